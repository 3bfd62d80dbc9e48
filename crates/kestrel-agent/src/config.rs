// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Flags shared by every subcommand: where persisted state lives and how to
/// log. Mirrors the host's top-level `Config`/`MuxConfig` flatten pattern.
#[derive(Debug, Clone, Parser)]
pub struct Config {
    /// Root directory for persisted bus topics, certs, and the image-sha
    /// latch. Stands in for the upstream system's `/persist`.
    #[arg(long, env = "KESTREL_STATE_DIR", default_value = "/var/lib/kestrel")]
    pub state_dir: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "KESTREL_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "KESTREL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// This device's UUID. Required by every subcommand that publishes or
    /// signs on the device's behalf.
    #[arg(long, env = "KESTREL_DEVICE_UUID")]
    pub device_uuid: Option<uuid::Uuid>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format: {other}"),
        }
        Ok(())
    }

    pub fn device_uuid(&self) -> anyhow::Result<uuid::Uuid> {
        self.device_uuid.ok_or_else(|| anyhow::anyhow!("--device-uuid is required"))
    }
}
