// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Composable error-with-source-and-timestamp, embedded by value into every
/// status type that can carry an aggregated error.
///
/// Clearing requires the same source to publish a status with `error=None`;
/// callers should use [`ErrorAndTime::set`] / [`ErrorAndTime::clear_source`]
/// rather than constructing this directly so the clear-requires-same-source
/// rule stays in one place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorAndTime {
    pub description: Option<String>,
    pub source: Option<String>,
    /// Unix epoch milliseconds.
    pub at_ms: Option<u64>,
}

impl ErrorAndTime {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(source: impl Into<String>, description: impl Into<String>, at_ms: u64) -> Self {
        Self { description: Some(description.into()), source: Some(source.into()), at_ms: Some(at_ms) }
    }

    pub fn has_error(&self) -> bool {
        self.description.is_some()
    }

    pub fn is_source(&self, source: &str) -> bool {
        self.source.as_deref() == Some(source)
    }

    /// Clear the error only if it currently belongs to `source`; a clean
    /// status from an unrelated source must not hide an outstanding error
    /// from another.
    pub fn clear_if_source(&mut self, source: &str) {
        if self.is_source(source) {
            *self = Self::none();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_if_source_ignores_other_sources() {
        let mut e = ErrorAndTime::set("domain", "boot failed", 1000);
        e.clear_if_source("network");
        assert!(e.has_error());
        e.clear_if_source("domain");
        assert!(!e.has_error());
    }
}
