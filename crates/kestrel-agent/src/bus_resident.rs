// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bus` subcommand: the PKI bootstrap and secure-channel deferred-send
//! resident. Every other subcommand opens its own [`kestrel_bus::Bus`]
//! rooted at the same persisted directory; this process is the one that
//! owns the controller channel and drains the deferred-send queue.

use std::sync::Arc;

use kestrel_secure::{sign_outbound, DeferredSendQueue, DeviceKey};
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use tokio_util::sync::CancellationToken;

const DEVICE_KEY_FILE: &str = "device-key.pkcs8";
const DEVICE_CERT_FILE: &str = "device-cert.der";

pub async fn run(
    state_dir: std::path::PathBuf,
    controller_url: String,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let queue = DeferredSendQueue::new();
    tracing::info!(state_dir = %state_dir.display(), "bus resident started");

    let identity = load_or_create_identity(&state_dir).await?;
    let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(15)).build()?;

    let drain_shutdown = shutdown.clone();
    let drain: Arc<DeferredSendQueue> = queue.clone();
    let drain_task = tokio::spawn(async move {
        drain
            .run(drain_shutdown, |destination, item| {
                let client = client.clone();
                let controller_url = controller_url.clone();
                let key = identity.key.clone();
                let cert_der = identity.cert_der.clone();
                async move {
                    let envelope = match sign_outbound(&item.payload, &key, &cert_der, false) {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::error!(destination, error = %e, "failed to sign deferred envelope");
                            return false;
                        }
                    };
                    let body = match serde_json::to_vec(&envelope) {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::error!(destination, error = %e, "failed to encode deferred envelope");
                            return false;
                        }
                    };
                    let url = format!("{controller_url}/{destination}");
                    match client.post(&url).body(body).send().await {
                        Ok(resp) if resp.status().is_success() => true,
                        Ok(resp) => {
                            tracing::warn!(destination, status = %resp.status(), "deferred send rejected");
                            false
                        }
                        Err(e) => {
                            tracing::warn!(destination, error = %e, "deferred send failed, will retry");
                            false
                        }
                    }
                }
            })
            .await;
    });

    shutdown.cancelled().await;
    let _ = drain_task.await;
    Ok(())
}

#[derive(Clone)]
struct DeviceIdentity {
    key: Arc<DeviceKey>,
    cert_der: Vec<u8>,
}

/// Load this device's signing key and cert from `state_dir`, generating a
/// fresh self-signed-equivalent ECDSA P-256 identity on first run. Real
/// onboarding (getting that cert countersigned by the controller) happens
/// out of band; this only guarantees a stable keypair to sign with across
/// restarts.
async fn load_or_create_identity(state_dir: &std::path::Path) -> anyhow::Result<DeviceIdentity> {
    let key_path = state_dir.join(DEVICE_KEY_FILE);
    let cert_path = state_dir.join(DEVICE_CERT_FILE);

    let pkcs8 = match tokio::fs::read(&key_path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let rng = ring::rand::SystemRandom::new();
            let generated = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
                .map_err(|_| anyhow::anyhow!("failed to generate device signing key"))?;
            tokio::fs::create_dir_all(state_dir).await?;
            let tmp = state_dir.join(format!("{DEVICE_KEY_FILE}.tmp"));
            tokio::fs::write(&tmp, generated.as_ref()).await?;
            tokio::fs::rename(&tmp, &key_path).await?;
            generated.as_ref().to_vec()
        }
    };
    let rng = ring::rand::SystemRandom::new();
    let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng)
        .map_err(|_| anyhow::anyhow!("stored device key is invalid"))?;

    let cert_der = match tokio::fs::read(&cert_path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!(
                path = %cert_path.display(),
                "no device cert on disk yet; deferred sends will carry an unverifiable cert hash until onboarding completes"
            );
            pair.public_key().as_ref().to_vec()
        }
    };

    Ok(DeviceIdentity { key: Arc::new(DeviceKey::EcdsaP256(pair)), cert_der })
}
