// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::sha2::Sha256 as RsaSha256;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SecureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HashAlgo {
    Sha256_16,
    Sha256_32,
}

impl HashAlgo {
    fn truncate<'a>(&self, full: &'a [u8; 32]) -> &'a [u8] {
        match self {
            Self::Sha256_16 => &full[..16],
            Self::Sha256_32 => &full[..],
        }
    }
}

/// Signed+hashed wrapper around every controller-bound payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protected_payload: Vec<u8>,
    pub sender_cert_hash: Vec<u8>,
    /// Present only when onboarding (base64-decoded onboard cert bytes).
    pub sender_cert: Option<Vec<u8>>,
    pub signature_hash: Vec<u8>,
    pub algo: HashAlgo,
}

/// The device's own signing key, either an ECDSA P-256 keypair or an RSA
/// PKCS1v15 keypair. TPM-backed keys are out of scope here: callers
/// holding a TPM key implement their own [`DeviceSigner`]-shaped closure
/// around the opaque `sign` operation instead of constructing this enum.
pub enum DeviceKey {
    EcdsaP256(ring::signature::EcdsaKeyPair),
    Rsa(Box<RsaPrivateKey>),
}

impl DeviceKey {
    /// Sign `payload` directly. Both the ring ECDSA P-256 fixed signer and
    /// the RSA PKCS1v15 signer hash the message internally with SHA-256, so
    /// the caller never pre-hashes.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SecureError> {
        match self {
            Self::EcdsaP256(pair) => {
                let rng = ring::rand::SystemRandom::new();
                let sig = pair.sign(&rng, payload).map_err(|_| SecureError::SignVerifyFail)?;
                Ok(sig.as_ref().to_vec())
            }
            Self::Rsa(key) => {
                let signing_key = RsaSigningKey::<RsaSha256>::new((**key).clone());
                let sig = signing_key.sign(payload);
                Ok(sig.to_vec())
            }
        }
    }
}

/// Sign `payload` and wrap it in an [`Envelope`] bound to `device_cert_der`.
///
/// `onboarding` attaches the full device cert so the controller can accept
/// a not-yet-trusted device exactly once.
pub fn sign_outbound(
    payload: &[u8],
    key: &DeviceKey,
    device_cert_der: &[u8],
    onboarding: bool,
) -> Result<Envelope, SecureError> {
    let signature_hash = key.sign(payload)?;
    let cert_hash = Sha256::digest(device_cert_der);
    Ok(Envelope {
        protected_payload: payload.to_vec(),
        sender_cert_hash: cert_hash.to_vec(),
        sender_cert: onboarding.then(|| device_cert_der.to_vec()),
        signature_hash,
        algo: HashAlgo::Sha256_32,
    })
}

/// A cached controller cert, keyed by its sha256 hash (full 32 bytes), used
/// to verify inbound envelopes without re-parsing PKI each time.
pub struct TrustedControllerCert {
    pub hash32: [u8; 32],
    pub public_key_der: Vec<u8>,
    pub is_ecdsa: bool,
}

/// Verify an inbound envelope's signature against the cached controller
/// cert. Returns the enclosed payload on success.
///
/// `sender_cert_hash` may be 16 or 32 bytes inbound even though
/// outbound envelopes always emit 32 (the open question on algo size is
/// resolved that way in DESIGN.md).
pub fn verify_inbound<'a>(
    envelope: &'a Envelope,
    cached: &TrustedControllerCert,
) -> Result<&'a [u8], SecureError> {
    if envelope.sender_cert_hash.len() != 16 && envelope.sender_cert_hash.len() != 32 {
        return Err(SecureError::HashSize);
    }
    let expected = match envelope.algo {
        HashAlgo::Sha256_16 => {
            if envelope.sender_cert_hash.len() != 16 {
                return Err(SecureError::AlgoFail);
            }
            cached.algo_truncated(HashAlgo::Sha256_16)
        }
        HashAlgo::Sha256_32 => {
            if envelope.sender_cert_hash.len() != 32 {
                return Err(SecureError::AlgoFail);
            }
            cached.algo_truncated(HashAlgo::Sha256_32)
        }
    };
    if envelope.sender_cert_hash != expected {
        return Err(SecureError::CertMiss);
    }

    let payload = &envelope.protected_payload;
    if cached.is_ecdsa {
        let pubkey = ring::signature::UnparsedPublicKey::new(
            &ring::signature::ECDSA_P256_SHA256_FIXED,
            &cached.public_key_der,
        );
        pubkey
            .verify(payload, &envelope.signature_hash)
            .map_err(|_| SecureError::SignVerifyFail)?;
    } else {
        let pubkey = RsaPublicKey::try_from(
            rsa::pkcs1::DecodeRsaPublicKey::from_pkcs1_der(&cached.public_key_der)
                .map_err(|_| SecureError::SignVerifyFail)?,
        )
        .map_err(|_| SecureError::SignVerifyFail)?;
        let verifying_key = rsa::pkcs1v15::VerifyingKey::<RsaSha256>::new(pubkey);
        let sig = rsa::pkcs1v15::Signature::try_from(envelope.signature_hash.as_slice())
            .map_err(|_| SecureError::SignVerifyFail)?;
        verifying_key.verify(payload, &sig).map_err(|_| SecureError::SignVerifyFail)?;
    }

    Ok(&envelope.protected_payload)
}

impl TrustedControllerCert {
    fn algo_truncated(&self, algo: HashAlgo) -> &[u8] {
        algo.truncate(&self.hash32)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
