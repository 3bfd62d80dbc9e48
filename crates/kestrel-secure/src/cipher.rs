// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use kestrel_types::cipher::{CipherBlock, CipherContext, KeyExchangeScheme};
use p256::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::SecureError;

type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

/// Decrypt `block` under `ctx` using the device's static EC private key and
/// the controller's public key recovered from its cert.
///
/// `device_key` is the device's static secret, which may live in a
/// TPM reachable only through an opaque `ecdh-zgen` call instead — callers
/// in that situation perform the scalar multiplication themselves and pass
/// the resulting shared secret's `X‖Y` bytes to [`decrypt_shared_secret`].
pub fn decrypt(
    ctx: &CipherContext,
    block: &CipherBlock,
    device_key: &SecretKey,
    controller_public_key: &PublicKey,
) -> Result<Vec<u8>, SecureError> {
    if ctx.scheme != KeyExchangeScheme::EcdhAes256Cfb {
        return Err(SecureError::UnsupportedScheme);
    }
    let shared = p256::ecdh::diffie_hellman(
        device_key.to_nonzero_scalar(),
        controller_public_key.as_affine(),
    );
    decrypt_shared_secret(shared.raw_secret_bytes(), block)
}

/// Decrypt given an already-computed ECDH shared secret's raw bytes
/// (`X‖Y`, as produced by a TPM `ecdh-zgen` call or [`decrypt`] above).
pub fn decrypt_shared_secret(shared_xy: &[u8], block: &CipherBlock) -> Result<Vec<u8>, SecureError> {
    let aes_key: [u8; 32] = Sha256::digest(shared_xy).into();
    let iv: [u8; 16] =
        block.iv.as_slice().try_into().map_err(|_| SecureError::UnsupportedScheme)?;
    let mut buf = block.cipher_data.clone();
    Aes256CfbDec::new((&aes_key).into(), (&iv).into()).decrypt(&mut buf);

    let got_hash = Sha256::digest(&buf);
    if got_hash.as_slice() != block.clear_text_hash.as_slice() {
        return Err(SecureError::ClearHashMismatch);
    }
    Ok(buf)
}

/// Used only by the signing/encrypt side of tests — the controller plays
/// this role in production.
pub fn encrypt_for_test(shared_xy: &[u8], iv: [u8; 16], plaintext: &[u8]) -> CipherBlock {
    type Enc = cfb_mode::Encryptor<aes::Aes256>;
    let aes_key: [u8; 32] = Sha256::digest(shared_xy).into();
    let mut buf = plaintext.to_vec();
    Enc::new((&aes_key).into(), (&iv).into()).encrypt(&mut buf);
    CipherBlock {
        cipher_context_id: "test".into(),
        iv: iv.to_vec(),
        cipher_data: buf,
        clear_text_hash: Sha256::digest(plaintext).to_vec(),
    }
}

#[cfg(test)]
#[path = "cipher_tests.rs"]
mod tests;
