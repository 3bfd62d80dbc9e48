// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn decrypt_round_trips_when_hash_matches() {
    let shared = [7u8; 32];
    let iv = [1u8; 16];
    let block = encrypt_for_test(&shared, iv, b"top secret cloud-init");
    let out = decrypt_shared_secret(&shared, &block).unwrap();
    assert_eq!(out, b"top secret cloud-init");
}

#[test]
fn tampered_cipher_data_is_rejected() {
    let shared = [7u8; 32];
    let iv = [1u8; 16];
    let mut block = encrypt_for_test(&shared, iv, b"top secret");
    block.cipher_data[0] ^= 0xFF;
    let err = decrypt_shared_secret(&shared, &block).unwrap_err();
    assert_eq!(err, SecureError::ClearHashMismatch);
}

#[test]
fn tampered_iv_is_rejected() {
    let shared = [7u8; 32];
    let iv = [1u8; 16];
    let mut block = encrypt_for_test(&shared, iv, b"top secret");
    block.iv[0] ^= 0xFF;
    let err = decrypt_shared_secret(&shared, &block).unwrap_err();
    assert_eq!(err, SecureError::ClearHashMismatch);
}
