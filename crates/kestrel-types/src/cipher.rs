// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExchangeScheme {
    EcdhAes256Cfb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerCert {
    pub hash: Vec<u8>,
    pub der: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeNodeCert {
    pub der: Vec<u8>,
    /// Private key bytes; `None` when the key lives in a TPM and is only
    /// reachable through the opaque sign/ecdh-zgen interface.
    pub private_key_pkcs8: Option<Vec<u8>>,
}

/// Names a controller cert, a device cert, and a key-exchange scheme under
/// which cipher-blocks bound to this context are decrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherContext {
    pub id: String,
    pub controller_cert_hash: Vec<u8>,
    pub device_cert_hash: Vec<u8>,
    pub scheme: KeyExchangeScheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherBlock {
    pub cipher_context_id: String,
    pub iv: Vec<u8>,
    pub cipher_data: Vec<u8>,
    pub clear_text_hash: Vec<u8>,
}
