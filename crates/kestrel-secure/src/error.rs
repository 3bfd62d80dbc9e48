// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecureError {
    HashSize,
    CertMiss,
    AlgoFail,
    SignVerifyFail,
    ClearHashMismatch,
    UnsupportedScheme,
    NoCipherContext,
}

impl SecureError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashSize => "HASH_SIZE",
            Self::CertMiss => "CERT_MISS",
            Self::AlgoFail => "ALGO_FAIL",
            Self::SignVerifyFail => "SIGN_VERIFY_FAIL",
            Self::ClearHashMismatch => "CLEAR_HASH_MISMATCH",
            Self::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            Self::NoCipherContext => "NO_CIPHER_CONTEXT",
        }
    }
}

impl fmt::Display for SecureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SecureError {}
