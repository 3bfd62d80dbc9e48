// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Unified error codes for the bus, following the host agent's convention
/// of a flat enum with an `as_str()` rather than nested error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The value could not be serialized. Treated as a programming error by
    /// callers — publishers should never hand the bus an unserializable
    /// value.
    SerializeFailed(String),
    /// A subscriber registered against a topic with a different type name
    /// than the one it was created with.
    TypeMismatch { expected: String, got: String },
    /// Persistence write failed; the publish itself still succeeded
    /// in-memory.
    PersistWriteFailed(String),
    PersistLoadFailed(String),
}

impl BusError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SerializeFailed(_) => "SERIALIZE_FAILED",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::PersistWriteFailed(_) => "PERSIST_WRITE_FAILED",
            Self::PersistLoadFailed(_) => "PERSIST_LOAD_FAILED",
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializeFailed(msg) => write!(f, "{}: {msg}", self.as_str()),
            Self::TypeMismatch { expected, got } => {
                write!(f, "{}: expected {expected}, got {got}", self.as_str())
            }
            Self::PersistWriteFailed(msg) => write!(f, "{}: {msg}", self.as_str()),
            Self::PersistLoadFailed(msg) => write!(f, "{}: {msg}", self.as_str()),
        }
    }
}

impl std::error::Error for BusError {}
