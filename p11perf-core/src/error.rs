//! Custom error types for p11perf.
//!
//! Explicit enum error types for every failure category the engine can
//! observe. No `Box<dyn Error>`, no `anyhow::Result` in library code.

use std::path::PathBuf;

use thiserror::Error;

use crate::token::ObjectClass;
use crate::types::{Curve, KeyType};
use crate::vendor::Vendor;

/// Top-level error type for the benchmark engine.
#[derive(Debug, Error)]
pub enum PerfError {
    // =========================================================================
    // Configuration Errors - Fatal Before Any Token Call
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // =========================================================================
    // Key Generation Errors - Fatal To The Whole Run
    // =========================================================================
    #[error("Key generation error: {0}")]
    KeyGeneration(#[from] KeyGenerationError),

    // =========================================================================
    // Benchmark Errors - Fatal To One Benchmark Only
    // =========================================================================
    #[error("Benchmark error: {0}")]
    Benchmark(#[from] BenchmarkError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PerfError {
    /// BSD sysexits-style process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            PerfError::Config(_) => 64,
            PerfError::KeyGeneration(_) | PerfError::Benchmark(_) => 70,
            PerfError::Io { .. } => 74,
        }
    }
}

/// Configuration errors are detected before the engine starts and abort the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown vendor flavour '{name}' (possible values: {choices})")]
    UnknownVendor { name: String, choices: String },

    #[error("Unsupported key size for {key_type}: {bits} bits")]
    UnsupportedKeySize { key_type: KeyType, bits: u32 },

    #[error("Unsupported curve for {key_type}: {curve}")]
    UnsupportedCurve { key_type: KeyType, curve: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown test coverage item: {name}")]
    UnknownCoverage { name: String },

    #[error("Unknown key size or curve item: {name}")]
    UnknownKeySize { name: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },
}

/// Aggregate failure of a parallel key generation step.
///
/// No partial success is exposed: keys created on the succeeding sessions
/// are left in place and the caller must abandon the run.
#[derive(Debug, Error)]
#[error("failed to generate {key_type} key '{alias}' on thread(s) {failed_threads:?}")]
pub struct KeyGenerationError {
    pub key_type: KeyType,
    pub alias: String,
    pub failed_threads: Vec<usize>,
}

/// Errors raised by a single benchmark's prepare or execute step.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Object not found: {class} labelled '{label}'")]
    ObjectNotFound { class: ObjectClass, label: String },

    #[error("Benchmark '{benchmark}' has no handling for vendor {vendor}")]
    UnsupportedVendor { benchmark: String, vendor: Vendor },

    #[error("Operation failed in '{benchmark}': {source}")]
    Operation {
        benchmark: String,
        #[source]
        source: TokenError,
    },

    #[error("Worker thread {thread} panicked")]
    ThreadPanicked { thread: usize },
}

/// Token-level return codes surfaced through the session interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("object handle {0} is invalid")]
    ObjectHandleInvalid(u64),

    #[error("key handle {0} is invalid")]
    KeyHandleInvalid(u64),

    #[error("key type inconsistent with mechanism {mechanism}")]
    KeyTypeInconsistent { mechanism: &'static str },

    #[error("key does not permit {usage}")]
    KeyFunctionNotPermitted { usage: &'static str },

    #[error("mechanism {0} is not supported")]
    MechanismInvalid(&'static str),

    #[error("mechanism parameter invalid: {reason}")]
    MechanismParamInvalid { reason: String },

    #[error("no operation initialised")]
    OperationNotInitialized,

    #[error("an operation is already active")]
    OperationActive,

    #[error("output buffer too small: needed {needed} bytes, provided {provided}")]
    BufferTooSmall { needed: usize, provided: usize },

    #[error("data length {len} out of range")]
    DataLenRange { len: usize },

    #[error("encrypted data is invalid")]
    EncryptedDataInvalid,

    #[error("key is not extractable")]
    KeyUnextractable,

    #[error("template incomplete: missing {attribute}")]
    TemplateIncomplete { attribute: &'static str },

    #[error("template inconsistent: {attribute} {reason}")]
    TemplateInconsistent { attribute: &'static str, reason: String },

    #[error("key size {bits} out of range")]
    KeySizeRange { bits: u32 },

    #[error("curve {0} is not supported")]
    CurveNotSupported(Curve),

    #[error("function failed: {reason}")]
    FunctionFailed { reason: String },
}

/// Result type alias using PerfError.
pub type PerfResult<T> = Result<T, PerfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnsupportedKeySize {
            key_type: KeyType::Aes,
            bits: 100,
        };
        assert!(err.to_string().contains("AES"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_error_chain() {
        let err = ConfigError::UnknownVendor {
            name: "acme".to_string(),
            choices: Vendor::choices().join(", "),
        };
        let perf_err: PerfError = err.into();
        assert!(matches!(perf_err, PerfError::Config(_)));
        assert_eq!(perf_err.exit_code(), 64);
    }

    #[test]
    fn test_key_generation_error_lists_threads() {
        let err = KeyGenerationError {
            key_type: KeyType::Rsa,
            alias: "rsa-2048".to_string(),
            failed_threads: vec![1, 3],
        };
        let msg = err.to_string();
        assert!(msg.contains("rsa-2048"));
        assert!(msg.contains("[1, 3]"));
        assert_eq!(PerfError::from(err).exit_code(), 70);
    }

    #[test]
    fn test_operation_error_keeps_source() {
        let err = BenchmarkError::Operation {
            benchmark: "AES GCM".to_string(),
            source: TokenError::BufferTooSmall {
                needed: 48,
                provided: 32,
            },
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("AES GCM"));
    }
}
