// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Newtype wrappers and enumerations for validated inputs.
//!
//! All types validate their invariants at creation time, so a value that
//! reaches the engine is already known to be legal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum number of worker threads accepted by the configuration.
const MAX_THREADS: usize = 1024;
/// Maximum test vector size: 16 MB.
const MAX_VECTOR_SIZE: usize = 16 * 1024 * 1024;

/// Kind of key material the key generator can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Aes,
    Des,
    Ecdsa,
    Ecdh,
    /// Generic secret, used for HMAC and XOR derivation.
    Generic,
}

impl KeyType {
    /// Legal bit lengths for size-parameterised key types.
    pub fn legal_bits(&self) -> &'static [u32] {
        match self {
            KeyType::Rsa => &[2048, 3072, 4096],
            KeyType::Aes => &[128, 192, 256],
            KeyType::Des => &[128, 192],
            KeyType::Generic => &[128, 160, 256, 512],
            KeyType::Ecdsa | KeyType::Ecdh => &[],
        }
    }

    /// Whether keys of this type are parameterised by a named curve.
    pub fn uses_curve(&self) -> bool {
        matches!(self, KeyType::Ecdsa | KeyType::Ecdh)
    }

    /// Asymmetric key pairs are generated once per thread under a
    /// thread-qualified label; symmetric keys share one alias.
    pub fn is_per_thread(&self) -> bool {
        matches!(self, KeyType::Rsa | KeyType::Ecdsa | KeyType::Ecdh)
    }

    /// Check a size or curve against the fixed catalogue for this key type.
    pub fn validate(&self, spec: KeySpec) -> Result<KeySpec, ConfigError> {
        match (self.uses_curve(), spec) {
            (true, KeySpec::Curve(_)) => Ok(spec),
            (true, KeySpec::Bits(bits)) => Err(ConfigError::UnsupportedCurve {
                key_type: *self,
                curve: format!("{} bits", bits),
            }),
            (false, KeySpec::Bits(bits)) if self.legal_bits().contains(&bits) => Ok(spec),
            (false, KeySpec::Bits(bits)) => Err(ConfigError::UnsupportedKeySize {
                key_type: *self,
                bits,
            }),
            (false, KeySpec::Curve(curve)) => Err(ConfigError::UnsupportedCurve {
                key_type: *self,
                curve: curve.to_string(),
            }),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Rsa => "RSA",
            KeyType::Aes => "AES",
            KeyType::Des => "DES",
            KeyType::Ecdsa => "ECDSA",
            KeyType::Ecdh => "ECDH",
            KeyType::Generic => "GENERIC",
        };
        f.write_str(name)
    }
}

/// Named elliptic curves supported by the EC key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256r1,
    Secp384r1,
    Secp521r1,
}

impl Curve {
    /// Canonical curve name.
    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp256r1 => "secp256r1",
            Curve::Secp384r1 => "secp384r1",
            Curve::Secp521r1 => "secp521r1",
        }
    }

    /// Size of one field element in bytes.
    pub fn field_bytes(&self) -> usize {
        match self {
            Curve::Secp256r1 => 32,
            Curve::Secp384r1 => 48,
            Curve::Secp521r1 => 66,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Curve {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256r1" | "prime256v1" | "p-256" => Ok(Curve::Secp256r1),
            "secp384r1" | "p-384" => Ok(Curve::Secp384r1),
            "secp521r1" | "p-521" => Ok(Curve::Secp521r1),
            _ => Err(ConfigError::UnknownKeySize {
                name: s.to_string(),
            }),
        }
    }
}

/// Size or curve parameter for a key generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySpec {
    Bits(u32),
    Curve(Curve),
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::Bits(bits) => write!(f, "{} bits", bits),
            KeySpec::Curve(curve) => write!(f, "{}", curve),
        }
    }
}

impl From<u32> for KeySpec {
    fn from(bits: u32) -> Self {
        KeySpec::Bits(bits)
    }
}

impl From<Curve> for KeySpec {
    fn from(curve: Curve) -> Self {
        KeySpec::Curve(curve)
    }
}

/// Validated concurrency level.
/// Must be in range 1-1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ThreadCount(usize);

impl ThreadCount {
    /// Create a new ThreadCount with validation.
    pub fn new(threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 || threads > MAX_THREADS {
            return Err(ConfigError::InvalidFieldValue {
                field: "threads",
                value: threads.to_string(),
                reason: format!("Must be between 1 and {}", MAX_THREADS),
            });
        }
        Ok(Self(threads))
    }

    /// Get the inner value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for ThreadCount {
    type Error = ConfigError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ThreadCount> for usize {
    fn from(threads: ThreadCount) -> Self {
        threads.0
    }
}

/// Validated test vector size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorSize(usize);

impl VectorSize {
    /// Create a new VectorSize with validation.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size == 0 || size > MAX_VECTOR_SIZE {
            return Err(ConfigError::InvalidFieldValue {
                field: "vectors",
                value: size.to_string(),
                reason: format!("Vector size must be between 1 and {} bytes", MAX_VECTOR_SIZE),
            });
        }
        Ok(Self(size))
    }

    /// Get the size in bytes.
    pub fn bytes(&self) -> usize {
        self.0
    }

    /// Report key for this vector, e.g. `testvec0064`.
    pub fn name(&self) -> String {
        format!("testvec{:04}", self.0)
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for VectorSize {
    type Error = ConfigError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorSize> for usize {
    fn from(size: VectorSize) -> Self {
        size.0
    }
}
