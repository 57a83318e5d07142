// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Token interface consumed by the benchmark engine.
//!
//! Mirrors the subset of a PKCS#11-style interface the engine measures:
//! object lookup by label, key generation, single-shot encrypt, decrypt
//! and sign, key wrapping, key derivation and random generation.
//! Implementations convert their own return codes into [`TokenError`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::{Curve, KeyType};

/// Class of a token object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    SecretKey,
    PublicKey,
    PrivateKey,
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectClass::SecretKey => write!(f, "secret key"),
            ObjectClass::PublicKey => write!(f, "public key"),
            ObjectClass::PrivateKey => write!(f, "private key"),
        }
    }
}

/// Opaque handle to an object living in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Hash functions used by HMAC and signature mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Digest {
    Sha1,
    Sha256,
    Sha512,
}

impl Digest {
    /// Output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Digest::Sha1 => 20,
            Digest::Sha256 => 32,
            Digest::Sha512 => 64,
        }
    }

    /// Largest message RSA OAEP over this digest carries in a modulus of
    /// `modulus_bytes`.
    pub fn oaep_capacity(&self, modulus_bytes: usize) -> usize {
        modulus_bytes.saturating_sub(2 * self.output_len() + 2)
    }
}

/// AES-GCM parameter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcmParams {
    pub iv: Vec<u8>,
    pub aad: Vec<u8>,
    pub tag_bits: u32,
}

/// Operation mechanisms, each carrying its parameter block.
///
/// Benchmarks own their mechanism and lend it to the token on every
/// init call, so no parameter block is rebuilt on the hot path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    AesEcb,
    AesCbc { iv: [u8; 16] },
    AesGcm(GcmParams),
    Des3Ecb,
    Des3Cbc { iv: [u8; 8] },
    Hmac(Digest),
    /// PKCS#1 v1.5 signature over a hash of the data.
    RsaPkcs(Digest),
    /// RSA OAEP with MGF1 over the same digest and an empty label.
    RsaPkcsOaep(Digest),
    Ecdsa(Digest),
    Ecdh1Derive { public_data: Vec<u8> },
    XorBaseAndData { data: Vec<u8> },
}

impl Mechanism {
    /// Short mechanism name, used in errors.
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::AesEcb => "AES_ECB",
            Mechanism::AesCbc { .. } => "AES_CBC",
            Mechanism::AesGcm(_) => "AES_GCM",
            Mechanism::Des3Ecb => "DES3_ECB",
            Mechanism::Des3Cbc { .. } => "DES3_CBC",
            Mechanism::Hmac(Digest::Sha1) => "SHA_1_HMAC",
            Mechanism::Hmac(Digest::Sha256) => "SHA256_HMAC",
            Mechanism::Hmac(Digest::Sha512) => "SHA512_HMAC",
            Mechanism::RsaPkcs(_) => "RSA_PKCS",
            Mechanism::RsaPkcsOaep(_) => "RSA_PKCS_OAEP",
            Mechanism::Ecdsa(_) => "ECDSA",
            Mechanism::Ecdh1Derive { .. } => "ECDH1_DERIVE",
            Mechanism::XorBaseAndData { .. } => "XOR_BASE_AND_DATA",
        }
    }
}

/// Key generation mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyGenMechanism {
    RsaPkcsKeyPair,
    EcKeyPair,
    AesKey,
    DesKey,
    Des2Key,
    Des3Key,
    GenericSecretKey,
}

/// Attribute template for key creation.
///
/// Only the attributes the engine sets are modelled; `token` stays
/// false for every key the engine creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTemplate {
    pub label: String,
    pub token: bool,
    pub private: bool,
    pub sensitive: bool,
    pub encrypt: bool,
    pub decrypt: bool,
    pub sign: bool,
    pub verify: bool,
    pub derive: bool,
    pub wrap: bool,
    pub unwrap: bool,
    pub extractable: bool,
    /// Key type of an unwrapped key.
    pub key_type: Option<KeyType>,
    pub value_len: Option<usize>,
    pub modulus_bits: Option<u32>,
    pub public_exponent: Option<u32>,
    pub curve: Option<Curve>,
}

impl KeyTemplate {
    /// Session-scoped template carrying only a label.
    pub fn ephemeral(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: false,
            ..Self::default()
        }
    }
}

/// Descriptive information about a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub label: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

/// An authenticated session to a token.
///
/// One session is owned by exactly one worker thread; implementations need
/// to be `Send` but never `Sync`.
pub trait Session: Send {
    /// Find the first object of `class` carrying `label`.
    fn find_object(&self, class: ObjectClass, label: &str) -> Result<Option<ObjectHandle>, TokenError>;

    /// Generate a secret key.
    fn generate_key(
        &mut self,
        mechanism: KeyGenMechanism,
        template: &KeyTemplate,
    ) -> Result<ObjectHandle, TokenError>;

    /// Generate a key pair, returning (public, private) handles.
    fn generate_key_pair(
        &mut self,
        mechanism: KeyGenMechanism,
        public: &KeyTemplate,
        private: &KeyTemplate,
    ) -> Result<(ObjectHandle, ObjectHandle), TokenError>;

    /// Destroy an object.
    fn destroy_object(&mut self, handle: ObjectHandle) -> Result<(), TokenError>;

    fn encrypt_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError>;

    /// Single-shot encryption; returns the number of bytes written to `out`.
    fn encrypt(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError>;

    fn decrypt_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError>;

    /// Single-shot decryption; returns the number of bytes written to `out`.
    fn decrypt(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError>;

    fn sign_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError>;

    /// Single-shot signature; returns the number of bytes written to `out`.
    fn sign(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError>;

    /// Derive a new secret key from `base`.
    fn derive_key(
        &mut self,
        mechanism: &Mechanism,
        base: ObjectHandle,
        template: &KeyTemplate,
    ) -> Result<ObjectHandle, TokenError>;

    /// Encrypt the value of `key` under `wrapping_key`; returns the number
    /// of bytes written to `out`.
    fn wrap_key(
        &mut self,
        mechanism: &Mechanism,
        wrapping_key: ObjectHandle,
        key: ObjectHandle,
        out: &mut [u8],
    ) -> Result<usize, TokenError>;

    /// Decrypt `wrapped` under `unwrapping_key` into a new secret key.
    fn unwrap_key(
        &mut self,
        mechanism: &Mechanism,
        unwrapping_key: ObjectHandle,
        wrapped: &[u8],
        template: &KeyTemplate,
    ) -> Result<ObjectHandle, TokenError>;

    fn generate_random(&mut self, out: &mut [u8]) -> Result<(), TokenError>;

    fn seed_random(&mut self, seed: &[u8]) -> Result<(), TokenError>;

    /// Abandon any active multi-step operation. Idempotent.
    fn cancel_operation(&mut self);
}

/// A token able to open authenticated sessions.
pub trait Token: Send + Sync {
    fn info(&self) -> TokenInfo;

    /// Open and authenticate a new session.
    fn open_session(&self) -> Result<Box<dyn Session>, TokenError>;
}
