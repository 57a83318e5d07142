// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! RSA OAEP decryption and key unwrapping benchmarks.
//!
//! Both operate on the per-thread RSA pair. The ciphertext or wrapped key is
//! produced with the public half in `stage`, so only the private-key
//! operation is timed. A vector longer than the OAEP capacity of the modulus
//! is clamped to that capacity.

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{Digest, KeyGenMechanism, KeyTemplate, Mechanism, ObjectClass, ObjectHandle, Session};
use p11perf_core::types::{KeyType, VectorSize};
use p11perf_core::vendor::Vendor;

use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

fn oaep_name(digest: Digest) -> &'static str {
    match digest {
        Digest::Sha1 => "SHA1",
        Digest::Sha256 => "SHA256",
        Digest::Sha512 => "SHA512",
    }
}

/// Handles of both halves of the thread's RSA pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RsaPair {
    pub public: ObjectHandle,
    pub private: ObjectHandle,
}

impl RsaPair {
    pub(crate) fn resolve(
        identity: &BenchmarkIdentity,
        session: &dyn Session,
        thread: usize,
    ) -> Result<Self, BenchmarkError> {
        Ok(Self {
            private: identity.resolve(session, thread)?,
            public: identity.resolve_class(session, ObjectClass::PublicKey, thread)?,
        })
    }
}

/// RSA OAEP decryption of a block encrypted under the public key.
#[derive(Debug, Clone)]
pub struct OaepDecryptBenchmark {
    identity: BenchmarkIdentity,
    mechanism: Mechanism,
    modulus_bytes: usize,
    capacity: usize,
    keys: Option<RsaPair>,
    ciphertext: Vec<u8>,
    scratch: Scratch,
}

impl OaepDecryptBenchmark {
    pub fn new(digest: Digest, modulus_bits: u32, label: impl Into<String>, vendor: Vendor) -> Self {
        let name = format!("RSA OAEP {}", oaep_name(digest));
        let modulus_bytes = modulus_bits as usize / 8;
        Self {
            identity: BenchmarkIdentity::new(name, label, ObjectClass::PrivateKey, vendor).per_thread(),
            mechanism: Mechanism::RsaPkcsOaep(digest),
            modulus_bytes,
            capacity: digest.oaep_capacity(modulus_bytes),
            keys: None,
            ciphertext: Vec::new(),
            scratch: Scratch::default(),
        }
    }

    /// Largest plaintext one block carries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

impl Benchmark for OaepDecryptBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.keys = Some(RsaPair::resolve(&self.identity, session, thread)?);
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        self.scratch.bind(size.bytes().min(self.capacity), self.modulus_bytes);
        self.ciphertext.clear();
    }

    fn stage(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let Some(keys) = self.keys else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        self.ciphertext.resize(self.modulus_bytes, 0);
        session
            .encrypt_init(&self.mechanism, keys.public)
            .map_err(|e| self.identity.operation_error(e))?;
        let len = session
            .encrypt(&self.scratch.payload, &mut self.ciphertext)
            .map_err(|e| self.identity.operation_error(e))?;
        self.ciphertext.truncate(len);
        Ok(())
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let Some(keys) = self.keys else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        session
            .decrypt_init(&self.mechanism, keys.private)
            .map_err(|e| self.identity.operation_error(e))?;
        session
            .decrypt(&self.ciphertext, &mut self.scratch.output)
            .map_err(|e| self.identity.operation_error(e))?;
        Ok(())
    }

    fn cleanup(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        session.cancel_operation();
        Ok(())
    }
}

/// RSA OAEP unwrapping of a generic secret wrapped under the public key.
///
/// Each call creates one session key, destroyed again in `release`.
#[derive(Debug, Clone)]
pub struct OaepUnwrapBenchmark {
    identity: BenchmarkIdentity,
    mechanism: Mechanism,
    modulus_bytes: usize,
    capacity: usize,
    keys: Option<RsaPair>,
    secret_len: usize,
    wrapped: Vec<u8>,
    template: KeyTemplate,
    unwrapped: Option<ObjectHandle>,
}

impl OaepUnwrapBenchmark {
    pub fn new(digest: Digest, modulus_bits: u32, label: impl Into<String>, vendor: Vendor) -> Self {
        let name = format!("RSA OAEP UNWRAP {}", oaep_name(digest));
        let identity = BenchmarkIdentity::new(name, label, ObjectClass::PrivateKey, vendor).per_thread();
        let modulus_bytes = modulus_bits as usize / 8;
        let template = KeyTemplate {
            key_type: Some(KeyType::Generic),
            sensitive: true,
            ..KeyTemplate::ephemeral(format!("{}-unwrapped", identity.label))
        };
        Self {
            identity,
            mechanism: Mechanism::RsaPkcsOaep(digest),
            modulus_bytes,
            capacity: digest.oaep_capacity(modulus_bytes),
            keys: None,
            secret_len: 0,
            wrapped: Vec::new(),
            template,
            unwrapped: None,
        }
    }

    /// Value length of the secret wrapped for the bound vector.
    pub fn secret_len(&self) -> usize {
        self.secret_len
    }

    /// Label carried by every unwrapped key.
    pub fn unwrapped_label(&self) -> &str {
        &self.template.label
    }

    fn wrap_secret(
        &mut self,
        session: &mut dyn Session,
        public: ObjectHandle,
        secret: ObjectHandle,
    ) -> Result<(), BenchmarkError> {
        self.wrapped.resize(self.modulus_bytes, 0);
        let len = session
            .wrap_key(&self.mechanism, public, secret, &mut self.wrapped)
            .map_err(|e| self.identity.operation_error(e))?;
        self.wrapped.truncate(len);
        Ok(())
    }
}

impl Benchmark for OaepUnwrapBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.keys = Some(RsaPair::resolve(&self.identity, session, thread)?);
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        self.secret_len = size.bytes().min(self.capacity);
        self.wrapped.clear();
    }

    fn stage(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let Some(keys) = self.keys else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let secret_template = KeyTemplate {
            extractable: true,
            value_len: Some(self.secret_len),
            ..KeyTemplate::ephemeral(format!("{}-wrapped", self.identity.label))
        };
        let secret = session
            .generate_key(KeyGenMechanism::GenericSecretKey, &secret_template)
            .map_err(|e| self.identity.operation_error(e))?;
        let wrapped = self.wrap_secret(session, keys.public, secret);
        session
            .destroy_object(secret)
            .map_err(|e| self.identity.operation_error(e))?;
        wrapped
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let Some(keys) = self.keys else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let unwrapped = session
            .unwrap_key(&self.mechanism, keys.private, &self.wrapped, &self.template)
            .map_err(|e| self.identity.operation_error(e))?;
        self.unwrapped = Some(unwrapped);
        Ok(())
    }

    fn release(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        if let Some(handle) = self.unwrapped.take() {
            session
                .destroy_object(handle)
                .map_err(|e| self.identity.operation_error(e))?;
        }
        Ok(())
    }

    fn cleanup(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        self.release(session)
    }
}
