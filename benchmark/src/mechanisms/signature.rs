// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Signature benchmarks: HMAC, RSA PKCS#1 and ECDSA.

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{Digest, Mechanism, ObjectClass, ObjectHandle, Session};
use p11perf_core::types::{Curve, VectorSize};
use p11perf_core::vendor::Vendor;

use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

/// Single-shot signature over the bound payload.
#[derive(Debug, Clone)]
pub struct SignBenchmark {
    identity: BenchmarkIdentity,
    mechanism: Mechanism,
    signature_len: usize,
    key: Option<ObjectHandle>,
    scratch: Scratch,
}

impl SignBenchmark {
    /// HMAC with a shared generic secret.
    pub fn hmac(digest: Digest, label: impl Into<String>, vendor: Vendor) -> Self {
        let name = match digest {
            Digest::Sha1 => "HMAC SHA1",
            Digest::Sha256 => "HMAC SHA256",
            Digest::Sha512 => "HMAC SHA512",
        };
        Self::new(
            BenchmarkIdentity::new(name, label, ObjectClass::SecretKey, vendor),
            Mechanism::Hmac(digest),
            digest.output_len(),
        )
    }

    /// RSA PKCS#1 v1.5 with SHA-256, one key pair per thread.
    pub fn rsa_pkcs(modulus_bits: u32, label: impl Into<String>, vendor: Vendor) -> Self {
        Self::new(
            BenchmarkIdentity::new("RSA PKCS#1 SHA256", label, ObjectClass::PrivateKey, vendor).per_thread(),
            Mechanism::RsaPkcs(Digest::Sha256),
            modulus_bits as usize / 8,
        )
    }

    /// ECDSA with SHA-256, one key pair per thread.
    pub fn ecdsa(curve: Curve, label: impl Into<String>, vendor: Vendor) -> Self {
        Self::new(
            BenchmarkIdentity::new("ECDSA SHA256", label, ObjectClass::PrivateKey, vendor).per_thread(),
            Mechanism::Ecdsa(Digest::Sha256),
            2 * curve.field_bytes(),
        )
    }

    fn new(identity: BenchmarkIdentity, mechanism: Mechanism, signature_len: usize) -> Self {
        Self {
            identity,
            mechanism,
            signature_len,
            key: None,
            scratch: Scratch::default(),
        }
    }

    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

impl Benchmark for SignBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.key = Some(self.identity.resolve(session, thread)?);
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        self.scratch.bind(size.bytes(), self.signature_len);
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let Some(key) = self.key else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        session
            .sign_init(&self.mechanism, key)
            .map_err(|e| self.identity.operation_error(e))?;
        session
            .sign(&self.scratch.payload, &mut self.scratch.output)
            .map_err(|e| self.identity.operation_error(e))?;
        Ok(())
    }

    fn cleanup(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        session.cancel_operation();
        Ok(())
    }
}
