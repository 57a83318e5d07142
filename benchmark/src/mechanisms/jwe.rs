// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! JWE decryption benchmark: RSA OAEP key unwrap followed by AES-GCM
//! decryption of the payload.
//!
//! `stage` plays the sender. It generates an extractable content key,
//! seals the payload with the vendor's GCM layout, wraps the content key
//! under the public RSA key and destroys it. The timed call plays the
//! recipient and unwraps the content key, then opens the payload.

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{
    Digest, GcmParams, KeyGenMechanism, KeyTemplate, Mechanism, ObjectClass, ObjectHandle, Session,
};
use p11perf_core::types::{KeyType, VectorSize};
use p11perf_core::vendor::{GcmLayout, IvSource, Vendor, GCM_LAYOUTS};
use rand::RngCore;

use super::oaep::RsaPair;
use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

/// JWE `alg` and `enc` header values, e.g. `RSA-OAEP-256 A256GCM`.
fn jwe_name(digest: Digest, aes_bits: u32) -> String {
    let alg = match digest {
        Digest::Sha1 => "RSA-OAEP",
        Digest::Sha256 => "RSA-OAEP-256",
        Digest::Sha512 => "RSA-OAEP-512",
    };
    format!("JWE {} A{}GCM", alg, aes_bits)
}

#[derive(Debug, Clone)]
pub struct JweBenchmark {
    identity: BenchmarkIdentity,
    oaep: Mechanism,
    modulus_bytes: usize,
    aes_bits: u32,
    layouts: &'static [GcmLayout],
    layout: Option<GcmLayout>,
    keys: Option<RsaPair>,
    /// Wrapped content key.
    encrypted_key: Vec<u8>,
    /// Ciphertext followed by the tag.
    sealed: Vec<u8>,
    /// GCM parameters carrying the IV the payload was sealed with.
    gcm: Option<Mechanism>,
    cek_template: KeyTemplate,
    cek: Option<ObjectHandle>,
    scratch: Scratch,
}

impl JweBenchmark {
    pub fn new(digest: Digest, modulus_bits: u32, aes_bits: u32, label: impl Into<String>, vendor: Vendor) -> Self {
        Self::with_layouts(digest, modulus_bits, aes_bits, label, vendor, GCM_LAYOUTS)
    }

    /// Use a custom GCM quirk table instead of the built-in one.
    pub fn with_layouts(
        digest: Digest,
        modulus_bits: u32,
        aes_bits: u32,
        label: impl Into<String>,
        vendor: Vendor,
        layouts: &'static [GcmLayout],
    ) -> Self {
        let identity =
            BenchmarkIdentity::new(jwe_name(digest, aes_bits), label, ObjectClass::PrivateKey, vendor).per_thread();
        let cek_template = KeyTemplate {
            key_type: Some(KeyType::Aes),
            sensitive: true,
            decrypt: true,
            ..KeyTemplate::ephemeral(format!("{}-cek", identity.label))
        };
        Self {
            identity,
            oaep: Mechanism::RsaPkcsOaep(digest),
            modulus_bytes: modulus_bits as usize / 8,
            aes_bits,
            layouts,
            layout: None,
            keys: None,
            encrypted_key: Vec::new(),
            sealed: Vec::new(),
            gcm: None,
            cek_template,
            cek: None,
            scratch: Scratch::default(),
        }
    }

    /// IV the bound payload was sealed with.
    pub fn iv(&self) -> Option<&[u8]> {
        match &self.gcm {
            Some(Mechanism::AesGcm(params)) => Some(&params.iv),
            _ => None,
        }
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Label carried by the unwrapped content key.
    pub fn cek_label(&self) -> &str {
        &self.cek_template.label
    }

    /// Seal the payload under `cek` and wrap `cek` under the public key.
    fn seal_and_wrap(
        &mut self,
        session: &mut dyn Session,
        layout: GcmLayout,
        public: ObjectHandle,
        cek: ObjectHandle,
    ) -> Result<(), BenchmarkError> {
        let mut iv = vec![0u8; layout.iv_len];
        if layout.iv_source == IvSource::EngineRandom {
            rand::thread_rng().fill_bytes(&mut iv);
        }
        let tag_bits = (layout.tag_len * 8) as u32;
        let seal = Mechanism::AesGcm(GcmParams {
            iv,
            aad: Vec::new(),
            tag_bits,
        });

        let body_len = self.scratch.payload.len();
        let mut output = vec![0u8; body_len + layout.output_overhead];
        session
            .encrypt_init(&seal, cek)
            .map_err(|e| self.identity.operation_error(e))?;
        let len = session
            .encrypt(&self.scratch.payload, &mut output)
            .map_err(|e| self.identity.operation_error(e))?;

        let Mechanism::AesGcm(mut params) = seal else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let sealed_len = body_len + layout.tag_len;
        if layout.iv_source == IvSource::TokenGenerated {
            // the token appended the IV it drew after the tag
            let returned = output
                .get(sealed_len..len)
                .filter(|iv| iv.len() == params.iv.len())
                .ok_or_else(|| {
                    self.identity.operation_error(TokenError::FunctionFailed {
                        reason: format!("expected {} bytes of output, got {}", sealed_len + layout.iv_len, len),
                    })
                })?;
            params.iv.copy_from_slice(returned);
        }
        output.truncate(sealed_len);
        self.sealed = output;
        self.gcm = Some(Mechanism::AesGcm(params));

        self.encrypted_key.resize(self.modulus_bytes, 0);
        let len = session
            .wrap_key(&self.oaep, public, cek, &mut self.encrypted_key)
            .map_err(|e| self.identity.operation_error(e))?;
        self.encrypted_key.truncate(len);
        Ok(())
    }
}

impl Benchmark for JweBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        let vendor = self.identity.vendor;
        let layout = GcmLayout::lookup_in(self.layouts, vendor)
            .copied()
            .ok_or_else(|| BenchmarkError::UnsupportedVendor {
                benchmark: self.identity.name.clone(),
                vendor,
            })?;
        self.keys = Some(RsaPair::resolve(&self.identity, session, thread)?);
        self.layout = Some(layout);
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        self.scratch.bind(size.bytes(), size.bytes());
        self.sealed.clear();
        self.encrypted_key.clear();
        self.gcm = None;
    }

    fn stage(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let (Some(keys), Some(layout)) = (self.keys, self.layout) else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let sender_template = KeyTemplate {
            encrypt: true,
            extractable: true,
            value_len: Some(self.aes_bits as usize / 8),
            ..KeyTemplate::ephemeral(format!("{}-sender", self.cek_template.label))
        };
        let cek = session
            .generate_key(KeyGenMechanism::AesKey, &sender_template)
            .map_err(|e| self.identity.operation_error(e))?;
        let staged = self.seal_and_wrap(session, layout, keys.public, cek);
        session.cancel_operation();
        session
            .destroy_object(cek)
            .map_err(|e| self.identity.operation_error(e))?;
        staged
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let (Some(keys), Some(gcm)) = (self.keys, self.gcm.as_ref()) else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let cek = session
            .unwrap_key(&self.oaep, keys.private, &self.encrypted_key, &self.cek_template)
            .map_err(|e| self.identity.operation_error(e))?;
        self.cek = Some(cek);
        session
            .decrypt_init(gcm, cek)
            .map_err(|e| self.identity.operation_error(e))?;
        session
            .decrypt(&self.sealed, &mut self.scratch.output)
            .map_err(|e| self.identity.operation_error(e))?;
        Ok(())
    }

    fn release(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        if let Some(handle) = self.cek.take() {
            session
                .destroy_object(handle)
                .map_err(|e| self.identity.operation_error(e))?;
        }
        Ok(())
    }

    fn cleanup(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        session.cancel_operation();
        self.release(session)
    }
}
