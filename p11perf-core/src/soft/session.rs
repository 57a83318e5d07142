// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Software token session.
//!
//! Each session owns a private object namespace. Every object is a
//! session object and disappears when the session is dropped.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest as _, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::primitives::{self, GCM_TAG_LEN};
use super::Fault;
use crate::error::TokenError;
use crate::token::{
    Digest, GcmParams, KeyGenMechanism, KeyTemplate, Mechanism, ObjectClass, ObjectHandle, Session,
};
use crate::types::{Curve, KeyType};
use crate::vendor::{GcmLayout, IvSource, Vendor};

/// Secret bytes held by a software object.
#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyMaterial(Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Aes,
    /// Single-length DES, which no DES3 mechanism accepts.
    SingleDes,
    Des,
    Generic,
    Rsa { modulus_bytes: usize },
    Ec(Curve),
}

#[derive(Debug, Clone, Copy, Default)]
struct Usage {
    encrypt: bool,
    decrypt: bool,
    sign: bool,
    derive: bool,
    wrap: bool,
    unwrap: bool,
    extractable: bool,
}

impl Usage {
    fn from_template(template: &KeyTemplate) -> Self {
        Self {
            encrypt: template.encrypt,
            decrypt: template.decrypt,
            sign: template.sign,
            derive: template.derive,
            wrap: template.wrap,
            unwrap: template.unwrap,
            extractable: template.extractable,
        }
    }
}

struct SoftObject {
    class: ObjectClass,
    label: String,
    kind: KeyKind,
    usage: Usage,
    material: KeyMaterial,
}

impl SoftObject {
    /// Value keying emulated RSA OAEP. The public value is a digest of the
    /// private one, so either half of a pair yields the same value.
    fn oaep_key(&self) -> KeyMaterial {
        match self.class {
            ObjectClass::PrivateKey => KeyMaterial(Sha256::digest(&self.material.0).to_vec()),
            _ => KeyMaterial(self.material.0.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EncryptOp {
    AesEcb,
    AesCbc { iv: [u8; 16] },
    AesGcm { iv: [u8; 16], iv_len: usize },
    Des3Ecb,
    Des3Cbc { iv: [u8; 8] },
    RsaOaep { digest: Digest, modulus_bytes: usize },
}

#[derive(Debug, Clone, Copy)]
enum DecryptOp {
    AesGcm { iv: [u8; 16], iv_len: usize },
    RsaOaep { digest: Digest, modulus_bytes: usize },
}

#[derive(Debug, Clone, Copy)]
enum SignOp {
    Hmac(Digest),
    RsaPkcs { digest: Digest, modulus_bytes: usize },
    Ecdsa { digest: Digest, field_bytes: usize },
}

#[derive(Debug, Clone, Copy)]
enum ActiveOperation {
    Encrypt { op: EncryptOp, key: ObjectHandle },
    Decrypt { op: DecryptOp, key: ObjectHandle },
    Sign { op: SignOp, key: ObjectHandle },
}

/// A session against the software token.
pub struct SoftSession {
    vendor: Vendor,
    objects: BTreeMap<ObjectHandle, SoftObject>,
    next_handle: u64,
    active: Option<ActiveOperation>,
    rng: StdRng,
    fault: Option<Fault>,
    completed_calls: u64,
}

impl SoftSession {
    /// Open a session emulating the given vendor's parameter layouts.
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            objects: BTreeMap::new(),
            next_handle: 1,
            active: None,
            rng: StdRng::from_entropy(),
            fault: None,
            completed_calls: 0,
        }
    }

    /// Open a session that misbehaves according to `fault`.
    pub fn with_fault(vendor: Vendor, fault: Option<Fault>) -> Self {
        Self {
            fault,
            ..Self::new(vendor)
        }
    }

    /// Vendor flavour this session emulates.
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Number of objects currently in the session namespace.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of single-shot operations completed so far.
    pub fn completed_calls(&self) -> u64 {
        self.completed_calls
    }

    fn insert(&mut self, object: SoftObject) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn object(&self, handle: ObjectHandle) -> Result<&SoftObject, TokenError> {
        self.objects
            .get(&handle)
            .ok_or(TokenError::KeyHandleInvalid(handle.0))
    }

    fn random_material(&mut self, len: usize) -> KeyMaterial {
        let mut bytes = vec![0u8; len];
        self.rng.fill_bytes(&mut bytes);
        KeyMaterial(bytes)
    }

    /// Count a single-shot call and apply any injected operation fault.
    fn complete_call(&mut self) -> Result<(), TokenError> {
        if let Some(Fault::OperationAfter { calls }) = self.fault {
            if self.completed_calls >= calls {
                return Err(TokenError::FunctionFailed {
                    reason: "injected operation fault".to_string(),
                });
            }
        }
        self.completed_calls += 1;
        Ok(())
    }

    fn check_keygen_fault(&self) -> Result<(), TokenError> {
        if self.fault == Some(Fault::KeyGeneration) {
            return Err(TokenError::FunctionFailed {
                reason: "injected key generation fault".to_string(),
            });
        }
        Ok(())
    }

    /// Validate a GCM parameter block against the vendor layout and return
    /// the IV padded to 16 bytes with its length.
    fn gcm_iv(&self, params: &GcmParams) -> Result<([u8; 16], usize), TokenError> {
        let layout = GcmLayout::for_vendor(self.vendor).ok_or(TokenError::MechanismInvalid("AES_GCM"))?;
        if params.tag_bits as usize != layout.tag_len * 8 {
            return Err(TokenError::MechanismParamInvalid {
                reason: format!("tag length {} bits not supported", params.tag_bits),
            });
        }
        if !params.aad.is_empty() {
            return Err(TokenError::MechanismParamInvalid {
                reason: "additional authenticated data not supported".to_string(),
            });
        }
        if params.iv.len() != layout.iv_len {
            return Err(TokenError::MechanismParamInvalid {
                reason: format!(
                    "IV must be {} bytes for {}, got {}",
                    layout.iv_len,
                    self.vendor,
                    params.iv.len()
                ),
            });
        }
        if layout.iv_source == IvSource::FixedZero && params.iv.iter().any(|&b| b != 0) {
            return Err(TokenError::MechanismParamInvalid {
                reason: format!("{} requires an all-zero IV", self.vendor),
            });
        }
        let mut iv = [0u8; 16];
        iv[..params.iv.len()].copy_from_slice(&params.iv);
        Ok((iv, params.iv.len()))
    }

    /// RSA OAEP digest and modulus size for `key`, which must be of `class`.
    fn oaep_params(
        &self,
        mechanism: &Mechanism,
        key: &SoftObject,
        class: ObjectClass,
    ) -> Result<(Digest, usize), TokenError> {
        match (mechanism, key.class, key.kind) {
            (Mechanism::RsaPkcsOaep(digest), found, KeyKind::Rsa { modulus_bytes }) if found == class => {
                Ok((*digest, modulus_bytes))
            }
            (Mechanism::RsaPkcsOaep(_), _, _) => Err(TokenError::KeyTypeInconsistent {
                mechanism: mechanism.name(),
            }),
            _ => Err(TokenError::MechanismInvalid(mechanism.name())),
        }
    }

    fn run_encrypt(&mut self, op: EncryptOp, key: ObjectHandle, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        match op {
            EncryptOp::AesEcb => primitives::aes_ecb(&self.object(key)?.material.0, data, out),
            EncryptOp::AesCbc { iv } => primitives::aes_cbc(&self.object(key)?.material.0, &iv, data, out),
            EncryptOp::Des3Ecb => primitives::des3_emulated(&self.object(key)?.material.0, None, data, out),
            EncryptOp::Des3Cbc { iv } => {
                primitives::des3_emulated(&self.object(key)?.material.0, Some(&iv), data, out)
            }
            EncryptOp::RsaOaep { digest, modulus_bytes } => {
                let mut seed = [0u8; 64];
                let seed = &mut seed[..digest.output_len()];
                self.rng.fill_bytes(seed);
                let key = self.object(key)?.oaep_key();
                primitives::oaep_seal(&key.0, digest, modulus_bytes, seed, data, out)
            }
            EncryptOp::AesGcm { iv, iv_len } => {
                let layout = GcmLayout::for_vendor(self.vendor).ok_or(TokenError::MechanismInvalid("AES_GCM"))?;
                let needed = data.len() + layout.output_overhead;
                if out.len() < needed {
                    return Err(TokenError::BufferTooSmall {
                        needed,
                        provided: out.len(),
                    });
                }
                let mut nonce = iv;
                if layout.iv_source == IvSource::TokenGenerated {
                    self.rng.fill_bytes(&mut nonce[..iv_len]);
                }
                let (body, rest) = out.split_at_mut(data.len());
                body.copy_from_slice(data);
                let key_bytes = &self.object(key)?.material.0;
                primitives::aes_gcm_seal(key_bytes, &nonce[..iv_len], body, &mut rest[..GCM_TAG_LEN])?;
                if layout.iv_source == IvSource::TokenGenerated {
                    rest[GCM_TAG_LEN..GCM_TAG_LEN + iv_len].copy_from_slice(&nonce[..iv_len]);
                }
                Ok(needed)
            }
        }
    }

    fn run_decrypt(&self, op: DecryptOp, key: ObjectHandle, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let object = self.object(key)?;
        match op {
            DecryptOp::AesGcm { iv, iv_len } => {
                let body_len = data
                    .len()
                    .checked_sub(GCM_TAG_LEN)
                    .ok_or(TokenError::DataLenRange { len: data.len() })?;
                if out.len() < body_len {
                    return Err(TokenError::BufferTooSmall {
                        needed: body_len,
                        provided: out.len(),
                    });
                }
                let (body, tag) = data.split_at(body_len);
                out[..body_len].copy_from_slice(body);
                primitives::aes_gcm_open(&object.material.0, &iv[..iv_len], &mut out[..body_len], tag)?;
                Ok(body_len)
            }
            DecryptOp::RsaOaep { digest, modulus_bytes } => {
                primitives::oaep_open(&object.oaep_key().0, digest, modulus_bytes, data, out)
            }
        }
    }

    fn run_sign(&self, op: SignOp, key: ObjectHandle, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let material = &self.object(key)?.material.0;
        let needed = match op {
            SignOp::Hmac(digest) => digest.output_len(),
            SignOp::RsaPkcs { modulus_bytes, .. } => modulus_bytes,
            SignOp::Ecdsa { field_bytes, .. } => 2 * field_bytes,
        };
        if out.len() < needed {
            return Err(TokenError::BufferTooSmall {
                needed,
                provided: out.len(),
            });
        }
        match op {
            SignOp::Hmac(digest) => primitives::hmac(digest, material, data, out),
            SignOp::RsaPkcs { digest, .. } | SignOp::Ecdsa { digest, .. } => {
                let mut hashed = [0u8; 64];
                let len = primitives::hash(digest, data, &mut hashed);
                primitives::expand(&[material, &hashed[..len]], &mut out[..needed]);
                Ok(needed)
            }
        }
    }
}

impl Session for SoftSession {
    fn find_object(&self, class: ObjectClass, label: &str) -> Result<Option<ObjectHandle>, TokenError> {
        Ok(self
            .objects
            .iter()
            .find(|(_, obj)| obj.class == class && obj.label == label)
            .map(|(handle, _)| *handle))
    }

    fn generate_key(&mut self, mechanism: KeyGenMechanism, template: &KeyTemplate) -> Result<ObjectHandle, TokenError> {
        self.check_keygen_fault()?;
        let (kind, len) = match mechanism {
            KeyGenMechanism::AesKey => {
                let len = template
                    .value_len
                    .ok_or(TokenError::TemplateIncomplete { attribute: "CKA_VALUE_LEN" })?;
                if !matches!(len, 16 | 24 | 32) {
                    return Err(TokenError::KeySizeRange {
                        bits: (len * 8) as u32,
                    });
                }
                (KeyKind::Aes, len)
            }
            KeyGenMechanism::DesKey => (KeyKind::SingleDes, 8),
            KeyGenMechanism::Des2Key => (KeyKind::Des, 16),
            KeyGenMechanism::Des3Key => (KeyKind::Des, 24),
            KeyGenMechanism::GenericSecretKey => {
                let len = template
                    .value_len
                    .ok_or(TokenError::TemplateIncomplete { attribute: "CKA_VALUE_LEN" })?;
                if len == 0 {
                    return Err(TokenError::KeySizeRange { bits: 0 });
                }
                (KeyKind::Generic, len)
            }
            KeyGenMechanism::RsaPkcsKeyPair | KeyGenMechanism::EcKeyPair => {
                return Err(TokenError::MechanismInvalid("key pair mechanism used for secret key"));
            }
        };
        let material = self.random_material(len);
        Ok(self.insert(SoftObject {
            class: ObjectClass::SecretKey,
            label: template.label.clone(),
            kind,
            usage: Usage::from_template(template),
            material,
        }))
    }

    fn generate_key_pair(
        &mut self,
        mechanism: KeyGenMechanism,
        public: &KeyTemplate,
        private: &KeyTemplate,
    ) -> Result<(ObjectHandle, ObjectHandle), TokenError> {
        self.check_keygen_fault()?;
        let kind = match mechanism {
            KeyGenMechanism::RsaPkcsKeyPair => {
                let bits = public
                    .modulus_bits
                    .ok_or(TokenError::TemplateIncomplete { attribute: "CKA_MODULUS_BITS" })?;
                if !(1024..=8192).contains(&bits) || bits % 8 != 0 {
                    return Err(TokenError::KeySizeRange { bits });
                }
                if public.public_exponent.is_none() {
                    return Err(TokenError::TemplateIncomplete {
                        attribute: "CKA_PUBLIC_EXPONENT",
                    });
                }
                KeyKind::Rsa {
                    modulus_bytes: bits as usize / 8,
                }
            }
            KeyGenMechanism::EcKeyPair => {
                let curve = public
                    .curve
                    .ok_or(TokenError::TemplateIncomplete { attribute: "CKA_EC_PARAMS" })?;
                KeyKind::Ec(curve)
            }
            _ => return Err(TokenError::MechanismInvalid("secret key mechanism used for key pair")),
        };
        let private_material = self.random_material(32);
        let public_material = KeyMaterial(Sha256::digest(&private_material.0).to_vec());
        let public_handle = self.insert(SoftObject {
            class: ObjectClass::PublicKey,
            label: public.label.clone(),
            kind,
            usage: Usage {
                encrypt: public.encrypt,
                wrap: public.wrap,
                ..Usage::default()
            },
            material: public_material,
        });
        let private_handle = self.insert(SoftObject {
            class: ObjectClass::PrivateKey,
            label: private.label.clone(),
            kind,
            usage: Usage {
                decrypt: private.decrypt,
                sign: private.sign,
                derive: private.derive,
                unwrap: private.unwrap,
                ..Usage::default()
            },
            material: private_material,
        });
        Ok((public_handle, private_handle))
    }

    fn destroy_object(&mut self, handle: ObjectHandle) -> Result<(), TokenError> {
        self.objects
            .remove(&handle)
            .map(|_| ())
            .ok_or(TokenError::ObjectHandleInvalid(handle.0))
    }

    fn encrypt_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError> {
        if self.active.is_some() {
            return Err(TokenError::OperationActive);
        }
        let object = self.object(key)?;
        if !object.usage.encrypt {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "encrypt" });
        }
        let op = match (mechanism, object.class, object.kind) {
            (Mechanism::AesEcb, ObjectClass::SecretKey, KeyKind::Aes) => EncryptOp::AesEcb,
            (Mechanism::AesCbc { iv }, ObjectClass::SecretKey, KeyKind::Aes) => EncryptOp::AesCbc { iv: *iv },
            (Mechanism::AesGcm(params), ObjectClass::SecretKey, KeyKind::Aes) => {
                let (iv, iv_len) = self.gcm_iv(params)?;
                EncryptOp::AesGcm { iv, iv_len }
            }
            (Mechanism::Des3Ecb, ObjectClass::SecretKey, KeyKind::Des) => EncryptOp::Des3Ecb,
            (Mechanism::Des3Cbc { iv }, ObjectClass::SecretKey, KeyKind::Des) => EncryptOp::Des3Cbc { iv: *iv },
            (Mechanism::RsaPkcsOaep(_), _, _) => {
                let (digest, modulus_bytes) = self.oaep_params(mechanism, object, ObjectClass::PublicKey)?;
                EncryptOp::RsaOaep { digest, modulus_bytes }
            }
            (
                Mechanism::AesEcb
                | Mechanism::AesCbc { .. }
                | Mechanism::AesGcm(_)
                | Mechanism::Des3Ecb
                | Mechanism::Des3Cbc { .. },
                _,
                _,
            ) => {
                return Err(TokenError::KeyTypeInconsistent {
                    mechanism: mechanism.name(),
                });
            }
            _ => return Err(TokenError::MechanismInvalid(mechanism.name())),
        };
        self.active = Some(ActiveOperation::Encrypt { op, key });
        Ok(())
    }

    fn encrypt(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let (op, key) = match self.active.take() {
            Some(ActiveOperation::Encrypt { op, key }) => (op, key),
            other => {
                self.active = other;
                return Err(TokenError::OperationNotInitialized);
            }
        };
        self.complete_call()?;
        match self.run_encrypt(op, key, data, out) {
            // a short buffer leaves the operation active so the caller may retry
            Err(err @ TokenError::BufferTooSmall { .. }) => {
                self.active = Some(ActiveOperation::Encrypt { op, key });
                Err(err)
            }
            result => result,
        }
    }

    fn decrypt_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError> {
        if self.active.is_some() {
            return Err(TokenError::OperationActive);
        }
        let object = self.object(key)?;
        if !object.usage.decrypt {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "decrypt" });
        }
        let op = match (mechanism, object.class, object.kind) {
            (Mechanism::AesGcm(params), ObjectClass::SecretKey, KeyKind::Aes) => {
                let (iv, iv_len) = self.gcm_iv(params)?;
                DecryptOp::AesGcm { iv, iv_len }
            }
            (Mechanism::AesGcm(_), _, _) => {
                return Err(TokenError::KeyTypeInconsistent {
                    mechanism: mechanism.name(),
                });
            }
            _ => {
                let (digest, modulus_bytes) = self.oaep_params(mechanism, object, ObjectClass::PrivateKey)?;
                DecryptOp::RsaOaep { digest, modulus_bytes }
            }
        };
        self.active = Some(ActiveOperation::Decrypt { op, key });
        Ok(())
    }

    fn decrypt(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let (op, key) = match self.active.take() {
            Some(ActiveOperation::Decrypt { op, key }) => (op, key),
            other => {
                self.active = other;
                return Err(TokenError::OperationNotInitialized);
            }
        };
        self.complete_call()?;
        match self.run_decrypt(op, key, data, out) {
            Err(err @ TokenError::BufferTooSmall { .. }) => {
                self.active = Some(ActiveOperation::Decrypt { op, key });
                Err(err)
            }
            result => result,
        }
    }

    fn sign_init(&mut self, mechanism: &Mechanism, key: ObjectHandle) -> Result<(), TokenError> {
        if self.active.is_some() {
            return Err(TokenError::OperationActive);
        }
        let object = self.object(key)?;
        if !object.usage.sign {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "sign" });
        }
        let op = match (mechanism, object.class, object.kind) {
            (Mechanism::Hmac(digest), ObjectClass::SecretKey, KeyKind::Generic) => SignOp::Hmac(*digest),
            (Mechanism::RsaPkcs(digest), ObjectClass::PrivateKey, KeyKind::Rsa { modulus_bytes }) => {
                SignOp::RsaPkcs {
                    digest: *digest,
                    modulus_bytes,
                }
            }
            (Mechanism::Ecdsa(digest), ObjectClass::PrivateKey, KeyKind::Ec(curve)) => SignOp::Ecdsa {
                digest: *digest,
                field_bytes: curve.field_bytes(),
            },
            (Mechanism::Hmac(_) | Mechanism::RsaPkcs(_) | Mechanism::Ecdsa(_), _, _) => {
                return Err(TokenError::KeyTypeInconsistent {
                    mechanism: mechanism.name(),
                });
            }
            _ => return Err(TokenError::MechanismInvalid(mechanism.name())),
        };
        self.active = Some(ActiveOperation::Sign { op, key });
        Ok(())
    }

    fn sign(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
        let (op, key) = match self.active.take() {
            Some(ActiveOperation::Sign { op, key }) => (op, key),
            other => {
                self.active = other;
                return Err(TokenError::OperationNotInitialized);
            }
        };
        self.complete_call()?;
        match self.run_sign(op, key, data, out) {
            Err(err @ TokenError::BufferTooSmall { .. }) => {
                self.active = Some(ActiveOperation::Sign { op, key });
                Err(err)
            }
            result => result,
        }
    }

    fn derive_key(
        &mut self,
        mechanism: &Mechanism,
        base: ObjectHandle,
        template: &KeyTemplate,
    ) -> Result<ObjectHandle, TokenError> {
        let object = self.object(base)?;
        if !object.usage.derive {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "derive" });
        }
        let material = match (mechanism, object.class, object.kind) {
            (Mechanism::Ecdh1Derive { public_data }, ObjectClass::PrivateKey, KeyKind::Ec(curve)) => {
                let point_len = 1 + 2 * curve.field_bytes();
                if public_data.len() != point_len || public_data[0] != 0x04 {
                    return Err(TokenError::MechanismParamInvalid {
                        reason: format!("expected a {}-byte uncompressed point", point_len),
                    });
                }
                let len = template
                    .value_len
                    .ok_or(TokenError::TemplateIncomplete { attribute: "CKA_VALUE_LEN" })?;
                let mut value = vec![0u8; len];
                primitives::expand(&[&object.material.0, public_data], &mut value);
                KeyMaterial(value)
            }
            (Mechanism::XorBaseAndData { data }, ObjectClass::SecretKey, _) => {
                if data.is_empty() {
                    return Err(TokenError::MechanismParamInvalid {
                        reason: "derivation data is empty".to_string(),
                    });
                }
                let base_value = &object.material.0;
                let len = template.value_len.unwrap_or(base_value.len());
                let value = (0..len)
                    .map(|i| base_value[i % base_value.len()] ^ data[i % data.len()])
                    .collect();
                KeyMaterial(value)
            }
            (Mechanism::Ecdh1Derive { .. } | Mechanism::XorBaseAndData { .. }, _, _) => {
                return Err(TokenError::KeyTypeInconsistent {
                    mechanism: mechanism.name(),
                });
            }
            _ => return Err(TokenError::MechanismInvalid(mechanism.name())),
        };
        self.complete_call()?;
        Ok(self.insert(SoftObject {
            class: ObjectClass::SecretKey,
            label: template.label.clone(),
            kind: KeyKind::Generic,
            usage: Usage::from_template(template),
            material,
        }))
    }

    fn wrap_key(
        &mut self,
        mechanism: &Mechanism,
        wrapping_key: ObjectHandle,
        key: ObjectHandle,
        out: &mut [u8],
    ) -> Result<usize, TokenError> {
        let wrapping = self.object(wrapping_key)?;
        if !wrapping.usage.wrap {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "wrap" });
        }
        let (digest, modulus_bytes) = self.oaep_params(mechanism, wrapping, ObjectClass::PublicKey)?;
        let wrapping_value = wrapping.oaep_key();

        let target = self.object(key)?;
        if target.class != ObjectClass::SecretKey {
            return Err(TokenError::KeyTypeInconsistent {
                mechanism: mechanism.name(),
            });
        }
        if !target.usage.extractable {
            return Err(TokenError::KeyUnextractable);
        }
        let value = KeyMaterial(target.material.0.clone());

        self.complete_call()?;
        let mut seed = [0u8; 64];
        let seed = &mut seed[..digest.output_len()];
        self.rng.fill_bytes(seed);
        primitives::oaep_seal(&wrapping_value.0, digest, modulus_bytes, seed, &value.0, out)
    }

    fn unwrap_key(
        &mut self,
        mechanism: &Mechanism,
        unwrapping_key: ObjectHandle,
        wrapped: &[u8],
        template: &KeyTemplate,
    ) -> Result<ObjectHandle, TokenError> {
        let unwrapping = self.object(unwrapping_key)?;
        if !unwrapping.usage.unwrap {
            return Err(TokenError::KeyFunctionNotPermitted { usage: "unwrap" });
        }
        let (digest, modulus_bytes) = self.oaep_params(mechanism, unwrapping, ObjectClass::PrivateKey)?;
        let kind = match template.key_type {
            Some(KeyType::Aes) => KeyKind::Aes,
            Some(KeyType::Des) => KeyKind::Des,
            Some(KeyType::Generic) => KeyKind::Generic,
            Some(other) => {
                return Err(TokenError::TemplateInconsistent {
                    attribute: "CKA_KEY_TYPE",
                    reason: format!("{} is not a secret key type", other),
                })
            }
            None => return Err(TokenError::TemplateIncomplete { attribute: "CKA_KEY_TYPE" }),
        };

        let mut value = KeyMaterial(vec![0u8; modulus_bytes]);
        let len = primitives::oaep_open(&unwrapping.oaep_key().0, digest, modulus_bytes, wrapped, &mut value.0)?;
        value.0.truncate(len);
        let legal = match kind {
            KeyKind::Aes => matches!(len, 16 | 24 | 32),
            KeyKind::Des => matches!(len, 16 | 24),
            _ => len > 0,
        };
        if !legal {
            return Err(TokenError::KeySizeRange {
                bits: (len * 8) as u32,
            });
        }
        if let Some(expected) = template.value_len {
            if expected != len {
                return Err(TokenError::TemplateInconsistent {
                    attribute: "CKA_VALUE_LEN",
                    reason: format!("is {} but the wrapped key holds {} bytes", expected, len),
                });
            }
        }

        self.complete_call()?;
        Ok(self.insert(SoftObject {
            class: ObjectClass::SecretKey,
            label: template.label.clone(),
            kind,
            usage: Usage::from_template(template),
            material: value,
        }))
    }

    fn generate_random(&mut self, out: &mut [u8]) -> Result<(), TokenError> {
        self.complete_call()?;
        self.rng.fill_bytes(out);
        Ok(())
    }

    fn seed_random(&mut self, seed: &[u8]) -> Result<(), TokenError> {
        self.complete_call()?;
        let mut state = [0u8; 32];
        self.rng.fill_bytes(&mut state);
        let mixed: [u8; 32] = Sha256::new().chain_update(state).chain_update(seed).finalize().into();
        self.rng = StdRng::from_seed(mixed);
        Ok(())
    }

    fn cancel_operation(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::GcmParams;

    fn aes_template(label: &str, len: usize) -> KeyTemplate {
        KeyTemplate {
            encrypt: true,
            decrypt: true,
            value_len: Some(len),
            ..KeyTemplate::ephemeral(label)
        }
    }

    fn gcm(iv: Vec<u8>) -> Mechanism {
        Mechanism::AesGcm(GcmParams {
            iv,
            aad: Vec::new(),
            tag_bits: 128,
        })
    }

    #[test]
    fn test_find_object_by_label() {
        let mut session = SoftSession::new(Vendor::Generic);
        let handle = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-128", 16))
            .unwrap();
        assert_eq!(
            session.find_object(ObjectClass::SecretKey, "aes-128").unwrap(),
            Some(handle)
        );
        assert_eq!(session.find_object(ObjectClass::SecretKey, "aes-256").unwrap(), None);
        assert_eq!(session.find_object(ObjectClass::PrivateKey, "aes-128").unwrap(), None);
    }

    #[test]
    fn test_aes_key_size_range() {
        let mut session = SoftSession::new(Vendor::Generic);
        let err = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes", 12))
            .unwrap_err();
        assert_eq!(err, TokenError::KeySizeRange { bits: 96 });
    }

    #[test]
    fn test_generic_gcm_layout() {
        let mut session = SoftSession::new(Vendor::Generic);
        let key = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-256", 32))
            .unwrap();
        session.encrypt_init(&gcm(vec![9u8; 12]), key).unwrap();
        let mut out = vec![0u8; 64 + 16];
        assert_eq!(session.encrypt(&[0u8; 64], &mut out).unwrap(), 80);
    }

    #[test]
    fn test_luna_gcm_appends_iv() {
        let mut session = SoftSession::new(Vendor::Luna);
        let key = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-128", 16))
            .unwrap();

        session.encrypt_init(&gcm(vec![0u8; 16]), key).unwrap();
        let mut short = vec![0u8; 8 + 16];
        assert!(matches!(
            session.encrypt(&[0u8; 8], &mut short),
            Err(TokenError::BufferTooSmall { needed: 40, .. })
        ));
        // the short buffer left the operation active
        let mut out = vec![0u8; 8 + 32];
        assert_eq!(session.encrypt(&[0u8; 8], &mut out).unwrap(), 40);
        assert!(out[24..].iter().any(|&b| b != 0));

        assert!(matches!(
            session.encrypt_init(&gcm(vec![0u8; 12]), key),
            Err(TokenError::MechanismParamInvalid { .. })
        ));
    }

    #[test]
    fn test_fixed_iv_vendor_rejects_nonzero_iv() {
        for vendor in [Vendor::Utimaco, Vendor::Entrust] {
            let mut session = SoftSession::new(vendor);
            let key = session
                .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-192", 24))
                .unwrap();
            assert!(session.encrypt_init(&gcm(vec![1u8; 12]), key).is_err());
            assert!(session.encrypt_init(&gcm(vec![0u8; 12]), key).is_ok());
        }
    }

    #[test]
    fn test_operation_lifecycle() {
        let mut session = SoftSession::new(Vendor::Generic);
        let key = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-128", 16))
            .unwrap();
        let mut out = [0u8; 16];
        assert_eq!(
            session.encrypt(&[0u8; 16], &mut out),
            Err(TokenError::OperationNotInitialized)
        );
        session.encrypt_init(&Mechanism::AesEcb, key).unwrap();
        assert_eq!(
            session.encrypt_init(&Mechanism::AesEcb, key),
            Err(TokenError::OperationActive)
        );
        session.cancel_operation();
        session.encrypt_init(&Mechanism::AesEcb, key).unwrap();
        assert_eq!(session.encrypt(&[0u8; 16], &mut out).unwrap(), 16);
        assert_eq!(session.completed_calls(), 1);
    }

    #[test]
    fn test_rsa_signature_length() {
        let mut session = SoftSession::new(Vendor::Generic);
        let public = KeyTemplate {
            verify: true,
            modulus_bits: Some(2048),
            public_exponent: Some(65537),
            ..KeyTemplate::ephemeral("rsa-2048")
        };
        let private = KeyTemplate {
            sign: true,
            private: true,
            sensitive: true,
            ..KeyTemplate::ephemeral("rsa-2048")
        };
        let (_, key) = session
            .generate_key_pair(KeyGenMechanism::RsaPkcsKeyPair, &public, &private)
            .unwrap();
        session.sign_init(&Mechanism::RsaPkcs(Digest::Sha256), key).unwrap();
        let mut sig = [0u8; 256];
        assert_eq!(session.sign(b"payload", &mut sig).unwrap(), 256);
    }

    #[test]
    fn test_injected_faults() {
        let mut session = SoftSession::with_fault(Vendor::Generic, Some(Fault::KeyGeneration));
        assert!(session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes", 16))
            .is_err());

        let mut session = SoftSession::with_fault(Vendor::Generic, Some(Fault::OperationAfter { calls: 2 }));
        let mut out = [0u8; 8];
        assert!(session.generate_random(&mut out).is_ok());
        assert!(session.generate_random(&mut out).is_ok());
        assert!(session.generate_random(&mut out).is_err());
    }

    #[test]
    fn test_single_des_key_rejected_by_des3() {
        let mut session = SoftSession::new(Vendor::Generic);
        let template = KeyTemplate {
            encrypt: true,
            ..KeyTemplate::ephemeral("des-64")
        };
        let single = session.generate_key(KeyGenMechanism::DesKey, &template).unwrap();
        for mechanism in [Mechanism::Des3Ecb, Mechanism::Des3Cbc { iv: [0u8; 8] }] {
            assert_eq!(
                session.encrypt_init(&mechanism, single),
                Err(TokenError::KeyTypeInconsistent {
                    mechanism: mechanism.name()
                })
            );
        }

        let double = session.generate_key(KeyGenMechanism::Des2Key, &template).unwrap();
        session.encrypt_init(&Mechanism::Des3Cbc { iv: [0u8; 8] }, double).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(session.encrypt(&[0u8; 16], &mut out).unwrap(), 16);
    }

    fn rsa_pair(session: &mut SoftSession, bits: u32) -> (ObjectHandle, ObjectHandle) {
        let public = KeyTemplate {
            encrypt: true,
            wrap: true,
            modulus_bits: Some(bits),
            public_exponent: Some(65537),
            ..KeyTemplate::ephemeral("rsa")
        };
        let private = KeyTemplate {
            decrypt: true,
            unwrap: true,
            private: true,
            sensitive: true,
            ..KeyTemplate::ephemeral("rsa")
        };
        session
            .generate_key_pair(KeyGenMechanism::RsaPkcsKeyPair, &public, &private)
            .unwrap()
    }

    #[test]
    fn test_oaep_public_encrypt_private_decrypt() {
        let mut session = SoftSession::new(Vendor::Generic);
        let (public, private) = rsa_pair(&mut session, 2048);
        let mechanism = Mechanism::RsaPkcsOaep(Digest::Sha256);

        session.encrypt_init(&mechanism, public).unwrap();
        let mut block = [0u8; 256];
        assert_eq!(session.encrypt(b"attack at dawn", &mut block).unwrap(), 256);

        session.decrypt_init(&mechanism, private).unwrap();
        let mut plain = [0u8; 256];
        let len = session.decrypt(&block, &mut plain).unwrap();
        assert_eq!(&plain[..len], b"attack at dawn");

        // the public key cannot decrypt and the private key cannot encrypt
        assert!(matches!(
            session.decrypt_init(&mechanism, public),
            Err(TokenError::KeyFunctionNotPermitted { usage: "decrypt" })
        ));
        assert!(matches!(
            session.encrypt_init(&mechanism, private),
            Err(TokenError::KeyFunctionNotPermitted { usage: "encrypt" })
        ));

        // a digest mismatch is detected on decryption
        session.decrypt_init(&Mechanism::RsaPkcsOaep(Digest::Sha1), private).unwrap();
        assert_eq!(session.decrypt(&block, &mut plain), Err(TokenError::EncryptedDataInvalid));
    }

    #[test]
    fn test_oaep_message_over_capacity() {
        let mut session = SoftSession::new(Vendor::Generic);
        let (public, _) = rsa_pair(&mut session, 1024);
        session.encrypt_init(&Mechanism::RsaPkcsOaep(Digest::Sha1), public).unwrap();
        let mut block = [0u8; 128];
        assert_eq!(
            session.encrypt(&[7u8; 87], &mut block),
            Err(TokenError::DataLenRange { len: 87 })
        );
        session.encrypt_init(&Mechanism::RsaPkcsOaep(Digest::Sha1), public).unwrap();
        assert_eq!(session.encrypt(&[7u8; 86], &mut block).unwrap(), 128);
    }

    #[test]
    fn test_wrap_then_unwrap_secret_key() {
        let mut session = SoftSession::new(Vendor::Generic);
        let (public, private) = rsa_pair(&mut session, 2048);
        let mechanism = Mechanism::RsaPkcsOaep(Digest::Sha1);
        let cek = session
            .generate_key(
                KeyGenMechanism::AesKey,
                &KeyTemplate {
                    extractable: true,
                    ..aes_template("cek", 32)
                },
            )
            .unwrap();

        let mut wrapped = [0u8; 256];
        assert_eq!(session.wrap_key(&mechanism, public, cek, &mut wrapped).unwrap(), 256);

        let template = KeyTemplate {
            key_type: Some(KeyType::Aes),
            ..aes_template("unwrapped", 32)
        };
        let unwrapped = session.unwrap_key(&mechanism, private, &wrapped, &template).unwrap();

        // both keys seal identical data to identical output
        let mut sealed = [[0u8; 16]; 2];
        for (key, out) in [cek, unwrapped].into_iter().zip(sealed.iter_mut()) {
            session.encrypt_init(&Mechanism::AesEcb, key).unwrap();
            session.encrypt(&[3u8; 16], out).unwrap();
        }
        assert_eq!(sealed[0], sealed[1]);

        let short = KeyTemplate {
            key_type: Some(KeyType::Aes),
            ..aes_template("unwrapped", 16)
        };
        assert!(matches!(
            session.unwrap_key(&mechanism, private, &wrapped, &short),
            Err(TokenError::TemplateInconsistent {
                attribute: "CKA_VALUE_LEN",
                ..
            })
        ));
        assert_eq!(
            session.unwrap_key(&mechanism, private, &wrapped, &KeyTemplate::ephemeral("untyped")),
            Err(TokenError::TemplateIncomplete { attribute: "CKA_KEY_TYPE" })
        );
    }

    #[test]
    fn test_wrap_requires_extractable_key() {
        let mut session = SoftSession::new(Vendor::Generic);
        let (public, _) = rsa_pair(&mut session, 2048);
        let key = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-128", 16))
            .unwrap();
        let mut wrapped = [0u8; 256];
        assert_eq!(
            session.wrap_key(&Mechanism::RsaPkcsOaep(Digest::Sha256), public, key, &mut wrapped),
            Err(TokenError::KeyUnextractable)
        );
        assert_eq!(session.completed_calls(), 0);
    }

    #[test]
    fn test_gcm_decrypt_with_returned_iv() {
        let mut session = SoftSession::new(Vendor::Luna);
        let key = session
            .generate_key(KeyGenMechanism::AesKey, &aes_template("aes-128", 16))
            .unwrap();
        session.encrypt_init(&gcm(vec![0u8; 16]), key).unwrap();
        let mut sealed = vec![0u8; 24 + 32];
        assert_eq!(session.encrypt(b"twenty-four byte message", &mut sealed).unwrap(), 56);

        // the token placed its IV after the tag
        let (body_and_tag, iv) = sealed.split_at(24 + 16);
        session.decrypt_init(&gcm(iv.to_vec()), key).unwrap();
        let mut plain = [0u8; 24];
        assert_eq!(session.decrypt(body_and_tag, &mut plain).unwrap(), 24);
        assert_eq!(&plain, b"twenty-four byte message");

        session.decrypt_init(&gcm(vec![0u8; 16]), key).unwrap();
        assert_eq!(
            session.decrypt(body_and_tag, &mut plain),
            Err(TokenError::EncryptedDataInvalid)
        );
    }

    #[test]
    fn test_xor_derive_and_destroy() {
        let mut session = SoftSession::new(Vendor::Generic);
        let template = KeyTemplate {
            derive: true,
            value_len: Some(16),
            ..KeyTemplate::ephemeral("xorder-128")
        };
        let base = session
            .generate_key(KeyGenMechanism::GenericSecretKey, &template)
            .unwrap();
        let derived = session
            .derive_key(
                &Mechanism::XorBaseAndData { data: vec![0xff; 16] },
                base,
                &KeyTemplate::ephemeral("derived"),
            )
            .unwrap();
        assert_eq!(session.object_count(), 2);
        session.destroy_object(derived).unwrap();
        assert_eq!(session.object_count(), 1);
        assert!(session.destroy_object(derived).is_err());
    }
}
