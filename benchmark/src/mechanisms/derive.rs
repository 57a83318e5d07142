// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Key derivation benchmarks: ECDH1 and XOR-base-and-data.

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{KeyTemplate, Mechanism, ObjectClass, ObjectHandle, Session};
use p11perf_core::types::{Curve, VectorSize};
use p11perf_core::vendor::Vendor;
use rand::RngCore;

use crate::lifecycle::{Benchmark, BenchmarkIdentity};

/// Value length of keys produced by XOR derivation.
const XOR_DERIVED_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeriveKind {
    Ecdh(Curve),
    Xor,
}

/// Derives a new session key from a base key on every call.
///
/// The derived key is destroyed in `release`, after the sample is taken,
/// so the session holds at most one derived key at a time.
#[derive(Debug, Clone)]
pub struct DeriveBenchmark {
    identity: BenchmarkIdentity,
    kind: DeriveKind,
    base: Option<ObjectHandle>,
    mechanism: Option<Mechanism>,
    template: KeyTemplate,
    derived: Option<ObjectHandle>,
}

impl DeriveBenchmark {
    /// ECDH1 derivation against a fresh peer point, one key pair per thread.
    pub fn ecdh(curve: Curve, label: impl Into<String>, vendor: Vendor) -> Self {
        let identity = BenchmarkIdentity::new("ECDH1 DERIVE", label, ObjectClass::PrivateKey, vendor).per_thread();
        let template = KeyTemplate {
            value_len: Some(curve.field_bytes()),
            ..KeyTemplate::ephemeral(derived_label(&identity.label))
        };
        Self {
            identity,
            kind: DeriveKind::Ecdh(curve),
            base: None,
            mechanism: None,
            template,
            derived: None,
        }
    }

    /// XOR of a shared generic secret with the bound payload.
    pub fn xor(label: impl Into<String>, vendor: Vendor) -> Self {
        let identity = BenchmarkIdentity::new("XOR BASE AND DATA", label, ObjectClass::SecretKey, vendor);
        let template = KeyTemplate {
            value_len: Some(XOR_DERIVED_LEN),
            ..KeyTemplate::ephemeral(derived_label(&identity.label))
        };
        Self {
            identity,
            kind: DeriveKind::Xor,
            base: None,
            mechanism: None,
            template,
            derived: None,
        }
    }

    /// Label carried by every key this benchmark derives.
    pub fn derived_label(&self) -> &str {
        &self.template.label
    }
}

fn derived_label(label: &str) -> String {
    format!("{}-derived", label)
}

/// Uncompressed point `04 || X || Y` with random coordinates.
fn peer_point(curve: Curve) -> Vec<u8> {
    let mut point = vec![0u8; 1 + 2 * curve.field_bytes()];
    rand::thread_rng().fill_bytes(&mut point[1..]);
    point[0] = 0x04;
    point
}

impl Benchmark for DeriveBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.base = Some(self.identity.resolve(session, thread)?);
        self.mechanism = match self.kind {
            DeriveKind::Ecdh(curve) => Some(Mechanism::Ecdh1Derive {
                public_data: peer_point(curve),
            }),
            // built per vector in bind_payload
            DeriveKind::Xor => None,
        };
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        if self.kind == DeriveKind::Xor {
            self.mechanism = Some(Mechanism::XorBaseAndData {
                data: vec![0u8; size.bytes()],
            });
        }
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let (Some(base), Some(mechanism)) = (self.base, self.mechanism.as_ref()) else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        let derived = session
            .derive_key(mechanism, base, &self.template)
            .map_err(|e| self.identity.operation_error(e))?;
        self.derived = Some(derived);
        Ok(())
    }

    fn release(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        if let Some(handle) = self.derived.take() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use p11perf_core::soft::{SoftSession, SoftToken};
    use p11perf_core::token::KeyGenMechanism;
    use p11perf_core::types::KeyType;
    use p11perf_core::KeyGenerator;

    #[test]
    fn test_ecdh_derive_and_cleanup() {
        let mut sessions = SoftToken::new(Vendor::Generic).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Ecdh, "ecdh-secp521r1", Curve::Secp521r1)
            .unwrap();
        let mut bench = DeriveBenchmark::ecdh(Curve::Secp521r1, "ecdh-secp521r1", Vendor::Generic);
        let session = sessions[0].as_mut();
        bench.prepare(session, 0).unwrap();
        bench.bind_payload(VectorSize::new(8).unwrap());
        for _ in 0..5 {
            bench.execute(session).unwrap();
            bench.release(session).unwrap();
        }
        bench.execute(session).unwrap();
        assert!(session
            .find_object(ObjectClass::SecretKey, bench.derived_label())
            .unwrap()
            .is_some());
        bench.cleanup(session).unwrap();
        bench.cleanup(session).unwrap();
        assert!(session
            .find_object(ObjectClass::SecretKey, bench.derived_label())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_derived_key_released_after_each_call() {
        let mut session = SoftSession::new(Vendor::Generic);
        let base = KeyTemplate {
            derive: true,
            value_len: Some(16),
            ..KeyTemplate::ephemeral("xorder-128")
        };
        session
            .generate_key(KeyGenMechanism::GenericSecretKey, &base)
            .unwrap();
        let baseline = session.object_count();

        let mut bench = DeriveBenchmark::xor("xorder-128", Vendor::Generic);
        bench.prepare(&mut session, 0).unwrap();
        bench.bind_payload(VectorSize::new(32).unwrap());
        for _ in 0..50 {
            bench.execute(&mut session).unwrap();
            assert_eq!(session.object_count(), baseline + 1);
            bench.release(&mut session).unwrap();
            assert_eq!(session.object_count(), baseline);
        }
        bench.release(&mut session).unwrap();
        bench.cleanup(&mut session).unwrap();
        assert_eq!(session.object_count(), baseline);
    }

    #[test]
    fn test_xor_derive_needs_payload() {
        let mut sessions = SoftToken::new(Vendor::Generic).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Generic, "xorder-128", 128)
            .unwrap();
        let mut bench = DeriveBenchmark::xor("xorder-128", Vendor::Generic);
        let session = sessions[0].as_mut();
        bench.prepare(session, 0).unwrap();
        assert!(bench.execute(session).is_err());
        bench.bind_payload(VectorSize::new(16).unwrap());
        bench.execute(session).unwrap();
        bench.cleanup(session).unwrap();
    }

    #[test]
    fn test_ecdh_rejects_signing_key() {
        let mut sessions = SoftToken::new(Vendor::Generic).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Ecdsa, "ec-p256", Curve::Secp256r1)
            .unwrap();
        let mut bench = DeriveBenchmark::ecdh(Curve::Secp256r1, "ec-p256", Vendor::Generic);
        let session = sessions[0].as_mut();
        bench.prepare(session, 0).unwrap();
        assert!(matches!(
            bench.execute(session),
            Err(BenchmarkError::Operation { .. })
        ));
    }
}
