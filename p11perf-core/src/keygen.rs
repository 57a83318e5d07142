// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Parallel session-key generation.
//!
//! One task per worker session creates the same ephemeral key. The
//! aggregate either succeeds on every session or fails as a whole.

use std::thread;

use tracing::{debug, error, info};

use crate::error::{KeyGenerationError, PerfResult, TokenError};
use crate::token::{KeyGenMechanism, KeyTemplate, Session};
use crate::types::{KeySpec, KeyType};

/// Public exponent used for every generated RSA key pair.
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// Label of a per-thread object, e.g. `rsa-2048#3`.
pub fn threaded_label(alias: &str, thread: usize) -> String {
    format!("{}#{}", alias, thread)
}

/// A single key to create on every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub key_type: KeyType,
    pub alias: String,
    pub spec: KeySpec,
}

impl KeyRequest {
    pub fn new(key_type: KeyType, alias: impl Into<String>, spec: impl Into<KeySpec>) -> Self {
        Self {
            key_type,
            alias: alias.into(),
            spec: spec.into(),
        }
    }
}

/// Generates keys on all worker sessions concurrently.
pub struct KeyGenerator<'a> {
    sessions: &'a mut [Box<dyn Session>],
}

impl<'a> KeyGenerator<'a> {
    /// Create a generator over already-authenticated sessions.
    pub fn new(sessions: &'a mut [Box<dyn Session>]) -> Self {
        Self { sessions }
    }

    /// Number of sessions keys are generated on.
    pub fn threads(&self) -> usize {
        self.sessions.len()
    }

    /// Generate one key (or key pair) under `alias` on every session.
    ///
    /// An unsupported size or curve is a configuration error raised before
    /// any session is touched. Keys created by succeeding sessions are not
    /// rolled back when another session fails.
    pub fn generate(&mut self, key_type: KeyType, alias: &str, spec: impl Into<KeySpec>) -> PerfResult<()> {
        let spec = key_type.validate(spec.into())?;
        info!(
            key_type = %key_type,
            alias = %alias,
            spec = %spec,
            threads = self.sessions.len(),
            "Generating session keys"
        );

        let outcomes: Vec<bool> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .sessions
                .iter_mut()
                .enumerate()
                .map(|(index, session)| {
                    scope.spawn(move || generate_on_session(session.as_mut(), key_type, alias, spec, index))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .collect()
        });

        let failed_threads: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, ok)| !**ok)
            .map(|(index, _)| index)
            .collect();

        if failed_threads.is_empty() {
            Ok(())
        } else {
            Err(KeyGenerationError {
                key_type,
                alias: alias.to_string(),
                failed_threads,
            }
            .into())
        }
    }

    /// Generate every request in order, stopping at the first failure.
    pub fn generate_all(&mut self, requests: &[KeyRequest]) -> PerfResult<()> {
        for request in requests {
            self.generate(request.key_type, &request.alias, request.spec)?;
        }
        Ok(())
    }
}

/// Per-thread attempt. Token errors are logged here and reduced to a
/// boolean so the aggregate applies uniform all-or-nothing logic.
fn generate_on_session(session: &mut dyn Session, key_type: KeyType, alias: &str, spec: KeySpec, thread: usize) -> bool {
    let label = if key_type.is_per_thread() {
        threaded_label(alias, thread)
    } else {
        alias.to_string()
    };

    match create_key(session, key_type, &label, spec) {
        Ok(()) => {
            debug!(thread, label = %label, "Key created");
            true
        }
        Err(e) => {
            error!(thread, label = %label, error = %e, "Key generation failed");
            false
        }
    }
}

fn create_key(session: &mut dyn Session, key_type: KeyType, label: &str, spec: KeySpec) -> Result<(), TokenError> {
    let secret = |value_len: Option<usize>| KeyTemplate {
        private: true,
        sensitive: true,
        encrypt: true,
        decrypt: true,
        value_len,
        ..KeyTemplate::ephemeral(label)
    };

    match (key_type, spec) {
        (KeyType::Rsa, KeySpec::Bits(bits)) => {
            let public = KeyTemplate {
                private: false,
                verify: true,
                encrypt: true,
                wrap: true,
                modulus_bits: Some(bits),
                public_exponent: Some(RSA_PUBLIC_EXPONENT),
                ..KeyTemplate::ephemeral(label)
            };
            let private = KeyTemplate {
                private: true,
                sensitive: true,
                sign: true,
                decrypt: true,
                unwrap: true,
                ..KeyTemplate::ephemeral(label)
            };
            session.generate_key_pair(KeyGenMechanism::RsaPkcsKeyPair, &public, &private)?;
        }
        (KeyType::Ecdsa | KeyType::Ecdh, KeySpec::Curve(curve)) => {
            let ecdh = key_type == KeyType::Ecdh;
            let public = KeyTemplate {
                verify: !ecdh,
                curve: Some(curve),
                ..KeyTemplate::ephemeral(label)
            };
            let private = KeyTemplate {
                private: true,
                sensitive: true,
                sign: !ecdh,
                derive: ecdh,
                ..KeyTemplate::ephemeral(label)
            };
            session.generate_key_pair(KeyGenMechanism::EcKeyPair, &public, &private)?;
        }
        (KeyType::Aes, KeySpec::Bits(bits)) => {
            session.generate_key(KeyGenMechanism::AesKey, &secret(Some(bits as usize / 8)))?;
        }
        (KeyType::Des, KeySpec::Bits(bits)) => {
            let mechanism = match bits {
                128 => KeyGenMechanism::Des2Key,
                192 => KeyGenMechanism::Des3Key,
                _ => return Err(TokenError::KeySizeRange { bits }),
            };
            session.generate_key(mechanism, &secret(None))?;
        }
        (KeyType::Generic, KeySpec::Bits(bits)) => {
            let template = KeyTemplate {
                encrypt: false,
                decrypt: false,
                sign: true,
                verify: true,
                derive: true,
                ..secret(Some(bits as usize / 8))
            };
            session.generate_key(KeyGenMechanism::GenericSecretKey, &template)?;
        }
        (_, KeySpec::Bits(bits)) => return Err(TokenError::KeySizeRange { bits }),
        (_, KeySpec::Curve(curve)) => return Err(TokenError::CurveNotSupported(curve)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerfError;
    use crate::soft::{Fault, SoftToken};
    use crate::token::{Digest, Mechanism, ObjectClass, Token};
    use crate::types::Curve;
    use crate::vendor::Vendor;

    fn sessions(count: usize) -> Vec<Box<dyn Session>> {
        SoftToken::new(Vendor::Generic).open_sessions(count).unwrap()
    }

    #[test]
    fn test_threaded_label() {
        assert_eq!(threaded_label("rsa-2048", 2), "rsa-2048#2");
    }

    #[test]
    fn test_symmetric_key_shares_alias() {
        let mut sessions = sessions(3);
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Aes, "aes-128", 128)
            .unwrap();
        for session in &sessions {
            assert!(session
                .find_object(ObjectClass::SecretKey, "aes-128")
                .unwrap()
                .is_some());
        }
    }

    #[test]
    fn test_key_pair_uses_threaded_label() {
        let mut sessions = sessions(2);
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Ecdsa, "ecdsa-secp256r1", Curve::Secp256r1)
            .unwrap();
        for (index, session) in sessions.iter().enumerate() {
            let label = threaded_label("ecdsa-secp256r1", index);
            assert!(session.find_object(ObjectClass::PrivateKey, &label).unwrap().is_some());
            assert!(session.find_object(ObjectClass::PublicKey, &label).unwrap().is_some());
        }
    }

    #[test]
    fn test_rsa_pair_serves_oaep() {
        let mut sessions = sessions(1);
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Rsa, "rsa-2048", 2048)
            .unwrap();
        let label = threaded_label("rsa-2048", 0);
        let session = &mut sessions[0];
        let public = session.find_object(ObjectClass::PublicKey, &label).unwrap().unwrap();
        let private = session.find_object(ObjectClass::PrivateKey, &label).unwrap().unwrap();

        let mechanism = Mechanism::RsaPkcsOaep(Digest::Sha256);
        let mut block = [0u8; 256];
        session.encrypt_init(&mechanism, public).unwrap();
        session.encrypt(&[5u8; 32], &mut block).unwrap();
        session.decrypt_init(&mechanism, private).unwrap();
        let mut plain = [0u8; 256];
        assert_eq!(session.decrypt(&block, &mut plain).unwrap(), 32);
        assert_eq!(&plain[..32], &[5u8; 32]);
    }

    #[test]
    fn test_invalid_size_is_config_error() {
        let mut sessions = sessions(2);
        let err = KeyGenerator::new(&mut sessions)
            .generate(KeyType::Aes, "aes-100", 100)
            .unwrap_err();
        assert!(matches!(err, PerfError::Config(_)));
        assert!(sessions[0]
            .find_object(ObjectClass::SecretKey, "aes-100")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_single_failure_fails_aggregate() {
        let token = SoftToken::new(Vendor::Generic).with_session_faults(vec![None, None, Some(Fault::KeyGeneration), None]);
        let mut sessions: Vec<Box<dyn Session>> = (0..4).map(|_| token.open_session().unwrap()).collect();
        let err = KeyGenerator::new(&mut sessions)
            .generate(KeyType::Generic, "hmac-256", 256)
            .unwrap_err();
        match err {
            PerfError::KeyGeneration(e) => {
                assert_eq!(e.failed_threads, vec![2]);
                assert_eq!(e.alias, "hmac-256");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_generate_all_stops_at_first_failure() {
        let mut sessions = sessions(1);
        let requests = vec![
            KeyRequest::new(KeyType::Des, "des-192", 192),
            KeyRequest::new(KeyType::Rsa, "rsa-1000", 1000),
            KeyRequest::new(KeyType::Aes, "aes-256", 256),
        ];
        assert!(KeyGenerator::new(&mut sessions).generate_all(&requests).is_err());
        assert!(sessions[0]
            .find_object(ObjectClass::SecretKey, "des-192")
            .unwrap()
            .is_some());
        assert!(sessions[0]
            .find_object(ObjectClass::SecretKey, "aes-256")
            .unwrap()
            .is_none());
    }
}
