// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! In-process software token.
//!
//! A deterministic stand-in for a hardware token, used by the test-suite
//! and by the CLI when no vendor module is available. It reproduces each
//! vendor's AES-GCM buffer layout and rejects mis-sized buffers or
//! parameters the way a real token does.

mod primitives;
mod session;

use std::sync::atomic::{AtomicUsize, Ordering};

pub use session::SoftSession;

use crate::error::TokenError;
use crate::token::{Session, Token, TokenInfo};
use crate::vendor::Vendor;

/// Misbehaviour injected into a software session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every key generation call fails.
    KeyGeneration,
    /// Single-shot operations fail once `calls` of them have succeeded.
    OperationAfter { calls: u64 },
}

/// Software token handing out [`SoftSession`]s.
#[derive(Debug)]
pub struct SoftToken {
    vendor: Vendor,
    /// Fault for the n-th opened session, if any.
    faults: Vec<Option<Fault>>,
    opened: AtomicUsize,
}

impl SoftToken {
    /// Create a token emulating `vendor`.
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            faults: Vec::new(),
            opened: AtomicUsize::new(0),
        }
    }

    /// Inject faults into sessions by opening order.
    pub fn with_session_faults(mut self, faults: Vec<Option<Fault>>) -> Self {
        self.faults = faults;
        self
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Open `count` sessions, one per worker thread.
    pub fn open_sessions(&self, count: usize) -> Result<Vec<Box<dyn Session>>, TokenError> {
        (0..count).map(|_| self.open_session()).collect()
    }
}

impl Token for SoftToken {
    fn info(&self) -> TokenInfo {
        TokenInfo {
            label: "p11perf soft token".to_string(),
            manufacturer: "p11perf".to_string(),
            model: format!("soft/{}", self.vendor),
            serial_number: "0000000000000001".to_string(),
        }
    }

    fn open_session(&self) -> Result<Box<dyn Session>, TokenError> {
        let index = self.opened.fetch_add(1, Ordering::Relaxed);
        let fault = self.faults.get(index).copied().flatten();
        Ok(Box::new(SoftSession::with_fault(self.vendor, fault)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{KeyGenMechanism, KeyTemplate, ObjectClass};

    #[test]
    fn test_sessions_have_private_namespaces() {
        let token = SoftToken::new(Vendor::Generic);
        let mut sessions = token.open_sessions(2).unwrap();
        let template = KeyTemplate {
            value_len: Some(16),
            ..KeyTemplate::ephemeral("aes-128")
        };
        sessions[0]
            .generate_key(KeyGenMechanism::AesKey, &template)
            .unwrap();
        assert!(sessions[0]
            .find_object(ObjectClass::SecretKey, "aes-128")
            .unwrap()
            .is_some());
        assert!(sessions[1]
            .find_object(ObjectClass::SecretKey, "aes-128")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_faults_follow_opening_order() {
        let token = SoftToken::new(Vendor::Generic).with_session_faults(vec![None, Some(Fault::KeyGeneration)]);
        let mut sessions = token.open_sessions(3).unwrap();
        let template = KeyTemplate {
            value_len: Some(32),
            ..KeyTemplate::ephemeral("hmac-256")
        };
        let outcomes: Vec<bool> = sessions
            .iter_mut()
            .map(|s| s.generate_key(KeyGenMechanism::GenericSecretKey, &template).is_ok())
            .collect();
        assert_eq!(outcomes, vec![true, false, true]);
    }

    #[test]
    fn test_info_names_vendor() {
        let token = SoftToken::new(Vendor::Luna);
        assert_eq!(token.info().model, "soft/luna");
    }
}
