// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! AES-GCM encryption benchmark.
//!
//! The only mechanism whose IV handling and output layout differ between
//! vendors. Everything vendor-specific comes from one lookup in the GCM
//! quirk table during `prepare`.

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{GcmParams, Mechanism, ObjectClass, ObjectHandle, Session};
use p11perf_core::types::VectorSize;
use p11perf_core::vendor::{GcmLayout, IvSource, Vendor, GCM_LAYOUTS};
use rand::RngCore;

use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

#[derive(Debug, Clone)]
pub struct AesGcmBenchmark {
    identity: BenchmarkIdentity,
    layouts: &'static [GcmLayout],
    layout: Option<GcmLayout>,
    key: Option<ObjectHandle>,
    mechanism: Option<Mechanism>,
    scratch: Scratch,
}

impl AesGcmBenchmark {
    pub fn new(label: impl Into<String>, vendor: Vendor) -> Self {
        Self::with_layouts(label, vendor, GCM_LAYOUTS)
    }

    /// Use a custom quirk table instead of the built-in one.
    pub fn with_layouts(label: impl Into<String>, vendor: Vendor, layouts: &'static [GcmLayout]) -> Self {
        Self {
            identity: BenchmarkIdentity::new("AES GCM", label, ObjectClass::SecretKey, vendor),
            layouts,
            layout: None,
            key: None,
            mechanism: None,
            scratch: Scratch::default(),
        }
    }

    /// IV placed in the parameter block by the last `prepare`.
    pub fn iv(&self) -> Option<&[u8]> {
        match &self.mechanism {
            Some(Mechanism::AesGcm(params)) => Some(&params.iv),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<&GcmLayout> {
        self.layout.as_ref()
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

impl Benchmark for AesGcmBenchmark {
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
        let key = self.identity.resolve(session, thread)?;

        let mut iv = vec![0u8; layout.iv_len];
        match layout.iv_source {
            IvSource::EngineRandom => rand::thread_rng().fill_bytes(&mut iv),
            // token-generated IVs are drawn by the token and appended to the output
            IvSource::TokenGenerated | IvSource::FixedZero => {}
        }

        self.key = Some(key);
        self.layout = Some(layout);
        self.mechanism = Some(Mechanism::AesGcm(GcmParams {
            iv,
            aad: Vec::new(),
            tag_bits: (layout.tag_len * 8) as u32,
        }));
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        let overhead = self.layout.map(|l| l.output_overhead).unwrap_or(0);
        self.scratch.bind(size.bytes(), size.bytes() + overhead);
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let (Some(key), Some(mechanism)) = (self.key, self.mechanism.as_ref()) else {
            return Err(self.identity.operation_error(TokenError::OperationNotInitialized));
        };
        session
            .encrypt_init(mechanism, key)
            .map_err(|e| self.identity.operation_error(e))?;
        session
            .encrypt(&self.scratch.payload, &mut self.scratch.output)
            .map_err(|e| self.identity.operation_error(e))?;
        Ok(())
    }

    fn cleanup(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        session.cancel_operation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p11perf_core::soft::SoftToken;
    use p11perf_core::types::KeyType;
    use p11perf_core::KeyGenerator;

    fn session(vendor: Vendor) -> Vec<Box<dyn Session>> {
        let mut sessions = SoftToken::new(vendor).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Aes, "aes-256", 256)
            .unwrap();
        sessions
    }

    #[test]
    fn test_generic_random_iv() {
        let mut sessions = session(Vendor::Generic);
        let mut bench = AesGcmBenchmark::new("aes-256", Vendor::Generic);
        bench.prepare(sessions[0].as_mut(), 0).unwrap();
        let first = bench.iv().unwrap().to_vec();
        bench.prepare(sessions[0].as_mut(), 0).unwrap();
        let second = bench.iv().unwrap().to_vec();
        assert_eq!(first.len(), 12);
        assert_ne!(first, second);
    }

    #[test]
    fn test_luna_output_size() {
        let mut sessions = session(Vendor::Luna);
        let mut bench = AesGcmBenchmark::new("aes-256", Vendor::Luna);
        bench.prepare(sessions[0].as_mut(), 0).unwrap();
        bench.bind_payload(VectorSize::new(100).unwrap());
        assert_eq!(bench.iv().unwrap().len(), 16);
        assert_eq!(bench.scratch().output.len(), 132);
        bench.execute(sessions[0].as_mut()).unwrap();
    }

    #[test]
    fn test_fixed_iv_vendors() {
        for vendor in [Vendor::Utimaco, Vendor::Entrust] {
            let mut sessions = session(vendor);
            let mut bench = AesGcmBenchmark::new("aes-256", vendor);
            bench.prepare(sessions[0].as_mut(), 0).unwrap();
            let first = bench.iv().unwrap().to_vec();
            bench.prepare(sessions[0].as_mut(), 0).unwrap();
            assert_eq!(first, vec![0u8; 12]);
            assert_eq!(bench.iv().unwrap(), first.as_slice());
            bench.bind_payload(VectorSize::new(64).unwrap());
            assert_eq!(bench.scratch().output.len(), 80);
            bench.execute(sessions[0].as_mut()).unwrap();
        }
    }

    #[test]
    fn test_vendor_missing_from_table() {
        let mut sessions = session(Vendor::Luna);
        let mut bench = AesGcmBenchmark::with_layouts("aes-256", Vendor::Luna, &GCM_LAYOUTS[..1]);
        assert!(matches!(
            bench.prepare(sessions[0].as_mut(), 0),
            Err(BenchmarkError::UnsupportedVendor { vendor: Vendor::Luna, .. })
        ));
    }
}
