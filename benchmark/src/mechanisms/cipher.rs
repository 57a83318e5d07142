// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Block-cipher encryption benchmarks (AES and DES3, ECB and CBC).

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::token::{Mechanism, ObjectClass, ObjectHandle, Session};
use p11perf_core::types::VectorSize;
use p11perf_core::vendor::Vendor;
use rand::RngCore;

use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    Aes,
    Des3,
}

impl BlockCipher {
    pub fn block_len(&self) -> usize {
        match self {
            BlockCipher::Aes => 16,
            BlockCipher::Des3 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Ecb,
    Cbc,
}

/// Single-shot encryption of a block-aligned payload.
#[derive(Debug, Clone)]
pub struct BlockCipherBenchmark {
    identity: BenchmarkIdentity,
    cipher: BlockCipher,
    mode: BlockMode,
    key: Option<ObjectHandle>,
    mechanism: Option<Mechanism>,
    scratch: Scratch,
}

impl BlockCipherBenchmark {
    pub fn new(cipher: BlockCipher, mode: BlockMode, label: impl Into<String>, vendor: Vendor) -> Self {
        let name = match (cipher, mode) {
            (BlockCipher::Aes, BlockMode::Ecb) => "AES ECB",
            (BlockCipher::Aes, BlockMode::Cbc) => "AES CBC",
            (BlockCipher::Des3, BlockMode::Ecb) => "DES3 ECB",
            (BlockCipher::Des3, BlockMode::Cbc) => "DES3 CBC",
        };
        Self {
            identity: BenchmarkIdentity::new(name, label, ObjectClass::SecretKey, vendor),
            cipher,
            mode,
            key: None,
            mechanism: None,
            scratch: Scratch::default(),
        }
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    fn build_mechanism(&self) -> Mechanism {
        let mut rng = rand::thread_rng();
        match (self.cipher, self.mode) {
            (BlockCipher::Aes, BlockMode::Ecb) => Mechanism::AesEcb,
            (BlockCipher::Aes, BlockMode::Cbc) => {
                let mut iv = [0u8; 16];
                rng.fill_bytes(&mut iv);
                Mechanism::AesCbc { iv }
            }
            (BlockCipher::Des3, BlockMode::Ecb) => Mechanism::Des3Ecb,
            (BlockCipher::Des3, BlockMode::Cbc) => {
                let mut iv = [0u8; 8];
                rng.fill_bytes(&mut iv);
                Mechanism::Des3Cbc { iv }
            }
        }
    }
}

impl Benchmark for BlockCipherBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.key = Some(self.identity.resolve(session, thread)?);
        self.mechanism = Some(self.build_mechanism());
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        self.scratch.bind_blocks(size, self.cipher.block_len(), 0);
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
