// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Random number generator benchmarks.

use p11perf_core::error::BenchmarkError;
use p11perf_core::token::{ObjectClass, Session};
use p11perf_core::types::VectorSize;
use p11perf_core::vendor::Vendor;

use crate::lifecycle::{Benchmark, BenchmarkIdentity, Scratch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomOp {
    /// Mix the bound payload into the token RNG.
    Seed,
    /// Fill an output buffer the size of the vector.
    Generate,
}

#[derive(Debug, Clone)]
pub struct RandomBenchmark {
    identity: BenchmarkIdentity,
    op: RandomOp,
    scratch: Scratch,
}

impl RandomBenchmark {
    pub fn new(op: RandomOp, label: impl Into<String>, vendor: Vendor) -> Self {
        let name = match op {
            RandomOp::Seed => "SEED RANDOM",
            RandomOp::Generate => "GENERATE RANDOM",
        };
        Self {
            identity: BenchmarkIdentity::new(name, label, ObjectClass::SecretKey, vendor),
            op,
            scratch: Scratch::default(),
        }
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

impl Benchmark for RandomBenchmark {
    fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    /// The RNG needs no key; the alias lookup only confirms the session
    /// was provisioned like every other benchmark's.
    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError> {
        self.identity.resolve(session, thread)?;
        Ok(())
    }

    fn bind_payload(&mut self, size: VectorSize) {
        match self.op {
            RandomOp::Seed => self.scratch.bind(size.bytes(), 0),
            RandomOp::Generate => self.scratch.bind(0, size.bytes()),
        }
    }

    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError> {
        let result = match self.op {
            RandomOp::Seed => session.seed_random(&self.scratch.payload),
            RandomOp::Generate => session.generate_random(&mut self.scratch.output),
        };
        result.map_err(|e| self.identity.operation_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p11perf_core::soft::SoftToken;
    use p11perf_core::types::KeyType;
    use p11perf_core::KeyGenerator;

    #[test]
    fn test_generate_fills_output() {
        let mut sessions = SoftToken::new(Vendor::Generic).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Aes, "rand-128", 128)
            .unwrap();
        let mut bench = RandomBenchmark::new(RandomOp::Generate, "rand-128", Vendor::Generic);
        bench.prepare(sessions[0].as_mut(), 0).unwrap();
        bench.bind_payload(VectorSize::new(1024).unwrap());
        bench.execute(sessions[0].as_mut()).unwrap();
        assert_eq!(bench.scratch().output.len(), 1024);
        assert!(bench.scratch().output.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_seed() {
        let mut sessions = SoftToken::new(Vendor::Generic).open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate(KeyType::Aes, "rand-128", 128)
            .unwrap();
        let mut bench = RandomBenchmark::new(RandomOp::Seed, "rand-128", Vendor::Generic);
        bench.prepare(sessions[0].as_mut(), 0).unwrap();
        bench.bind_payload(VectorSize::new(64).unwrap());
        bench.execute(sessions[0].as_mut()).unwrap();
        bench.cleanup(sessions[0].as_mut()).unwrap();
    }
}
