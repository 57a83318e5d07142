// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! One [`Benchmark`](crate::lifecycle::Benchmark) implementation per
//! measured operation kind.

pub mod aes_gcm;
pub mod cipher;
pub mod derive;
pub mod jwe;
pub mod oaep;
pub mod random;
pub mod signature;

pub use aes_gcm::AesGcmBenchmark;
pub use cipher::{BlockCipher, BlockCipherBenchmark, BlockMode};
pub use derive::DeriveBenchmark;
pub use jwe::JweBenchmark;
pub use oaep::{OaepDecryptBenchmark, OaepUnwrapBenchmark};
pub use random::{RandomBenchmark, RandomOp};
pub use signature::SignBenchmark;
