// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Benchmark catalogue.
//!
//! Turns the coverage and key-size selection of a [`RunConfig`] into the
//! keys to generate and the benchmark prototypes that use them. Both lists
//! come from the same aliases, so a generated key and the benchmark that
//! looks it up always agree on the label.

use p11perf_core::config::{Coverage, RunConfig};
use p11perf_core::keygen::KeyRequest;
use p11perf_core::token::Digest;
use p11perf_core::types::{Curve, KeySpec, KeyType};
use tracing::warn;

use crate::lifecycle::Benchmark;
use crate::mechanisms::{
    AesGcmBenchmark, BlockCipher, BlockCipherBenchmark, BlockMode, DeriveBenchmark, JweBenchmark,
    OaepDecryptBenchmark, OaepUnwrapBenchmark, RandomBenchmark, RandomOp, SignBenchmark,
};

/// Alias of the generic secret used by XOR derivation.
pub const XOR_ALIAS: &str = "xorder-128";
/// Alias provisioned for the random benchmarks.
pub const RANDOM_ALIAS: &str = "rand-128";

pub fn rsa_alias(bits: u32) -> String {
    format!("rsa-{}", bits)
}

pub fn ecdsa_alias(curve: Curve) -> String {
    format!("ecdsa-{}", curve)
}

pub fn ecdh_alias(curve: Curve) -> String {
    format!("ecdh-{}", curve)
}

pub fn hmac_alias(bits: u32) -> String {
    format!("hmac-{}", bits)
}

pub fn des_alias(bits: u32) -> String {
    format!("des-{}", bits)
}

pub fn aes_alias(bits: u32) -> String {
    format!("aes-{}", bits)
}

/// HMAC digest matching a generic key size.
fn hmac_digest(bits: u32) -> Option<Digest> {
    match bits {
        160 => Some(Digest::Sha1),
        256 => Some(Digest::Sha256),
        512 => Some(Digest::Sha512),
        _ => None,
    }
}

/// Keys to generate and benchmark prototypes to run, in execution order.
pub struct Catalog {
    key_requests: Vec<KeyRequest>,
    benchmarks: Vec<Box<dyn Benchmark>>,
}

impl Catalog {
    /// Build the catalogue selected by `config`.
    pub fn from_config(config: &RunConfig) -> Self {
        let mut builder = Builder {
            catalog: Catalog {
                key_requests: Vec::new(),
                benchmarks: Vec::new(),
            },
        };

        for coverage in &config.coverage {
            match coverage {
                Coverage::Rsa => {
                    for bits in config.rsa_bits() {
                        let alias = rsa_alias(bits);
                        builder.key(KeyType::Rsa, &alias, bits);
                        builder.push(SignBenchmark::rsa_pkcs(bits, alias, config.vendor));
                    }
                }
                Coverage::Ecdsa => {
                    for curve in config.curves() {
                        let alias = ecdsa_alias(curve);
                        builder.key(KeyType::Ecdsa, &alias, curve);
                        builder.push(SignBenchmark::ecdsa(curve, alias, config.vendor));
                    }
                }
                Coverage::Ecdh => {
                    for curve in config.curves() {
                        let alias = ecdh_alias(curve);
                        builder.key(KeyType::Ecdh, &alias, curve);
                        builder.push(DeriveBenchmark::ecdh(curve, alias, config.vendor));
                    }
                }
                Coverage::Hmac => {
                    for bits in config.hmac_bits() {
                        let Some(digest) = hmac_digest(bits) else {
                            warn!(bits, "No HMAC digest matches this key size, skipping");
                            continue;
                        };
                        let alias = hmac_alias(bits);
                        builder.key(KeyType::Generic, &alias, bits);
                        builder.push(SignBenchmark::hmac(digest, alias, config.vendor));
                    }
                }
                Coverage::DesEcb | Coverage::DesCbc => {
                    let mode = block_mode(*coverage);
                    for bits in config.des_bits() {
                        let alias = des_alias(bits);
                        builder.key(KeyType::Des, &alias, bits);
                        builder.push(BlockCipherBenchmark::new(BlockCipher::Des3, mode, alias, config.vendor));
                    }
                }
                Coverage::AesEcb | Coverage::AesCbc => {
                    let mode = block_mode(*coverage);
                    for bits in config.aes_bits() {
                        let alias = aes_alias(bits);
                        builder.key(KeyType::Aes, &alias, bits);
                        builder.push(BlockCipherBenchmark::new(BlockCipher::Aes, mode, alias, config.vendor));
                    }
                }
                Coverage::AesGcm => {
                    for bits in config.aes_bits() {
                        let alias = aes_alias(bits);
                        builder.key(KeyType::Aes, &alias, bits);
                        builder.push(AesGcmBenchmark::new(alias, config.vendor));
                    }
                }
                Coverage::XorDerive => {
                    builder.key(KeyType::Generic, XOR_ALIAS, 128);
                    builder.push(DeriveBenchmark::xor(XOR_ALIAS, config.vendor));
                }
                Coverage::Random => {
                    builder.key(KeyType::Aes, RANDOM_ALIAS, 128);
                    builder.push(RandomBenchmark::new(RandomOp::Seed, RANDOM_ALIAS, config.vendor));
                    builder.push(RandomBenchmark::new(RandomOp::Generate, RANDOM_ALIAS, config.vendor));
                }
                Coverage::OaepSha1 | Coverage::OaepSha256 => {
                    let digest = oaep_digest(*coverage);
                    for bits in config.rsa_bits() {
                        let alias = rsa_alias(bits);
                        builder.key(KeyType::Rsa, &alias, bits);
                        builder.push(OaepDecryptBenchmark::new(digest, bits, alias, config.vendor));
                    }
                }
                Coverage::OaepUnwrapSha1 | Coverage::OaepUnwrapSha256 => {
                    let digest = oaep_digest(*coverage);
                    for bits in config.rsa_bits() {
                        let alias = rsa_alias(bits);
                        builder.key(KeyType::Rsa, &alias, bits);
                        builder.push(OaepUnwrapBenchmark::new(digest, bits, alias, config.vendor));
                    }
                }
                Coverage::JweSha1 | Coverage::JweSha256 => {
                    // content keys are generated per call, the AES sizes only select the encryption
                    let digest = oaep_digest(*coverage);
                    let aes_sizes = config.aes_bits();
                    if aes_sizes.is_empty() {
                        continue;
                    }
                    for bits in config.rsa_bits() {
                        let alias = rsa_alias(bits);
                        builder.key(KeyType::Rsa, &alias, bits);
                        for &aes_bits in &aes_sizes {
                            builder.push(JweBenchmark::new(digest, bits, aes_bits, alias.clone(), config.vendor));
                        }
                    }
                }
            }
        }

        builder.catalog
    }

    /// Distinct keys the benchmarks expect, in first-use order.
    pub fn key_requests(&self) -> &[KeyRequest] {
        &self.key_requests
    }

    pub fn benchmarks(&self) -> &[Box<dyn Benchmark>] {
        &self.benchmarks
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}

fn block_mode(coverage: Coverage) -> BlockMode {
    match coverage {
        Coverage::DesCbc | Coverage::AesCbc => BlockMode::Cbc,
        _ => BlockMode::Ecb,
    }
}

fn oaep_digest(coverage: Coverage) -> Digest {
    match coverage {
        Coverage::OaepSha1 | Coverage::OaepUnwrapSha1 | Coverage::JweSha1 => Digest::Sha1,
        _ => Digest::Sha256,
    }
}

struct Builder {
    catalog: Catalog,
}

impl Builder {
    fn key(&mut self, key_type: KeyType, alias: &str, spec: impl Into<KeySpec>) {
        let request = KeyRequest::new(key_type, alias, spec);
        if !self.catalog.key_requests.contains(&request) {
            self.catalog.key_requests.push(request);
        }
    }

    fn push(&mut self, benchmark: impl Benchmark + 'static) {
        self.catalog.benchmarks.push(Box::new(benchmark));
    }
}
