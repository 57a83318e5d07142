// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! p11perf Benchmarking Framework
//!
//! Measures per-call latency of cryptographic token operations under
//! concurrency: one session and one worker thread per configured thread,
//! samples pooled per benchmark and test vector after all threads finish.
//!
//! # Benchmark Categories
//!
//! - **Signatures**: RSA PKCS#1, ECDSA and HMAC
//! - **Block ciphers**: DES3 and AES in ECB and CBC modes
//! - **AEAD**: AES-GCM with per-vendor buffer layouts
//! - **Derivation**: ECDH1 and XOR base-and-data
//! - **Random**: seeding and generation
//!
//! # Data Output
//!
//! Runs produce a JSON document with latency percentiles and throughput
//! keyed by `<name> using <label>` and test vector.

pub mod catalog;
pub mod executor;
pub mod harness;
pub mod lifecycle;
pub mod mechanisms;
pub mod metrics;
pub mod reporter;

pub use catalog::Catalog;
pub use executor::{Executor, Outcome, Report, SampleSet, VectorSamples};
pub use harness::{BenchmarkHarness, ThreadSamples};
pub use lifecycle::{Benchmark, BenchmarkIdentity, LabelScope, Scratch};
pub use metrics::{
    BenchmarkEntry, EntryStatus, LatencyMetrics, ReportDocument, ResultSet, RunSummary, SystemInfo,
    ThroughputMetrics, VectorMetrics,
};
pub use reporter::{JsonReporter, ReporterError};
