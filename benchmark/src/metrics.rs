// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Standardized metrics types for benchmark results.
//!
//! Turns the executor's pooled samples into latency percentiles and
//! throughput, and assembles the serializable report document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use p11perf_core::clock::ClockPrecision;
use p11perf_core::config::RunConfig;
use p11perf_core::token::TokenInfo;
use p11perf_core::vendor::Vendor;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sysinfo::System;
use uuid::Uuid;

use crate::executor::{Outcome, Report, SampleSet};

/// Latency metrics with statistical analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Minimum observed latency in nanoseconds
    pub min_ns: u64,
    /// Maximum observed latency in nanoseconds
    pub max_ns: u64,
    /// Arithmetic mean latency in nanoseconds
    pub mean_ns: f64,
    /// Median (p50) latency in nanoseconds
    pub median_ns: u64,
    /// 95th percentile latency in nanoseconds
    pub p95_ns: u64,
    /// 99th percentile latency in nanoseconds
    pub p99_ns: u64,
    /// Standard deviation in nanoseconds
    pub std_dev_ns: f64,
    /// Raw sample data (optional, may be downsampled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u64>>,
}

impl LatencyMetrics {
    /// Calculate metrics from a vector of latency samples (in nanoseconds).
    pub fn from_samples(mut samples: Vec<u64>, keep_raw: bool) -> Self {
        if samples.is_empty() {
            return Self {
                min_ns: 0,
                max_ns: 0,
                mean_ns: 0.0,
                median_ns: 0,
                p95_ns: 0,
                p99_ns: 0,
                std_dev_ns: 0.0,
                samples: None,
            };
        }

        samples.sort_unstable();
        let len = samples.len();

        let min_ns = samples[0];
        let max_ns = samples[len - 1];
        let sum: u64 = samples.iter().sum();
        let mean_ns = sum as f64 / len as f64;
        let median_ns = samples[len / 2];
        let p95_ns = samples[(len as f64 * 0.95) as usize];
        let p99_ns = samples[(len as f64 * 0.99) as usize];

        let variance: f64 = samples
            .iter()
            .map(|&x| {
                let diff = x as f64 - mean_ns;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;
        let std_dev_ns = variance.sqrt();

        let raw_samples = if keep_raw {
            if len > 10000 {
                Some(samples.iter().step_by(len / 1000).copied().collect())
            } else {
                Some(samples)
            }
        } else {
            None
        };

        Self {
            min_ns,
            max_ns,
            mean_ns,
            median_ns,
            p95_ns,
            p99_ns,
            std_dev_ns,
            samples: raw_samples,
        }
    }

    /// Format latency in human-readable form (auto-selects ns/μs/ms).
    pub fn format_latency(ns: u64) -> String {
        if ns < 1_000 {
            format!("{}ns", ns)
        } else if ns < 1_000_000 {
            format!("{:.2}μs", ns as f64 / 1_000.0)
        } else if ns < 1_000_000_000 {
            format!("{:.2}ms", ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", ns as f64 / 1_000_000_000.0)
        }
    }
}

/// Throughput under concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    /// Sum over threads of each thread's calls per second
    pub tps: f64,
    /// Total measured calls across threads
    pub total_calls: u64,
    /// Number of threads that contributed samples
    pub threads: usize,
}

impl ThroughputMetrics {
    /// Each thread ran `count / threads` measured calls in its own elapsed
    /// time; the thread rates add up.
    pub fn from_sample_set(set: &SampleSet) -> Self {
        let threads = set.thread_elapsed_ns.len();
        if threads == 0 {
            return Self {
                tps: 0.0,
                total_calls: set.count as u64,
                threads,
            };
        }
        let calls_per_thread = set.count as f64 / threads as f64;
        let tps = set
            .thread_elapsed_ns
            .iter()
            .filter(|&&ns| ns > 0)
            .map(|&ns| calls_per_thread / (ns as f64 / 1_000_000_000.0))
            .sum();
        Self {
            tps,
            total_calls: set.count as u64,
            threads,
        }
    }

    /// Format a rate in human-readable form.
    pub fn format_tps(tps: f64) -> String {
        if tps < 1_000.0 {
            format!("{:.2} tps", tps)
        } else if tps < 1_000_000.0 {
            format!("{:.2}k tps", tps / 1_000.0)
        } else {
            format!("{:.2}M tps", tps / 1_000_000.0)
        }
    }
}

/// System information captured at benchmark time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name
    pub os: String,
    /// OS version
    pub os_version: String,
    /// Kernel version (Linux)
    pub kernel_version: Option<String>,
    /// CPU model name
    pub cpu_model: String,
    /// Number of CPU cores
    pub cpu_cores: usize,
    /// Total system memory in bytes
    pub memory_bytes: u64,
    /// Hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Metrics of one test vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetrics {
    pub count: usize,
    pub latency: LatencyMetrics,
    pub throughput: ThroughputMetrics,
}

impl VectorMetrics {
    pub fn from_sample_set(set: &SampleSet, keep_raw: bool) -> Self {
        Self {
            count: set.count,
            latency: LatencyMetrics::from_samples(set.samples.clone(), keep_raw),
            throughput: ThroughputMetrics::from_sample_set(set),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
}

/// One benchmark in the report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub name: String,
    pub label: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Keyed `testvecNNNN`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vectors: BTreeMap<String, VectorMetrics>,
}

impl BenchmarkEntry {
    pub fn from_outcome(name: &str, label: &str, outcome: &Outcome, keep_raw: bool) -> Self {
        let (status, reason, vectors) = match outcome {
            Outcome::Completed(samples) => (
                EntryStatus::Completed,
                None,
                samples
                    .iter()
                    .map(|(size, set)| (size.name(), VectorMetrics::from_sample_set(set, keep_raw)))
                    .collect(),
            ),
            Outcome::Failed { reason } => (EntryStatus::Failed, Some(reason.clone()), BTreeMap::new()),
        };
        Self {
            name: name.to_string(),
            label: label.to_string(),
            status,
            reason,
            vectors,
        }
    }

    /// Report key, e.g. `AES GCM using aes-128`.
    pub fn key(&self) -> String {
        format!("{} using {}", self.name, self.label)
    }
}

/// Benchmark entries in execution order.
///
/// Serialized as a JSON object keyed `<name> using <label>`, with the keys
/// in the order the benchmarks ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet(Vec<BenchmarkEntry>);

impl ResultSet {
    pub fn get(&self, key: &str) -> Option<&BenchmarkEntry> {
        self.0.iter().find(|entry| entry.key() == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BenchmarkEntry> {
        self.0.iter()
    }

    /// Report keys in execution order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(BenchmarkEntry::key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<BenchmarkEntry> for ResultSet {
    fn from_iter<I: IntoIterator<Item = BenchmarkEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a BenchmarkEntry;
    type IntoIter = std::slice::Iter<'a, BenchmarkEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for ResultSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.key(), entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResultSetVisitor;

        impl<'de> Visitor<'de> for ResultSetVisitor {
            type Value = ResultSet;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of benchmark entries keyed by report key")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, entry)) = map.next_entry::<String, BenchmarkEntry>()? {
                    if entry.key() != key {
                        return Err(de::Error::custom(format!(
                            "entry keyed '{}' describes '{}'",
                            key,
                            entry.key()
                        )));
                    }
                    entries.push(entry);
                }
                Ok(ResultSet(entries))
            }
        }

        deserializer.deserialize_map(ResultSetVisitor)
    }
}

/// Configuration echoed into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub threads: usize,
    pub iterations: usize,
    pub skip: usize,
    pub vendor: Vendor,
    pub vectors: Vec<usize>,
    pub coverage: Vec<String>,
    pub key_sizes: Vec<String>,
}

impl From<&RunConfig> for RunSummary {
    fn from(config: &RunConfig) -> Self {
        Self {
            threads: config.threads.get(),
            iterations: config.iterations,
            skip: config.skip,
            vendor: config.vendor,
            vectors: config.vectors.iter().map(|v| v.bytes()).collect(),
            coverage: config.coverage.iter().map(|c| c.to_string()).collect(),
            key_sizes: config.key_sizes.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Complete benchmark run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    /// Suite identifier
    pub benchmark_suite: String,
    /// Framework version
    pub version: String,
    pub run_id: Uuid,
    /// Timestamp when the report was assembled
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub token: TokenInfo,
    pub clock_precision: ClockPrecision,
    pub configuration: RunSummary,
    /// Keyed `<name> using <label>`, in execution order.
    pub results: ResultSet,
}

impl ReportDocument {
    /// Assemble a document from an executor report.
    pub fn new(
        config: &RunConfig,
        token: TokenInfo,
        clock_precision: ClockPrecision,
        report: &Report,
        keep_raw_samples: bool,
    ) -> Self {
        let results = report
            .iter()
            .map(|(name, label, outcome)| BenchmarkEntry::from_outcome(name, label, outcome, keep_raw_samples))
            .collect();

        Self {
            benchmark_suite: "p11perf".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            token,
            clock_precision,
            configuration: RunSummary::from(config),
            results,
        }
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|entry| entry.status == EntryStatus::Failed)
            .count()
    }
}
