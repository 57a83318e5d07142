// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Multi-threaded benchmark executor.
//!
//! One OS thread per session. Every thread owns its session and its own
//! clone of the benchmark prototype for the whole benchmark; the threads
//! run their timed loops without any barrier and the per-thread samples
//! are merged only after all of them have been joined.

use std::collections::BTreeMap;
use std::thread;

use p11perf_core::config::RunConfig;
use p11perf_core::error::BenchmarkError;
use p11perf_core::token::Session;
use p11perf_core::types::VectorSize;
use tracing::{debug, info, warn};

use crate::harness::{BenchmarkHarness, ThreadSamples};
use crate::lifecycle::Benchmark;

/// Pooled samples of all threads for one (benchmark, vector size).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    /// Latencies in nanoseconds, thread by thread in thread order.
    pub samples: Vec<u64>,
    /// Number of pooled samples.
    pub count: usize,
    /// Measured wall-clock time of each thread, indexed by thread.
    pub thread_elapsed_ns: Vec<u64>,
}

impl SampleSet {
    fn push(&mut self, thread: ThreadSamples) {
        self.samples.extend_from_slice(&thread.samples);
        self.count = self.samples.len();
        self.thread_elapsed_ns.push(thread.elapsed_ns);
    }
}

/// Samples of one benchmark keyed by vector size, ascending.
pub type VectorSamples = BTreeMap<VectorSize, SampleSet>;

/// Result of one benchmark in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(VectorSamples),
    /// The benchmark was abandoned; no samples are reported for it.
    Failed { reason: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn samples(&self) -> Option<&VectorSamples> {
        match self {
            Outcome::Completed(samples) => Some(samples),
            Outcome::Failed { .. } => None,
        }
    }
}

/// One benchmark's outcome in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportEntry {
    name: String,
    label: String,
    outcome: Outcome,
}

/// Results of a run in execution order, addressed by benchmark name and label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. A second outcome for the same name and label
    /// replaces the first in place.
    pub fn insert(&mut self, name: impl Into<String>, label: impl Into<String>, outcome: Outcome) {
        let (name, label) = (name.into(), label.into());
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.name == name && entry.label == label)
        {
            Some(entry) => entry.outcome = outcome,
            None => self.entries.push(ReportEntry { name, label, outcome }),
        }
    }

    pub fn get(&self, name: &str, label: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|entry| entry.name == name && entry.label == label)
            .map(|entry| &entry.outcome)
    }

    /// Iterate over (name, label, outcome) in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Outcome)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.label.as_str(), &entry.outcome))
    }

    /// Number of (name, label) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.iter().filter(|(_, _, outcome)| outcome.is_failed()).count()
    }
}

/// Runs benchmark prototypes across all sessions and vector sizes.
pub struct Executor<'a> {
    sessions: &'a mut [Box<dyn Session>],
    harness: BenchmarkHarness,
    /// Distinct sizes in ascending order.
    vectors: Vec<VectorSize>,
}

impl<'a> Executor<'a> {
    /// Create an executor over one session per worker thread.
    pub fn new(
        sessions: &'a mut [Box<dyn Session>],
        iterations: usize,
        skip: usize,
        vectors: impl IntoIterator<Item = VectorSize>,
    ) -> Self {
        let mut vectors: Vec<VectorSize> = vectors.into_iter().collect();
        vectors.sort_unstable();
        vectors.dedup();
        Self {
            sessions,
            harness: BenchmarkHarness::new().warmup(skip).iterations(iterations),
            vectors,
        }
    }

    /// Create an executor with the iteration, skip and vector settings of `config`.
    pub fn from_config(sessions: &'a mut [Box<dyn Session>], config: &RunConfig) -> Self {
        Self::new(sessions, config.iterations, config.skip, config.vectors.iter().copied())
    }

    pub fn threads(&self) -> usize {
        self.sessions.len()
    }

    pub fn vectors(&self) -> &[VectorSize] {
        &self.vectors
    }

    /// Run one prototype on every thread and pool the samples.
    ///
    /// A failure on any thread abandons the whole benchmark; the first
    /// failure in thread order is returned.
    pub fn run(&mut self, prototype: &dyn Benchmark) -> Result<VectorSamples, BenchmarkError> {
        let clones: Vec<Box<dyn Benchmark>> = (0..self.sessions.len()).map(|_| prototype.clone_box()).collect();
        let vectors = &self.vectors;
        let harness = &self.harness;

        let outcomes: Vec<Result<Vec<ThreadSamples>, BenchmarkError>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .sessions
                .iter_mut()
                .zip(clones)
                .enumerate()
                .map(|(index, (session, mut benchmark))| {
                    scope.spawn(move || run_thread(benchmark.as_mut(), session.as_mut(), index, vectors, harness))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(BenchmarkError::ThreadPanicked { thread: index }))
                })
                .collect()
        });

        let mut pooled: VectorSamples = BTreeMap::new();
        for outcome in outcomes {
            for (size, samples) in vectors.iter().zip(outcome?) {
                pooled.entry(*size).or_default().push(samples);
            }
        }
        Ok(pooled)
    }

    /// Run every prototype in order, isolating failures per benchmark.
    pub fn run_all(&mut self, benchmarks: &[Box<dyn Benchmark>]) -> Report {
        let mut report = Report::new();
        for benchmark in benchmarks {
            let identity = benchmark.identity();
            info!(benchmark = %identity, threads = self.threads(), "Running benchmark");
            let outcome = match self.run(&**benchmark) {
                Ok(samples) => Outcome::Completed(samples),
                Err(e) => {
                    warn!(benchmark = %identity, error = %e, "Benchmark failed");
                    Outcome::Failed { reason: e.to_string() }
                }
            };
            report.insert(identity.name.clone(), identity.label.clone(), outcome);
        }
        report
    }
}

/// Lifecycle of one clone on one thread: prepare once, then bind and time
/// every vector, then clean up.
fn run_thread(
    benchmark: &mut dyn Benchmark,
    session: &mut dyn Session,
    thread: usize,
    vectors: &[VectorSize],
    harness: &BenchmarkHarness,
) -> Result<Vec<ThreadSamples>, BenchmarkError> {
    benchmark.prepare(session, thread)?;
    debug!(thread, benchmark = %benchmark.identity(), "Prepared");

    let measured = measure_vectors(benchmark, session, vectors, harness);
    let cleaned = benchmark.cleanup(session);
    let samples = measured?;
    cleaned?;
    Ok(samples)
}

fn measure_vectors(
    benchmark: &mut dyn Benchmark,
    session: &mut dyn Session,
    vectors: &[VectorSize],
    harness: &BenchmarkHarness,
) -> Result<Vec<ThreadSamples>, BenchmarkError> {
    let mut per_vector = Vec::with_capacity(vectors.len());
    for &size in vectors {
        benchmark.bind_payload(size);
        benchmark.stage(session)?;
        let mut pair = (&mut *benchmark, &mut *session);
        per_vector.push(harness.run_settled(
            &mut pair,
            |(benchmark, session)| benchmark.execute(&mut **session),
            |(benchmark, session)| benchmark.release(&mut **session),
        )?);
    }
    Ok(per_vector)
}
