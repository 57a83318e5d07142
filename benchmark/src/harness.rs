// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Benchmark harness for running and timing operations.
//!
//! Runs `warmup + iterations` timed calls of one operation on the calling
//! thread and keeps only the timings after the warm-up.

use std::time::{Duration, Instant};

/// Timings of one thread for one test vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadSamples {
    /// Per-call latency in nanoseconds, warm-up excluded.
    pub samples: Vec<u64>,
    /// Wall-clock time spent in the measured calls, in nanoseconds.
    pub elapsed_ns: u64,
}

/// A benchmark harness for measuring operation latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkHarness {
    /// Number of timed calls discarded before measurement
    warmup_iterations: usize,
    /// Number of measurement iterations
    measurement_iterations: usize,
}

impl BenchmarkHarness {
    /// Create a new benchmark harness with default settings.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 0,
            measurement_iterations: 200,
        }
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: usize) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Set the number of measurement iterations.
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn warmup_iterations(&self) -> usize {
        self.warmup_iterations
    }

    pub fn measurement_iterations(&self) -> usize {
        self.measurement_iterations
    }

    /// Run an operation and collect latency samples.
    ///
    /// Warm-up calls are timed exactly like measured ones so both follow the
    /// same code path; their timings are dropped. The first failing call
    /// aborts the run and its error is returned.
    pub fn run<F, E>(&self, mut operation: F) -> Result<ThreadSamples, E>
    where
        F: FnMut() -> Result<(), E>,
    {
        self.run_settled(&mut (), |_| operation(), |_| Ok(()))
    }

    /// Like [`run`](Self::run), with `settle` called after every timed call.
    ///
    /// Time spent in `settle` is excluded from the samples and from the
    /// measured elapsed time.
    pub fn run_settled<S, F, G, E>(&self, state: &mut S, mut operation: F, mut settle: G) -> Result<ThreadSamples, E>
    where
        S: ?Sized,
        F: FnMut(&mut S) -> Result<(), E>,
        G: FnMut(&mut S) -> Result<(), E>,
    {
        let mut samples = Vec::with_capacity(self.measurement_iterations);
        let mut measured_since = Instant::now();
        let mut settling = Duration::ZERO;

        for iteration in 0..self.warmup_iterations + self.measurement_iterations {
            if iteration == self.warmup_iterations {
                measured_since = Instant::now();
                settling = Duration::ZERO;
            }
            let start = Instant::now();
            operation(state)?;
            let elapsed = start.elapsed();
            if iteration >= self.warmup_iterations {
                samples.push(elapsed.as_nanos() as u64);
            }

            let settle_start = Instant::now();
            settle(state)?;
            settling += settle_start.elapsed();
        }

        Ok(ThreadSamples {
            samples,
            elapsed_ns: measured_since.elapsed().saturating_sub(settling).as_nanos() as u64,
        })
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_harness_discards_warmup() {
        let harness = BenchmarkHarness::new().warmup(5).iterations(20);
        let mut calls = 0;

        let result: Result<_, ()> = harness.run(|| {
            calls += 1;
            Ok(())
        });

        assert_eq!(result.unwrap().samples.len(), 20);
        assert_eq!(calls, 25);
    }

    #[test]
    fn test_harness_samples_cover_sleep() {
        let harness = BenchmarkHarness::new().iterations(10);

        let result: Result<_, ()> = harness.run(|| {
            thread::sleep(Duration::from_micros(100));
            Ok(())
        });

        let result = result.unwrap();
        for sample in &result.samples {
            assert!(*sample >= 100_000, "Sample {} < 100μs", sample);
        }
        assert!(result.elapsed_ns >= 1_000_000);
    }

    #[test]
    fn test_harness_stops_on_error() {
        let harness = BenchmarkHarness::new().warmup(2).iterations(10);
        let mut calls = 0;

        let result = harness.run(|| {
            calls += 1;
            if calls == 4 {
                Err("rejected")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("rejected"));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_iterations() {
        let harness = BenchmarkHarness::new().warmup(3).iterations(0);
        let result: Result<_, ()> = harness.run(|| Ok(()));
        assert!(result.unwrap().samples.is_empty());
    }

    #[test]
    fn test_settle_runs_outside_samples() {
        let harness = BenchmarkHarness::new().warmup(2).iterations(5);
        let mut live = 0usize;
        let mut peak = 0usize;

        let result: Result<_, ()> = harness.run_settled(
            &mut live,
            |live| {
                *live += 1;
                peak = peak.max(*live);
                Ok(())
            },
            |live| {
                thread::sleep(Duration::from_millis(2));
                *live -= 1;
                Ok(())
            },
        );

        let result = result.unwrap();
        assert_eq!(live, 0);
        assert_eq!(peak, 1);
        assert_eq!(result.samples.len(), 5);
        // five settles of 2ms each would push elapsed past 10ms
        assert!(result.samples.iter().all(|&s| s < 2_000_000));
        assert!(result.elapsed_ns < 10_000_000);
    }
}
