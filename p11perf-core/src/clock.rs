// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Monotonic clock precision measurement.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Number of clock steps sampled by [`ClockPrecision::measure`].
const PRECISION_SAMPLES: usize = 1000;

/// Smallest observable step of the monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockPrecision {
    /// Mean step between two distinct consecutive readings.
    pub granularity_ns: f64,
    /// Standard deviation of those steps.
    pub jitter_ns: f64,
}

impl ClockPrecision {
    /// Sample consecutive clock readings and summarise the steps between them.
    pub fn measure() -> Self {
        Self::measure_with(PRECISION_SAMPLES)
    }

    /// Same as [`measure`](Self::measure) with an explicit sample count.
    pub fn measure_with(samples: usize) -> Self {
        let mut steps = Vec::with_capacity(samples);
        for _ in 0..samples {
            let start = Instant::now();
            let mut now = Instant::now();
            // spin until the clock visibly advances
            while now == start {
                now = Instant::now();
            }
            steps.push(now.duration_since(start).as_nanos() as f64);
        }
        Self::from_steps(&steps)
    }

    /// Summarise a set of observed clock steps.
    pub fn from_steps(steps: &[f64]) -> Self {
        if steps.is_empty() {
            return Self {
                granularity_ns: 0.0,
                jitter_ns: 0.0,
            };
        }
        let n = steps.len() as f64;
        let mean = steps.iter().sum::<f64>() / n;
        let variance = steps.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            granularity_ns: mean,
            jitter_ns: variance.sqrt(),
        }
    }
}

impl std::fmt::Display for ClockPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} ns +/- {:.1} ns", self.granularity_ns, self.jitter_ns)
    }
}
