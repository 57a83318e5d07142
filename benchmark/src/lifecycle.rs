// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Benchmark lifecycle contract.
//!
//! A benchmark prototype is built once with a static identity, cloned once
//! per worker thread, prepared against that thread's session, executed in
//! the timed loop and finally cleaned up:
//!
//! ```text
//! Constructed -> Cloned -> Prepared -> Executing -> CleanedUp -> Disposed
//! ```
//!
//! All lookup and allocation happens in [`Benchmark::prepare`],
//! [`Benchmark::bind_payload`] and [`Benchmark::stage`];
//! [`Benchmark::execute`] only issues the measured token calls against
//! pre-resolved handles and pre-sized buffers, and [`Benchmark::release`]
//! disposes of whatever a call created before the next one is timed.

use std::fmt;

use p11perf_core::error::{BenchmarkError, TokenError};
use p11perf_core::keygen::threaded_label;
use p11perf_core::token::{ObjectClass, ObjectHandle, Session};
use p11perf_core::types::VectorSize;
use p11perf_core::vendor::Vendor;
use serde::{Deserialize, Serialize};

/// Whether a benchmark's key is shared by all sessions under one alias or
/// generated per thread under a thread-qualified label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelScope {
    Shared,
    PerThread,
}

/// Static identity of a benchmark, used for key lookup and report keying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkIdentity {
    /// Benchmark name, e.g. `AES GCM`.
    pub name: String,
    /// Key alias the benchmark operates on.
    pub label: String,
    /// Class of the object looked up in `prepare`.
    pub class: ObjectClass,
    pub vendor: Vendor,
    pub scope: LabelScope,
}

impl BenchmarkIdentity {
    pub fn new(name: impl Into<String>, label: impl Into<String>, class: ObjectClass, vendor: Vendor) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            class,
            vendor,
            scope: LabelScope::Shared,
        }
    }

    /// Look the key up under a thread-qualified label.
    pub fn per_thread(mut self) -> Self {
        self.scope = LabelScope::PerThread;
        self
    }

    /// Label of this benchmark's object on the session of `thread`.
    pub fn label_for(&self, thread: usize) -> String {
        match self.scope {
            LabelScope::Shared => self.label.clone(),
            LabelScope::PerThread => threaded_label(&self.label, thread),
        }
    }

    /// Resolve this benchmark's object on `session`.
    pub fn resolve(&self, session: &dyn Session, thread: usize) -> Result<ObjectHandle, BenchmarkError> {
        self.resolve_class(session, self.class, thread)
    }

    /// Resolve an object of another class sharing this benchmark's label.
    pub fn resolve_class(
        &self,
        session: &dyn Session,
        class: ObjectClass,
        thread: usize,
    ) -> Result<ObjectHandle, BenchmarkError> {
        let label = self.label_for(thread);
        session
            .find_object(class, &label)
            .map_err(|e| self.operation_error(e))?
            .ok_or(BenchmarkError::ObjectNotFound { class, label })
    }

    /// Wrap a token-level rejection into a benchmark failure.
    pub fn operation_error(&self, source: TokenError) -> BenchmarkError {
        BenchmarkError::Operation {
            benchmark: self.name.clone(),
            source,
        }
    }

    /// Report key, e.g. `AES GCM using aes-128`.
    pub fn report_key(&self) -> String {
        format!("{} using {}", self.name, self.label)
    }
}

impl fmt::Display for BenchmarkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} using {}", self.name, self.label)
    }
}

/// Per-clone mutable buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratch {
    pub payload: Vec<u8>,
    pub output: Vec<u8>,
}

impl Scratch {
    /// Resize the payload to `payload_len` zero bytes and the output to
    /// `output_len` bytes. Capacity is kept across calls.
    pub fn bind(&mut self, payload_len: usize, output_len: usize) {
        self.payload.clear();
        self.payload.resize(payload_len, 0);
        self.output.clear();
        self.output.resize(output_len, 0);
    }

    /// Bind a vector padded up to a whole number of cipher blocks.
    pub fn bind_blocks(&mut self, size: VectorSize, block: usize, overhead: usize) {
        let padded = padded_len(size.bytes(), block);
        self.bind(padded, padded + overhead);
    }
}

/// `len` rounded up to a multiple of `block`.
pub fn padded_len(len: usize, block: usize) -> usize {
    len.div_ceil(block) * block
}

/// A measured token operation.
pub trait Benchmark: BenchmarkClone + Send {
    fn identity(&self) -> &BenchmarkIdentity;

    /// Resolve objects on `session` and build the mechanism parameters.
    /// Called once per thread before any vector is bound.
    fn prepare(&mut self, session: &mut dyn Session, thread: usize) -> Result<(), BenchmarkError>;

    /// Size the scratch buffers for one test vector. Never timed.
    fn bind_payload(&mut self, size: VectorSize);

    /// Untimed token calls that depend on the bound payload, such as
    /// encrypting or wrapping it. Called after every `bind_payload`.
    fn stage(&mut self, _session: &mut dyn Session) -> Result<(), BenchmarkError> {
        Ok(())
    }

    /// The timed call. Issues only the measured token operations.
    fn execute(&mut self, session: &mut dyn Session) -> Result<(), BenchmarkError>;

    /// Destroy objects created by the last `execute`. Called after every
    /// timed call; its time is not part of the sample.
    fn release(&mut self, _session: &mut dyn Session) -> Result<(), BenchmarkError> {
        Ok(())
    }

    /// Reset operation state or release per-benchmark objects.
    /// Must be safe to call any number of times.
    fn cleanup(&mut self, _session: &mut dyn Session) -> Result<(), BenchmarkError> {
        Ok(())
    }
}

/// Deep copy of a boxed benchmark.
pub trait BenchmarkClone {
    fn clone_box(&self) -> Box<dyn Benchmark>;
}

impl<T> BenchmarkClone for T
where
    T: Benchmark + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Benchmark> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Benchmark> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
