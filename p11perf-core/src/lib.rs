//! p11perf Core Library
//!
//! Core library for the p11perf token benchmarking engine.
//! Provides the token interface, vendor quirk resolution, run
//! configuration, parallel session-key generation and an in-process
//! software token.

pub mod clock;
pub mod config;
pub mod error;
pub mod keygen;
pub mod soft;
pub mod token;
pub mod types;
pub mod vendor;

// Re-export commonly used types
pub use clock::ClockPrecision;
pub use config::{ConfigLoader, Coverage, KeySize, RawRunConfig, RunConfig};
pub use error::{BenchmarkError, ConfigError, KeyGenerationError, PerfError, PerfResult, TokenError};
pub use keygen::{threaded_label, KeyGenerator, KeyRequest};
pub use soft::{Fault, SoftSession, SoftToken};
pub use token::{Mechanism, ObjectClass, ObjectHandle, Session, Token, TokenInfo};
pub use types::{Curve, KeySpec, KeyType, ThreadCount, VectorSize};
pub use vendor::{GcmLayout, IvSource, Vendor};
