// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! `p11perf run` command - Generate keys, run the catalogue and report.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use p11perf_benchmark::{
    Catalog, EntryStatus, Executor, JsonReporter, LatencyMetrics, ReportDocument, ThroughputMetrics,
};
use p11perf_core::{
    ClockPrecision, ConfigError, ConfigLoader, KeyGenerator, PerfError, RawRunConfig, RunConfig, SoftToken, Token,
};
use tracing::{info, warn};

/// Writes the JSON report to stdout instead of a file.
const STDOUT: &str = "-";

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// YAML configuration file; flags given on the command line override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of worker threads, one session each
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Measured iterations per thread and test vector
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Warm-up iterations discarded before measuring
    #[arg(short, long)]
    pub skip: Option<usize>,

    /// Vendor flavour (see `p11perf flavours`)
    #[arg(short, long)]
    pub flavour: Option<String>,

    /// Test vector sizes in bytes, comma separated
    #[arg(long, value_delimiter = ',')]
    pub vectors: Vec<usize>,

    /// Benchmarks to run, e.g. rsa,ecdsa,aes,xorder
    #[arg(long, value_delimiter = ',')]
    pub coverage: Vec<String>,

    /// Key sizes and curves, e.g. rsa2048,ecnistp256,aes128
    #[arg(long, value_delimiter = ',')]
    pub keysizes: Vec<String>,

    /// Use keys already present on the token instead of generating them;
    /// the software token rejects this since its sessions start empty
    #[arg(long)]
    pub no_generate: bool,

    /// Report file path, or `-` for stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory for timestamped reports when no output path is given
    #[arg(long, default_value = "p11perf-results")]
    pub output_dir: PathBuf,

    /// Include raw latency samples in the report
    #[arg(long)]
    pub keep_samples: bool,
}

impl RunArgs {
    /// Resolve the run configuration: file (or defaults), then flags, then validation.
    pub fn resolve(&self) -> Result<RunConfig, PerfError> {
        let mut raw = match &self.config {
            Some(path) => ConfigLoader::load_raw_file(path)?,
            None => RawRunConfig::default(),
        };

        if let Some(threads) = self.threads {
            raw.threads = threads;
        }
        if let Some(iterations) = self.iterations {
            raw.iterations = iterations;
        }
        if let Some(skip) = self.skip {
            raw.skip = skip;
        }
        if let Some(flavour) = &self.flavour {
            raw.flavour = flavour.clone();
        }
        if !self.vectors.is_empty() {
            raw.vectors = self.vectors.clone();
        }
        if !self.coverage.is_empty() {
            raw.coverage = self.coverage.clone();
        }
        if !self.keysizes.is_empty() {
            raw.keysizes = self.keysizes.clone();
        }
        if self.no_generate {
            raw.generate_keys = false;
        }

        Ok(ConfigLoader::validate(raw)?)
    }
}

pub fn execute(args: &RunArgs) -> anyhow::Result<()> {
    let config = args.resolve()?;
    check_key_source(&config)?;

    let hardware_threads = num_cpus::get();
    if config.threads.get() > hardware_threads {
        warn!(
            threads = config.threads.get(),
            hardware_threads, "More worker threads than hardware threads, figures may be affected"
        );
    }

    let clock = ClockPrecision::measure();
    info!(precision = %clock, "Measured clock precision");

    let token = SoftToken::new(config.vendor);
    let token_info = token.info();
    info!(
        token = %token_info.label,
        model = %token_info.model,
        flavour = %config.vendor,
        threads = config.threads.get(),
        iterations = config.iterations,
        skip = config.skip,
        "Starting benchmark run"
    );

    let catalog = Catalog::from_config(&config);
    if catalog.is_empty() {
        warn!("The coverage and key size selection names no benchmark");
    }

    let mut sessions = token
        .open_sessions(config.threads.get())
        .context("Failed to open token sessions")?;

    KeyGenerator::new(&mut sessions).generate_all(catalog.key_requests())?;
    info!(keys = catalog.key_requests().len(), "Keys generated");

    let report = Executor::from_config(&mut sessions, &config).run_all(catalog.benchmarks());
    let document = ReportDocument::new(&config, token_info, clock, &report, args.keep_samples);

    let summary_error = |source| PerfError::Io {
        context: "writing run summary",
        source,
    };
    match args.output.as_deref() {
        Some(STDOUT) => {
            print_summary(&mut io::stderr(), &document).map_err(summary_error)?;
            JsonReporter::write(io::stdout().lock(), &document)?;
        }
        Some(path) => {
            print_summary(&mut io::stdout(), &document).map_err(summary_error)?;
            JsonReporter::save_to(path, &document)?;
            info!(path = %path, "Report written");
        }
        None => {
            print_summary(&mut io::stdout(), &document).map_err(summary_error)?;
            let path = JsonReporter::new(&args.output_dir)?.save(&document)?;
            info!(path = %path.display(), "Report written");
        }
    }

    let failed = document.failed();
    if failed > 0 {
        warn!(failed, total = document.results.len(), "Some benchmarks failed");
    }
    Ok(())
}

/// Sessions of the software token start empty, so every benchmark of a
/// run without key generation would fail to find its key.
fn check_key_source(config: &RunConfig) -> Result<(), PerfError> {
    if config.generate_keys {
        return Ok(());
    }
    Err(ConfigError::InvalidFieldValue {
        field: "generate_keys",
        value: "false".to_string(),
        reason: "the software token starts with empty sessions, keys must be generated".to_string(),
    }
    .into())
}

/// Human-readable median, p99 and throughput per benchmark and vector.
fn print_summary(out: &mut impl io::Write, document: &ReportDocument) -> io::Result<()> {
    writeln!(out, "Clock precision: {}", document.clock_precision)?;
    writeln!(out)?;
    for entry in &document.results {
        let key = entry.key();
        match entry.status {
            EntryStatus::Completed => {
                writeln!(out, "{}", key)?;
                for (vector, metrics) in &entry.vectors {
                    writeln!(
                        out,
                        "  {:<12} median {:>10}  p99 {:>10}  {:>14}  ({} samples)",
                        vector,
                        LatencyMetrics::format_latency(metrics.latency.median_ns),
                        LatencyMetrics::format_latency(metrics.latency.p99_ns),
                        ThroughputMetrics::format_tps(metrics.throughput.tps),
                        metrics.count
                    )?;
                }
            }
            EntryStatus::Failed => {
                writeln!(out, "{}: FAILED ({})", key, entry.reason.as_deref().unwrap_or("unknown"))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use p11perf_core::Vendor;

    #[test]
    fn test_flags_override_defaults() {
        let args = RunArgs {
            threads: Some(3),
            flavour: Some("utimaco".to_string()),
            vectors: vec![32, 32, 8],
            coverage: vec!["aesgcm".to_string()],
            keysizes: vec!["aes256".to_string()],
            no_generate: true,
            ..RunArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.threads.get(), 3);
        assert_eq!(config.vendor, Vendor::Utimaco);
        assert_eq!(config.vectors.len(), 2);
        assert_eq!(config.iterations, 200);
        assert!(!config.generate_keys);
    }

    #[test]
    fn test_no_generate_rejected_before_running() {
        let output = tempfile::tempdir().unwrap();
        let args = RunArgs {
            iterations: Some(2),
            vectors: vec![16],
            coverage: vec!["aes".to_string()],
            keysizes: vec!["aes128".to_string()],
            no_generate: true,
            output_dir: output.path().to_path_buf(),
            ..RunArgs::default()
        };

        let err = execute(&args).unwrap_err();
        match err.downcast_ref::<PerfError>() {
            Some(perf @ PerfError::Config(ConfigError::InvalidFieldValue { field, .. })) => {
                assert_eq!(*field, "generate_keys");
                assert_eq!(perf.exit_code(), 64);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);

        let generating = RunArgs {
            no_generate: false,
            ..args
        };
        assert!(check_key_source(&generating.resolve().unwrap()).is_ok());
    }

    #[test]
    fn test_invalid_flag_is_config_error() {
        let args = RunArgs {
            flavour: Some("acme".to_string()),
            ..RunArgs::default()
        };
        assert!(matches!(
            args.resolve(),
            Err(PerfError::Config(ConfigError::UnknownVendor { .. }))
        ));
    }

    #[test]
    fn test_summary_lists_every_benchmark() {
        let args = RunArgs {
            iterations: Some(3),
            vectors: vec![16],
            coverage: vec!["hmac".to_string(), "rand".to_string()],
            keysizes: vec!["hmac256".to_string()],
            ..RunArgs::default()
        };
        let config = args.resolve().unwrap();
        let catalog = Catalog::from_config(&config);
        let token = SoftToken::new(config.vendor);
        let mut sessions = token.open_sessions(1).unwrap();
        KeyGenerator::new(&mut sessions)
            .generate_all(catalog.key_requests())
            .unwrap();
        let report = Executor::from_config(&mut sessions, &config).run_all(catalog.benchmarks());
        let document = ReportDocument::new(&config, token.info(), ClockPrecision::measure_with(10), &report, false);

        let mut out = Vec::new();
        print_summary(&mut out, &document).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("HMAC SHA256 using hmac-256"));
        assert!(text.contains("GENERATE RANDOM using rand-128"));
        assert!(text.contains("testvec0016"));
        assert!(!text.contains("FAILED"));
    }
}
