// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! `p11perf validate` command - Validate configuration file.

use p11perf_benchmark::Catalog;
use p11perf_core::ConfigLoader;

pub fn execute(file: &str) -> anyhow::Result<()> {
    tracing::info!(file = %file, "Validating configuration");

    let config = ConfigLoader::load_file(file)?;
    let catalog = Catalog::from_config(&config);

    println!("✓ Configuration is valid");
    println!();
    println!("Run Settings:");
    println!("  Threads:       {}", config.threads);
    println!("  Iterations:    {}", config.iterations);
    println!("  Skip:          {}", config.skip);
    println!("  Flavour:       {}", config.vendor);
    println!(
        "  Vectors:       {}",
        config
            .vectors
            .iter()
            .map(|v| v.bytes().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Generate keys: {}", config.generate_keys);
    println!();
    println!("Keys ({}):", catalog.key_requests().len());
    for request in catalog.key_requests() {
        println!("  - {} ({} {})", request.alias, request.key_type, request.spec);
    }
    println!();
    println!("Benchmarks ({}):", catalog.len());
    for benchmark in catalog.benchmarks() {
        println!("  - {}", benchmark.identity());
    }
    Ok(())
}
