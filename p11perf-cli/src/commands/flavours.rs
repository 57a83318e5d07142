// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! `p11perf flavours` command - List vendor flavours and their GCM layouts.

use p11perf_core::{GcmLayout, IvSource, Vendor};

pub fn execute() -> anyhow::Result<()> {
    println!("Vendor flavours:");
    for name in Vendor::choices() {
        let vendor = Vendor::resolve(name)?;
        match GcmLayout::for_vendor(vendor) {
            Some(layout) => println!(
                "  {:<8} AES-GCM iv {} bytes ({}), output payload+{}",
                name,
                layout.iv_len,
                iv_source(layout.iv_source),
                layout.output_overhead
            ),
            None => println!("  {:<8} AES-GCM not supported", name),
        }
    }
    Ok(())
}

fn iv_source(source: IvSource) -> &'static str {
    match source {
        IvSource::EngineRandom => "random",
        IvSource::TokenGenerated => "token generated",
        IvSource::FixedZero => "all zero",
    }
}
