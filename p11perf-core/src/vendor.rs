// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Vendor flavour resolution and the per-vendor quirk table.
//!
//! The standard token interface leaves some parameter layouts to the
//! implementation. Benchmarks never branch on the vendor themselves; they
//! consult the quirk table once per `prepare` call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Token implementation flavour. Resolved once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    Generic,
    Luna,
    Utimaco,
    Entrust,
}

/// Every vendor, in the order reported by [`Vendor::choices`].
const ALL_VENDORS: [Vendor; 4] = [
    Vendor::Generic,
    Vendor::Luna,
    Vendor::Utimaco,
    Vendor::Entrust,
];

impl Vendor {
    /// Resolve a configuration name into a vendor.
    pub fn resolve(name: &str) -> Result<Self, ConfigError> {
        ALL_VENDORS
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownVendor {
                name: name.to_string(),
                choices: Self::choices().join(", "),
            })
    }

    /// Ordered list of accepted vendor names.
    pub fn choices() -> Vec<&'static str> {
        ALL_VENDORS.iter().map(|v| v.name()).collect()
    }

    /// Configuration name of this vendor.
    pub fn name(&self) -> &'static str {
        match self {
            Vendor::Generic => "generic",
            Vendor::Luna => "luna",
            Vendor::Utimaco => "utimaco",
            Vendor::Entrust => "entrust",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Vendor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

/// Where the IV of an authenticated-encryption call comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSource {
    /// Fresh random bytes drawn by the engine at every prepare.
    EngineRandom,
    /// The token draws the IV and appends it to the output.
    TokenGenerated,
    /// The mechanism requires an all-zero IV.
    FixedZero,
}

/// Buffer and parameter layout of AES-GCM encryption for one vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcmLayout {
    pub vendor: Vendor,
    /// IV length in bytes.
    pub iv_len: usize,
    pub iv_source: IvSource,
    /// Authentication tag length in bytes.
    pub tag_len: usize,
    /// Bytes added to the plaintext length in the output buffer.
    pub output_overhead: usize,
}

/// Quirk table for AES-GCM. Output layouts:
/// - generic: `payload | tag(16)`
/// - luna: `payload | tag(16) | iv(16)`
/// - utimaco, entrust: `payload | tag(16)` with a zero IV
pub const GCM_LAYOUTS: &[GcmLayout] = &[
    GcmLayout {
        vendor: Vendor::Generic,
        iv_len: 12,
        iv_source: IvSource::EngineRandom,
        tag_len: 16,
        output_overhead: 16,
    },
    GcmLayout {
        vendor: Vendor::Luna,
        iv_len: 16,
        iv_source: IvSource::TokenGenerated,
        tag_len: 16,
        output_overhead: 32,
    },
    GcmLayout {
        vendor: Vendor::Utimaco,
        iv_len: 12,
        iv_source: IvSource::FixedZero,
        tag_len: 16,
        output_overhead: 16,
    },
    GcmLayout {
        vendor: Vendor::Entrust,
        iv_len: 12,
        iv_source: IvSource::FixedZero,
        tag_len: 16,
        output_overhead: 16,
    },
];

impl GcmLayout {
    /// Look up the layout for a vendor in the built-in table.
    pub fn for_vendor(vendor: Vendor) -> Option<&'static GcmLayout> {
        Self::lookup_in(GCM_LAYOUTS, vendor)
    }

    /// Look up the layout for a vendor in an arbitrary table.
    pub fn lookup_in(table: &[GcmLayout], vendor: Vendor) -> Option<&GcmLayout> {
        table.iter().find(|layout| layout.vendor == vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_vendors() {
        assert_eq!(Vendor::resolve("generic").unwrap(), Vendor::Generic);
        assert_eq!(Vendor::resolve("LUNA").unwrap(), Vendor::Luna);
        assert_eq!("entrust".parse::<Vendor>().unwrap(), Vendor::Entrust);
    }

    #[test]
    fn test_resolve_unknown_vendor() {
        let err = Vendor::resolve("acme").unwrap_err();
        match err {
            ConfigError::UnknownVendor { name, choices } => {
                assert_eq!(name, "acme");
                assert_eq!(choices, "generic, luna, utimaco, entrust");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_choices_are_ordered() {
        assert_eq!(Vendor::choices(), vec!["generic", "luna", "utimaco", "entrust"]);
    }

    #[test]
    fn test_every_vendor_has_gcm_layout() {
        for vendor in ALL_VENDORS {
            let layout = GcmLayout::for_vendor(vendor).unwrap();
            assert_eq!(layout.tag_len, 16);
        }
        let luna = GcmLayout::for_vendor(Vendor::Luna).unwrap();
        assert_eq!(luna.output_overhead, luna.tag_len + luna.iv_len);
    }

    #[test]
    fn test_lookup_in_partial_table() {
        let table = &GCM_LAYOUTS[..1];
        assert!(GcmLayout::lookup_in(table, Vendor::Generic).is_some());
        assert!(GcmLayout::lookup_in(table, Vendor::Luna).is_none());
    }
}
