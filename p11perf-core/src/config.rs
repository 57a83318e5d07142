// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Run configuration with strict validation.
//!
//! A YAML document and the command line both fill the same [`RawRunConfig`].
//! Every field is checked before the first token call; any invalid value
//! is a [`ConfigError`] that aborts the run.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PerfError, PerfResult};
use crate::types::{Curve, KeySpec, KeyType, ThreadCount, VectorSize};
use crate::vendor::Vendor;

/// Raw run configuration as parsed from YAML or assembled from CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRunConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_flavour")]
    pub flavour: String,
    #[serde(default = "default_vectors")]
    pub vectors: Vec<usize>,
    #[serde(default = "default_coverage")]
    pub coverage: Vec<String>,
    #[serde(default = "default_keysizes")]
    pub keysizes: Vec<String>,
    #[serde(default = "default_generate_keys")]
    pub generate_keys: bool,
}

fn default_threads() -> usize {
    1
}

fn default_iterations() -> usize {
    200
}

fn default_flavour() -> String {
    Vendor::Generic.name().to_string()
}

fn default_vectors() -> Vec<usize> {
    vec![8, 16, 64, 256, 1024, 4096]
}

fn default_coverage() -> Vec<String> {
    to_strings(&[
        "rsa", "ecdsa", "ecdh", "hmac", "des", "aes", "xorder", "rand", "jwe", "oaep", "oaepunw",
    ])
}

fn default_keysizes() -> Vec<String> {
    to_strings(&[
        "rsa2048", "rsa3072", "rsa4096", "ecnistp256", "ecnistp384", "ecnistp521", "hmac160", "hmac256", "hmac512",
        "des128", "des192", "aes128", "aes192", "aes256",
    ])
}

fn default_generate_keys() -> bool {
    true
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            iterations: default_iterations(),
            skip: 0,
            flavour: default_flavour(),
            vectors: default_vectors(),
            coverage: default_coverage(),
            keysizes: default_keysizes(),
            generate_keys: default_generate_keys(),
        }
    }
}

/// One benchmark family selectable through the coverage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Rsa,
    Ecdsa,
    Ecdh,
    Hmac,
    DesEcb,
    DesCbc,
    AesEcb,
    AesCbc,
    AesGcm,
    XorDerive,
    Random,
    OaepSha1,
    OaepSha256,
    OaepUnwrapSha1,
    OaepUnwrapSha256,
    JweSha1,
    JweSha256,
}

impl Coverage {
    /// Expand a coverage token; compound tokens select several families.
    pub fn expand(token: &str) -> Result<&'static [Coverage], ConfigError> {
        let items: &'static [Coverage] = match token.trim().to_ascii_lowercase().as_str() {
            "rsa" => &[Coverage::Rsa],
            "ecdsa" => &[Coverage::Ecdsa],
            "ecdh" => &[Coverage::Ecdh],
            "hmac" => &[Coverage::Hmac],
            "des" => &[Coverage::DesEcb, Coverage::DesCbc],
            "desecb" => &[Coverage::DesEcb],
            "descbc" => &[Coverage::DesCbc],
            "aes" => &[Coverage::AesEcb, Coverage::AesCbc, Coverage::AesGcm],
            "aesecb" => &[Coverage::AesEcb],
            "aescbc" => &[Coverage::AesCbc],
            "aesgcm" => &[Coverage::AesGcm],
            "xorder" => &[Coverage::XorDerive],
            "rand" => &[Coverage::Random],
            "oaep" => &[Coverage::OaepSha1, Coverage::OaepSha256],
            "oaepsha1" => &[Coverage::OaepSha1],
            "oaepsha256" => &[Coverage::OaepSha256],
            "oaepunw" => &[Coverage::OaepUnwrapSha1, Coverage::OaepUnwrapSha256],
            "oaepunwsha1" => &[Coverage::OaepUnwrapSha1],
            "oaepunwsha256" => &[Coverage::OaepUnwrapSha256],
            "jwe" => &[Coverage::JweSha1, Coverage::JweSha256],
            "jweoaepsha1" => &[Coverage::JweSha1],
            "jweoaepsha256" => &[Coverage::JweSha256],
            _ => {
                return Err(ConfigError::UnknownCoverage {
                    name: token.to_string(),
                })
            }
        };
        Ok(items)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Coverage::Rsa => "rsa",
            Coverage::Ecdsa => "ecdsa",
            Coverage::Ecdh => "ecdh",
            Coverage::Hmac => "hmac",
            Coverage::DesEcb => "desecb",
            Coverage::DesCbc => "descbc",
            Coverage::AesEcb => "aesecb",
            Coverage::AesCbc => "aescbc",
            Coverage::AesGcm => "aesgcm",
            Coverage::XorDerive => "xorder",
            Coverage::Random => "rand",
            Coverage::OaepSha1 => "oaepsha1",
            Coverage::OaepSha256 => "oaepsha256",
            Coverage::OaepUnwrapSha1 => "oaepunwsha1",
            Coverage::OaepUnwrapSha256 => "oaepunwsha256",
            Coverage::JweSha1 => "jweoaepsha1",
            Coverage::JweSha256 => "jweoaepsha256",
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A key size or curve selected through the key-size list,
/// e.g. `rsa2048`, `ecnistp384`, `hmac256`, `des192`, `aes128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySize {
    Rsa(u32),
    Ec(Curve),
    Hmac(u32),
    Des(u32),
    Aes(u32),
}

impl KeySize {
    /// Key type and parameter generated for this selection.
    /// EC selections serve both ECDSA and ECDH; ECDSA is reported here.
    pub fn key_spec(&self) -> (KeyType, KeySpec) {
        match *self {
            KeySize::Rsa(bits) => (KeyType::Rsa, KeySpec::Bits(bits)),
            KeySize::Ec(curve) => (KeyType::Ecdsa, KeySpec::Curve(curve)),
            KeySize::Hmac(bits) => (KeyType::Generic, KeySpec::Bits(bits)),
            KeySize::Des(bits) => (KeyType::Des, KeySpec::Bits(bits)),
            KeySize::Aes(bits) => (KeyType::Aes, KeySpec::Bits(bits)),
        }
    }
}

impl FromStr for KeySize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        let unknown = || ConfigError::UnknownKeySize { name: s.to_string() };

        if let Some(rest) = token.strip_prefix("ecnistp") {
            let curve = match rest {
                "256" => Curve::Secp256r1,
                "384" => Curve::Secp384r1,
                "521" => Curve::Secp521r1,
                _ => return Err(unknown()),
            };
            return Ok(KeySize::Ec(curve));
        }

        let split = token.find(|c: char| c.is_ascii_digit()).ok_or_else(unknown)?;
        let (prefix, digits) = token.split_at(split);
        let bits: u32 = digits.parse().map_err(|_| unknown())?;
        let (key_type, size) = match prefix {
            "rsa" => (KeyType::Rsa, KeySize::Rsa(bits)),
            "hmac" => (KeyType::Generic, KeySize::Hmac(bits)),
            "des" => (KeyType::Des, KeySize::Des(bits)),
            "aes" => (KeyType::Aes, KeySize::Aes(bits)),
            _ => return Err(unknown()),
        };
        key_type.validate(KeySpec::Bits(bits))?;
        Ok(size)
    }
}

impl fmt::Display for KeySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySize::Rsa(bits) => write!(f, "rsa{}", bits),
            KeySize::Ec(Curve::Secp256r1) => f.write_str("ecnistp256"),
            KeySize::Ec(Curve::Secp384r1) => f.write_str("ecnistp384"),
            KeySize::Ec(Curve::Secp521r1) => f.write_str("ecnistp521"),
            KeySize::Hmac(bits) => write!(f, "hmac{}", bits),
            KeySize::Des(bits) => write!(f, "des{}", bits),
            KeySize::Aes(bits) => write!(f, "aes{}", bits),
        }
    }
}

/// Validated run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub threads: ThreadCount,
    pub iterations: usize,
    pub skip: usize,
    pub vendor: Vendor,
    /// Distinct vector sizes, ascending.
    pub vectors: BTreeSet<VectorSize>,
    pub coverage: BTreeSet<Coverage>,
    pub key_sizes: BTreeSet<KeySize>,
    pub generate_keys: bool,
}

impl RunConfig {
    /// Whether `coverage` was selected.
    pub fn covers(&self, coverage: Coverage) -> bool {
        self.coverage.contains(&coverage)
    }

    /// Selected RSA modulus sizes.
    pub fn rsa_bits(&self) -> Vec<u32> {
        self.select(|k| matches!(k, KeySize::Rsa(_)))
    }

    /// Selected HMAC key sizes.
    pub fn hmac_bits(&self) -> Vec<u32> {
        self.select(|k| matches!(k, KeySize::Hmac(_)))
    }

    /// Selected DES key sizes.
    pub fn des_bits(&self) -> Vec<u32> {
        self.select(|k| matches!(k, KeySize::Des(_)))
    }

    /// Selected AES key sizes.
    pub fn aes_bits(&self) -> Vec<u32> {
        self.select(|k| matches!(k, KeySize::Aes(_)))
    }

    /// Selected EC curves.
    pub fn curves(&self) -> Vec<Curve> {
        self.key_sizes
            .iter()
            .filter_map(|k| match k {
                KeySize::Ec(curve) => Some(*curve),
                _ => None,
            })
            .collect()
    }

    fn select(&self, filter: impl Fn(&KeySize) -> bool) -> Vec<u32> {
        self.key_sizes
            .iter()
            .filter(|k| filter(*k))
            .filter_map(|k| match k.key_spec().1 {
                KeySpec::Bits(bits) => Some(bits),
                KeySpec::Curve(_) => None,
            })
            .collect()
    }

    /// Total measured calls per (benchmark, vector) across all threads.
    pub fn samples_per_vector(&self) -> usize {
        self.threads.get() * self.iterations
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> PerfResult<RunConfig> {
        let raw = Self::load_raw_file(path)?;
        Ok(Self::validate(raw)?)
    }

    /// Parse a YAML file without validating it, so that command-line
    /// overrides can be applied first.
    pub fn load_raw_file(path: impl AsRef<Path>) -> PerfResult<RawRunConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::ConfigNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| PerfError::Io {
            context: "reading config file",
            source: e,
        })?;

        Ok(Self::parse(&content)?)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> PerfResult<RunConfig> {
        let raw = Self::parse(content)?;
        Ok(Self::validate(raw)?)
    }

    fn parse(content: &str) -> Result<RawRunConfig, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })
    }

    /// Validate a raw configuration and convert it to validated types.
    pub fn validate(raw: RawRunConfig) -> Result<RunConfig, ConfigError> {
        let threads = ThreadCount::new(raw.threads)?;
        let vendor = Vendor::resolve(&raw.flavour)?;

        let vectors = raw
            .vectors
            .iter()
            .map(|&size| VectorSize::new(size))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if vectors.is_empty() {
            return Err(ConfigError::InvalidFieldValue {
                field: "vectors",
                value: "[]".to_string(),
                reason: "At least one vector size must be given".to_string(),
            });
        }

        let mut coverage = BTreeSet::new();
        for token in list_items(&raw.coverage) {
            coverage.extend(Coverage::expand(token)?.iter().copied());
        }

        let key_sizes = list_items(&raw.keysizes)
            .map(KeySize::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(RunConfig {
            threads,
            iterations: raw.iterations,
            skip: raw.skip,
            vendor,
            vectors,
            coverage,
            key_sizes,
            generate_keys: raw.generate_keys,
        })
    }
}

/// Entries may themselves be comma-separated lists; blanks are ignored.
fn list_items(entries: &[String]) -> impl Iterator<Item = &str> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
}
