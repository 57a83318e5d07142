// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Integration tests for configuration and parallel key generation.
//!
//! These tests verify the flow from a YAML configuration to keys present on
//! every session of a software token.

use std::io::Write;

use p11perf_core::config::{ConfigLoader, KeySize};
use p11perf_core::error::PerfError;
use p11perf_core::keygen::{threaded_label, KeyGenerator, KeyRequest};
use p11perf_core::soft::{Fault, SoftToken};
use p11perf_core::token::ObjectClass;
use p11perf_core::types::{Curve, KeySpec, KeyType};
use p11perf_core::vendor::Vendor;
use tempfile::NamedTempFile;

/// Every key size the default selection names generates on every session.
#[test]
fn test_default_key_sizes_generate() {
    let config = ConfigLoader::load_string("threads: 3\n").expect("default config");
    let token = SoftToken::new(config.vendor);
    let mut sessions = token.open_sessions(config.threads.get()).unwrap();

    let requests: Vec<KeyRequest> = config
        .key_sizes
        .iter()
        .flat_map(|size| {
            let (key_type, spec) = size.key_spec();
            let alias = format!("it-{}", size);
            match key_type {
                // one entry per EC key type a curve can produce
                KeyType::Ecdsa | KeyType::Ecdh => vec![
                    KeyRequest::new(KeyType::Ecdsa, format!("{}-sig", alias), spec),
                    KeyRequest::new(KeyType::Ecdh, format!("{}-dh", alias), spec),
                ],
                _ => vec![KeyRequest::new(key_type, alias, spec)],
            }
        })
        .collect();
    assert!(requests.len() >= config.key_sizes.len());

    KeyGenerator::new(&mut sessions)
        .generate_all(&requests)
        .expect("all default key sizes are legal");

    for (thread, session) in sessions.iter().enumerate() {
        for request in &requests {
            let (class, label) = if request.key_type.is_per_thread() {
                (ObjectClass::PrivateKey, threaded_label(&request.alias, thread))
            } else {
                (ObjectClass::SecretKey, request.alias.clone())
            };
            assert!(
                session.find_object(class, &label).unwrap().is_some(),
                "{} missing on thread {}",
                label,
                thread
            );
        }
    }
}

#[test]
fn test_illegal_aes_size_is_a_configuration_error() {
    let token = SoftToken::new(Vendor::Generic);
    let mut sessions = token.open_sessions(2).unwrap();

    let err = KeyGenerator::new(&mut sessions)
        .generate(KeyType::Aes, "aes-100", 100u32)
        .unwrap_err();

    assert!(matches!(err, PerfError::Config(_)));
    assert_eq!(err.exit_code(), 64);
    assert!(sessions
        .iter()
        .all(|s| s.find_object(ObjectClass::SecretKey, "aes-100").unwrap().is_none()));
}

#[test]
fn test_keygen_failure_names_failed_threads() {
    let token = SoftToken::new(Vendor::Generic).with_session_faults(vec![
        None,
        Some(Fault::KeyGeneration),
        None,
        Some(Fault::KeyGeneration),
    ]);
    let mut sessions = token.open_sessions(4).unwrap();

    let err = KeyGenerator::new(&mut sessions)
        .generate(KeyType::Ecdsa, "ecdsa-secp384r1", Curve::Secp384r1)
        .unwrap_err();

    match err {
        PerfError::KeyGeneration(e) => {
            assert_eq!(e.failed_threads, vec![1, 3]);
            assert_eq!(e.alias, "ecdsa-secp384r1");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_yaml_file_to_keys() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "threads: 2\nflavour: luna\nvectors: [16, 32]\ncoverage: [aes, hmac]\nkeysizes: [\"aes256, hmac512\"]"
    )
    .unwrap();

    let config = ConfigLoader::load_file(file.path()).unwrap();
    assert_eq!(config.vendor, Vendor::Luna);
    assert_eq!(config.aes_bits(), vec![256]);
    assert_eq!(config.hmac_bits(), vec![512]);

    let token = SoftToken::new(config.vendor);
    let mut sessions = token.open_sessions(config.threads.get()).unwrap();
    let mut generator = KeyGenerator::new(&mut sessions);
    for size in &config.key_sizes {
        let (key_type, spec) = size.key_spec();
        generator.generate(key_type, &size.to_string(), spec).unwrap();
    }
    assert_eq!(generator.threads(), 2);
}

#[test]
fn test_key_size_parsing_matches_key_spec() {
    let size: KeySize = "ecnistp521".parse().unwrap();
    assert_eq!(size.key_spec(), (KeyType::Ecdsa, KeySpec::Curve(Curve::Secp521r1)));
    assert!("rsa1000".parse::<KeySize>().is_err());
}

#[test]
fn test_example_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../p11perf.example.yaml");
    let config = ConfigLoader::load_file(path).unwrap();
    assert_eq!(config.threads.get(), 4);
    assert_eq!(config.skip, 20);
    assert_eq!(config.key_sizes.len(), 14);
    assert_eq!(config.samples_per_vector(), 800);
}
