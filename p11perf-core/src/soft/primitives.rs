// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! Cryptographic primitives backing the software token.
//!
//! AES (ECB, CBC, GCM) and HMAC are real. Mechanisms with no primitive in
//! the dependency stack (DES3, RSA, ECDSA, ECDH) are emulated with keyed
//! SHA-256 expansion that produces outputs of the right size. Emulated
//! RSA OAEP keeps the real block layout and capacity and is keyed by the
//! public key value, so the private key recomputes it to decrypt.

use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::cipher::BlockEncrypt;
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::AesGcm;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::TokenError;
use crate::token::Digest;

pub const AES_BLOCK: usize = 16;
pub const DES_BLOCK: usize = 8;
pub const GCM_TAG_LEN: usize = 16;

/// AES block cipher keyed at one of the three legal sizes.
enum AesCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesCipher {
    fn new(key: &[u8]) -> Result<Self, TokenError> {
        let invalid = |_| TokenError::KeySizeRange {
            bits: (key.len() * 8) as u32,
        };
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(TokenError::KeySizeRange {
                bits: (n * 8) as u32,
            }),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

fn check_block_io(data: &[u8], out: &[u8], block: usize) -> Result<(), TokenError> {
    if data.is_empty() || data.len() % block != 0 {
        return Err(TokenError::DataLenRange { len: data.len() });
    }
    if out.len() < data.len() {
        return Err(TokenError::BufferTooSmall {
            needed: data.len(),
            provided: out.len(),
        });
    }
    Ok(())
}

/// AES in ECB mode. `data` must be block aligned.
pub fn aes_ecb(key: &[u8], data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    check_block_io(data, out, AES_BLOCK)?;
    let cipher = AesCipher::new(key)?;
    out[..data.len()].copy_from_slice(data);
    for block in out[..data.len()].chunks_exact_mut(AES_BLOCK) {
        cipher.encrypt_block(block);
    }
    Ok(data.len())
}

/// AES in CBC mode. `data` must be block aligned.
pub fn aes_cbc(key: &[u8], iv: &[u8; 16], data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    check_block_io(data, out, AES_BLOCK)?;
    let cipher = AesCipher::new(key)?;
    let mut chain = *iv;
    for (src, dst) in data
        .chunks_exact(AES_BLOCK)
        .zip(out[..data.len()].chunks_exact_mut(AES_BLOCK))
    {
        for ((d, s), c) in dst.iter_mut().zip(src).zip(chain.iter()) {
            *d = s ^ c;
        }
        cipher.encrypt_block(dst);
        chain.copy_from_slice(dst);
    }
    Ok(data.len())
}

fn gcm_seal_with<A>(key: &[u8], nonce: &[u8], buf: &mut [u8], tag_out: &mut [u8]) -> Result<(), TokenError>
where
    A: AeadInPlace + KeyInit,
{
    let cipher = A::new_from_slice(key).map_err(|_| TokenError::KeySizeRange {
        bits: (key.len() * 8) as u32,
    })?;
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], buf)
        .map_err(|_| TokenError::FunctionFailed {
            reason: "AES-GCM encryption failed".to_string(),
        })?;
    tag_out.copy_from_slice(tag.as_slice());
    Ok(())
}

/// AES-GCM encryption in place over `buf`, writing a 16-byte tag to `tag_out`.
/// Supports 12- and 16-byte nonces.
pub fn aes_gcm_seal(key: &[u8], nonce: &[u8], buf: &mut [u8], tag_out: &mut [u8]) -> Result<(), TokenError> {
    match (key.len(), nonce.len()) {
        (16, 12) => gcm_seal_with::<AesGcm<Aes128, U12>>(key, nonce, buf, tag_out),
        (24, 12) => gcm_seal_with::<AesGcm<Aes192, U12>>(key, nonce, buf, tag_out),
        (32, 12) => gcm_seal_with::<AesGcm<Aes256, U12>>(key, nonce, buf, tag_out),
        (16, 16) => gcm_seal_with::<AesGcm<Aes128, U16>>(key, nonce, buf, tag_out),
        (24, 16) => gcm_seal_with::<AesGcm<Aes192, U16>>(key, nonce, buf, tag_out),
        (32, 16) => gcm_seal_with::<AesGcm<Aes256, U16>>(key, nonce, buf, tag_out),
        (16 | 24 | 32, n) => Err(TokenError::MechanismParamInvalid {
            reason: format!("unsupported GCM IV length {}", n),
        }),
        (n, _) => Err(TokenError::KeySizeRange {
            bits: (n * 8) as u32,
        }),
    }
}

fn gcm_open_with<A>(key: &[u8], nonce: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<(), TokenError>
where
    A: AeadInPlace + KeyInit,
{
    let cipher = A::new_from_slice(key).map_err(|_| TokenError::KeySizeRange {
        bits: (key.len() * 8) as u32,
    })?;
    cipher
        .decrypt_in_place_detached(GenericArray::from_slice(nonce), &[], buf, GenericArray::from_slice(tag))
        .map_err(|_| TokenError::EncryptedDataInvalid)
}

/// AES-GCM decryption in place over `buf`, checking the 16-byte `tag`.
/// Supports 12- and 16-byte nonces.
pub fn aes_gcm_open(key: &[u8], nonce: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<(), TokenError> {
    if tag.len() != GCM_TAG_LEN {
        return Err(TokenError::EncryptedDataInvalid);
    }
    match (key.len(), nonce.len()) {
        (16, 12) => gcm_open_with::<AesGcm<Aes128, U12>>(key, nonce, buf, tag),
        (24, 12) => gcm_open_with::<AesGcm<Aes192, U12>>(key, nonce, buf, tag),
        (32, 12) => gcm_open_with::<AesGcm<Aes256, U12>>(key, nonce, buf, tag),
        (16, 16) => gcm_open_with::<AesGcm<Aes128, U16>>(key, nonce, buf, tag),
        (24, 16) => gcm_open_with::<AesGcm<Aes192, U16>>(key, nonce, buf, tag),
        (32, 16) => gcm_open_with::<AesGcm<Aes256, U16>>(key, nonce, buf, tag),
        (16 | 24 | 32, n) => Err(TokenError::MechanismParamInvalid {
            reason: format!("unsupported GCM IV length {}", n),
        }),
        (n, _) => Err(TokenError::KeySizeRange {
            bits: (n * 8) as u32,
        }),
    }
}

fn mac_with<M>(key: &[u8], data: &[u8], out: &mut [u8]) -> Result<usize, TokenError>
where
    M: Mac + KeyInit,
{
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| TokenError::KeySizeRange {
        bits: (key.len() * 8) as u32,
    })?;
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    out[..tag.len()].copy_from_slice(&tag);
    Ok(tag.len())
}

/// HMAC over `data`. `out` must hold at least the digest length.
pub fn hmac(digest: Digest, key: &[u8], data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    let needed = digest.output_len();
    if out.len() < needed {
        return Err(TokenError::BufferTooSmall {
            needed,
            provided: out.len(),
        });
    }
    match digest {
        Digest::Sha1 => mac_with::<Hmac<Sha1>>(key, data, out),
        Digest::Sha256 => mac_with::<Hmac<Sha256>>(key, data, out),
        Digest::Sha512 => mac_with::<Hmac<Sha512>>(key, data, out),
    }
}

/// Hash `data` with the given digest into a fixed 64-byte buffer,
/// returning the used length.
pub fn hash(digest: Digest, data: &[u8], out: &mut [u8; 64]) -> usize {
    match digest {
        Digest::Sha1 => {
            let h = Sha1::digest(data);
            out[..h.len()].copy_from_slice(&h);
            h.len()
        }
        Digest::Sha256 => {
            let h = Sha256::digest(data);
            out[..h.len()].copy_from_slice(&h);
            h.len()
        }
        Digest::Sha512 => {
            let h = Sha512::digest(data);
            out[..h.len()].copy_from_slice(&h);
            h.len()
        }
    }
}

/// Fill `out` with SHA-256 in counter mode over the concatenation of `parts`.
pub fn expand(parts: &[&[u8]], out: &mut [u8]) {
    for (counter, chunk) in out.chunks_mut(32).enumerate() {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.update((counter as u32).to_be_bytes());
        let block = hasher.finalize();
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

/// Emulated DES3 transform with the shape of the real one: 8-byte blocks,
/// output as long as the input, optional CBC chaining.
pub fn des3_emulated(key: &[u8], iv: Option<&[u8; 8]>, data: &[u8], out: &mut [u8]) -> Result<usize, TokenError> {
    if key.len() != 16 && key.len() != 24 {
        return Err(TokenError::KeySizeRange {
            bits: (key.len() * 8) as u32,
        });
    }
    check_block_io(data, out, DES_BLOCK)?;
    let mut chain = iv.copied().unwrap_or([0u8; 8]);
    for (src, dst) in data
        .chunks_exact(DES_BLOCK)
        .zip(out[..data.len()].chunks_exact_mut(DES_BLOCK))
    {
        match iv {
            Some(_) => expand(&[key, &chain, src], dst),
            None => expand(&[key, src], dst),
        }
        chain.copy_from_slice(dst);
    }
    Ok(data.len())
}

fn xor_mask(parts: &[&[u8]], data: &mut [u8]) {
    let mut mask = vec![0u8; data.len()];
    expand(parts, &mut mask);
    for (byte, m) in data.iter_mut().zip(&mask) {
        *byte ^= m;
    }
}

/// Emulated RSA OAEP encryption of `msg` into one `modulus_bytes` block:
/// `00 | masked seed | masked (label hash | 00.. | 01 | msg)`.
/// `seed` must be as long as the digest output.
pub fn oaep_seal(
    key: &[u8],
    digest: Digest,
    modulus_bytes: usize,
    seed: &[u8],
    msg: &[u8],
    out: &mut [u8],
) -> Result<usize, TokenError> {
    let h = digest.output_len();
    if seed.len() != h {
        return Err(TokenError::FunctionFailed {
            reason: format!("OAEP seed must be {} bytes", h),
        });
    }
    if modulus_bytes < 2 * h + 2 || msg.len() > digest.oaep_capacity(modulus_bytes) {
        return Err(TokenError::DataLenRange { len: msg.len() });
    }
    if out.len() < modulus_bytes {
        return Err(TokenError::BufferTooSmall {
            needed: modulus_bytes,
            provided: out.len(),
        });
    }

    let block = &mut out[..modulus_bytes];
    block.fill(0);
    let (masked_seed, db) = block[1..].split_at_mut(h);
    let mut label_hash = [0u8; 64];
    hash(digest, &[], &mut label_hash);
    db[..h].copy_from_slice(&label_hash[..h]);
    let separator = db.len() - msg.len() - 1;
    db[separator] = 0x01;
    db[separator + 1..].copy_from_slice(msg);

    xor_mask(&[key, seed], db);
    masked_seed.copy_from_slice(seed);
    xor_mask(&[key, &*db], masked_seed);
    Ok(modulus_bytes)
}

/// Reverse of [`oaep_seal`]; returns the recovered message length.
pub fn oaep_open(
    key: &[u8],
    digest: Digest,
    modulus_bytes: usize,
    ciphertext: &[u8],
    out: &mut [u8],
) -> Result<usize, TokenError> {
    let h = digest.output_len();
    if ciphertext.len() != modulus_bytes || modulus_bytes < 2 * h + 2 {
        return Err(TokenError::DataLenRange {
            len: ciphertext.len(),
        });
    }
    if ciphertext[0] != 0 {
        return Err(TokenError::EncryptedDataInvalid);
    }

    let mut block = ciphertext[1..].to_vec();
    let (seed, db) = block.split_at_mut(h);
    xor_mask(&[key, &*db], seed);
    xor_mask(&[key, &*seed], db);

    let mut label_hash = [0u8; 64];
    hash(digest, &[], &mut label_hash);
    if db[..h] != label_hash[..h] {
        return Err(TokenError::EncryptedDataInvalid);
    }
    let separator = db[h..]
        .iter()
        .position(|&b| b != 0)
        .map(|i| i + h)
        .ok_or(TokenError::EncryptedDataInvalid)?;
    if db[separator] != 0x01 {
        return Err(TokenError::EncryptedDataInvalid);
    }

    let msg = &db[separator + 1..];
    if out.len() < msg.len() {
        return Err(TokenError::BufferTooSmall {
            needed: msg.len(),
            provided: out.len(),
        });
    }
    out[..msg.len()].copy_from_slice(msg);
    Ok(msg.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_ecb_known_answer() {
        // FIPS-197 appendix C.1
        let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let mut out = [0u8; 16];
        aes_ecb(&key, &plain, &mut out).unwrap();
        assert_eq!(hex::encode(out), "69c4e0d86a7b0430d8cdb78070b4c55a");
    }

    #[test]
    fn test_aes_rejects_unaligned_data() {
        let key = [0u8; 16];
        let mut out = [0u8; 32];
        assert_eq!(
            aes_ecb(&key, &[0u8; 8], &mut out),
            Err(TokenError::DataLenRange { len: 8 })
        );
    }

    #[test]
    fn test_aes_cbc_differs_from_ecb() {
        let key = [7u8; 32];
        let data = [0u8; 32];
        let mut ecb = [0u8; 32];
        let mut cbc = [0u8; 32];
        aes_ecb(&key, &data, &mut ecb).unwrap();
        aes_cbc(&key, &[1u8; 16], &data, &mut cbc).unwrap();
        assert_ne!(ecb, cbc);
        // identical plaintext blocks encrypt identically in ECB only
        assert_eq!(ecb[..16], ecb[16..]);
        assert_ne!(cbc[..16], cbc[16..]);
    }

    #[test]
    fn test_gcm_nonce_sizes() {
        let key = [3u8; 16];
        let mut buf = [0u8; 24];
        let mut tag = [0u8; 16];
        assert!(aes_gcm_seal(&key, &[0u8; 12], &mut buf, &mut tag).is_ok());
        assert!(aes_gcm_seal(&key, &[0u8; 16], &mut buf, &mut tag).is_ok());
        assert!(matches!(
            aes_gcm_seal(&key, &[0u8; 8], &mut buf, &mut tag),
            Err(TokenError::MechanismParamInvalid { .. })
        ));
    }

    #[test]
    fn test_hmac_lengths() {
        let mut out = [0u8; 64];
        assert_eq!(hmac(Digest::Sha1, b"key", b"data", &mut out).unwrap(), 20);
        assert_eq!(hmac(Digest::Sha512, b"key", b"data", &mut out).unwrap(), 64);
        let mut short = [0u8; 16];
        assert!(hmac(Digest::Sha256, b"key", b"data", &mut short).is_err());
    }

    #[test]
    fn test_expand_is_deterministic() {
        let mut a = [0u8; 70];
        let mut b = [0u8; 70];
        expand(&[b"seed", b"x"], &mut a);
        expand(&[b"seed", b"x"], &mut b);
        assert_eq!(a, b);
        expand(&[b"seed", b"y"], &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_des3_block_alignment() {
        let key = [1u8; 24];
        let mut out = [0u8; 16];
        assert_eq!(des3_emulated(&key, None, &[0u8; 16], &mut out).unwrap(), 16);
        assert!(des3_emulated(&key, None, &[0u8; 12], &mut out).is_err());
        assert!(des3_emulated(&[1u8; 8], None, &[0u8; 8], &mut out).is_err());
    }

    #[test]
    fn test_gcm_open_checks_tag() {
        let key = [5u8; 32];
        let nonce = [9u8; 12];
        let mut buf = *b"sixteen byte msg";
        let mut tag = [0u8; 16];
        aes_gcm_seal(&key, &nonce, &mut buf, &mut tag).unwrap();

        let mut opened = buf;
        aes_gcm_open(&key, &nonce, &mut opened, &tag).unwrap();
        assert_eq!(&opened, b"sixteen byte msg");

        tag[0] ^= 1;
        let mut tampered = buf;
        assert_eq!(
            aes_gcm_open(&key, &nonce, &mut tampered, &tag),
            Err(TokenError::EncryptedDataInvalid)
        );
    }

    #[test]
    fn test_oaep_block_layout() {
        let key = [4u8; 32];
        let seed = [8u8; 20];
        let mut block = [0xffu8; 256];
        assert_eq!(
            oaep_seal(&key, Digest::Sha1, 256, &seed, b"wrapped key", &mut block).unwrap(),
            256
        );
        assert_eq!(block[0], 0);

        let mut out = [0u8; 256];
        let len = oaep_open(&key, Digest::Sha1, 256, &block, &mut out).unwrap();
        assert_eq!(&out[..len], b"wrapped key");

        // wrong key or digest breaks the label hash check
        assert_eq!(
            oaep_open(&[5u8; 32], Digest::Sha1, 256, &block, &mut out),
            Err(TokenError::EncryptedDataInvalid)
        );
        assert!(oaep_open(&key, Digest::Sha1, 256, &block[..255], &mut out).is_err());
    }

    #[test]
    fn test_oaep_capacity_enforced() {
        let key = [4u8; 32];
        let seed = [1u8; 32];
        let mut block = [0u8; 256];
        assert!(oaep_seal(&key, Digest::Sha256, 256, &seed, &[0u8; 190], &mut block).is_ok());
        assert_eq!(
            oaep_seal(&key, Digest::Sha256, 256, &seed, &[0u8; 191], &mut block),
            Err(TokenError::DataLenRange { len: 191 })
        );
        assert!(oaep_seal(&key, Digest::Sha256, 256, &seed[..20], &[0u8; 16], &mut block).is_err());
    }
}
