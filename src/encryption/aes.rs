//! AES-CBC for the AESV2 (128-bit) and AESV3 (256-bit) crypt filters.
//!
//! Encrypted strings and streams are `IV || ciphertext` with PKCS#7 padding.
//! The password algorithms of revision 5/6 also need raw CBC without padding
//! under an explicit IV, which is exposed separately.

use super::algorithms::random_bytes;
use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK: usize = 16;

/// Encrypt block-aligned `data` in place.
fn encrypt_blocks(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let len = data.len();
    let res = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|e| Error::Encryption(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(data, len)
            .map(|_| ()),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| Error::Encryption(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(data, len)
            .map(|_| ()),
        n => return Err(Error::Encryption(format!("AES key must be 16 or 32 bytes, got {}", n))),
    };
    res.map_err(|_| Error::Encryption("data is not block aligned".to_string()))
}

/// Decrypt block-aligned `data` in place.
fn decrypt_blocks(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let res = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| Error::Encryption(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map(|_| ()),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| Error::Encryption(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map(|_| ()),
        n => return Err(Error::Encryption(format!("AES key must be 16 or 32 bytes, got {}", n))),
    };
    res.map_err(|_| Error::Encryption("data is not block aligned".to_string()))
}

/// Encrypt with a fresh random IV, returning `IV || ciphertext`.
pub fn cbc_encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv = random_bytes(BLOCK);
    encrypt_with_iv(key, &iv, data)
}

/// Encrypt with a given IV (PKCS#7 padded), returning `IV || ciphertext`.
pub fn encrypt_with_iv(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let pad = BLOCK - data.len() % BLOCK;
    let mut buf = Vec::with_capacity(BLOCK + data.len() + pad);
    buf.extend_from_slice(iv);
    buf.extend_from_slice(data);
    buf.resize(BLOCK + data.len() + pad, pad as u8);
    encrypt_blocks(key, iv, &mut buf[BLOCK..])?;
    Ok(buf)
}

/// Decrypt `IV || ciphertext`.
///
/// Real files carry damaged AES payloads often enough that this never fails:
/// input shorter than one block yields nothing, a trailing partial block is
/// dropped, and padding that does not check out is left in place.
pub fn cbc_decrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    if data.len() < 2 * BLOCK {
        if !data.is_empty() {
            log::warn!("AES payload of {} bytes has no ciphertext block", data.len());
        }
        return Vec::new();
    }
    let (iv, rest) = data.split_at(BLOCK);
    let aligned = rest.len() - rest.len() % BLOCK;
    if aligned != rest.len() {
        log::warn!("AES payload not block aligned, dropping {} bytes", rest.len() - aligned);
    }

    let mut buf = rest[..aligned].to_vec();
    if let Err(e) = decrypt_blocks(key, iv, &mut buf) {
        log::warn!("AES decryption failed: {}", e);
        return Vec::new();
    }

    let pad = buf.last().copied().unwrap_or(0) as usize;
    if (1..=BLOCK).contains(&pad) && buf[buf.len() - pad..].iter().all(|&b| b as usize == pad) {
        buf.truncate(buf.len() - pad);
    } else {
        log::debug!("AES payload has invalid PKCS#7 padding, keeping it");
    }
    buf
}

/// Raw CBC encryption of block-aligned data under an explicit IV.
pub fn cbc_encrypt_no_pad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    encrypt_blocks(key, iv, &mut buf)?;
    Ok(buf)
}

/// Raw CBC decryption of block-aligned data under an explicit IV.
pub fn cbc_decrypt_no_pad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    decrypt_blocks(key, iv, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY128: &[u8; 16] = b"0123456789abcdef";
    const KEY256: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_fips197_single_block() {
        // FIPS-197 C.1: one block under a zero IV is plain AES-128.
        let key: Vec<u8> = (0u8..16).collect();
        let plain = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
            0xff,
        ];
        let expected = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4, 0xc5,
            0x5a,
        ];
        let out = cbc_encrypt_no_pad(&key, &[0u8; 16], &plain).unwrap();
        assert_eq!(out, expected);
        assert_eq!(cbc_decrypt_no_pad(&key, &[0u8; 16], &out).unwrap(), plain);
    }

    #[test]
    fn test_round_trip_both_key_sizes() {
        for key in [&KEY128[..], &KEY256[..]] {
            for len in [0usize, 1, 15, 16, 17, 100] {
                let plain: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let enc = cbc_encrypt(key, &plain).unwrap();
                assert_eq!(enc.len(), 16 + (len / 16 + 1) * 16);
                assert_eq!(cbc_decrypt(key, &enc), plain);
            }
        }
    }

    #[test]
    fn test_random_iv_differs() {
        let a = cbc_encrypt(KEY128, b"same plaintext").unwrap();
        let b = cbc_encrypt(KEY128, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let iv = [7u8; 16];
        let a = encrypt_with_iv(KEY128, &iv, b"hello").unwrap();
        assert_eq!(&a[..16], &iv);
        assert_eq!(a, encrypt_with_iv(KEY128, &iv, b"hello").unwrap());
    }

    #[test]
    fn test_bad_key_length() {
        assert!(cbc_encrypt(b"short", b"data").is_err());
        assert!(cbc_decrypt(b"short", &[0u8; 32]).is_empty());
    }

    #[test]
    fn test_lenient_decrypt() {
        assert!(cbc_decrypt(KEY128, &[1, 2, 3]).is_empty());

        let mut enc = cbc_encrypt(KEY128, b"0123456789abcdefXYZ").unwrap();
        enc.push(0xAA);
        assert_eq!(cbc_decrypt(KEY128, &enc), b"0123456789abcdefXYZ");
    }

    #[test]
    fn test_wrong_key_keeps_garbage() {
        let enc = cbc_encrypt(KEY128, b"secret").unwrap();
        let out = cbc_decrypt(b"fedcba9876543210", &enc);
        assert_ne!(out, b"secret");
    }
}
