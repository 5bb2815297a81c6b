//! FlateDecode (zlib/deflate) implementation.
//!
//! The most common PDF compression filter and the one almost every object
//! stream and cross-reference stream uses. Uses the flate2 crate.

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Inflate zlib data, recovering as much as possible from damaged input.
pub fn decode(input: &[u8], limit: usize) -> Vec<u8> {
    let mut output = Vec::new();
    let cap = limit.saturating_add(1) as u64;

    match ZlibDecoder::new(input).take(cap).read_to_end(&mut output) {
        Ok(_) => return clamp(output, limit),
        Err(e) if !output.is_empty() => {
            log::warn!(
                "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                output.len(),
                e
            );
            return clamp(output, limit);
        },
        Err(e) => log::info!("Zlib decode failed ({}), trying raw deflate", e),
    }

    // Some writers omit or damage the two-byte zlib header.
    for skip in [0usize, 2] {
        if input.len() <= skip {
            break;
        }
        output.clear();
        let result = DeflateDecoder::new(&input[skip..])
            .take(cap)
            .read_to_end(&mut output);
        if result.is_ok() || !output.is_empty() {
            log::info!("Raw deflate recovery (skip {}) produced {} bytes", skip, output.len());
            return clamp(output, limit);
        }
    }

    log::warn!("FlateDecode: no data could be recovered from {} bytes", input.len());
    Vec::new()
}

fn clamp(mut output: Vec<u8>, limit: usize) -> Vec<u8> {
    if output.len() > limit {
        log::warn!("FlateDecode: output exceeds {} bytes, truncating", limit);
        output.truncate(limit);
    }
    output
}

/// Deflate with a zlib wrapper.
pub fn encode(input: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET".repeat(20);
        let encoded = encode(&data).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(decode(&encoded, usize::MAX), data);
    }

    #[test]
    fn test_truncated_input_recovers_prefix() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let encoded = encode(&data).unwrap();
        let truncated = &encoded[..encoded.len() / 2];
        let decoded = decode(truncated, usize::MAX);
        assert!(data.starts_with(&decoded));
    }

    #[test]
    fn test_raw_deflate_without_header() {
        let data = b"raw deflate payload".repeat(8);
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).unwrap();
        let raw = encoder.finish().unwrap();
        assert_eq!(decode(&raw, usize::MAX), data);
    }

    #[test]
    fn test_limit_truncates() {
        let data = vec![0u8; 10_000];
        let encoded = encode(&data).unwrap();
        assert_eq!(decode(&encoded, 100).len(), 100);
    }

    #[test]
    fn test_garbage_yields_empty() {
        assert!(decode(&[0xFF, 0xFF, 0xFF], usize::MAX).is_empty());
    }
}
