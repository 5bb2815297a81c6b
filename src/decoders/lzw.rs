//! LZWDecode implementation for PDF.
//!
//! Decompresses data using the Lempel-Ziv-Welch (LZW) algorithm as specified
//! in the PDF Reference (Section 7.4.4).
//!
//! PDF's LZW implementation:
//! - Uses MSB-first bit ordering
//! - Starts with 9-bit codes and grows to at most 12 bits
//! - With EarlyChange=1 (the default) the code width grows one code earlier
//!   than in GIF, which is the TIFF convention
//! - Clear code is 256, EOD code is 257
//! - First available code is 258
//!
//! Decoding and encoding go through `weezl`. Streams it rejects (an invalid
//! code, or data ending before EOD) are decoded again by a tolerant decoder
//! that returns the bytes produced before the damage.

use weezl::{decode::Decoder, encode::Encoder, BitOrder, LzwStatus};

use crate::error::{Error, Result};

const CLEAR_CODE: u16 = 256;
const EOD_CODE: u16 = 257;
const FIRST_CODE: u16 = 258;
const TABLE_SIZE: u16 = 4096;

/// Literal code size: codes 0-255 are single bytes.
const MIN_CODE_SIZE: u8 = 8;

const CHUNK_SIZE: usize = 1 << 12;

/// Code width for a table whose next free code is `next`.
fn code_width(next: u16, early_change: bool) -> u8 {
    match next + early_change as u16 {
        0..=511 => 9,
        512..=1023 => 10,
        1024..=2047 => 11,
        _ => 12,
    }
}

/// Decompress LZW data, stopping at EOD, at the end of input, after `limit`
/// bytes, or at the first invalid code.
pub fn decode(input: &[u8], early_change: bool, limit: usize) -> Vec<u8> {
    match decode_weezl(input, early_change, limit) {
        Ok(output) => output,
        Err(e) => {
            log::warn!("{}, falling back to tolerant decoder", e);
            decode_tolerant(input, early_change, limit)
        },
    }
}

/// Decode with weezl, in chunks so that no more than `limit` bytes are produced.
fn decode_weezl(input: &[u8], early_change: bool, limit: usize) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, MIN_CODE_SIZE)
    } else {
        Decoder::new(BitOrder::Msb, MIN_CODE_SIZE)
    };
    let mut output = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut data = input;

    while output.len() < limit {
        let want = CHUNK_SIZE.min(limit - output.len());
        let result = decoder.decode_bytes(data, &mut chunk[..want]);
        data = &data[result.consumed_in..];
        output.extend_from_slice(&chunk[..result.consumed_out]);

        match result.status {
            Ok(LzwStatus::Ok) => {},
            Ok(LzwStatus::Done) => break,
            Ok(LzwStatus::NoProgress) => {
                return Err(Error::Decode(format!(
                    "LZWDecode: data ends without EOD after {} bytes",
                    output.len()
                )))
            },
            Err(e) => return Err(Error::Decode(format!("LZWDecode: {}", e))),
        }
    }

    Ok(output)
}

/// Table-driven decoder that keeps everything decoded before an invalid code
/// or the end of the data.
fn decode_tolerant(input: &[u8], early_change: bool, limit: usize) -> Vec<u8> {
    let mut output = Vec::new();
    let mut table = init_table();
    let mut reader = BitReader::new(input);
    let mut prev: Option<u16> = None;

    while output.len() < limit {
        let width = code_width(table.len() as u16, early_change);
        let Some(code) = reader.read_bits(width) else {
            break;
        };
        let code = code as u16;

        match code {
            EOD_CODE => break,
            CLEAR_CODE => {
                table.truncate(FIRST_CODE as usize);
                prev = None;
                continue;
            },
            _ => {},
        }

        let next = table.len() as u16;
        let entry = if code < next && !table[code as usize].is_empty() {
            table[code as usize].clone()
        } else if code == next {
            // KwKwK: the code being defined by this very step.
            match prev {
                Some(p) => {
                    let mut s = table[p as usize].clone();
                    s.push(s[0]);
                    s
                },
                None => {
                    log::warn!("LZWDecode: code {} before any string, truncating", code);
                    break;
                },
            }
        } else {
            log::warn!(
                "LZWDecode: invalid code {} (next {}), keeping {} decoded bytes",
                code,
                next,
                output.len()
            );
            break;
        };

        output.extend_from_slice(&entry);

        if let Some(p) = prev {
            if next < TABLE_SIZE {
                let mut s = table[p as usize].clone();
                s.push(entry[0]);
                table.push(s);
            }
        }
        prev = Some(code);
    }

    output.truncate(limit);
    output
}

/// Table holding the 256 single-byte strings plus empty slots for the two
/// control codes.
fn init_table() -> Vec<Vec<u8>> {
    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());
    table
}

/// Compress data with LZW.
///
/// The output starts with a clear code, resets the table before it
/// overflows, and ends with EOD. It decodes with the same `early_change`
/// setting.
pub fn encode(input: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut encoder = if early_change {
        Encoder::with_tiff_size_switch(BitOrder::Msb, MIN_CODE_SIZE)
    } else {
        Encoder::new(BitOrder::Msb, MIN_CODE_SIZE)
    };
    encoder
        .encode(input)
        .map_err(|e| Error::Decode(format!("LZW encoding failed: {}", e)))
}

/// Bit reader for MSB-first bit ordering.
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8, // 0-7, position within current byte (0 = MSB)
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read_bits(&mut self, n: u8) -> Option<u32> {
        let mut result = 0u32;
        for _ in 0..n {
            let byte = *self.data.get(self.byte_pos)?;
            let bit = (byte >> (7 - self.bit_pos)) & 1;
            result = (result << 1) | bit as u32;
            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }
        Some(result)
    }
}
