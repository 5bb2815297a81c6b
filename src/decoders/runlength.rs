//! RunLengthDecode implementation.
//!
//! Decodes run-length encoded data according to PDF specification:
//! - Length byte 0-127: Copy next N+1 bytes literally
//! - Length byte 128: EOD marker
//! - Length byte 129-255: Repeat next byte 257-N times
//!
//! Truncated input yields the bytes decoded so far, including a short final
//! literal run.

/// Decode run-length data.
pub fn decode(input: &[u8], limit: usize) -> Vec<u8> {
    let mut output = Vec::new();
    let mut i = 0;

    while i < input.len() && output.len() < limit {
        let length = input[i];
        i += 1;

        match length {
            0..=127 => {
                let count = length as usize + 1;
                let available = count.min(input.len() - i);
                if available < count {
                    log::warn!(
                        "RunLengthDecode: literal run truncated (need {}, have {})",
                        count,
                        available
                    );
                }
                output.extend_from_slice(&input[i..i + available]);
                i += available;
            },
            128 => break,
            129..=255 => {
                let count = 257 - length as usize;
                let Some(&byte) = input.get(i) else {
                    log::warn!("RunLengthDecode: missing byte for run");
                    break;
                };
                i += 1;
                output.resize(output.len() + count, byte);
            },
        }
    }

    output.truncate(limit);
    output
}

/// Encode with runs of 2..=128 repeated bytes and literal runs of up to 128 bytes.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 128 + 2);
    let mut literal_start = 0;
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        let mut run = 1;
        while i + run < input.len() && input[i + run] == byte && run < 128 {
            run += 1;
        }

        if run >= 2 {
            flush_literal(&mut output, &input[literal_start..i]);
            output.push((257 - run) as u8);
            output.push(byte);
            i += run;
            literal_start = i;
        } else {
            i += 1;
        }
    }

    flush_literal(&mut output, &input[literal_start..]);
    output.push(128);
    output
}

fn flush_literal(output: &mut Vec<u8>, literal: &[u8]) {
    for chunk in literal.chunks(128) {
        output.push((chunk.len() - 1) as u8);
        output.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_literal() {
        assert_eq!(decode(&[4, b'H', b'e', b'l', b'l', b'o'], usize::MAX), b"Hello");
    }

    #[test]
    fn test_decode_run() {
        assert_eq!(decode(&[252, b'A'], usize::MAX), b"AAAAA");
    }

    #[test]
    fn test_decode_mixed() {
        assert_eq!(decode(&[1, b'H', b'i', 254, b'X'], usize::MAX), b"HiXXX");
    }

    #[test]
    fn test_decode_eod_marker() {
        assert_eq!(decode(&[1, b'H', b'i', 128, 99, 99, 99], usize::MAX), b"Hi");
    }

    #[test]
    fn test_decode_max_runs() {
        let mut input = vec![127];
        input.extend_from_slice(&[b'A'; 128]);
        assert_eq!(decode(&input, usize::MAX), vec![b'A'; 128]);
        assert_eq!(decode(&[129, b'B'], usize::MAX), vec![b'B'; 128]);
    }

    #[test]
    fn test_decode_truncated_literal_is_partial() {
        assert_eq!(decode(&[4, b'A', b'B', b'C'], usize::MAX), b"ABC");
    }

    #[test]
    fn test_decode_missing_run_byte_is_partial() {
        assert_eq!(decode(&[1, b'O', b'K', 252], usize::MAX), b"OK");
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(b"AAAB"), vec![254, b'A', 0, b'B', 128]);
        assert_eq!(encode(b""), vec![128]);
    }

    #[test]
    fn test_encode_long_inputs() {
        let mut data = vec![7u8; 300];
        data.extend((0..=255u8).cycle().take(400));
        assert_eq!(decode(&encode(&data), usize::MAX), data);
    }
}
