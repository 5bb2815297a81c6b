//! ASCIIHexDecode implementation.
//!
//! Each pair of hex digits is one byte, whitespace is ignored and `>` ends the
//! data. A final lone digit is treated as if followed by `0`.

/// Decode hex-encoded data, stopping at `>` or at the first invalid character.
pub fn decode(input: &[u8], limit: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in input {
        if output.len() >= limit {
            break;
        }
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b'>' => break,
            _ if byte.is_ascii_whitespace() || byte == 0 => continue,
            _ => {
                log::warn!(
                    "ASCIIHexDecode: invalid character 0x{:02x}, keeping {} decoded bytes",
                    byte,
                    output.len()
                );
                break;
            },
        };
        match high.take() {
            Some(h) => output.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }

    if let Some(h) = high {
        if output.len() < limit {
            output.push(h << 4);
        }
    }

    output
}

/// Encode bytes as uppercase hex terminated by `>`.
pub fn encode(input: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut output = Vec::with_capacity(input.len() * 2 + input.len() / 32 + 1);
    for (i, &byte) in input.iter().enumerate() {
        if i > 0 && i % 32 == 0 {
            output.push(b'\n');
        }
        output.push(DIGITS[(byte >> 4) as usize]);
        output.push(DIGITS[(byte & 0x0F) as usize]);
    }
    output.push(b'>');
    output
}
