//! ASCII85Decode (Base85) implementation.
//!
//! Four bytes are written as five characters in the range `!` to `u`; `z`
//! stands for four zero bytes and `~>` ends the data.

/// Decode ASCII85 data, keeping whatever was decoded before a malformed group.
pub fn decode(input: &[u8], limit: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    let input = input.strip_prefix(b"<~").unwrap_or(input);

    for &byte in input {
        if output.len() >= limit {
            output.truncate(limit);
            return output;
        }
        match byte {
            b'~' => break,
            b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    match group_value(&group) {
                        Some(value) => output.extend_from_slice(&value.to_be_bytes()),
                        None => {
                            log::warn!("ASCII85Decode: group overflow, truncating output");
                            return output;
                        },
                    }
                    count = 0;
                }
            },
            _ if byte.is_ascii_whitespace() || byte == 0 => {},
            _ => {
                log::warn!(
                    "ASCII85Decode: invalid character 0x{:02x}, keeping {} decoded bytes",
                    byte,
                    output.len()
                );
                return output;
            },
        }
    }

    // A trailing partial group of n characters yields n-1 bytes.
    if count > 1 {
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        if let Some(value) = group_value(&group) {
            output.extend_from_slice(&value.to_be_bytes()[..count - 1]);
        }
    }

    output.truncate(limit);
    output
}

fn group_value(group: &[u8; 5]) -> Option<u32> {
    group
        .iter()
        .try_fold(0u32, |acc, &digit| acc.checked_mul(85)?.checked_add(digit as u32))
}

/// Encode bytes as ASCII85 terminated by `~>`.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 5 / 4 + 4);

    for chunk in input.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        if chunk.len() == 4 && value == 0 {
            output.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        output.extend_from_slice(&digits[..chunk.len() + 1]);
    }

    output.extend_from_slice(b"~>");
    output
}
