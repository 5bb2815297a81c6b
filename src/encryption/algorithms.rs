//! Key derivation and password checks of the standard security handler.
//!
//! Revisions 2-4 derive the file key from the password with MD5 and RC4
//! (ISO 32000-1, 7.6.3.3, algorithms 2-7). Revisions 5 and 6 pick a random
//! file key and wrap it under a SHA-2 hash of the password (ISO 32000-2,
//! 7.6.4.3.3, algorithms 2.A, 2.B, 8-13).

use super::aes::{cbc_decrypt_no_pad, cbc_encrypt_no_pad};
use super::rc4::rc4;
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

/// Padding appended to short passwords.
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const ZERO_IV: [u8; 16] = [0; 16];

/// Pad or truncate a password to exactly 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let n = password.len().min(32);
    padded[..n].copy_from_slice(&password[..n]);
    padded[n..].copy_from_slice(&PADDING[..32 - n]);
    padded
}

/// Algorithm 2: file key from a password (revisions 2-4).
pub fn compute_file_key(
    password: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    document_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let n = key_length.clamp(5, 16);
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(owner_hash);
    hasher.update(permissions.to_le_bytes());
    hasher.update(document_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
    let mut hash = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..n]).to_vec();
        }
    }
    hash.truncate(if revision == 2 { 5 } else { n });
    hash
}

/// RC4 with each key byte XORed by `round`, for the 19 extra rounds of
/// algorithms 3, 5 and 7.
fn rc4_round(key: &[u8], round: u8, data: &[u8]) -> Vec<u8> {
    let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
    rc4(&round_key, data)
}

/// Algorithms 4 and 5: the `/U` value for a file key.
///
/// Revision 2 yields 32 meaningful bytes; revision 3 and later only the first
/// 16 count and the rest is zero filled.
pub fn compute_user_hash(file_key: &[u8], document_id: &[u8], revision: u32) -> Vec<u8> {
    if revision == 2 {
        return rc4(file_key, &PADDING);
    }
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(document_id);
    let mut hash = rc4(file_key, &hasher.finalize());
    for round in 1..=19u8 {
        hash = rc4_round(file_key, round, &hash);
    }
    hash.resize(32, 0);
    hash
}

/// RC4 key derived from the owner password (algorithm 3, steps a-d).
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let n = if revision == 2 { 5 } else { key_length.clamp(5, 16) };
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    hash.truncate(n);
    hash
}

/// Algorithm 3: the `/O` value. An empty owner password falls back to the user password.
pub fn compute_owner_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let owner = if owner_password.is_empty() { user_password } else { owner_password };
    let key = owner_rc4_key(owner, revision, key_length);
    let mut hash = rc4(&key, &pad_password(user_password));
    if revision >= 3 {
        for round in 1..=19u8 {
            hash = rc4_round(&key, round, &hash);
        }
    }
    hash
}

/// Algorithm 6: check a user password, returning the file key on success.
#[allow(clippy::too_many_arguments)]
pub fn check_user_password(
    password: &[u8],
    user_hash: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    document_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = compute_file_key(
        password,
        owner_hash,
        permissions,
        document_id,
        revision,
        key_length,
        encrypt_metadata,
    );
    let expected = compute_user_hash(&key, document_id, revision);
    let significant = if revision == 2 { 32 } else { 16 };
    if user_hash.len() < significant {
        return None;
    }
    constant_time_eq(&user_hash[..significant], &expected[..significant]).then_some(key)
}

/// Algorithm 7: check an owner password by recovering the user password from `/O`.
#[allow(clippy::too_many_arguments)]
pub fn check_owner_password(
    password: &[u8],
    user_hash: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    document_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, revision, key_length);
    let mut user_password = owner_hash.to_vec();
    if revision == 2 {
        user_password = rc4(&key, &user_password);
    } else {
        for round in (0..=19u8).rev() {
            user_password = rc4_round(&key, round, &user_password);
        }
    }
    check_user_password(
        &user_password,
        user_hash,
        owner_hash,
        permissions,
        document_id,
        revision,
        key_length,
        encrypt_metadata,
    )
}

/// Algorithm 1: key for one object.
///
/// Revision 5 and later use the file key unchanged.
pub fn object_key(file_key: &[u8], obj: u32, gen: u16, aes: bool, revision: u32) -> Vec<u8> {
    if revision >= 5 {
        return file_key.to_vec();
    }
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&obj.to_le_bytes()[..3]);
    hasher.update(gen.to_le_bytes());
    if aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

/// Passwords for revision 5/6 are UTF-8 limited to 127 bytes.
pub fn truncate_password(password: &[u8]) -> &[u8] {
    if password.len() <= 127 {
        return password;
    }
    let mut end = 127;
    // Step back so a multi-byte sequence is not split.
    while end > 0 && (password[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    &password[..end]
}

/// Algorithm 2.A/2.B password hash. `udata` is the 48-byte `/U` for owner
/// checks and empty for user checks.
pub fn hash_v5(password: &[u8], salt: &[u8], udata: &[u8], revision: u32) -> [u8; 32] {
    let password = truncate_password(password);
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(udata);
    let mut k: Vec<u8> = hasher.finalize().to_vec();

    if revision >= 6 {
        let mut round = 0usize;
        loop {
            let mut k1 = Vec::with_capacity(64 * (password.len() + k.len() + udata.len()));
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                k1.extend_from_slice(udata);
            }
            // k1 is a multiple of 64 bytes long, so this cannot fail.
            let e = match cbc_encrypt_no_pad(&k[..16], &k[16..32], &k1) {
                Ok(e) => e,
                Err(_) => break,
            };
            let selector: u32 = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };
            round += 1;
            let last = e.last().copied().unwrap_or(0) as usize;
            if round >= 64 && last + 32 <= round {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

/// Algorithm 8: `/U` (hash, validation salt, key salt) and `/UE`.
pub fn compute_user_entries_v5(
    password: &[u8],
    file_key: &[u8],
    revision: u32,
) -> crate::error::Result<(Vec<u8>, Vec<u8>)> {
    let salts = random_bytes(16);
    let (validation_salt, key_salt) = salts.split_at(8);
    let mut u = hash_v5(password, validation_salt, &[], revision).to_vec();
    u.extend_from_slice(validation_salt);
    u.extend_from_slice(key_salt);
    let intermediate = hash_v5(password, key_salt, &[], revision);
    let ue = cbc_encrypt_no_pad(&intermediate, &ZERO_IV, file_key)?;
    Ok((u, ue))
}

/// Algorithm 9: `/O` and `/OE`; needs the finished 48-byte `/U`.
pub fn compute_owner_entries_v5(
    password: &[u8],
    file_key: &[u8],
    user_hash: &[u8],
    revision: u32,
) -> crate::error::Result<(Vec<u8>, Vec<u8>)> {
    let salts = random_bytes(16);
    let (validation_salt, key_salt) = salts.split_at(8);
    let mut o = hash_v5(password, validation_salt, user_hash, revision).to_vec();
    o.extend_from_slice(validation_salt);
    o.extend_from_slice(key_salt);
    let intermediate = hash_v5(password, key_salt, user_hash, revision);
    let oe = cbc_encrypt_no_pad(&intermediate, &ZERO_IV, file_key)?;
    Ok((o, oe))
}

/// Algorithm 11 + 2.A: user password check for revision 5/6, returning the file key.
pub fn check_user_password_v5(password: &[u8], u: &[u8], ue: &[u8], revision: u32) -> Option<Vec<u8>> {
    if u.len() < 48 || ue.len() < 32 {
        return None;
    }
    let hash = hash_v5(password, &u[32..40], &[], revision);
    if !constant_time_eq(&hash, &u[..32]) {
        return None;
    }
    let intermediate = hash_v5(password, &u[40..48], &[], revision);
    cbc_decrypt_no_pad(&intermediate, &ZERO_IV, &ue[..32]).ok()
}

/// Algorithm 12 + 2.A: owner password check for revision 5/6, returning the file key.
pub fn check_owner_password_v5(
    password: &[u8],
    o: &[u8],
    oe: &[u8],
    u: &[u8],
    revision: u32,
) -> Option<Vec<u8>> {
    if o.len() < 48 || oe.len() < 32 || u.len() < 48 {
        return None;
    }
    let udata = &u[..48];
    let hash = hash_v5(password, &o[32..40], udata, revision);
    if !constant_time_eq(&hash, &o[..32]) {
        return None;
    }
    let intermediate = hash_v5(password, &o[40..48], udata, revision);
    cbc_decrypt_no_pad(&intermediate, &ZERO_IV, &oe[..32]).ok()
}

/// Algorithm 10: the `/Perms` block.
pub fn compute_perms(permissions: i32, encrypt_metadata: bool, file_key: &[u8]) -> crate::error::Result<Vec<u8>> {
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&permissions.to_le_bytes());
    block[4..8].copy_from_slice(&[0xFF; 4]);
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    block[12..].copy_from_slice(&random_bytes(4));
    cbc_encrypt_no_pad(file_key, &ZERO_IV, &block)
}

/// Algorithm 13: whether `/Perms` decrypts to the declared permissions.
pub fn verify_perms(perms: &[u8], file_key: &[u8], permissions: i32) -> bool {
    if perms.len() < 16 {
        return false;
    }
    match cbc_decrypt_no_pad(file_key, &ZERO_IV, &perms[..16]) {
        Ok(block) => &block[9..12] == b"adb" && block[..4] == permissions.to_le_bytes(),
        Err(_) => false,
    }
}

/// `n` random bytes.
///
/// Version 4 UUIDs come from the operating system's random source; six bits
/// of each are fixed, so every UUID is folded through SHA-256 first.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let mut hasher = Sha256::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let block = hasher.finalize();
        let take = (n - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
    }
    out
}

/// Compare without an early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
