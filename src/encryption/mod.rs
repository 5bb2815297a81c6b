//! Standard security handler.
//!
//! Implements password-based document encryption as described in ISO 32000-1
//! section 7.6 and the AES-256 extension of ISO 32000-2:
//!
//! - RC4 with 40-bit keys (V1/R2) and 128-bit keys (V2/R3)
//! - AES-128 through the AESV2 crypt filter (V4/R4)
//! - AES-256 through the AESV3 crypt filter (V5/R5 written, R5 and R6 read)
//!
//! A [`SecurityHandler`] is either built from an [`EncryptionPolicy`] when a
//! document is about to be saved encrypted, or parsed from the trailer's
//! `/Encrypt` dictionary when an encrypted file is opened. A parsed handler
//! stays locked until [`SecurityHandler::authenticate`] accepts a password.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use bitflags::bitflags;

pub mod aes;
pub mod algorithms;
mod handler;
pub mod rc4;

pub use handler::{DataKind, HandlerState, SecurityHandler};

/// Encryption algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RC4, 40-bit key (V1, R2)
    Rc4_40,
    /// RC4, 128-bit key (V2, R3)
    Rc4_128,
    /// AES-128 in CBC mode (V4, R4)
    Aes128,
    /// AES-256 in CBC mode (V5, R5/R6)
    Aes256,
}

impl Algorithm {
    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// `/V` written for this algorithm.
    pub fn version(&self) -> u32 {
        match self {
            Algorithm::Rc4_40 => 1,
            Algorithm::Rc4_128 => 2,
            Algorithm::Aes128 => 4,
            Algorithm::Aes256 => 5,
        }
    }

    /// `/R` written for this algorithm.
    pub fn revision(&self) -> u32 {
        match self {
            Algorithm::Rc4_40 => 2,
            Algorithm::Rc4_128 => 3,
            Algorithm::Aes128 => 4,
            Algorithm::Aes256 => 5,
        }
    }

    /// Whether this is an AES algorithm.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }

    fn method(&self) -> CryptMethod {
        match self {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => CryptMethod::Rc4,
            Algorithm::Aes128 => CryptMethod::AesV2,
            Algorithm::Aes256 => CryptMethod::AesV3,
        }
    }
}

/// How one class of data (strings or streams) is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Stored in the clear (`/Identity` or `/CFM /None`)
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128 with a per-object key
    AesV2,
    /// AES-256 with the file key
    AesV3,
}

impl CryptMethod {
    fn from_cfm(name: &str) -> Result<Self> {
        match name {
            "None" => Ok(CryptMethod::Identity),
            "V2" => Ok(CryptMethod::Rc4),
            "AESV2" => Ok(CryptMethod::AesV2),
            "AESV3" => Ok(CryptMethod::AesV3),
            other => Err(Error::UnsupportedEncryption(format!("crypt filter method /{}", other))),
        }
    }

    /// Whether this method uses AES.
    pub fn is_aes(&self) -> bool {
        matches!(self, CryptMethod::AesV2 | CryptMethod::AesV3)
    }
}

bitflags! {
    /// User access permissions, the `/P` entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Print the document
        const PRINT = 1 << 2;
        /// Modify contents
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics
        const COPY = 1 << 4;
        /// Add or modify annotations and fill forms
        const ANNOTATE = 1 << 5;
        /// Fill existing form fields (R3+)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (R3+)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Assemble: insert, rotate, delete pages (R3+)
        const ASSEMBLE = 1 << 10;
        /// Print at full quality (R3+)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// The signed `/P` value: reserved bits 7-8 and 13-32 set, 1-2 clear.
    pub fn to_p_value(self) -> i32 {
        (0xFFFF_F0C0u32 | self.bits()) as i32
    }

    /// Permissions granted by a `/P` value.
    pub fn from_p_value(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }
}

/// What to apply when a document is saved with encryption.
#[derive(Debug, Clone)]
pub struct EncryptionPolicy {
    /// Cipher and key size; fixes `/V`, `/R` and `/Length`
    pub algorithm: Algorithm,
    /// Password that opens the document
    pub user_password: Vec<u8>,
    /// Password that grants full access; empty means the user password
    pub owner_password: Vec<u8>,
    /// Operations allowed to a user-password reader
    pub permissions: Permissions,
    /// Whether XMP metadata streams are encrypted (R4+)
    pub encrypt_metadata: bool,
}

impl EncryptionPolicy {
    /// Policy granting every permission and encrypting metadata.
    pub fn new(algorithm: Algorithm, user_password: &str, owner_password: &str) -> Self {
        Self {
            algorithm,
            user_password: user_password.as_bytes().to_vec(),
            owner_password: owner_password.as_bytes().to_vec(),
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    /// Restrict the permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Parsed `/Encrypt` dictionary of the standard handler.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// `/V`
    pub version: u32,
    /// `/R`
    pub revision: u32,
    /// Key length in bytes
    pub key_length: usize,
    /// `/O`: 32 bytes, 48 for R5/R6
    pub owner_hash: Vec<u8>,
    /// `/U`: 32 bytes, 48 for R5/R6
    pub user_hash: Vec<u8>,
    /// `/OE` (R5/R6)
    pub owner_key: Option<Vec<u8>>,
    /// `/UE` (R5/R6)
    pub user_key: Option<Vec<u8>>,
    /// `/Perms` (R5/R6)
    pub perms: Option<Vec<u8>>,
    /// `/P`
    pub permissions: i32,
    /// `/EncryptMetadata`, true when absent
    pub encrypt_metadata: bool,
    /// Method applied to streams
    pub stream_method: CryptMethod,
    /// Method applied to strings
    pub string_method: CryptMethod,
}

impl EncryptDict {
    /// Parse the standard handler's entries.
    ///
    /// Anything other than `/Filter /Standard` with a known `/V`/`/R` pair is
    /// reported as [`Error::UnsupportedEncryption`].
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        match dict.get_name("Filter") {
            Some("Standard") => {},
            Some(other) => {
                return Err(Error::UnsupportedEncryption(format!("security handler /{}", other)));
            },
            None => return Err(Error::InvalidPdf("Encrypt dictionary missing /Filter".to_string())),
        }

        let version = dict.get_integer("V").unwrap_or(0) as u32;
        let revision = dict
            .get_integer("R")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /R".to_string()))?
            as u32;
        let string_entry = |key: &str| dict.get(key).and_then(|o| o.as_string()).map(|s| s.to_vec());
        let owner_hash = string_entry("O")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /O".to_string()))?;
        let user_hash = string_entry("U")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /U".to_string()))?;
        let permissions = dict
            .get_integer("P")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /P".to_string()))?
            as i32;
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let (key_length, stream_method, string_method) = match (version, revision) {
            (0 | 1, 2) => (5, CryptMethod::Rc4, CryptMethod::Rc4),
            (2, 2..=3) | (3, 3) => {
                let bits = dict.get_integer("Length").unwrap_or(40);
                let bytes = (bits / 8).clamp(5, 16) as usize;
                (bytes, CryptMethod::Rc4, CryptMethod::Rc4)
            },
            (4, 4) => {
                let stream = Self::crypt_filter(dict, "StmF")?;
                let string = Self::crypt_filter(dict, "StrF")?;
                (16, stream, string)
            },
            (5, 5 | 6) => {
                let stream = Self::crypt_filter(dict, "StmF")?;
                let string = Self::crypt_filter(dict, "StrF")?;
                (32, stream, string)
            },
            (v, r) => {
                return Err(Error::UnsupportedEncryption(format!("V={} R={}", v, r)));
            },
        };

        Ok(Self {
            version,
            revision,
            key_length,
            owner_hash,
            user_hash,
            owner_key: string_entry("OE"),
            user_key: string_entry("UE"),
            perms: string_entry("Perms"),
            permissions,
            encrypt_metadata,
            stream_method,
            string_method,
        })
    }

    /// Method named by `/StmF` or `/StrF`, looked up in `/CF`.
    fn crypt_filter(dict: &Dictionary, key: &str) -> Result<CryptMethod> {
        let name = dict.get_name(key).unwrap_or("Identity");
        if name == "Identity" {
            return Ok(CryptMethod::Identity);
        }
        let cfm = dict
            .get("CF")
            .and_then(|cf| cf.get(name))
            .and_then(|filter| filter.get("CFM"))
            .and_then(Object::as_name)
            .unwrap_or("None");
        CryptMethod::from_cfm(cfm)
    }

    /// Algorithm family, judged by how streams are encrypted.
    pub fn algorithm(&self) -> Algorithm {
        match self.stream_method {
            CryptMethod::AesV3 => Algorithm::Aes256,
            CryptMethod::AesV2 => Algorithm::Aes128,
            _ if self.version == 5 => Algorithm::Aes256,
            _ if self.key_length <= 5 => Algorithm::Rc4_40,
            _ => Algorithm::Rc4_128,
        }
    }
}
