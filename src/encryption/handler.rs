//! The security handler object: key state, password checks and per-object
//! encryption of strings and streams.

use super::algorithms::{self, random_bytes};
use super::{aes, rc4};
use super::{Algorithm, CryptMethod, EncryptDict, EncryptionPolicy, Permissions};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, PdfString};

/// Lifecycle of a [`SecurityHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Built from a policy; holds its key and can encrypt for saving
    Ready,
    /// Read from a file; no password tried yet
    Parsed,
    /// A password was accepted and the file key is known
    Unlocked,
    /// Every password tried so far was rejected
    Locked,
}

/// Which crypt filter applies to a piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// String objects (`/StrF`)
    String,
    /// Stream bodies (`/StmF`)
    Stream,
}

/// Standard security handler for one document.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    dict: EncryptDict,
    algorithm: Algorithm,
    document_id: Vec<u8>,
    file_key: Option<Vec<u8>>,
    state: HandlerState,
}

impl SecurityHandler {
    /// Build a handler for saving with `policy`.
    ///
    /// A fresh 16-byte document ID is generated; it becomes the first `/ID`
    /// element of the saved file, so encrypting a document changes its identity.
    pub fn from_policy(policy: &EncryptionPolicy) -> Result<Self> {
        let algorithm = policy.algorithm;
        let version = algorithm.version();
        let revision = algorithm.revision();
        let key_length = algorithm.key_length();
        let document_id = random_bytes(16);
        let permissions = policy.permissions.to_p_value();
        // /EncryptMetadata is only written from R4 on.
        let encrypt_metadata = policy.encrypt_metadata || revision < 4;

        let owner_password = if policy.owner_password.is_empty() {
            &policy.user_password
        } else {
            &policy.owner_password
        };

        let mut dict = EncryptDict {
            version,
            revision,
            key_length,
            owner_hash: Vec::new(),
            user_hash: Vec::new(),
            owner_key: None,
            user_key: None,
            perms: None,
            permissions,
            encrypt_metadata,
            stream_method: algorithm.method(),
            string_method: algorithm.method(),
        };

        let file_key = if revision >= 5 {
            let file_key = random_bytes(32);
            let (u, ue) =
                algorithms::compute_user_entries_v5(&policy.user_password, &file_key, revision)?;
            let (o, oe) = algorithms::compute_owner_entries_v5(owner_password, &file_key, &u, revision)?;
            dict.perms = Some(algorithms::compute_perms(permissions, encrypt_metadata, &file_key)?);
            dict.user_hash = u;
            dict.user_key = Some(ue);
            dict.owner_hash = o;
            dict.owner_key = Some(oe);
            file_key
        } else {
            dict.owner_hash = algorithms::compute_owner_hash(
                owner_password,
                &policy.user_password,
                revision,
                key_length,
            );
            let file_key = algorithms::compute_file_key(
                &policy.user_password,
                &dict.owner_hash,
                permissions,
                &document_id,
                revision,
                key_length,
                encrypt_metadata,
            );
            dict.user_hash = algorithms::compute_user_hash(&file_key, &document_id, revision);
            file_key
        };

        log::debug!("created {:?} security handler (V={}, R={})", algorithm, version, revision);

        Ok(Self {
            dict,
            algorithm,
            document_id,
            file_key: Some(file_key),
            state: HandlerState::Ready,
        })
    }

    /// Parse the `/Encrypt` dictionary of a file whose first `/ID` element is `document_id`.
    pub fn from_encrypt_dict(dict: &Dictionary, document_id: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_dict(dict)?;
        let algorithm = dict.algorithm();
        log::info!(
            "document is encrypted with {:?} (V={}, R={})",
            algorithm,
            dict.version,
            dict.revision
        );
        Ok(Self {
            dict,
            algorithm,
            document_id,
            file_key: None,
            state: HandlerState::Parsed,
        })
    }

    /// Try `password` as the user password, then as the owner password.
    ///
    /// On success the file key is cached and the handler is unlocked. A
    /// rejected password derives nothing; a handler that was never unlocked
    /// becomes [`HandlerState::Locked`], one that already holds a key keeps it.
    pub fn authenticate(&mut self, password: &[u8]) -> bool {
        let key = self.check_user(password).or_else(|| self.check_owner(password));
        match key {
            Some(key) => {
                if self.dict.revision >= 5 {
                    self.check_perms(&key);
                }
                self.file_key = Some(key);
                self.state = HandlerState::Unlocked;
                true
            },
            None => {
                if self.file_key.is_none() {
                    self.state = HandlerState::Locked;
                }
                false
            },
        }
    }

    fn check_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let d = &self.dict;
        if d.revision >= 5 {
            let ue = d.user_key.as_deref()?;
            return algorithms::check_user_password_v5(password, &d.user_hash, ue, d.revision);
        }
        algorithms::check_user_password(
            password,
            &d.user_hash,
            &d.owner_hash,
            d.permissions,
            &self.document_id,
            d.revision,
            d.key_length,
            d.encrypt_metadata,
        )
    }

    fn check_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let d = &self.dict;
        if d.revision >= 5 {
            let oe = d.owner_key.as_deref()?;
            return algorithms::check_owner_password_v5(
                password,
                &d.owner_hash,
                oe,
                &d.user_hash,
                d.revision,
            );
        }
        algorithms::check_owner_password(
            password,
            &d.user_hash,
            &d.owner_hash,
            d.permissions,
            &self.document_id,
            d.revision,
            d.key_length,
            d.encrypt_metadata,
        )
    }

    fn check_perms(&self, file_key: &[u8]) {
        match self.dict.perms.as_deref() {
            Some(perms) if algorithms::verify_perms(perms, file_key, self.dict.permissions) => {},
            Some(_) => log::warn!("/Perms does not match /P; using /P"),
            None => log::warn!("AES-256 encryption without /Perms"),
        }
    }

    fn method(&self, kind: DataKind) -> CryptMethod {
        match kind {
            DataKind::String => self.dict.string_method,
            DataKind::Stream => self.dict.stream_method,
        }
    }

    fn object_key(&self, obj: u32, gen: u16, method: CryptMethod) -> Result<Vec<u8>> {
        let file_key = self.file_key.as_deref().ok_or(Error::InvalidPassword)?;
        Ok(algorithms::object_key(file_key, obj, gen, method.is_aes(), self.dict.revision))
    }

    /// Decrypt the bytes of a string or stream belonging to object `obj gen`.
    ///
    /// Fails with [`Error::InvalidPassword`] until a password was accepted,
    /// unless the crypt filter for `kind` is `/Identity`.
    pub fn decrypt_bytes(&self, obj: u32, gen: u16, data: &[u8], kind: DataKind) -> Result<Vec<u8>> {
        let method = self.method(kind);
        if method == CryptMethod::Identity {
            return Ok(data.to_vec());
        }
        let key = self.object_key(obj, gen, method)?;
        Ok(match method {
            CryptMethod::Identity => data.to_vec(),
            CryptMethod::Rc4 => rc4::rc4(&key, data),
            CryptMethod::AesV2 | CryptMethod::AesV3 => aes::cbc_decrypt(&key, data),
        })
    }

    /// Encrypt the bytes of a string or stream belonging to object `obj gen`.
    ///
    /// AES output carries a random IV, so two calls give different bytes.
    pub fn encrypt_bytes(&self, obj: u32, gen: u16, data: &[u8], kind: DataKind) -> Result<Vec<u8>> {
        let method = self.method(kind);
        if method == CryptMethod::Identity {
            return Ok(data.to_vec());
        }
        let key = self.object_key(obj, gen, method)?;
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4::rc4(&key, data)),
            CryptMethod::AesV2 | CryptMethod::AesV3 => aes::cbc_encrypt(&key, data),
        }
    }

    /// Decrypt every string and stream body inside the value of object `obj gen`.
    ///
    /// Cross-reference streams are left alone, as are metadata streams when
    /// `/EncryptMetadata` is false.
    pub fn decrypt_object(&self, value: &mut Object, obj: u32, gen: u16) -> Result<()> {
        self.walk(value, obj, gen, false)
    }

    /// Encrypt every string and stream body inside the value of object `obj gen`.
    pub fn encrypt_object(&self, value: &mut Object, obj: u32, gen: u16) -> Result<()> {
        self.walk(value, obj, gen, true)
    }

    fn crypt(&self, obj: u32, gen: u16, data: &[u8], kind: DataKind, encrypt: bool) -> Result<Vec<u8>> {
        if encrypt {
            self.encrypt_bytes(obj, gen, data, kind)
        } else {
            self.decrypt_bytes(obj, gen, data, kind)
        }
    }

    fn walk(&self, value: &mut Object, obj: u32, gen: u16, encrypt: bool) -> Result<()> {
        match value {
            Object::String(s) => {
                let out = self.crypt(obj, gen, s.as_bytes(), DataKind::String, encrypt)?;
                s.set_bytes(out);
            },
            Object::Array(items) => {
                for item in items {
                    self.walk(item, obj, gen, encrypt)?;
                }
            },
            Object::Dictionary(dict) => self.walk_dict(dict, obj, gen, encrypt)?,
            Object::Stream(stream) => {
                self.walk_dict(&mut stream.dict, obj, gen, encrypt)?;
                let skip = stream.dict.is_type("XRef")
                    || (stream.dict.is_type("Metadata") && !self.dict.encrypt_metadata);
                if !skip {
                    let out = self.crypt(obj, gen, stream.raw_buffer(), DataKind::Stream, encrypt)?;
                    stream.set_raw_buffer(out);
                }
            },
            _ => {},
        }
        Ok(())
    }

    fn walk_dict(&self, dict: &mut Dictionary, obj: u32, gen: u16, encrypt: bool) -> Result<()> {
        for (_, value) in dict.iter_mut() {
            self.walk(value, obj, gen, encrypt)?;
        }
        Ok(())
    }

    /// Build the `/Encrypt` dictionary describing this handler.
    pub fn create_encrypt(&self) -> Dictionary {
        let d = &self.dict;
        let hex = |bytes: &[u8]| Object::String(PdfString::hex(bytes.to_vec()));

        let mut out = Dictionary::new();
        out.insert("Filter", Object::name("Standard"));
        out.insert("V", Object::from(d.version));
        out.insert("R", Object::from(d.revision));
        out.insert("Length", Object::from((d.key_length * 8) as i64));
        out.insert("O", hex(&d.owner_hash));
        out.insert("U", hex(&d.user_hash));
        out.insert("P", Object::from(d.permissions));

        if d.version >= 4 {
            let cfm = match self.algorithm {
                Algorithm::Aes256 => "AESV3",
                Algorithm::Aes128 => "AESV2",
                _ => "V2",
            };
            let std_cf: Dictionary = [
                ("Type", Object::name("CryptFilter")),
                ("CFM", Object::name(cfm)),
                ("AuthEvent", Object::name("DocOpen")),
                ("Length", Object::from(d.key_length as i64)),
            ]
            .into_iter()
            .collect();
            let cf: Dictionary = [("StdCF", Object::from(std_cf))].into_iter().collect();
            out.insert("CF", Object::from(cf));
            out.insert("StmF", Object::name("StdCF"));
            out.insert("StrF", Object::name("StdCF"));
            out.insert("EncryptMetadata", Object::from(d.encrypt_metadata));
        }

        if d.revision >= 5 {
            if let Some(oe) = &d.owner_key {
                out.insert("OE", hex(oe));
            }
            if let Some(ue) = &d.user_key {
                out.insert("UE", hex(ue));
            }
            if let Some(perms) = &d.perms {
                out.insert("Perms", hex(perms));
            }
        }
        out
    }

    /// First element of the file identifier.
    pub fn document_id(&self) -> &[u8] {
        &self.document_id
    }

    /// `/U`
    pub fn user_hash(&self) -> &[u8] {
        &self.dict.user_hash
    }

    /// `/O`
    pub fn owner_hash(&self) -> &[u8] {
        &self.dict.owner_hash
    }

    /// `/OE`, AES-256 only
    pub fn oe(&self) -> Option<&[u8]> {
        self.dict.owner_key.as_deref()
    }

    /// `/UE`, AES-256 only
    pub fn ue(&self) -> Option<&[u8]> {
        self.dict.user_key.as_deref()
    }

    /// `/Perms`, AES-256 only
    pub fn perms(&self) -> Option<&[u8]> {
        self.dict.perms.as_deref()
    }

    /// Granted permissions.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_p_value(self.dict.permissions)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn version(&self) -> u32 {
        self.dict.version
    }

    pub fn revision(&self) -> u32 {
        self.dict.revision
    }

    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        self.dict.key_length
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.dict.encrypt_metadata
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Whether a key is available for decryption.
    pub fn is_unlocked(&self) -> bool {
        self.file_key.is_some()
    }
}
