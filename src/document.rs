//! PDF document session.
//!
//! A [`PdfDocument`] owns the file bytes and the [`XRef`] resolved from
//! them. It is the unit of locking: every read goes through `&mut self`
//! because resolution fills the object cache.

use crate::encryption::{EncryptionPolicy, Permissions};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef, Stream};
use crate::parser_config::ParserOptions;
use crate::writer::write_document;
use crate::xref::XRef;
use bytes::Bytes;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// How far into the file the `%PDF-` header may start in lenient mode.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// An open document.
///
/// An encrypted document whose password is unknown still opens; it is
/// locked until [`PdfDocument::check_password`] accepts a password, and
/// reading a string or stream fails with [`Error::InvalidPassword`] until
/// then.
///
/// # Example
///
/// ```no_run
/// use pdf_objstore::document::PdfDocument;
///
/// let mut doc = PdfDocument::open("sample.pdf")?;
/// if doc.is_locked() && !doc.check_password("secret") {
///     eprintln!("wrong password");
/// }
/// let catalog = doc.catalog()?;
/// # Ok::<(), pdf_objstore::error::Error>(())
/// ```
pub struct PdfDocument {
    /// PDF version (major, minor) from the header
    version: (u8, u8),
    xref: XRef,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("xref_entries", &self.xref.len())
            .field("encrypted", &self.xref.is_encrypted())
            .field("locked", &self.xref.is_locked())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a PDF document from a file path with lenient options.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The header is not `%PDF-M.m`
    /// - The cross-reference data is unusable and cannot be reconstructed
    /// - The trailer names no catalog (`Error::MissingCatalog`)
    /// - The encryption scheme is not supported
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// [`PdfDocument::open`] with explicit parser options.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        log::debug!("read {} bytes from {}", data.len(), path.as_ref().display());
        Self::from_bytes_with_options(data, options)
    }

    /// Open a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParserOptions::default())
    }

    /// [`PdfDocument::from_bytes`] with explicit parser options.
    pub fn from_bytes_with_options(data: impl Into<Bytes>, options: ParserOptions) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data, &options)?;
        let mut xref = XRef::load(data, options)?;

        // Most encrypted files only have an owner password.
        if xref.is_encrypted() && !xref.authenticate(b"") {
            log::info!("document is encrypted and needs a password");
        }

        let mut doc = Self { version, xref };
        doc.check_catalog()?;
        Ok(doc)
    }

    /// A missing catalog is fatal; a locked one is checked once unlocked.
    fn check_catalog(&mut self) -> Result<()> {
        match self.catalog() {
            Ok(_) => Ok(()),
            Err(Error::InvalidPassword) => {
                log::debug!("catalog cannot be read before a password is accepted");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn is_encrypted(&self) -> bool {
        self.xref.is_encrypted()
    }

    /// Whether strings and streams are unreadable until a password is accepted.
    pub fn is_locked(&self) -> bool {
        self.xref.is_locked()
    }

    /// Try a user or owner password.
    ///
    /// A wrong password derives no key and leaves the document as it was;
    /// another candidate can be tried at any time.
    pub fn check_password(&mut self, password: impl AsRef<[u8]>) -> bool {
        let accepted = self.xref.authenticate(password.as_ref());
        if accepted {
            log::info!("password accepted");
        } else {
            log::debug!("password rejected");
        }
        accepted
    }

    /// Access permissions granted by the encryption dictionary.
    pub fn permissions(&self) -> Option<Permissions> {
        self.xref.security_handler().map(|h| h.permissions())
    }

    /// Resolve object `id`; missing or damaged objects are `Null`.
    pub fn get_object(&mut self, id: u32) -> Result<Arc<Object>> {
        self.xref.get_object(id)
    }

    /// Follow `obj` if it is a reference.
    pub fn resolve(&mut self, obj: &Object) -> Result<Arc<Object>> {
        self.xref.resolve(obj)
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&mut self) -> Result<Arc<Object>> {
        let catalog = self.xref.catalog()?;
        match catalog.as_dict() {
            Some(dict) => {
                if !dict.is_type("Catalog") {
                    log::warn!("catalog has no /Type /Catalog");
                }
                Ok(catalog)
            },
            None => Err(Error::MissingCatalog),
        }
    }

    /// The document information dictionary, if any.
    pub fn info(&mut self) -> Result<Option<Arc<Object>>> {
        let Some(info) = self.xref.info() else {
            return Ok(None);
        };
        let info = self.xref.get_object(info.id)?;
        Ok(info.as_dict().is_some().then_some(info))
    }

    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    /// Decoded bytes of `stream`, resolving indirect filter parameters.
    pub fn stream_data(&mut self, stream: &Stream) -> Result<Vec<u8>> {
        self.xref.decoded_stream_data(stream)
    }

    /// Append a new object.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectRef {
        self.xref.add_object(object)
    }

    pub fn xref(&self) -> &XRef {
        &self.xref
    }

    pub fn xref_mut(&mut self) -> &mut XRef {
        &mut self.xref
    }

    /// Encrypt the document with `policy` when it is next saved.
    ///
    /// The document gets a new ID.
    pub fn encrypt(&mut self, policy: &EncryptionPolicy) -> Result<()> {
        self.xref.add_encryption(policy)
    }

    /// Write the complete document to `out`.
    pub fn save<W: Write>(&mut self, out: &mut W) -> Result<()> {
        write_document(&mut self.xref, out)
    }

    /// Write the complete document to a file.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut bytes = Vec::new();
        self.save(&mut bytes)?;
        std::fs::write(path.as_ref(), bytes)?;
        log::info!("saved {}", path.as_ref().display());
        Ok(())
    }
}

/// Parse the `%PDF-M.m` header.
///
/// Strict mode requires it at byte 0; otherwise it may follow up to 1 KB of
/// junk, as some generators prepend.
///
/// # Example
///
/// ```rust
/// # use pdf_objstore::document::parse_header;
/// # use pdf_objstore::parser_config::ParserOptions;
/// let (major, minor) = parse_header(b"%PDF-1.7\n", &ParserOptions::default()).unwrap();
/// assert_eq!((major, minor), (1, 7));
/// ```
pub fn parse_header(data: &[u8], options: &ParserOptions) -> Result<(u8, u8)> {
    let magic = b"%PDF-";
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let start = match window.windows(magic.len()).position(|w| w == magic) {
        Some(0) => 0,
        Some(pos) if !options.strict => {
            log::warn!("{} bytes before the PDF header", pos);
            pos
        },
        _ => {
            return Err(Error::InvalidHeader(
                String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned(),
            ))
        },
    };

    let header = &data[start..];
    let version = header.get(5..8).ok_or_else(|| Error::InvalidHeader("file too short".to_string()))?;
    let (major, dot, minor) = (version[0], version[1], version[2]);
    if dot != b'.' || !major.is_ascii_digit() || !minor.is_ascii_digit() {
        return Err(Error::InvalidHeader(String::from_utf8_lossy(&header[..8]).into_owned()));
    }

    let (major, minor) = (major - b'0', minor - b'0');
    if major > 2 || (major == 0 && minor == 0) {
        return Err(Error::InvalidHeader(format!("unsupported version {}.{}", major, minor)));
    }
    Ok((major, minor))
}
