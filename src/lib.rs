// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::manual_range_contains)]

//! # PDF Object Store
//!
//! Low-level access to the objects of a PDF file.
//!
//! ## Core Features
//!
//! - **Lazy cross-reference resolution**: objects are parsed on first access
//!   and memoized; classic tables, xref streams, hybrid files and `/Prev`
//!   chains of incremental updates are merged with the newest section winning
//! - **Object streams**: compressed objects (PDF 1.5+) are resolved through
//!   their container, with stale entries detected
//! - **Damage containment**: a corrupt object resolves to `null` without
//!   affecting its neighbours; an unusable xref is rebuilt by scanning the file
//! - **Stream filters**: FlateDecode, LZWDecode, RunLengthDecode,
//!   ASCIIHexDecode, ASCII85Decode, JBIG2Decode and PNG/TIFF predictors,
//!   with encoders for the round-trippable ones
//! - **Standard security handler**: RC4 40/128-bit, AES-128 and AES-256,
//!   user and owner passwords, decryption on read and encryption on write
//! - **Writer**: serializes the object table into a fresh file
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_objstore::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = PdfDocument::open("report.pdf")?;
//! if doc.is_locked() && !doc.check_password("secret") {
//!     return Err("wrong password".into());
//! }
//!
//! let catalog = doc.catalog()?;
//! println!("{:?}", catalog);
//!
//! let mut out = Vec::new();
//! doc.save(&mut out)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 (<http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license (<http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Core PDF parsing
pub mod lexer;
pub mod object;
pub mod parser;
/// Parser configuration options
pub mod parser_config;

// Cross-reference resolution
pub mod objstm;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Encryption support
pub mod encryption;

// Document session and serialization
pub mod document;
pub mod writer;

// Re-exports
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use object::{Dictionary, Object, ObjectRef, Stream};
pub use parser_config::ParserOptions;
pub use xref::XRef;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
