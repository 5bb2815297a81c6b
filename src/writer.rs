//! Serialization of a whole document.
//!
//! Writes a fresh file from an [`XRef`]: header, every live object, a
//! classic cross-reference table and the trailer built by
//! [`XRef::create_trailer`]. Objects that came from object streams are
//! written as ordinary indirect objects, so object streams and xref streams
//! themselves are left out.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::xref::XRef;
use std::io::Write;

/// Version written in the header.
pub const PDF_VERSION: &str = "1.7";

/// Write the document held by `xref` to `out`.
///
/// With a security handler installed, strings and streams are encrypted
/// with per-object keys; the `/Encrypt` dictionary is written in clear.
/// Objects that resolve to `Null` are written as free entries.
///
/// # Errors
///
/// `Error::MissingCatalog` when no catalog is set, `Error::InvalidPassword`
/// when an encrypted source is still locked, and I/O errors from `out`.
pub fn write_document<W: Write>(xref: &mut XRef, out: &mut W) -> Result<()> {
    if xref.root().is_none() {
        return Err(Error::MissingCatalog);
    }

    let mut output = Vec::new();
    writeln!(output, "%PDF-{}", PDF_VERSION)?;
    // Binary marker
    output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let trailer = xref.create_trailer();
    let encrypt_id = xref.encrypt_ref().map(|r| r.id);
    let mut xref_offsets: Vec<Option<(usize, u16)>> = vec![None; xref.len()];

    for id in 1..xref.len() as u32 {
        let Some(entry) = xref.entry(id).filter(|e| e.is_in_use()) else {
            continue;
        };
        let object = xref.get_object(id)?;
        if object.is_null() {
            log::debug!("object {} is null, writing it as free", id);
            continue;
        }
        if let Object::Stream(stream) = object.as_ref() {
            if stream.dict.is_type("ObjStm") || stream.dict.is_type("XRef") {
                continue;
            }
        }

        let generation = entry.generation();
        xref_offsets[id as usize] = Some((output.len(), generation));
        match xref.security_handler() {
            Some(handler) if encrypt_id != Some(id) => {
                let mut encrypted = object.as_ref().clone();
                handler.encrypt_object(&mut encrypted, id, generation)?;
                encrypted.write_indirect(&mut output, id, generation)?;
            },
            _ => object.write_indirect(&mut output, id, generation)?,
        }
    }

    let xref_start = output.len();
    writeln!(output, "xref")?;
    writeln!(output, "0 {}", xref_offsets.len())?;
    // Object 0 is always free
    writeln!(output, "0000000000 65535 f ")?;
    for slot in xref_offsets.iter().skip(1) {
        match slot {
            Some((offset, generation)) => writeln!(output, "{:010} {:05} n ", offset, generation)?,
            None => writeln!(output, "0000000000 00000 f ")?,
        }
    }

    writeln!(output, "trailer")?;
    Object::Dictionary(trailer).write(&mut output)?;
    writeln!(output)?;
    writeln!(output, "startxref")?;
    writeln!(output, "{}", xref_start)?;
    writeln!(output, "%%EOF")?;

    log::debug!("wrote {} bytes, {} objects", output.len(), xref_offsets.iter().flatten().count());
    out.write_all(&output)?;
    Ok(())
}

/// [`write_document`] into a new buffer.
pub fn to_bytes(xref: &mut XRef) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_document(xref, &mut out)?;
    Ok(out)
}
