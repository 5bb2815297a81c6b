//! Object streams (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs several indirect objects into one
//! compressed stream:
//!
//! ```text
//! 12 0 obj
//! << /Type /ObjStm /N 2 /First 10 /Filter /FlateDecode >>
//! stream
//! 10 0 11 4          % (object number, offset relative to /First) pairs
//! 42 << /A 1 >>      % object 10 at offset 0, object 11 at offset 4
//! endstream
//! endobj
//! ```
//!
//! This module only deals with the decoded body. Fetching, decrypting and
//! decoding the container is the job of [`crate::xref::XRef`].

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, Stream};
use crate::parser::parse_object_with_depth;

/// Sanity bound on `/N`.
const MAX_OBJECTS: i64 = 1_000_000;

/// Index over a decoded object stream body.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    data: Vec<u8>,
    first: usize,
    entries: Vec<(u32, usize)>,
}

impl ObjectStream {
    /// Read `/N` and `/First` from `dict` and the offset table from `data`.
    ///
    /// A table shorter than `/N` keeps the pairs that could be read.
    pub fn new(dict: &Dictionary, data: Vec<u8>) -> Result<Self> {
        if let Some(t) = dict.get_name("Type") {
            if t != "ObjStm" {
                return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /{}", t)));
            }
        }
        let n = dict
            .get_integer("N")
            .ok_or_else(|| Error::InvalidPdf("object stream missing /N".to_string()))?;
        let first = dict
            .get_integer("First")
            .ok_or_else(|| Error::InvalidPdf("object stream missing /First".to_string()))?;
        if !(0..=MAX_OBJECTS).contains(&n) {
            return Err(Error::InvalidPdf(format!("invalid object stream /N {}", n)));
        }
        let first = usize::try_from(first)
            .ok()
            .filter(|&f| f <= data.len())
            .ok_or_else(|| {
                Error::InvalidPdf(format!("object stream /First {} outside {} bytes", first, data.len()))
            })?;

        // Pairs are read up to /N even if they run past /First.
        let entries = read_pairs(&data, n as usize);
        if entries.len() < n as usize {
            log::warn!("object stream declares {} objects, offset table has {}", n, entries.len());
        }
        Ok(Self { data, first, entries })
    }

    /// Index a decoded [`Stream`].
    pub fn from_stream(stream: &Stream) -> Result<Self> {
        Self::new(&stream.dict, stream.decoded_data()?)
    }

    /// Number of readable entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object number and relative offset of entry `index`.
    pub fn entry(&self, index: usize) -> Option<(u32, usize)> {
        self.entries.get(index).copied()
    }

    /// Object numbers in table order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|&(num, _)| num)
    }

    /// Parse the value stored in entry `index`.
    pub fn object_at(&self, index: usize, max_nesting: usize) -> Option<(u32, Object)> {
        let (num, offset) = self.entry(index)?;
        let start = self.first.checked_add(offset)?;
        let body = self.data.get(start..)?;
        match parse_object_with_depth(body, max_nesting) {
            Ok((_, obj)) => Some((num, obj)),
            Err(e) => {
                log::warn!("object {} in object stream does not parse: {:?}", num, e);
                None
            },
        }
    }

    /// Parse object `obj_num`, preferring entry `hint` when it holds that number.
    pub fn find(&self, obj_num: u32, hint: usize, max_nesting: usize) -> Option<Object> {
        let index = match self.entry(hint) {
            Some((num, _)) if num == obj_num => hint,
            _ => self.entries.iter().position(|&(num, _)| num == obj_num)?,
        };
        self.object_at(index, max_nesting).map(|(_, obj)| obj)
    }

    /// Pack objects into an uncompressed object stream.
    ///
    /// Streams and non-zero generations cannot live in an object stream;
    /// callers filter those out.
    pub fn build(objects: &[(u32, Object)]) -> Result<Stream> {
        let mut header = Vec::new();
        let mut body = Vec::new();
        for (i, (num, obj)) in objects.iter().enumerate() {
            if matches!(obj, Object::Stream(_)) {
                return Err(Error::InvalidPdf(format!("object {} is a stream", num)));
            }
            if i > 0 {
                header.push(b' ');
                body.push(b'\n');
            }
            header.extend_from_slice(format!("{} {}", num, body.len()).as_bytes());
            obj.write(&mut body)?;
        }
        header.push(b'\n');

        let mut dict = Dictionary::new();
        dict.insert("Type", Object::name("ObjStm"));
        dict.insert("N", Object::from(objects.len() as i64));
        dict.insert("First", Object::from(header.len() as i64));
        header.extend_from_slice(&body);
        Ok(Stream::from_plain(dict, header))
    }
}

/// Read up to `n` integer pairs.
fn read_pairs(mut input: &[u8], n: usize) -> Vec<(u32, usize)> {
    let mut pairs = Vec::with_capacity(n.min(4096));
    while pairs.len() < n {
        let (rest, num) = match token(input) {
            Ok((rest, Token::Integer(num))) => (rest, num),
            _ => break,
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(offset))) => (rest, offset),
            _ => break,
        };
        match (u32::try_from(num), usize::try_from(offset)) {
            (Ok(num), Ok(offset)) => pairs.push((num, offset)),
            _ => break,
        }
        input = rest;
    }
    pairs
}
