//! Cross-reference data and the object resolver.
//!
//! Reading starts at `startxref`, walks the `/Prev` chain and merges every
//! section into one [`CrossRefTable`], newest entries first. Both section
//! formats are supported:
//!
//! ```text
//! xref                      % classic table (PDF 1.0-1.4)
//! 0 3
//! 0000000000 65535 f
//! 0000000018 00000 n
//! 0000000154 00000 n
//! trailer
//! << /Size 3 /Root 1 0 R >>
//!
//! 7 0 obj                   % cross-reference stream (PDF 1.5+)
//! << /Type /XRef /W [1 2 1] /Size 8 /Index [0 8] /Filter /FlateDecode >>
//! stream ... endstream
//! ```
//!
//! [`XRef`] then resolves objects from the merged table on demand. Every
//! object number owns one slot in an arena; a slot moves from unresolved to
//! resolved (or failed, which reads as `Null`) once per session.

use crate::decoders::FilterChain;
use crate::encryption::algorithms::random_bytes;
use crate::encryption::{EncryptionPolicy, SecurityHandler};
use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dictionary, Object, ObjectRef, PdfString, Stream};
use crate::objstm::ObjectStream;
use crate::parser::{parse_indirect_object, parse_object_with_depth};
use crate::parser_config::ParserOptions;
use crate::xref_reconstruction::reconstruct_xref;
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 2048;

/// Largest subsection accepted in a classic table.
const MAX_SUBSECTION: i64 = 1_000_000;

/// Highest object number a conforming file can use.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Slots every table may use regardless of how many entries it lists.
const MIN_ARENA_SLOTS: usize = 1 << 16;

/// Slots allowed per listed entry past `MIN_ARENA_SLOTS`.
const MAX_SLOTS_PER_ENTRY: usize = 16;

/// Trailer keys inherited from older sections when the newest one omits them.
const INHERITED_TRAILER_KEYS: [&str; 4] = ["Root", "Info", "ID", "Encrypt"];

/// Numeric type of a cross-reference entry, as stored in xref streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Unused object number
    Free = 0,
    /// Object stored at a byte offset
    Direct = 1,
    /// Object stored inside an object stream
    Compressed = 2,
}

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Unused object number
    Free {
        /// Next free object number
        next: u64,
        /// Generation to use if the number is reused
        generation: u16,
    },
    /// Object stored at a byte offset in the file
    Direct {
        /// Byte offset of the `N G obj` header
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the `/Type /ObjStm` container
        container: u32,
        /// Position of the object in the container's offset table
        index: u32,
    },
}

impl XRefEntry {
    /// Entry for a free object number.
    pub fn free(next: u64, generation: u16) -> Self {
        XRefEntry::Free { next, generation }
    }

    /// Entry for an object at a byte offset.
    pub fn direct(offset: u64, generation: u16) -> Self {
        XRefEntry::Direct { offset, generation }
    }

    /// Entry for an object inside an object stream.
    pub fn compressed(container: u32, index: u32) -> Self {
        XRefEntry::Compressed { container, index }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            XRefEntry::Free { .. } => EntryType::Free,
            XRefEntry::Direct { .. } => EntryType::Direct,
            XRefEntry::Compressed { .. } => EntryType::Compressed,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation number of the object; objects in object streams always have 0.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::Direct { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Cross-reference entries read from one or more sections.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    pub(crate) entries: HashMap<u32, XRefEntry>,
    /// Trailer dictionary (for xref streams, the stream dictionary)
    trailer: Option<Dictionary>,
}

impl CrossRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }

    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Add or overwrite the entry for `object_number`.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    pub fn all_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Merge an older section into this one.
    ///
    /// Entries already present win. Trailer keys that this section lacks
    /// are taken from the older trailer, and `/Size` becomes the larger one.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }

        let Some(old_trailer) = older.trailer else {
            return;
        };
        let Some(trailer) = self.trailer.as_mut() else {
            self.trailer = Some(old_trailer);
            return;
        };
        for key in INHERITED_TRAILER_KEYS {
            if !trailer.contains_key(key) {
                if let Some(value) = old_trailer.get(key) {
                    trailer.insert(key, value.clone());
                }
            }
        }
        if let Some(old_size) = old_trailer.get_integer("Size") {
            if trailer.get_integer("Size").map_or(true, |size| size < old_size) {
                trailer.insert("Size", Object::from(old_size));
            }
        }
    }

    /// Take entries from the `/XRefStm` stream of a hybrid file.
    ///
    /// The stream only fills numbers the classic table lists as free or omits.
    fn fill_from(&mut self, stream_table: CrossRefTable) {
        for (obj_num, entry) in stream_table.entries {
            match self.entries.get(&obj_num) {
                Some(existing) if existing.is_in_use() => {},
                _ => {
                    self.entries.insert(obj_num, entry);
                },
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the byte offset named by the last `startxref` in the file.
///
/// Only the final 2 KB are searched.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::InvalidXref("no startxref keyword near the end of the file".to_string()))?;

    match token(&tail[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) => usize::try_from(offset)
            .ok()
            .filter(|&o| o < data.len())
            .ok_or_else(|| Error::InvalidXref(format!("startxref offset {} is outside the file", offset))),
        _ => Err(Error::InvalidXref("startxref is not followed by an offset".to_string())),
    }
}

/// Parse the section at `offset` and every older section reachable via `/Prev`.
///
/// A `/Prev` that points back to a section already read ends the chain. More
/// than `options.max_xref_chain` hops is an error. A damaged older section
/// ends the chain with a warning unless `options.strict` is set.
pub fn parse_xref(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut table = parse_section(data, offset, options)?;
    let mut visited = HashSet::from([offset]);
    let mut next = prev_offset(table.trailer());
    let mut hops = 0;

    while let Some(prev) = next {
        if !visited.insert(prev) {
            log::warn!("/Prev chain loops back to offset {}", prev);
            break;
        }
        hops += 1;
        if hops > options.max_xref_chain {
            return Err(Error::InvalidXref(format!(
                "/Prev chain is longer than {} sections",
                options.max_xref_chain
            )));
        }
        log::debug!("following /Prev to offset {}", prev);
        let older = match parse_section(data, prev, options) {
            Ok(older) => older,
            Err(e) if !options.strict => {
                log::warn!("ignoring damaged xref section at offset {}: {}", prev, e);
                break;
            },
            Err(e) => return Err(e),
        };
        next = prev_offset(older.trailer());
        table.merge_from(older);
    }

    Ok(table)
}

fn prev_offset(trailer: Option<&Dictionary>) -> Option<usize> {
    trailer
        .and_then(|t| t.get_integer("Prev"))
        .and_then(|p| usize::try_from(p).ok())
}

/// Parse one section, classic or stream, detected from its first bytes.
fn parse_section(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let input = data
        .get(offset..)
        .ok_or_else(|| Error::InvalidXref(format!("section offset {} is past the end of the file", offset)))?;
    let start = skip_ws(input);

    if start.starts_with(b"xref") {
        log::debug!("classic xref table at offset {}", offset);
        let body = &start[b"xref".len()..];
        let mut table = parse_classic_xref(body, offset, options)?;

        if let Some(stm) = table.trailer().and_then(|t| t.get_integer("XRefStm")) {
            let stream_table = usize::try_from(stm)
                .map_err(|_| Error::InvalidXref(format!("invalid /XRefStm {}", stm)))
                .and_then(|stm| parse_xref_stream(data, stm, options));
            match stream_table {
                Ok(stream_table) => table.fill_from(stream_table),
                Err(e) => log::warn!("ignoring /XRefStm {}: {}", stm, e),
            }
        }
        Ok(table)
    } else if start.first().is_some_and(u8::is_ascii_digit) {
        log::debug!("xref stream at offset {}", offset);
        parse_xref_stream(data, offset, options)
    } else {
        Err(Error::InvalidXref(format!("no cross-reference data at offset {}", offset)))
    }
}

/// Parse a classic table body (after the `xref` keyword) and its trailer.
fn parse_classic_xref(mut input: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();

    loop {
        let (rest, tok) = token(input)
            .map_err(|_| Error::InvalidXref(format!("xref table at offset {} has no trailer", offset)))?;
        match tok {
            Token::Keyword(kw) if kw == b"trailer" => {
                input = rest;
                break;
            },
            Token::Integer(first) => {
                let count = match token(rest) {
                    Ok((after, Token::Integer(count))) => {
                        input = after;
                        count
                    },
                    _ => {
                        return Err(Error::InvalidXref(format!(
                            "malformed subsection header in xref table at offset {}",
                            offset
                        )))
                    },
                };
                let first = u32::try_from(first)
                    .map_err(|_| Error::InvalidXref(format!("invalid subsection start {}", first)))?;
                if !(0..=MAX_SUBSECTION).contains(&count) {
                    return Err(Error::InvalidXref(format!("xref subsection count {} exceeds limit", count)));
                }
                input = parse_subsection(&mut table, input, first, count as u32, options)?;
            },
            _ => {
                return Err(Error::InvalidXref(format!(
                    "unexpected token in xref table at offset {}",
                    offset
                )))
            },
        }
    }

    match parse_object_with_depth(input, options.max_nesting) {
        Ok((_, Object::Dictionary(trailer))) => table.set_trailer(trailer),
        Ok((_, other)) => {
            return Err(Error::InvalidXref(format!("trailer is a {}, not a dictionary", other.type_name())))
        },
        Err(e) => return Err(Error::InvalidXref(format!("unreadable trailer: {:?}", e))),
    }

    Ok(table)
}

/// Read `count` records of the form `nnnnnnnnnn ggggg n`.
///
/// Records are read token by token, so 19- and 21-byte lines and stray
/// whitespace are accepted.
fn parse_subsection<'a>(
    table: &mut CrossRefTable,
    mut input: &'a [u8],
    mut first: u32,
    count: u32,
    options: &ParserOptions,
) -> Result<&'a [u8]> {
    for i in 0..count {
        let (rest, offset) = match token(input) {
            Ok((rest, Token::Integer(offset))) => (rest, offset),
            Ok((_, Token::Keyword(kw))) if kw == b"trailer" && !options.strict => {
                log::warn!("xref subsection {} declares {} entries but has {}", first, count, i);
                return Ok(input);
            },
            _ => return Err(Error::InvalidXref(format!("malformed xref entry {} of subsection {}", i, first))),
        };
        let (rest, generation) = match token(rest) {
            Ok((rest, Token::Integer(generation))) => (rest, generation),
            _ => return Err(Error::InvalidXref(format!("missing generation in xref entry {} of subsection {}", i, first))),
        };
        let (rest, flag) = match token(rest) {
            Ok((rest, Token::Keyword(flag))) => (rest, flag.first().copied().unwrap_or(b'?')),
            _ => return Err(Error::InvalidXref(format!("missing type in xref entry {} of subsection {}", i, first))),
        };
        input = rest;

        let generation = u16::try_from(generation).unwrap_or_else(|_| {
            log::warn!("xref generation {} out of range", generation);
            u16::MAX
        });
        let offset = u64::try_from(offset).unwrap_or(0);

        // Some writers number the first subsection from 1 while still
        // emitting the free head of object 0.
        if i == 0 && first == 1 && flag == b'f' && offset == 0 && generation == u16::MAX {
            log::debug!("xref subsection starts at 1 with the object 0 record, shifting to 0");
            first = 0;
        }
        let Some(obj_num) = first.checked_add(i) else {
            return Err(Error::InvalidXref(format!("subsection {} overflows object numbers", first)));
        };

        let entry = match flag.to_ascii_lowercase() {
            // An in-use entry at offset 0 cannot point at an object.
            b'n' if offset > 0 => XRefEntry::direct(offset, generation),
            b'n' | b'f' => XRefEntry::free(offset, generation),
            other if options.strict => {
                return Err(Error::InvalidXref(format!(
                    "invalid xref entry type {:?} for object {}",
                    other as char, obj_num
                )))
            },
            other => {
                log::warn!("invalid xref entry type {:?} for object {}, treating as free", other as char, obj_num);
                XRefEntry::free(0, generation)
            },
        };
        table.add_entry(obj_num, entry);
    }
    Ok(input)
}

/// Parse a cross-reference stream (`/Type /XRef`) at `offset`.
///
/// Each record has three big-endian fields whose widths come from `/W`:
/// entry type (default 1 when the width is 0), then offset or container
/// number, then generation or index. `/Index` lists the subsections and
/// defaults to `[0 /Size]`. The stream dictionary doubles as the trailer.
fn parse_xref_stream(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let (reference, object) = parse_indirect_object(data, offset, options, &mut |_| None)
        .map_err(|e| Error::InvalidXref(format!("xref stream at offset {}: {}", offset, e)))?;
    let stream = match object {
        Object::Stream(stream) => stream,
        other => {
            return Err(Error::InvalidXref(format!(
                "object {} at offset {} is a {}, not an xref stream",
                reference,
                offset,
                other.type_name()
            )))
        },
    };
    if let Some(type_name) = stream.dict.get_name("Type") {
        if type_name != "XRef" {
            return Err(Error::InvalidXref(format!("expected /Type /XRef, got /Type /{}", type_name)));
        }
    }

    let widths = field_widths(&stream.dict)?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidXref(format!("xref stream {} has zero-width records", reference)));
    }
    let ranges = index_ranges(&stream.dict)?;

    let chain = FilterChain::from_dict(&stream.dict, &mut |o: &Object| o.clone())?;
    let decoded = chain.decode(stream.raw_buffer(), options)?;

    let mut table = CrossRefTable::new();
    let mut records = decoded.chunks_exact(entry_size);
    'ranges: for (start, count) in ranges {
        for i in 0..count {
            let Some(record) = records.next() else {
                if options.strict {
                    return Err(Error::InvalidXref(format!("xref stream {} is truncated", reference)));
                }
                log::warn!("xref stream {} ends before subsection {} is complete", reference, start);
                break 'ranges;
            };
            let (field1, rest) = record.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_field(field1) };
            let field2 = read_field(field2);
            let field3 = read_field(field3);

            let entry = match kind {
                0 => XRefEntry::free(field2, clamp_generation(field3)),
                1 => XRefEntry::direct(field2, clamp_generation(field3)),
                2 => match (u32::try_from(field2), u32::try_from(field3)) {
                    (Ok(container), Ok(index)) => XRefEntry::compressed(container, index),
                    _ => {
                        log::warn!("compressed xref entry out of range in stream {}", reference);
                        continue;
                    },
                },
                // Unknown types are reserved and read as null references.
                other => {
                    log::debug!("ignoring xref stream entry of type {}", other);
                    continue;
                },
            };
            let Some(obj_num) = start.checked_add(i) else {
                break 'ranges;
            };
            table.add_entry(obj_num, entry);
        }
    }

    table.set_trailer(stream.dict);
    Ok(table)
}

fn field_widths(dict: &Dictionary) -> Result<[usize; 3]> {
    let w = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidXref("missing /W array in xref stream".to_string()))?;
    if w.len() != 3 {
        return Err(Error::InvalidXref(format!("/W has {} elements, expected 3", w.len())));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(w) {
        *slot = value
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v <= 8)
            .ok_or_else(|| Error::InvalidXref(format!("invalid /W element {:?}", value)))?;
    }
    Ok(widths)
}

fn index_ranges(dict: &Dictionary) -> Result<Vec<(u32, u32)>> {
    let size = dict
        .get_integer("Size")
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| Error::InvalidXref("missing /Size in xref stream".to_string()))?;
    let Some(index) = dict.get("Index").and_then(Object::as_array) else {
        return Ok(vec![(0, size)]);
    };

    let mut ranges = Vec::with_capacity(index.len() / 2);
    for pair in index.chunks(2) {
        let [start, count] = pair else {
            log::warn!("odd number of elements in /Index, ignoring the last");
            break;
        };
        match (
            start.as_integer().and_then(|s| u32::try_from(s).ok()),
            count.as_integer().and_then(|c| u32::try_from(c).ok()),
        ) {
            (Some(start), Some(count)) => ranges.push((start, count)),
            _ => return Err(Error::InvalidXref("invalid /Index entry".to_string())),
        }
    }
    Ok(ranges)
}

/// Big-endian unsigned field of 0 to 8 bytes.
fn read_field(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

fn clamp_generation(value: u64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Resolution state of one object number.
#[derive(Debug, Clone)]
enum Slot {
    Unresolved,
    /// Being resolved; a nested request for the same number reads `Null`
    InProgress,
    Resolved(Arc<Object>),
    Failed,
}


#[derive(Debug, Clone)]
struct Entry {
    location: XRefEntry,
    slot: Slot,
}

impl Entry {
    fn free() -> Self {
        Self {
            location: XRefEntry::free(0, 0),
            slot: Slot::Unresolved,
        }
    }
}

/// One past the highest object number given a slot for a table of `listed` entries.
///
/// Sparse tables get at most `MAX_SLOTS_PER_ENTRY` slots per listed entry,
/// never fewer than `MIN_ARENA_SLOTS` and never past the format limit.
fn arena_limit(listed: usize) -> usize {
    listed
        .saturating_mul(MAX_SLOTS_PER_ENTRY)
        .max(MIN_ARENA_SLOTS)
        .min(MAX_OBJECT_NUMBER as usize + 1)
}

fn has_root(table: &CrossRefTable) -> bool {
    table.trailer().is_some_and(|t| t.contains_key("Root"))
}

/// Object resolver for one document.
///
/// Owns the file bytes, one slot per object number, the trailer references
/// and the security handler of an encrypted file. Resolution caches into the
/// slots, so it takes `&mut self`; share an `XRef` behind a single lock or
/// keep it on one thread.
#[derive(Debug)]
pub struct XRef {
    data: Bytes,
    options: ParserOptions,
    entries: Vec<Entry>,
    trailer: Dictionary,
    root: Option<ObjectRef>,
    info: Option<ObjectRef>,
    file_id: Option<(Vec<u8>, Vec<u8>)>,
    handler: Option<SecurityHandler>,
    encrypt_ref: Option<ObjectRef>,
    object_streams: HashMap<u32, Option<Arc<ObjectStream>>>,
    parse_count: usize,
}

impl Default for XRef {
    fn default() -> Self {
        Self::new()
    }
}

impl XRef {
    /// Empty table for a document built in memory.
    pub fn new() -> Self {
        Self::with_source(Bytes::new(), ParserOptions::default())
    }

    fn with_source(data: Bytes, options: ParserOptions) -> Self {
        Self {
            data,
            options,
            entries: vec![Entry {
                location: XRefEntry::free(0, u16::MAX),
                slot: Slot::Unresolved,
            }],
            trailer: Dictionary::new(),
            root: None,
            info: None,
            file_id: None,
            handler: None,
            encrypt_ref: None,
            object_streams: HashMap::new(),
            parse_count: 0,
        }
    }

    /// Read the cross-reference data of a complete file.
    ///
    /// When the declared data is unusable, or the trailer has no `/Root`,
    /// and `options.reconstruct_xref` is set, the table is rebuilt by
    /// scanning the file for object headers.
    pub fn load(data: impl Into<Bytes>, options: ParserOptions) -> Result<Self> {
        let data = data.into();
        let parsed = find_xref_offset(&data).and_then(|offset| parse_xref(&data, offset, &options));
        let table = match parsed {
            Ok(table) if has_root(&table) || !options.reconstruct_xref => table,
            Ok(table) => {
                log::warn!("trailer has no /Root, reconstructing the cross-reference table");
                reconstruct_xref(&data, &options).unwrap_or_else(|e| {
                    log::warn!("reconstruction failed: {}", e);
                    table
                })
            },
            Err(e) if options.reconstruct_xref => {
                log::warn!("cross-reference data is unusable ({}), reconstructing", e);
                reconstruct_xref(&data, &options)?
            },
            Err(e) => return Err(e),
        };
        Self::from_table(data, table, options)
    }

    /// Build the resolver over `data` from an already merged table.
    ///
    /// Reads `/Root`, `/Info` and `/ID` from the trailer and, for an encrypted
    /// file, installs a security handler that still needs a password.
    pub fn from_table(data: impl Into<Bytes>, table: CrossRefTable, options: ParserOptions) -> Result<Self> {
        let mut xref = Self::with_source(data.into(), options);
        let CrossRefTable { entries, trailer } = table;

        let slot_limit = arena_limit(entries.len());
        let size = entries
            .keys()
            .copied()
            .filter(|&n| (n as usize) < slot_limit)
            .max()
            .map_or(1, |n| n as usize + 1);
        xref.entries.resize(size, Entry::free());
        for (num, location) in entries {
            if num == 0 {
                continue;
            }
            if num as usize >= slot_limit {
                log::warn!("ignoring object number {}, the table lists too few objects to reach it", num);
                continue;
            }
            xref.entries[num as usize].location = location;
        }
        log::debug!("cross-reference table has {} slots", xref.entries.len());

        xref.set_trailer(trailer.unwrap_or_default());
        xref.install_security_handler()?;
        Ok(xref)
    }

    fn install_security_handler(&mut self) -> Result<()> {
        let encrypt = match self.trailer.get("Encrypt").cloned() {
            None => return Ok(()),
            Some(Object::Reference(r)) => {
                self.encrypt_ref = Some(r);
                self.get_object(r.id)?
            },
            Some(other) => Arc::new(other),
        };
        let dict = encrypt.as_dict().ok_or_else(|| {
            Error::InvalidPdf(format!("/Encrypt is a {}, not a dictionary", encrypt.type_name()))
        })?;
        let id = match &self.file_id {
            Some((first, _)) => first.clone(),
            None => {
                log::warn!("encrypted document has no /ID");
                Vec::new()
            },
        };
        self.handler = Some(SecurityHandler::from_encrypt_dict(dict, id)?);
        Ok(())
    }

    /// Options this table was read with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Number of object numbers, including the reserved object 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Location of object `id`.
    pub fn entry(&self, id: u32) -> Option<XRefEntry> {
        self.entries.get(id as usize).map(|e| e.location)
    }

    /// Object numbers with an in-use entry, ascending.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, e)| e.location.is_in_use())
            .map(|(i, _)| i as u32)
    }

    /// How many objects have been parsed from the file so far.
    pub fn parse_count(&self) -> usize {
        self.parse_count
    }

    /// Resolve object `id`.
    ///
    /// Missing, free and damaged objects are `Null`; damage is logged once
    /// and remembered. Repeated calls return the same `Arc`. The only error
    /// is [`Error::InvalidPassword`], for a string or stream of an encrypted
    /// document that no accepted password unlocks yet; it is not cached.
    pub fn get_object(&mut self, id: u32) -> Result<Arc<Object>> {
        let Some(entry) = self.entries.get(id as usize) else {
            return Ok(Arc::new(Object::Null));
        };
        match &entry.slot {
            Slot::Resolved(object) => return Ok(Arc::clone(object)),
            Slot::Failed | Slot::InProgress => return Ok(Arc::new(Object::Null)),
            Slot::Unresolved => {},
        }
        let location = entry.location;
        if !location.is_in_use() {
            return Ok(Arc::new(Object::Null));
        }

        self.entries[id as usize].slot = Slot::InProgress;
        let loaded = match location {
            XRefEntry::Direct { offset, generation } => self.load_direct(id, offset, generation),
            XRefEntry::Compressed { container, index } => self.load_compressed(id, container, index),
            XRefEntry::Free { .. } => Ok(None),
        };

        let slot = &mut self.entries[id as usize].slot;
        match loaded {
            Ok(Some(object)) => {
                let object = Arc::new(object);
                *slot = Slot::Resolved(Arc::clone(&object));
                Ok(object)
            },
            Ok(None) => {
                *slot = Slot::Failed;
                Ok(Arc::new(Object::Null))
            },
            Err(e) => {
                *slot = Slot::Unresolved;
                Err(e)
            },
        }
    }

    /// Follow `obj` if it is a reference; other values are returned as they are.
    pub fn resolve(&mut self, obj: &Object) -> Result<Arc<Object>> {
        match obj {
            Object::Reference(r) => self.get_object(r.id),
            other => Ok(Arc::new(other.clone())),
        }
    }

    /// Resolve every in-use object.
    pub fn resolve_all(&mut self) -> Result<()> {
        for id in 1..self.entries.len() as u32 {
            self.get_object(id)?;
        }
        Ok(())
    }

    fn load_direct(&mut self, id: u32, offset: u64, generation: u16) -> Result<Option<Object>> {
        self.parse_count += 1;
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(None);
        };
        let data = self.data.clone();
        let options = self.options;
        let parsed = parse_indirect_object(&data, offset, &options, &mut |r| self.length_of(r));
        let (reference, mut object) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("object {} {} at offset {} is unreadable: {}", id, generation, offset, e);
                return Ok(None);
            },
        };

        if reference.id != id {
            log::warn!("xref entry for object {} points at object {}", id, reference);
            return Ok(None);
        }
        if reference.gen != generation {
            if options.strict {
                log::warn!("object {} has generation {}, xref says {}", id, reference.gen, generation);
                return Ok(None);
            }
            log::debug!("object {} has generation {}, xref says {}", id, reference.gen, generation);
        }

        // The /Encrypt dictionary is stored in clear.
        if self.encrypt_ref.map(|r| r.id) != Some(id) {
            if let Some(handler) = &self.handler {
                if let Err(e) = handler.decrypt_object(&mut object, id, reference.gen) {
                    if e.is_security() {
                        return Err(e);
                    }
                    log::warn!("object {} does not decrypt: {}", id, e);
                    return Ok(None);
                }
            }
        }
        Ok(Some(object))
    }

    fn length_of(&mut self, r: ObjectRef) -> Option<i64> {
        self.get_object(r.id).ok().and_then(|o| o.as_integer())
    }

    fn load_compressed(&mut self, id: u32, container: u32, index: u32) -> Result<Option<Object>> {
        let Some(objects) = self.object_stream(container)? else {
            return Ok(None);
        };
        self.parse_count += 1;
        let Some(object) = objects.find(id, index as usize, self.options.max_nesting) else {
            log::warn!("object {} is not in object stream {}", id, container);
            return Ok(None);
        };

        // Only the live entry counts: a definition from a stream the object
        // has since moved out of is dropped.
        match self.entry(id) {
            Some(XRefEntry::Compressed { container: live, .. }) if live == container => Ok(Some(object)),
            _ => {
                log::debug!("object {} no longer lives in object stream {}", id, container);
                Ok(None)
            },
        }
    }

    /// Index of object stream `container`, decoded once and cached.
    fn object_stream(&mut self, container: u32) -> Result<Option<Arc<ObjectStream>>> {
        if let Some(cached) = self.object_streams.get(&container) {
            return Ok(cached.clone());
        }
        let holder = self.get_object(container)?;
        let index = match holder.as_stream() {
            Some(stream) => match self.decoded_stream_data(stream).and_then(|data| ObjectStream::new(&stream.dict, data)) {
                Ok(index) => Some(Arc::new(index)),
                Err(e) => {
                    log::warn!("object stream {} is unusable: {}", container, e);
                    None
                },
            },
            None => {
                log::warn!("object stream {} is a {}", container, holder.type_name());
                None
            },
        };
        self.object_streams.insert(container, index.clone());
        Ok(index)
    }

    /// Decode `stream`, resolving indirect filter names and parameters through this table.
    ///
    /// Fails with [`Error::InvalidPassword`] when a parameter object cannot
    /// be read before a password is accepted; the call can be retried.
    pub fn decoded_stream_data(&mut self, stream: &Stream) -> Result<Vec<u8>> {
        if stream.is_decoded() {
            return Ok(stream.raw_buffer().to_vec());
        }
        let mut failure = None;
        let chain = FilterChain::from_dict(&stream.dict, &mut |o: &Object| match o {
            Object::Reference(r) => match self.get_object(r.id) {
                Ok(object) => object.as_ref().clone(),
                Err(e) => {
                    failure.get_or_insert(e);
                    Object::Null
                },
            },
            other => other.clone(),
        });
        if let Some(e) = failure {
            return Err(e);
        }
        chain?.decode(stream.raw_buffer(), &self.options)
    }

    /// Append a new object and return its reference.
    ///
    /// The entry is direct with no file offset; its slot starts resolved.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectRef {
        let id = self.entries.len() as u32;
        self.entries.push(Entry {
            location: XRefEntry::direct(0, 0),
            slot: Slot::Resolved(Arc::new(object.into())),
        });
        ObjectRef::new(id, 0)
    }

    /// Store `object` as the value of object `id`, growing the table if needed.
    pub fn replace_object(&mut self, id: u32, object: impl Into<Object>) -> Result<()> {
        if id == 0 || id > MAX_OBJECT_NUMBER {
            return Err(Error::InvalidPdf(format!("cannot store object number {}", id)));
        }
        let index = id as usize;
        if index >= self.entries.len() {
            self.entries.resize(index + 1, Entry::free());
        }
        let entry = &mut self.entries[index];
        if let XRefEntry::Free { generation, .. } = entry.location {
            let generation = if generation == u16::MAX { 0 } else { generation };
            entry.location = XRefEntry::direct(0, generation);
        }
        entry.slot = Slot::Resolved(Arc::new(object.into()));
        self.object_streams.remove(&id);
        Ok(())
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Replace the trailer and take `/Root`, `/Info` and `/ID` from it.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.root = trailer.get("Root").and_then(Object::as_reference);
        self.info = trailer.get("Info").and_then(Object::as_reference);
        self.file_id = trailer
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| match ids.as_slice() {
                [first, second, ..] => Some((first.as_string()?.to_vec(), second.as_string()?.to_vec())),
                _ => None,
            });
        self.trailer = trailer;
    }

    /// Reference to the document catalog.
    pub fn root(&self) -> Option<ObjectRef> {
        self.root
    }

    pub fn set_catalog(&mut self, catalog: ObjectRef) {
        self.root = Some(catalog);
    }

    /// Reference to the document information dictionary.
    pub fn info(&self) -> Option<ObjectRef> {
        self.info
    }

    pub fn set_info(&mut self, info: ObjectRef) {
        self.info = Some(info);
    }

    /// The catalog object, or `Null` when the trailer names none.
    pub fn catalog(&mut self) -> Result<Arc<Object>> {
        match self.root {
            Some(root) => self.get_object(root.id),
            None => Ok(Arc::new(Object::Null)),
        }
    }

    /// Build the trailer for saving the current table.
    ///
    /// `/ID` comes from the security handler when there is one, otherwise
    /// from the file; a document without either gets a random ID that is
    /// kept for later calls.
    pub fn create_trailer(&mut self) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.insert("Size", Object::from(self.entries.len() as i64));
        if let Some(root) = self.root {
            trailer.insert("Root", root.into());
        }
        if let Some(info) = self.info {
            trailer.insert("Info", info.into());
        }

        let (first, second) = self.document_id();
        trailer.insert(
            "ID",
            Object::Array(vec![
                Object::String(PdfString::hex(first)),
                Object::String(PdfString::hex(second)),
            ]),
        );

        if let Some(handler) = &self.handler {
            let encrypt = match self.encrypt_ref {
                Some(r) => Object::Reference(r),
                None => Object::Dictionary(handler.create_encrypt()),
            };
            trailer.insert("Encrypt", encrypt);
        }
        trailer
    }

    fn document_id(&mut self) -> (Vec<u8>, Vec<u8>) {
        if let Some(handler) = &self.handler {
            let first = handler.document_id().to_vec();
            let second = match &self.file_id {
                Some((_, second)) => second.clone(),
                None => first.clone(),
            };
            return (first, second);
        }
        self.file_id
            .get_or_insert_with(|| {
                let id = random_bytes(16);
                (id.clone(), id)
            })
            .clone()
    }

    /// Encrypt the document with `policy` from now on.
    ///
    /// Every object is resolved first, since objects still in the file are
    /// encrypted under the old key or none. The new handler brings a new
    /// document ID and its `/Encrypt` dictionary is stored as an object.
    pub fn add_encryption(&mut self, policy: &EncryptionPolicy) -> Result<()> {
        self.resolve_all()?;
        let handler = SecurityHandler::from_policy(policy)?;
        let encrypt = handler.create_encrypt();
        let id = handler.document_id().to_vec();
        match self.encrypt_ref {
            Some(r) => self.replace_object(r.id, encrypt)?,
            None => self.encrypt_ref = Some(self.add_object(encrypt)),
        }
        log::info!("document will be saved with {:?}", handler.algorithm());
        self.file_id = Some((id.clone(), id));
        self.handler = Some(handler);
        Ok(())
    }

    /// Try `password` on an encrypted document. Unencrypted documents accept anything.
    pub fn authenticate(&mut self, password: &[u8]) -> bool {
        match self.handler.as_mut() {
            Some(handler) => handler.authenticate(password),
            None => true,
        }
    }

    /// Whether strings and streams are still unreadable for lack of a password.
    pub fn is_locked(&self) -> bool {
        self.handler.as_ref().is_some_and(|h| !h.is_unlocked())
    }

    pub fn is_encrypted(&self) -> bool {
        self.handler.is_some()
    }

    pub fn security_handler(&self) -> Option<&SecurityHandler> {
        self.handler.as_ref()
    }

    /// Object holding the `/Encrypt` dictionary, if it is an indirect object.
    pub fn encrypt_ref(&self) -> Option<ObjectRef> {
        self.encrypt_ref
    }
}
