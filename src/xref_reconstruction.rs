//! Cross-reference table reconstruction for damaged files.
//!
//! When the declared cross-reference data is missing or unusable, the file
//! is scanned for `N G obj` headers instead. A later header for the same
//! object number replaces an earlier one, which is what an incremental
//! update does. Members of object streams found on the way become
//! compressed entries unless the object also has a header of its own.
//!
//! This is a fallback used only when normal xref parsing fails.

use crate::decoders::FilterChain;
use crate::error::{Error, Result};
use crate::lexer::skip_ws;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{parse_indirect_object, parse_object_with_depth};
use crate::parser_config::ParserOptions;
use crate::xref::{CrossRefTable, XRefEntry, MAX_OBJECT_NUMBER};
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Regex for finding "N G obj" patterns
    static ref RE_OBJ_PATTERN: regex::bytes::Regex = regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();

    /// Regex for finding "trailer <<" patterns
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
}

/// Trailer keys collected from every trailer found in the file.
const TRAILER_KEYS: [&str; 4] = ["Root", "Info", "ID", "Encrypt"];

/// Rebuild the cross-reference table by scanning all of `data`.
///
/// The trailer merges every `trailer` dictionary and xref stream dictionary
/// in file order. When its `/Root` does not lead to a catalog, the last
/// `/Type /Catalog` object in the file is used; a file without one gets a
/// trailer without `/Root`.
///
/// # Errors
///
/// Returns `Error::InvalidPdf` if no object header is found.
pub fn reconstruct_xref(data: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    log::info!("reconstructing xref table by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    let mut objects_found = 0;

    for capture in RE_OBJ_PATTERN.captures_iter(data) {
        let (Some(full), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2)) else {
            continue;
        };
        let (Some(obj_num), Some(generation)) =
            (parse_number::<u32>(num.as_bytes()), parse_number::<u16>(gen.as_bytes()))
        else {
            log::debug!("object header out of range at offset {}", full.start());
            continue;
        };
        if obj_num == 0 || obj_num > MAX_OBJECT_NUMBER {
            continue;
        }

        // Headers inside strings or binary data are not followed by a value.
        if !starts_value(&data[full.end()..]) {
            log::debug!("skipping false positive object header at offset {}", full.start());
            continue;
        }

        table.add_entry(obj_num, XRefEntry::direct(full.start() as u64, generation));
        objects_found += 1;
    }

    if objects_found == 0 {
        return Err(Error::InvalidPdf("no objects found during xref reconstruction".to_string()));
    }
    log::info!("found {} object headers for {} objects", objects_found, table.len());

    let scan = scan_streams(data, &table, options);
    for (obj_num, entry) in scan.members {
        if !table.contains(obj_num) {
            table.add_entry(obj_num, entry);
        }
    }

    let trailer = build_trailer(data, &table, scan.xref_dicts, options);
    table.set_trailer(trailer);
    Ok(table)
}

fn parse_number<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Whether `rest` can begin a PDF value.
fn starts_value(rest: &[u8]) -> bool {
    match skip_ws(rest).first() {
        Some(&b) => matches!(b, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-' | b'+' | b'.') || b.is_ascii_digit(),
        None => false,
    }
}

/// Direct entries ordered by file position.
fn direct_entries(table: &CrossRefTable) -> Vec<(u32, usize)> {
    let mut direct: Vec<(u32, usize)> = table
        .entries
        .iter()
        .filter_map(|(&num, entry)| match entry {
            XRefEntry::Direct { offset, .. } => usize::try_from(*offset).ok().map(|o| (num, o)),
            _ => None,
        })
        .collect();
    direct.sort_by_key(|&(_, offset)| offset);
    direct
}

fn load_object_at_offset(data: &[u8], offset: usize, options: &ParserOptions) -> Option<Object> {
    parse_indirect_object(data, offset, options, &mut |_| None)
        .map(|(_, obj)| obj)
        .ok()
}

#[derive(Default)]
struct StreamScan {
    /// Object stream members, later containers winning
    members: HashMap<u32, XRefEntry>,
    /// Xref stream dictionaries with their offsets
    xref_dicts: Vec<(usize, Dictionary)>,
}

/// Look into every stream for object streams and xref streams.
fn scan_streams(data: &[u8], table: &CrossRefTable, options: &ParserOptions) -> StreamScan {
    let mut scan = StreamScan::default();
    for (container, offset) in direct_entries(table) {
        let Some(Object::Stream(stream)) = load_object_at_offset(data, offset, options) else {
            continue;
        };
        if stream.dict.is_type("XRef") {
            scan.xref_dicts.push((offset, stream.dict));
            continue;
        }
        if !stream.dict.is_type("ObjStm") {
            continue;
        }
        let index = FilterChain::from_dict(&stream.dict, &mut |o: &Object| o.clone())
            .and_then(|chain| chain.decode(stream.raw_buffer(), options))
            .and_then(|decoded| ObjectStream::new(&stream.dict, decoded));
        match index {
            Ok(index) => {
                log::debug!("object stream {} holds {} objects", container, index.len());
                for (i, obj_num) in index.object_numbers().enumerate() {
                    scan.members.insert(obj_num, XRefEntry::compressed(container, i as u32));
                }
            },
            Err(e) => log::debug!("object stream {} is unreadable: {}", container, e),
        }
    }
    scan
}

/// Merge all trailers in file order and make sure `/Root` names a catalog.
fn build_trailer(
    data: &[u8],
    table: &CrossRefTable,
    xref_dicts: Vec<(usize, Dictionary)>,
    options: &ParserOptions,
) -> Dictionary {
    let mut found = xref_dicts;
    for mat in RE_TRAILER.find_iter(data) {
        let input = &data[mat.start() + b"trailer".len()..];
        match parse_object_with_depth(input, options.max_nesting) {
            Ok((_, Object::Dictionary(dict))) => found.push((mat.start(), dict)),
            _ => log::warn!("unreadable trailer dictionary at offset {}", mat.start()),
        }
    }
    found.sort_by_key(|(offset, _)| *offset);

    let mut trailer = Dictionary::new();
    for (_, dict) in found {
        for key in TRAILER_KEYS {
            if let Some(value) = dict.get(key) {
                trailer.insert(key, value.clone());
            }
        }
    }

    let root_ok = trailer
        .get("Root")
        .and_then(Object::as_reference)
        .is_some_and(|root| is_catalog_entry(data, table, root, options));
    if !root_ok {
        match find_catalog(data, table, options) {
            Some(root) => {
                log::info!("using catalog {}", root);
                trailer.insert("Root", Object::Reference(root));
            },
            None => {
                log::warn!("no catalog found while reconstructing");
                trailer.remove("Root");
            },
        }
    }

    let size = table.all_object_numbers().max().map_or(1, |n| i64::from(n) + 1);
    trailer.insert("Size", Object::from(size));
    trailer
}

fn is_catalog_entry(data: &[u8], table: &CrossRefTable, root: ObjectRef, options: &ParserOptions) -> bool {
    match table.get(root.id) {
        Some(XRefEntry::Direct { offset, .. }) => usize::try_from(*offset)
            .ok()
            .and_then(|offset| load_object_at_offset(data, offset, options))
            .is_some_and(|obj| is_catalog(&obj)),
        // Cannot be checked without the object stream; trust the trailer.
        Some(XRefEntry::Compressed { .. }) => true,
        _ => false,
    }
}

/// The last object in the file whose dictionary has `/Type /Catalog`.
fn find_catalog(data: &[u8], table: &CrossRefTable, options: &ParserOptions) -> Option<ObjectRef> {
    direct_entries(table)
        .into_iter()
        .rev()
        .find_map(|(num, offset)| {
            let obj = load_object_at_offset(data, offset, options)?;
            is_catalog(&obj).then(|| ObjectRef::new(num, table.get(num).map_or(0, |e| e.generation())))
        })
}

/// Check if an object is the document catalog.
fn is_catalog(obj: &Object) -> bool {
    matches!(obj, Object::Dictionary(dict) if dict.is_type("Catalog"))
}
