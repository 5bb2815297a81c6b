//! Tests for object stream resolution (PDF 1.5+ feature).
//!
//! Compressed objects live inside an `/ObjStm` container and are located
//! through type 2 entries of a cross-reference stream.

use pdf_objstore::decoders::{Filter, PredictorParams};
use pdf_objstore::object::{Dictionary, Object, ObjectRef};
use pdf_objstore::objstm::ObjectStream;
use pdf_objstore::parser_config::ParserOptions;
use pdf_objstore::xref::{EntryType, XRef};
use std::sync::Arc;

/// Assembles a PDF file and records where each object starts.
struct PdfBuilder {
    data: Vec<u8>,
}

impl PdfBuilder {
    fn new() -> Self {
        Self {
            data: b"%PDF-1.5\n".to_vec(),
        }
    }

    fn object(&mut self, id: u32, body: &str) -> u64 {
        let offset = self.data.len() as u64;
        self.data
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
        offset
    }

    fn stream(&mut self, id: u32, dict: &str, contents: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(
            format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", id, dict, contents.len()).as_bytes(),
        );
        self.data.extend_from_slice(contents);
        self.data.extend_from_slice(b"\nendstream\nendobj\n");
        offset
    }

    /// Uncompressed xref stream with `/W [1 4 2]`, one subsection per entry.
    fn xref_stream(&mut self, id: u32, entries: &[(u32, u8, u64, u16)], extra: &str) -> u64 {
        let mut records = Vec::new();
        let mut index = Vec::new();
        for &(num, kind, field2, field3) in entries {
            records.push(kind);
            records.extend_from_slice(&(field2 as u32).to_be_bytes());
            records.extend_from_slice(&field3.to_be_bytes());
            index.push(format!("{} 1", num));
        }
        let size = entries.iter().map(|e| e.0).max().unwrap_or(0).max(id) + 1;
        let dict = format!(
            "/Type /XRef /W [1 4 2] /Index [{}] /Size {} {}",
            index.join(" "),
            size,
            extra
        );
        self.stream(id, &dict, &records)
    }

    fn finish(mut self, startxref: u64) -> Vec<u8> {
        self.data
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", startxref).as_bytes());
        self.data
    }
}

/// Body of an object stream holding `objects` in order, and its `/First`.
fn objstm_body(objects: &[(u32, &str)]) -> (Vec<u8>, usize) {
    let mut table = String::new();
    let mut bodies = String::new();
    for (num, body) in objects {
        table.push_str(&format!("{} {} ", num, bodies.len()));
        bodies.push_str(body);
        bodies.push('\n');
    }
    let first = table.len();
    table.push_str(&bodies);
    (table.into_bytes(), first)
}

/// Catalog 1, object stream 2 holding 10 and 11, xref stream 3.
fn compressed_pdf(flate: bool) -> Vec<u8> {
    let (body, first) = objstm_body(&[(10, "<< /Kind /Ten /Next 11 0 R >>"), (11, "(eleven)")]);
    let mut pdf = PdfBuilder::new();
    let catalog = pdf.object(1, "<< /Type /Catalog /Extra 10 0 R >>");
    let container = if flate {
        let filter = Filter::FlateDecode(PredictorParams::default());
        let encoded = filter.encode(&body).unwrap();
        pdf.stream(2, &format!("/Type /ObjStm /N 2 /First {} /Filter /FlateDecode", first), &encoded)
    } else {
        pdf.stream(2, &format!("/Type /ObjStm /N 2 /First {}", first), &body)
    };
    let xref = pdf.xref_stream(
        3,
        &[(1, 1, catalog, 0), (2, 1, container, 0), (10, 2, 2, 0), (11, 2, 2, 1)],
        "/Root 1 0 R",
    );
    pdf.finish(xref)
}

fn load(pdf: Vec<u8>) -> XRef {
    XRef::load(pdf, ParserOptions::default()).unwrap()
}

mod container_tests {
    use super::*;

    fn dict(n: i64, first: i64) -> Dictionary {
        [
            ("Type", Object::name("ObjStm")),
            ("N", Object::from(n)),
            ("First", Object::from(first)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_two_objects_in_either_order() {
        // Offset table "0 0 1 2", bodies start at /First.
        let data = b"0 0 1 2\n42 (two)".to_vec();
        let os = ObjectStream::new(&dict(2, 8), data).unwrap();

        assert_eq!(os.find(1, 1, 100), Some(Object::string(b"two".to_vec())));
        assert_eq!(os.find(0, 0, 100), Some(Object::from(42)));
        assert_eq!(os.find(1, 1, 100), Some(Object::string(b"two".to_vec())));
    }

    #[test]
    fn test_offset_table_overlapping_bodies() {
        // /First points into the offset table; pairs are still read up to /N.
        let os = ObjectStream::new(&dict(2, 4), b"0 0 1 2".to_vec()).unwrap();
        assert_eq!(os.len(), 2);
        assert_eq!(os.find(0, 0, 100), Some(Object::from(1)));
        assert_eq!(os.find(1, 1, 100), Some(Object::from(2)));
    }

    #[test]
    fn test_object_kinds() {
        let (body, first) = objstm_body(&[
            (4, "true"),
            (5, "null"),
            (6, "/Name"),
            (7, "[1 2.5 (s)]"),
            (8, "<< /Ref 4 0 R >>"),
        ]);
        let os = ObjectStream::new(&dict(5, first as i64), body).unwrap();
        assert_eq!(os.object_numbers().collect::<Vec<_>>(), vec![4, 5, 6, 7, 8]);
        assert_eq!(os.find(4, 0, 100).and_then(|o| o.as_bool()), Some(true));
        assert_eq!(os.find(5, 1, 100), Some(Object::Null));
        assert_eq!(os.find(6, 2, 100).as_ref().and_then(Object::as_name), Some("Name"));
        assert_eq!(os.find(7, 3, 100).as_ref().and_then(Object::as_array).map(Vec::len), Some(3));
        let reference = os.find(8, 4, 100).unwrap();
        assert_eq!(
            reference.as_dict().unwrap().get("Ref").and_then(Object::as_reference),
            Some(ObjectRef::new(4, 0))
        );
    }

    #[test]
    fn test_nesting_limit_applies() {
        let (body, first) = objstm_body(&[(3, "[[[[[[1]]]]]]")]);
        let os = ObjectStream::new(&dict(1, first as i64), body).unwrap();
        assert!(os.find(3, 0, 100).is_some());
        assert!(os.find(3, 0, 3).is_none());
    }
}

mod resolution_tests {
    use super::*;

    #[test]
    fn test_resolve_compressed_objects() {
        for flate in [false, true] {
            let mut xref = load(compressed_pdf(flate));
            assert_eq!(xref.entry(10).unwrap().entry_type(), EntryType::Compressed);

            let ten = xref.get_object(10).unwrap();
            let dict = ten.as_dict().unwrap();
            assert_eq!(dict.get_name("Kind"), Some("Ten"));
            let next = xref.resolve(dict.get("Next").unwrap()).unwrap();
            assert_eq!(next.as_string(), Some(&b"eleven"[..]));
        }
    }

    #[test]
    fn test_resolution_order_does_not_matter() {
        let mut forward = load(compressed_pdf(true));
        let a10 = forward.get_object(10).unwrap();
        let a11 = forward.get_object(11).unwrap();

        let mut backward = load(compressed_pdf(true));
        let b11 = backward.get_object(11).unwrap();
        let b10 = backward.get_object(10).unwrap();

        assert_eq!(a10, b10);
        assert_eq!(a11, b11);
    }

    #[test]
    fn test_container_decoded_once() {
        let mut xref = load(compressed_pdf(true));
        assert_eq!(xref.parse_count(), 0);
        xref.get_object(10).unwrap();
        // The container plus the member.
        assert_eq!(xref.parse_count(), 2);
        xref.get_object(11).unwrap();
        assert_eq!(xref.parse_count(), 3);

        let first = xref.get_object(11).unwrap();
        let second = xref.get_object(11).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(xref.parse_count(), 3);
    }

    #[test]
    fn test_container_that_is_not_a_stream() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let container = pdf.object(2, "<< /Type /ObjStm /N 1 /First 4 >>");
        let xref = pdf.xref_stream(
            3,
            &[(1, 1, catalog, 0), (2, 1, container, 0), (10, 2, 2, 0)],
            "/Root 1 0 R",
        );
        let mut xref = load(pdf.finish(xref));
        assert!(xref.get_object(10).unwrap().is_null());
        assert!(xref.get_object(1).unwrap().as_dict().is_some());
    }

    #[test]
    fn test_index_hint_may_be_wrong() {
        let (body, first) = objstm_body(&[(11, "(eleven)"), (10, "10")]);
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let container = pdf.stream(2, &format!("/Type /ObjStm /N 2 /First {}", first), &body);
        // Both entries claim index 0.
        let xref = pdf.xref_stream(
            3,
            &[(1, 1, catalog, 0), (2, 1, container, 0), (10, 2, 2, 0), (11, 2, 2, 0)],
            "/Root 1 0 R",
        );
        let mut xref = load(pdf.finish(xref));
        assert_eq!(xref.get_object(10).unwrap().as_integer(), Some(10));
        assert_eq!(xref.get_object(11).unwrap().as_string(), Some(&b"eleven"[..]));
    }

    #[test]
    fn test_damaged_container_only_affects_members() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let container = pdf.stream(2, "/Type /ObjStm /First 4", b"10 0 42");
        let other = pdf.object(4, "(intact)");
        let xref = pdf.xref_stream(
            3,
            &[(1, 1, catalog, 0), (2, 1, container, 0), (4, 1, other, 0), (10, 2, 2, 0)],
            "/Root 1 0 R",
        );
        let mut xref = load(pdf.finish(xref));
        // No /N: the container cannot be indexed.
        assert!(xref.get_object(10).unwrap().is_null());
        assert_eq!(xref.get_object(4).unwrap().as_string(), Some(&b"intact"[..]));
    }
}
