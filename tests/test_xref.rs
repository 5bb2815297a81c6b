//! Integration tests for cross-reference resolution.
//!
//! Tests:
//! - Incremental updates chained with /Prev, newest definition winning
//! - Objects moving between object streams and direct storage
//! - Hybrid files (/XRefStm in a classic trailer)
//! - Damage to one object never affecting the others
//! - Far-off object numbers not inflating the table
//! - Memoized, idempotent resolution
//! - Reconstruction when the cross-reference data is unusable

use pdf_objstore::decoders::{Filter, PredictorParams};
use pdf_objstore::document::PdfDocument;
use pdf_objstore::error::Error;
use pdf_objstore::object::{Object, ObjectRef};
use pdf_objstore::parser_config::ParserOptions;
use pdf_objstore::xref::{EntryType, XRef, XRefEntry};
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

    /// Classic section with one subsection per entry.
    fn classic_xref(&mut self, entries: &[(u32, u64)], trailer: &str) -> u64 {
        let offset = self.data.len() as u64;
        let mut out = String::from("xref\n0 1\n0000000000 65535 f \n");
        for (id, pos) in entries {
            out.push_str(&format!("{} 1\n{:010} 00000 n \n", id, pos));
        }
        out.push_str(&format!("trailer\n<< {} >>\n", trailer));
        self.data.extend_from_slice(out.as_bytes());
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

fn load(pdf: Vec<u8>) -> XRef {
    let _ = env_logger::builder().is_test(true).try_init();
    XRef::load(pdf, ParserOptions::default()).unwrap()
}

/// Object stream 4 holding 5 and 6, located by xref stream 7.
fn base_with_object_stream(pdf: &mut PdfBuilder) -> u64 {
    let catalog = pdf.object(1, "<< /Type /Catalog >>");
    let body = b"5 0 6 6 (old) (six)";
    let container = pdf.stream(4, "/Type /ObjStm /N 2 /First 8", body);
    pdf.xref_stream(
        7,
        &[(1, 1, catalog, 0), (4, 1, container, 0), (5, 2, 4, 0), (6, 2, 4, 1)],
        "/Root 1 0 R",
    )
}

mod incremental_update_tests {
    use super::*;

    #[test]
    fn test_newest_section_wins() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let title = pdf.object(2, "(first draft)");
        let kept = pdf.object(3, "(unchanged)");
        let base = pdf.classic_xref(&[(1, catalog), (2, title), (3, kept)], "/Size 4 /Root 1 0 R");

        let title = pdf.object(2, "(final)");
        let added = pdf.object(4, "(added)");
        let update = pdf.classic_xref(
            &[(2, title), (4, added)],
            &format!("/Size 5 /Root 1 0 R /Prev {}", base),
        );
        let mut xref = load(pdf.finish(update));

        assert_eq!(xref.get_object(2).unwrap().as_string(), Some(&b"final"[..]));
        assert_eq!(xref.get_object(3).unwrap().as_string(), Some(&b"unchanged"[..]));
        assert_eq!(xref.get_object(4).unwrap().as_string(), Some(&b"added"[..]));
        assert_eq!(xref.trailer().get_integer("Size"), Some(5));
        assert_eq!(xref.root(), Some(ObjectRef::new(1, 0)));
    }

    #[test]
    fn test_update_inherits_trailer_keys() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let info = pdf.object(2, "<< /Producer (base) >>");
        let base = pdf.classic_xref(&[(1, catalog), (2, info)], "/Size 3 /Root 1 0 R /Info 2 0 R");
        let extra = pdf.object(3, "7");
        let update = pdf.classic_xref(&[(3, extra)], &format!("/Size 4 /Prev {}", base));
        let xref = load(pdf.finish(update));

        assert_eq!(xref.root(), Some(ObjectRef::new(1, 0)));
        assert_eq!(xref.info(), Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn test_deleted_object_is_null() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let doomed = pdf.object(2, "(doomed)");
        let base = pdf.classic_xref(&[(1, catalog), (2, doomed)], "/Size 3 /Root 1 0 R");
        let update = pdf.xref_stream(8, &[(2, 0, 0, 1)], &format!("/Root 1 0 R /Prev {}", base));
        let mut xref = load(pdf.finish(update));

        assert!(!xref.entry(2).unwrap().is_in_use());
        assert!(xref.get_object(2).unwrap().is_null());
    }

    #[test]
    fn test_redefined_compressed_object_uses_direct_definition() {
        let mut pdf = PdfBuilder::new();
        let base = base_with_object_stream(&mut pdf);
        let replacement = pdf.object(5, "(new)");
        let update = pdf.classic_xref(&[(5, replacement)], &format!("/Size 8 /Root 1 0 R /Prev {}", base));
        let mut xref = load(pdf.finish(update));

        assert_eq!(xref.entry(5).unwrap().entry_type(), EntryType::Direct);
        assert_eq!(xref.get_object(5).unwrap().as_string(), Some(&b"new"[..]));
        // The sibling still comes from the object stream.
        assert_eq!(xref.get_object(6).unwrap().as_string(), Some(&b"six"[..]));
        // Loading the container for 6 does not bring the old 5 back.
        assert_eq!(xref.get_object(5).unwrap().as_string(), Some(&b"new"[..]));
    }

    #[test]
    fn test_redefined_compressed_object_resolved_after_sibling() {
        let mut pdf = PdfBuilder::new();
        let base = base_with_object_stream(&mut pdf);
        let replacement = pdf.object(5, "(new)");
        let update = pdf.classic_xref(&[(5, replacement)], &format!("/Size 8 /Root 1 0 R /Prev {}", base));
        let mut xref = load(pdf.finish(update));

        assert_eq!(xref.get_object(6).unwrap().as_string(), Some(&b"six"[..]));
        assert_eq!(xref.get_object(5).unwrap().as_string(), Some(&b"new"[..]));
    }

    #[test]
    fn test_object_moved_into_newer_object_stream() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let old = pdf.object(2, "(direct)");
        let base = pdf.classic_xref(&[(1, catalog), (2, old)], "/Size 3 /Root 1 0 R");
        let container = pdf.stream(3, "/Type /ObjStm /N 1 /First 4", b"2 0 (packed)");
        let update = pdf.xref_stream(
            4,
            &[(2, 2, 3, 0), (3, 1, container, 0)],
            &format!("/Root 1 0 R /Prev {}", base),
        );
        let mut xref = load(pdf.finish(update));

        assert_eq!(xref.get_object(2).unwrap().as_string(), Some(&b"packed"[..]));
    }

    #[test]
    fn test_stale_container_entry_is_null() {
        // Object 9 claims to live in object stream 4, which only holds 5 and 6.
        let mut pdf = PdfBuilder::new();
        let base = base_with_object_stream(&mut pdf);
        let update = pdf.xref_stream(10, &[(9, 2, 4, 1)], &format!("/Root 1 0 R /Prev {}", base));
        let mut xref = load(pdf.finish(update));

        assert!(xref.get_object(9).unwrap().is_null());
        assert_eq!(xref.get_object(6).unwrap().as_string(), Some(&b"six"[..]));
    }
}

mod hybrid_tests {
    use super::*;

    #[test]
    fn test_xrefstm_supplies_compressed_entries() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog /Extra 5 0 R >>");
        let container = pdf.stream(4, "/Type /ObjStm /N 1 /First 4", b"5 0 (hidden)");
        let stm = pdf.xref_stream(6, &[(4, 1, container, 0), (5, 2, 4, 0)], "");
        let table = pdf.classic_xref(&[(1, catalog)], &format!("/Size 7 /Root 1 0 R /XRefStm {}", stm));
        let mut xref = load(pdf.finish(table));

        assert_eq!(xref.entry(5).unwrap().entry_type(), EntryType::Compressed);
        assert_eq!(xref.get_object(5).unwrap().as_string(), Some(&b"hidden"[..]));
    }

    #[test]
    fn test_classic_entries_beat_xrefstm() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let direct = pdf.object(5, "(classic)");
        let container = pdf.stream(4, "/Type /ObjStm /N 1 /First 4", b"5 0 (stream)");
        let stm = pdf.xref_stream(6, &[(4, 1, container, 0), (5, 2, 4, 0)], "");
        let table = pdf.classic_xref(
            &[(1, catalog), (5, direct)],
            &format!("/Size 7 /Root 1 0 R /XRefStm {}", stm),
        );
        let mut xref = load(pdf.finish(table));

        assert_eq!(xref.get_object(5).unwrap().as_string(), Some(&b"classic"[..]));
    }
}

mod containment_tests {
    use super::*;

    fn flate(data: &[u8]) -> Vec<u8> {
        Filter::FlateDecode(PredictorParams::default()).encode(data).unwrap()
    }

    #[test]
    fn test_truncated_stream_does_not_affect_neighbours() {
        let contents: Vec<u8> = b"BT /F1 12 Tf (Hello) Tj ET\n".repeat(40);
        let mut encoded = flate(&contents);
        encoded.truncate(encoded.len() - 1);

        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let broken = pdf.stream(2, "/Filter /FlateDecode", &encoded);
        let after = pdf.object(3, "<< /Intact true >>");
        let table = pdf.classic_xref(&[(1, catalog), (2, broken), (3, after)], "/Size 4 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        for id in 1..4 {
            assert!(xref.get_object(id).is_ok(), "object {} raised an error", id);
        }
        assert_eq!(
            xref.get_object(3).unwrap().as_dict().unwrap().get("Intact").and_then(Object::as_bool),
            Some(true)
        );
        let stream = xref.get_object(2).unwrap();
        let decoded = xref.decoded_stream_data(stream.as_stream().unwrap()).unwrap();
        assert!(contents.starts_with(&decoded));
    }

    #[test]
    fn test_unparseable_object_is_null() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let bad = pdf.object(2, ">> ] garbage");
        let good = pdf.object(3, "[1 2 3]");
        let table = pdf.classic_xref(&[(1, catalog), (2, bad), (3, good)], "/Size 4 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        assert!(xref.get_object(2).unwrap().is_null());
        assert_eq!(xref.get_object(3).unwrap().as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_offset_past_end_is_null() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let table = pdf.classic_xref(&[(1, catalog), (2, 999_999)], "/Size 3 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        assert!(xref.get_object(2).unwrap().is_null());
        assert!(xref.get_object(1).unwrap().as_dict().is_some());
    }

    #[test]
    fn test_far_object_number_does_not_grow_table() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let table = pdf.classic_xref(&[(1, catalog), (8_388_607, 9)], "/Size 2 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        assert_eq!(xref.len(), 2);
        assert_eq!(xref.entry(8_388_607), None);
        assert!(xref.get_object(8_388_607).unwrap().is_null());
        assert!(xref.catalog().unwrap().as_dict().unwrap().is_type("Catalog"));
    }

    #[test]
    fn test_self_referencing_length_terminates() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let odd = pdf.object(2, "<< /Length 2 0 R >>\nstream\nabc\nendstream");
        let table = pdf.classic_xref(&[(1, catalog), (2, odd)], "/Size 3 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        // The nested lookup sees a null length and falls back to scanning.
        let stream = xref.get_object(2).unwrap();
        assert_eq!(stream.as_stream().unwrap().raw_buffer(), b"abc");
    }
}

mod memoization_tests {
    use super::*;

    #[test]
    fn test_resolution_is_idempotent() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        let pages = pdf.object(2, "<< /Type /Pages /Count 0 /Kids [] >>");
        let table = pdf.classic_xref(&[(1, catalog), (2, pages)], "/Size 3 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        let first = xref.get_object(2).unwrap();
        let count = xref.parse_count();
        let second = xref.get_object(2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(xref.parse_count(), count);

        let via_reference = xref.resolve(&Object::Reference(ObjectRef::new(2, 0))).unwrap();
        assert!(Arc::ptr_eq(&first, &via_reference));
    }

    #[test]
    fn test_failures_are_remembered() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let bad = pdf.object(2, ")");
        let table = pdf.classic_xref(&[(1, catalog), (2, bad)], "/Size 3 /Root 1 0 R");
        let mut xref = load(pdf.finish(table));

        assert!(xref.get_object(2).unwrap().is_null());
        let count = xref.parse_count();
        assert!(xref.get_object(2).unwrap().is_null());
        assert_eq!(xref.parse_count(), count);
    }
}

mod recovery_tests {
    use super::*;

    #[test]
    fn test_bad_startxref_reconstructs() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let value = pdf.object(2, "(found by scanning)");
        pdf.classic_xref(&[(1, catalog), (2, value)], "/Size 3 /Root 1 0 R");
        let bytes = pdf.finish(12345);

        let mut xref = XRef::load(bytes.clone(), ParserOptions::lenient()).unwrap();
        assert_eq!(xref.root(), Some(ObjectRef::new(1, 0)));
        assert_eq!(xref.get_object(2).unwrap().as_string(), Some(&b"found by scanning"[..]));

        assert!(XRef::load(bytes, ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_prev_loop_is_not_fatal() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let offset = pdf.data.len();
        let table = pdf.classic_xref(&[(1, catalog)], &format!("/Size 2 /Root 1 0 R /Prev {}", offset));
        let mut xref = load(pdf.finish(table));
        assert!(xref.catalog().unwrap().as_dict().is_some());
    }

    #[test]
    fn test_document_without_catalog_fails_to_open() {
        let mut pdf = PdfBuilder::new();
        let value = pdf.object(1, "42");
        let table = pdf.classic_xref(&[(1, value)], "/Size 2 /Root 1 0 R");
        let result = PdfDocument::from_bytes(pdf.finish(table));
        assert!(matches!(result, Err(Error::MissingCatalog)));
    }

    #[test]
    fn test_table_built_by_hand() {
        let mut pdf = PdfBuilder::new();
        let catalog = pdf.object(1, "<< /Type /Catalog >>");
        let bytes = pdf.finish(0);

        let mut table = pdf_objstore::xref::CrossRefTable::new();
        table.add_entry(1, XRefEntry::direct(catalog, 0));
        table.set_trailer([("Root", Object::from(ObjectRef::new(1, 0)))].into_iter().collect());
        let mut xref = XRef::from_table(bytes, table, ParserOptions::strict()).unwrap();
        assert!(xref.catalog().unwrap().as_dict().unwrap().is_type("Catalog"));
    }
}
