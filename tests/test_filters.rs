//! Integration tests for the stream filter pipeline.
//!
//! Covers:
//! - Decode(Encode(x)) == x for every filter, including empty input
//! - LZW code-width boundaries and cross-checking against an independent encoder
//! - PNG and TIFF predictor reconstruction
//! - Filter chains read from stream dictionaries
//! - Damaged input producing partial output instead of errors

use flate2::write::ZlibEncoder;
use flate2::Compression;
use pdf_objstore::decoders::predictor::{self, PredictorParams};
use pdf_objstore::decoders::{Filter, FilterChain, Jbig2Params};
use pdf_objstore::object::{Dictionary, Object, Stream};
use pdf_objstore::parser_config::ParserOptions;
use proptest::prelude::*;
use std::io::Write;
use weezl::{encode::Encoder as LzwEncoder, BitOrder};

const NO_LIMIT: usize = usize::MAX;

fn identity(o: &Object) -> Object {
    o.clone()
}

fn lzw(early_change: bool) -> Filter {
    Filter::LzwDecode {
        early_change,
        predictor: PredictorParams::default(),
    }
}

fn png(predictor: u8, columns: usize) -> PredictorParams {
    PredictorParams {
        predictor,
        columns,
        ..Default::default()
    }
}

/// Filters whose encoders accept any byte buffer.
fn byte_filters() -> Vec<Filter> {
    vec![
        Filter::FlateDecode(PredictorParams::default()),
        Filter::FlateDecode(png(15, 7)),
        Filter::FlateDecode(PredictorParams {
            predictor: 2,
            columns: 5,
            colors: 3,
            bits_per_component: 8,
        }),
        lzw(true),
        lzw(false),
        Filter::LzwDecode {
            early_change: true,
            predictor: png(12, 4),
        },
        Filter::AsciiHexDecode,
        Filter::Ascii85Decode,
        Filter::RunLengthDecode,
    ]
}

/// Pseudo-random input of `len` bytes; nearly every byte emits an LZW code,
/// so the table size tracks the input length.
fn lzw_codes(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    let mut state: u32 = 0x1234_5678;
    while data.len() < len {
        // xorshift keeps neighbouring bytes different often enough
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state & 0xFF) as u8);
    }
    data
}

mod roundtrip_tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        for filter in byte_filters() {
            let encoded = filter.encode(b"").unwrap();
            assert!(
                filter.decode(&encoded, NO_LIMIT).is_empty(),
                "{} did not round-trip an empty buffer",
                filter.name()
            );
        }
    }

    #[test]
    fn test_lzw_width_boundaries() {
        // Table sizes where the code width changes, with and without early change.
        for early_change in [true, false] {
            for len in [253, 254, 255, 509, 510, 511, 1021, 1022, 1023, 2045, 2046, 2047, 3836, 3837, 3838, 5000] {
                let data = lzw_codes(len);
                let filter = lzw(early_change);
                let encoded = filter.encode(&data).unwrap();
                assert_eq!(
                    filter.decode(&encoded, NO_LIMIT),
                    data,
                    "LZW early_change={} failed with {} input bytes",
                    early_change,
                    len
                );
            }
        }
    }

    #[test]
    fn test_lzw_repetitive_input() {
        let data: Vec<u8> = b"ABABABABABABAB".iter().cycle().take(20_000).copied().collect();
        for early_change in [true, false] {
            let filter = lzw(early_change);
            let encoded = filter.encode(&data).unwrap();
            assert!(encoded.len() < data.len() / 4);
            assert_eq!(filter.decode(&encoded, NO_LIMIT), data);
        }
    }

    #[test]
    fn test_jbig2_image() {
        let (width, height) = (24u32, 6u32);
        let samples: Vec<u8> = (0..18u8).map(|i| i.wrapping_mul(37) ^ 0x5A).collect();
        let filter = Filter::Jbig2Decode(Jbig2Params {
            globals: None,
            width,
            height,
        });
        let encoded = filter.encode(&samples).unwrap();
        assert_eq!(filter.decode(&encoded, NO_LIMIT), samples);
    }

    proptest! {
        #[test]
        fn prop_byte_filters_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            for filter in byte_filters() {
                let encoded = filter.encode(&data).unwrap();
                prop_assert_eq!(filter.decode(&encoded, NO_LIMIT), data.clone(), "{}", filter.name());
            }
        }

        #[test]
        fn prop_chain_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let chain = FilterChain::new(vec![
                Filter::Ascii85Decode,
                Filter::FlateDecode(png(15, 3)),
                Filter::RunLengthDecode,
            ]);
            let encoded = chain.encode(&data).unwrap();
            prop_assert_eq!(chain.decode(&encoded, &ParserOptions::default()).unwrap(), data);
        }

        #[test]
        fn prop_jbig2_roundtrip(
            stride in 1usize..5,
            height in 1u32..12,
            seed in any::<u64>(),
        ) {
            let len = stride * height as usize;
            let mut state = seed | 1;
            let samples: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 7;
                    state ^= state >> 9;
                    state as u8
                })
                .collect();
            let filter = Filter::Jbig2Decode(Jbig2Params {
                globals: None,
                width: (stride * 8) as u32,
                height,
            });
            let encoded = filter.encode(&samples).unwrap();
            prop_assert_eq!(filter.decode(&encoded, NO_LIMIT), samples);
        }
    }
}

mod interop_tests {
    use super::*;

    #[test]
    fn test_lzw_decodes_weezl_output() {
        let original: Vec<u8> = b"This is a test of LZWDecode in a PDF stream. "
            .iter()
            .cycle()
            .take(4000)
            .copied()
            .collect();

        let mut encoder = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
        let compressed = encoder.encode(&original).unwrap();
        assert_eq!(lzw(true).decode(&compressed, NO_LIMIT), original);

        let mut encoder = LzwEncoder::new(BitOrder::Msb, 8);
        let compressed = encoder.encode(&original).unwrap();
        assert_eq!(lzw(false).decode(&compressed, NO_LIMIT), original);
    }

    #[test]
    fn test_flate_decodes_zlib_output() {
        let original = b"This is a test of FlateDecode compression in a PDF stream.";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let filter = Filter::from_name("FlateDecode", None).unwrap();
        assert_eq!(filter.decode(&compressed, NO_LIMIT), original);
    }

    #[test]
    fn test_ascii85_reference_string() {
        let filter = Filter::Ascii85Decode;
        assert_eq!(filter.decode(b"87cURD]i,\"Ebo80~>", NO_LIMIT), b"Hello World");
        assert_eq!(filter.decode(b"z~>", NO_LIMIT), vec![0u8; 4]);
    }

    #[test]
    fn test_ascii_hex_odd_digit_count() {
        let filter = Filter::AsciiHexDecode;
        assert_eq!(filter.decode(b"48 65 6C 6C 6F>", NO_LIMIT), b"Hello");
        // A final odd digit is padded with 0.
        assert_eq!(filter.decode(b"7>", NO_LIMIT), vec![0x70]);
    }
}

mod predictor_tests {
    use super::*;

    #[test]
    fn test_sub_row_worked_example() {
        // Row [10, 20, 30] Sub-encoded against an all-zero previous row.
        let params = png(11, 3);
        assert_eq!(predictor::decode(&[1, 10, 10, 10], &params), vec![10, 20, 30]);
        assert_eq!(predictor::encode(&[10, 20, 30], &params).unwrap(), vec![1, 10, 10, 10]);
    }

    #[test]
    fn test_every_png_tag_reconstructs_reference_rows() {
        let reference: Vec<u8> = vec![10, 20, 30, 12, 25, 31, 200, 4, 90];
        for tag in 0u8..=4 {
            let params = png(10 + tag, 3);
            let encoded = predictor::encode(&reference, &params).unwrap();
            assert_eq!(encoded.len(), 12);
            for row in encoded.chunks(4) {
                assert_eq!(row[0], tag);
            }
            assert_eq!(predictor::decode(&encoded, &params), reference, "PNG tag {}", tag);
        }
    }

    #[test]
    fn test_known_encoded_rows() {
        let params = png(10, 3);
        // Row 0: Up against zeros, row 1: Average, row 2: Paeth.
        let encoded = [2, 10, 20, 30, 3, 7, 9, 4, 4, 188, 60, 86];
        assert_eq!(
            predictor::decode(&encoded, &params),
            vec![10, 20, 30, 12, 25, 31, 200, 4, 90]
        );
    }

    #[test]
    fn test_optimum_picks_per_row() {
        let rows: Vec<u8> = (0..64u8).collect();
        let params = png(15, 8);
        let encoded = predictor::encode(&rows, &params).unwrap();
        assert_eq!(predictor::decode(&encoded, &params), rows);
        // A linear ramp compresses best with Sub.
        assert_eq!(encoded[9], 1);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = PredictorParams {
            predictor: 2,
            columns: 4,
            ..Default::default()
        };
        assert_eq!(predictor::decode(&[5, 1, 1, 1], &params), vec![5, 6, 7, 8]);
    }
}

mod pipeline_tests {
    use super::*;

    #[test]
    fn test_stream_decode_updates_dictionary() {
        let chain = FilterChain::new(vec![Filter::AsciiHexDecode, Filter::FlateDecode(PredictorParams::default())]);
        let mut stream = Stream::from_plain(Dictionary::new(), b"stream contents".to_vec());
        stream.encode(&chain).unwrap();
        assert!(stream.dict.contains_key("Filter"));
        assert_ne!(stream.raw_buffer(), b"stream contents");

        stream.decode().unwrap();
        assert!(stream.is_decoded());
        assert_eq!(stream.raw_buffer(), b"stream contents");
        assert!(!stream.dict.contains_key("Filter"));
        assert_eq!(stream.dict.get_integer("Length"), Some(15));

        // A second decode is a no-op.
        stream.decode().unwrap();
        assert_eq!(stream.raw_buffer(), b"stream contents");
    }

    #[test]
    fn test_unknown_filter_leaves_stream_alone() {
        let dict: Dictionary = [("Filter", Object::name("DCTDecode"))].into_iter().collect();
        let mut stream = Stream::new(dict, b"\xFF\xD8\xFF".to_vec());
        assert!(stream.decode().is_err());
        assert!(!stream.is_decoded());
        assert_eq!(stream.raw_buffer(), b"\xFF\xD8\xFF");
    }

    #[test]
    fn test_truncated_flate_keeps_prefix() {
        let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let filter = Filter::from_name("FlateDecode", None).unwrap();
        let mut encoded = filter.encode(&original).unwrap();
        encoded.truncate(encoded.len() - 1);

        let decoded = filter.decode(&encoded, NO_LIMIT);
        assert!(decoded.len() <= original.len());
        assert_eq!(&original[..decoded.len()], &decoded[..]);
    }

    #[test]
    fn test_decompression_bomb_capped() {
        let filter = Filter::from_name("FlateDecode", None).unwrap();
        let encoded = filter.encode(&vec![0u8; 1 << 20]).unwrap();
        let options = ParserOptions {
            max_decompressed_size: 4096,
            ..ParserOptions::default()
        };
        let decoded = FilterChain::new(vec![filter]).decode(&encoded, &options).unwrap();
        assert_eq!(decoded.len(), 4096);
    }

    #[test]
    fn test_overflowing_predictor_columns_pass_through() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&[2, 1, 2, 3]).unwrap();
        let body = zlib.finish().unwrap();

        let parms: Dictionary = [("Predictor", Object::from(12)), ("Columns", Object::from(i64::MAX))]
            .into_iter()
            .collect();
        let dict: Dictionary = [
            ("Filter", Object::name("FlateDecode")),
            ("DecodeParms", Object::Dictionary(parms)),
        ]
        .into_iter()
        .collect();
        let mut stream = Stream::new(dict, body);
        stream.decode().unwrap();
        // The predictor cannot apply, so the inflated bytes come back as-is.
        assert_eq!(stream.raw_buffer(), &[2, 1, 2, 3]);
    }

    #[test]
    fn test_single_name_and_single_params() {
        let dict: Dictionary = [
            ("Filter", Object::name("LZWDecode")),
            (
                "DecodeParms",
                Object::Dictionary([("EarlyChange", Object::from(0))].into_iter().collect()),
            ),
        ]
        .into_iter()
        .collect();
        let chain = FilterChain::from_dict(&dict, &mut identity).unwrap();
        assert_eq!(chain.filters(), &[lzw(false)]);
    }
}
