//! Stream filter pipeline.
//!
//! This module provides decoders and encoders for the PDF filters the object
//! store handles:
//! - FlateDecode (zlib/deflate) - most common
//! - LZWDecode - LZW compression, with `EarlyChange`
//! - ASCIIHexDecode - hexadecimal encoding
//! - ASCII85Decode - base85 encoding
//! - RunLengthDecode - run-length encoding
//! - JBIG2Decode - bi-level images (generic regions)
//!
//! Flate and LZW optionally carry a TIFF or PNG predictor. Filters are chained
//! in a [`FilterChain`], read from a stream's `/Filter` and `/DecodeParms`.
//!
//! Codecs never fail on damaged input: they stop at the damage and return the
//! bytes decoded so far. Only an unknown filter name is an error.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser_config::ParserOptions;

mod ascii85;
mod ascii_hex;
mod flate;
pub mod jbig2;
mod lzw;
pub mod mq;
pub mod predictor;
mod runlength;

pub use predictor::PredictorParams;

/// Parameters of a JBIG2Decode filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jbig2Params {
    /// Decoded contents of the `/JBIG2Globals` stream
    pub globals: Option<Vec<u8>>,
    /// Image width, needed only for encoding
    pub width: u32,
    /// Image height, needed only for encoding
    pub height: u32,
}

/// One PDF stream filter with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// FlateDecode (deflate/zlib compression)
    FlateDecode(PredictorParams),
    /// LZWDecode (Lempel-Ziv-Welch compression)
    LzwDecode {
        /// Grow the code width one code early (`/EarlyChange 1`, the default)
        early_change: bool,
        /// Predictor applied after decompression
        predictor: PredictorParams,
    },
    /// ASCIIHexDecode (hexadecimal encoding)
    AsciiHexDecode,
    /// ASCII85Decode (base-85 encoding)
    Ascii85Decode,
    /// RunLengthDecode (run-length encoding)
    RunLengthDecode,
    /// JBIG2Decode (bi-level image compression)
    Jbig2Decode(Jbig2Params),
}

impl Filter {
    /// Build a filter from its name (full or abbreviated inline-image form)
    /// and optional `/DecodeParms` dictionary.
    pub fn from_name(name: &str, params: Option<&Dictionary>) -> Result<Self> {
        let predictor = || params.map(PredictorParams::from_dict).unwrap_or_default();
        match name {
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode(predictor())),
            "LZWDecode" | "LZW" => Ok(Filter::LzwDecode {
                early_change: params
                    .and_then(|p| p.get_integer("EarlyChange"))
                    .map(|v| v != 0)
                    .unwrap_or(true),
                predictor: predictor(),
            }),
            "ASCIIHexDecode" | "AHx" => Ok(Filter::AsciiHexDecode),
            "ASCII85Decode" | "A85" => Ok(Filter::Ascii85Decode),
            "RunLengthDecode" | "RL" => Ok(Filter::RunLengthDecode),
            "JBIG2Decode" => Ok(Filter::Jbig2Decode(Jbig2Params::default())),
            other => Err(Error::UnsupportedFilter(other.to_string())),
        }
    }

    /// Filter name as written in `/Filter`.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::FlateDecode(_) => "FlateDecode",
            Filter::LzwDecode { .. } => "LZWDecode",
            Filter::AsciiHexDecode => "ASCIIHexDecode",
            Filter::Ascii85Decode => "ASCII85Decode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::Jbig2Decode(_) => "JBIG2Decode",
        }
    }

    /// Decode `input`, producing at most `limit` bytes.
    pub fn decode(&self, input: &[u8], limit: usize) -> Vec<u8> {
        match self {
            Filter::FlateDecode(predictor) => {
                apply_predictor(flate::decode(input, limit), predictor)
            },
            Filter::LzwDecode {
                early_change,
                predictor,
            } => apply_predictor(lzw::decode(input, *early_change, limit), predictor),
            Filter::AsciiHexDecode => ascii_hex::decode(input, limit),
            Filter::Ascii85Decode => ascii85::decode(input, limit),
            Filter::RunLengthDecode => runlength::decode(input, limit),
            Filter::Jbig2Decode(params) => jbig2::decode(input, params.globals.as_deref(), limit),
        }
    }

    /// Encode `input` so that [`Filter::decode`] gives it back.
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Filter::FlateDecode(predictor) => {
                flate::encode(&predictor::encode(input, predictor)?).map_err(Error::from)
            },
            Filter::LzwDecode {
                early_change,
                predictor,
            } => lzw::encode(&predictor::encode(input, predictor)?, *early_change),
            Filter::AsciiHexDecode => Ok(ascii_hex::encode(input)),
            Filter::Ascii85Decode => Ok(ascii85::encode(input)),
            Filter::RunLengthDecode => Ok(runlength::encode(input)),
            Filter::Jbig2Decode(params) => {
                if params.width == 0 || params.height == 0 {
                    return Err(Error::Decode(
                        "JBIG2 encoding needs the image /Width and /Height".to_string(),
                    ));
                }
                Ok(jbig2::encode(input, params.width, params.height))
            },
        }
    }

    /// `/DecodeParms` entries for this filter, `None` when all are defaults.
    pub fn params_dict(&self) -> Option<Dictionary> {
        let mut dict = Dictionary::new();
        match self {
            Filter::FlateDecode(predictor) => predictor.write_to_dict(&mut dict),
            Filter::LzwDecode {
                early_change,
                predictor,
            } => {
                if !early_change {
                    dict.insert("EarlyChange", Object::from(0));
                }
                predictor.write_to_dict(&mut dict);
            },
            _ => {},
        }
        (!dict.is_empty()).then_some(dict)
    }
}

fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Vec<u8> {
    if params.is_identity() {
        data
    } else {
        predictor::decode(&data, params)
    }
}

/// Ordered list of filters; decoding applies them first to last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Read `/Filter` and `/DecodeParms` from a stream dictionary.
    ///
    /// `resolve` turns indirect references into values; it is called on the
    /// filter entries, parameter dictionaries and the `/JBIG2Globals` stream.
    pub fn from_dict(
        dict: &Dictionary,
        resolve: &mut dyn FnMut(&Object) -> Object,
    ) -> Result<Self> {
        let Some(filter_obj) = dict.get("Filter") else {
            return Ok(Self::default());
        };

        let names: Vec<String> = match resolve(filter_obj) {
            Object::Name(name) => vec![name],
            Object::Array(items) => items
                .iter()
                .filter_map(|item| resolve(item).as_name().map(str::to_string))
                .collect(),
            Object::Null => Vec::new(),
            other => {
                return Err(Error::InvalidObjectType {
                    expected: "Name or Array".to_string(),
                    found: other.type_name().to_string(),
                })
            },
        };

        let params: Vec<Option<Dictionary>> = match dict.get("DecodeParms") {
            None => Vec::new(),
            Some(obj) => match resolve(obj) {
                Object::Dictionary(d) => vec![Some(d)],
                Object::Array(items) => items
                    .iter()
                    .map(|item| match resolve(item) {
                        Object::Dictionary(d) => Some(d),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            },
        };

        let mut filters = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let param = params.get(i).and_then(|p| p.as_ref());
            let mut filter = Filter::from_name(name, param)?;
            if let Filter::Jbig2Decode(jbig2) = &mut filter {
                jbig2.width = dict_dimension(dict, "Width", resolve);
                jbig2.height = dict_dimension(dict, "Height", resolve);
                jbig2.globals = param
                    .and_then(|p| p.get("JBIG2Globals"))
                    .map(|g| resolve(g))
                    .and_then(|g| match g {
                        Object::Stream(s) => s.decoded_data().ok(),
                        _ => None,
                    });
            }
            filters.push(filter);
        }

        Ok(Self { filters })
    }

    /// Decode through every filter in order.
    ///
    /// Output is capped at `options.max_decompressed_size`; a stream that
    /// reaches the cap is truncated with a warning.
    pub fn decode(&self, data: &[u8], options: &ParserOptions) -> Result<Vec<u8>> {
        let limit = options.decoded_limit();
        let mut current = data.to_vec();
        for filter in &self.filters {
            current = filter.decode(&current, limit);
            log::debug!("{}: {} bytes decoded", filter.name(), current.len());
        }
        if current.len() >= limit {
            log::warn!("Decoded stream reached the {} byte limit", limit);
        }
        Ok(current)
    }

    /// Encode through every filter, last to first.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for filter in self.filters.iter().rev() {
            current = filter.encode(&current)?;
        }
        Ok(current)
    }

    /// Set `/Filter` and `/DecodeParms` to describe this chain.
    pub fn write_to_dict(&self, dict: &mut Dictionary) {
        dict.remove("Filter");
        dict.remove("DecodeParms");
        match self.filters.as_slice() {
            [] => {},
            [single] => {
                dict.insert("Filter", Object::name(single.name()));
                if let Some(params) = single.params_dict() {
                    dict.insert("DecodeParms", Object::Dictionary(params));
                }
            },
            many => {
                dict.insert(
                    "Filter",
                    Object::Array(many.iter().map(|f| Object::name(f.name())).collect()),
                );
                let params: Vec<Object> = many
                    .iter()
                    .map(|f| f.params_dict().map(Object::Dictionary).unwrap_or(Object::Null))
                    .collect();
                if params.iter().any(|p| !p.is_null()) {
                    dict.insert("DecodeParms", Object::Array(params));
                }
            },
        }
    }
}

fn dict_dimension(dict: &Dictionary, key: &str, resolve: &mut dyn FnMut(&Object) -> Object) -> u32 {
    dict.get(key)
        .map(|v| resolve(v))
        .and_then(|v| v.as_integer())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}
