//! PDF object types.
//!
//! The document graph is built from a closed set of values. Dictionaries keep
//! the key order they were read (or built) in, so a document written back out
//! looks like the one that was read. Dictionaries and streams also carry two
//! bookkeeping slots that the store itself never interprets: the object number
//! assigned when the value is about to be written, and an opaque [`Tag`] that
//! higher layers use to find a wrapper they cached for this value.

use crate::decoders::FilterChain;
use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use bytes::Bytes;
use indexmap::IndexMap;
use std::io::Write;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Numeric value; integers are stored exactly up to 2^53
    Number(f64),
    /// Name (without the leading /)
    Name(String),
    /// String bytes plus the syntax they were written in
    String(PdfString),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (ordered key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + data)
    Stream(Stream),
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// Opaque handle a higher layer attaches to a dictionary or stream.
///
/// The store copies it around with the value but never looks behind it; it is
/// typically an index into a side table owned by whoever set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

/// A PDF string: raw bytes plus whether it was written as `<hex>` or `(literal)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    hex: bool,
}

impl PdfString {
    /// A string that serializes in literal `( )` syntax.
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    /// A string that serializes in hexadecimal `< >` syntax.
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    /// The string's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the string came from (or will be written as) hex syntax.
    pub fn is_hex(&self) -> bool {
        self.hex
    }

    /// Replace the bytes, keeping the syntax flag.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
    }

    /// Consume the string and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// An ordered PDF dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<String, Object>,
    /// Object number assigned when this dictionary is about to be written
    pub obj_no: Option<u32>,
    /// Back-reference slot for higher layers
    pub tag: Option<Tag>,
}

impl PartialEq for Dictionary {
    // Bookkeeping slots are not part of the value.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.get(key)
    }

    /// Look up a key for mutation.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    /// Insert or replace a key. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Object) -> Option<Object> {
        self.entries.insert(key.into(), value)
    }

    /// Remove a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.entries.shift_remove(key)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Object)> {
        self.entries.iter()
    }

    /// Iterate mutably over entries in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Object)> {
        self.entries.iter_mut()
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Name value of `key`, if present and a name.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|o| o.as_name())
    }

    /// Integer value of `key`, if present and integral.
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|o| o.as_integer())
    }

    /// Whether `/Type` equals `type_name`.
    pub fn is_type(&self, type_name: &str) -> bool {
        self.get_name("Type") == Some(type_name)
    }
}

impl FromIterator<(String, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Object)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            obj_no: None,
            tag: None,
        }
    }
}

impl<'a> FromIterator<(&'a str, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (&'a str, Object)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// A stream: dictionary, byte buffer, and whether the buffer is already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dictionary,
    data: Bytes,
    decoded: bool,
}

impl Stream {
    /// Create a stream holding encoded data as read from a file.
    ///
    /// `/Length` is left as given; it is corrected on decode or write.
    pub fn new(dict: Dictionary, data: impl Into<Bytes>) -> Self {
        Self {
            dict,
            data: data.into(),
            decoded: false,
        }
    }

    /// Create a stream holding plain data with no filters.
    pub fn from_plain(mut dict: Dictionary, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        dict.remove("Filter");
        dict.remove("DecodeParms");
        dict.insert("Length", Object::from(data.len() as i64));
        Self {
            dict,
            data,
            decoded: true,
        }
    }

    /// The current buffer: encoded before [`Stream::decode`], plain after.
    pub fn raw_buffer(&self) -> &[u8] {
        &self.data
    }

    /// Whether the buffer holds decoded data.
    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    /// Replace the encoded buffer, e.g. after decryption.
    pub fn set_raw_buffer(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    /// Run the filter pipeline once and keep the result.
    ///
    /// A second call is a no-op. On success `/Filter` and `/DecodeParms` are
    /// removed and `/Length` equals the buffer length. A stream whose filters
    /// cannot be processed is left untouched and the error is returned.
    pub fn decode(&mut self) -> Result<()> {
        self.decode_with_options(&ParserOptions::default())
    }

    /// [`Stream::decode`] with explicit limits.
    pub fn decode_with_options(&mut self, options: &ParserOptions) -> Result<()> {
        if self.decoded {
            return Ok(());
        }
        let chain = FilterChain::from_dict(&self.dict, &mut |o: &Object| o.clone())?;
        let data = chain.decode(&self.data, options)?;
        self.finish_decode(data);
        Ok(())
    }

    fn finish_decode(&mut self, data: Vec<u8>) {
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.dict.insert("Length", Object::from(data.len() as i64));
        self.data = Bytes::from(data);
        self.decoded = true;
    }

    /// Decoded bytes without changing the stream.
    pub fn decoded_data(&self) -> Result<Vec<u8>> {
        if self.decoded {
            return Ok(self.data.to_vec());
        }
        let chain = FilterChain::from_dict(&self.dict, &mut |o: &Object| o.clone())?;
        chain.decode(&self.data, &ParserOptions::default())
    }

    /// Encode the (decoded) buffer through `chain` and record it in the dictionary.
    ///
    /// The stream is decoded first if needed. Filters apply in chain order on
    /// decode, so encoding runs them back to front.
    pub fn encode(&mut self, chain: &FilterChain) -> Result<()> {
        self.decode()?;
        if chain.is_empty() {
            return Ok(());
        }
        let encoded = chain.encode(&self.data)?;
        chain.write_to_dict(&mut self.dict);
        self.dict.insert("Length", Object::from(encoded.len() as i64));
        self.data = Bytes::from(encoded);
        self.decoded = false;
        Ok(())
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Number(i as f64)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Number(i as f64)
    }
}

impl From<u32> for Object {
    fn from(i: u32) -> Self {
        Object::Number(i as f64)
    }
}

impl From<f64> for Object {
    fn from(r: f64) -> Self {
        Object::Number(r)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<PdfString> for Object {
    fn from(s: PdfString) -> Self {
        Object::String(s)
    }
}

impl Object {
    /// Shorthand for a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Shorthand for a literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(PdfString::literal(bytes))
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Number(_) => "Number",
            Object::Name(_) => "Name",
            Object::String(_) => "String",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Integer value, if this is an integral number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Number(n) if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 => Some(*n as i64),
            _ => None,
        }
    }

    /// Numeric value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Name value.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    /// String bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Dictionary, including a stream's dictionary.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Mutable dictionary, including a stream's dictionary.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    /// Stream value.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Array value.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Reference value.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Check if this is a null object.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Dictionary lookup on a dictionary or stream; `None` for other values.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Whether an array holds a value equal to `needle`.
    pub fn array_contains(&self, needle: &Object) -> bool {
        self.as_array()
            .is_some_and(|items| items.iter().any(|item| item == needle))
    }

    /// Serialize this value in PDF syntax.
    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            Object::Null => w.write_all(b"null"),
            Object::Boolean(b) => w.write_all(if *b { b"true" } else { b"false" }),
            Object::Number(n) => write_number(w, *n),
            Object::Name(n) => write_name(w, n),
            Object::String(s) => write_string(w, s),
            Object::Array(items) => {
                w.write_all(b"[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        w.write_all(b" ")?;
                    }
                    item.write(w)?;
                }
                w.write_all(b"]")
            },
            Object::Dictionary(d) => write_dictionary(w, d, None),
            Object::Stream(s) => {
                write_dictionary(w, &s.dict, Some(s.data.len()))?;
                w.write_all(b"\nstream\n")?;
                w.write_all(&s.data)?;
                w.write_all(b"\nendstream")
            },
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    /// Serialize as an indirect object (`N G obj ... endobj`).
    pub fn write_indirect<W: Write>(&self, w: &mut W, id: u32, gen: u16) -> std::io::Result<()> {
        writeln!(w, "{} {} obj", id, gen)?;
        self.write(w)?;
        w.write_all(b"\nendobj\n")
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out);
        out
    }

    /// Expect a stream, for callers that need one.
    pub fn into_stream(self) -> Result<Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            other => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }
}

fn write_number<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    if !value.is_finite() {
        return w.write_all(b"0");
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        write!(w, "{}", value as i64)
    } else {
        let formatted = format!("{:.6}", value);
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        match trimmed {
            "-0" | "" => w.write_all(b"0"),
            t => w.write_all(t.as_bytes()),
        }
    }
}

fn write_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    w.write_all(b"/")?;
    for byte in name.bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && !matches!(
                byte,
                b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
            );
        if regular {
            w.write_all(&[byte])?;
        } else {
            write!(w, "#{:02X}", byte)?;
        }
    }
    Ok(())
}

fn write_string<W: Write>(w: &mut W, s: &PdfString) -> std::io::Result<()> {
    if s.is_hex() {
        w.write_all(b"<")?;
        for byte in s.as_bytes() {
            write!(w, "{:02X}", byte)?;
        }
        return w.write_all(b">");
    }
    w.write_all(b"(")?;
    for &byte in s.as_bytes() {
        match byte {
            b'(' => w.write_all(b"\\(")?,
            b')' => w.write_all(b"\\)")?,
            b'\\' => w.write_all(b"\\\\")?,
            // A bare CR would be read back as LF.
            b'\r' => w.write_all(b"\\r")?,
            _ => w.write_all(&[byte])?,
        }
    }
    w.write_all(b")")
}

fn write_dictionary<W: Write>(
    w: &mut W,
    dict: &Dictionary,
    stream_len: Option<usize>,
) -> std::io::Result<()> {
    w.write_all(b"<<")?;
    for (key, value) in dict.iter() {
        w.write_all(b" ")?;
        write_name(w, key)?;
        w.write_all(b" ")?;
        match (key.as_str(), stream_len) {
            ("Length", Some(len)) => write!(w, "{}", len)?,
            _ => value.write(w)?,
        }
    }
    if let Some(len) = stream_len {
        if !dict.contains_key("Length") {
            write!(w, " /Length {}", len)?;
        }
    }
    w.write_all(b" >>")
}
