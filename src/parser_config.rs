/// Parser options for controlling error handling and recovery behavior.
///
/// These options trade strict PDF compliance for broader compatibility with
/// malformed files, and bound the resources a hostile file can consume.
///
/// # Example
///
/// ```
/// use pdf_objstore::parser_config::ParserOptions;
///
/// let strict = ParserOptions::strict();
/// let lenient = ParserOptions::lenient();
///
/// let custom = ParserOptions {
///     max_decompressed_size: 8 * 1024 * 1024,
///     ..ParserOptions::lenient()
/// };
/// assert!(!custom.strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fail on recoverable syntax deviations (true) or repair them (false)
    pub strict: bool,

    /// Maximum object nesting depth (DoS protection)
    ///
    /// PDF Spec: ISO 32000-1:2008, Section H.1 - Implementation Limits
    pub max_nesting: usize,

    /// Maximum decoded size of a single stream in bytes
    ///
    /// A decoder that reaches this limit stops and returns what it has.
    /// Set to 0 to disable the check.
    pub max_decompressed_size: usize,

    /// Maximum number of `/Prev` hops followed when reading incremental updates
    pub max_xref_chain: usize,

    /// Rebuild the cross-reference table by scanning the file when the
    /// declared one is unusable
    pub reconstruct_xref: bool,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: reject damaged files instead of repairing them.
    pub fn strict() -> Self {
        Self {
            strict: true,
            max_nesting: 100, // PDF spec recommended limit
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_xref_chain: 100,
            reconstruct_xref: false,
        }
    }

    /// Lenient mode: recover from damage wherever possible.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 100,
            max_decompressed_size: 100 * 1024 * 1024,
            max_xref_chain: 100,
            reconstruct_xref: true,
        }
    }

    /// Output cap handed to the decoders; `usize::MAX` when unlimited.
    pub(crate) fn decoded_limit(&self) -> usize {
        match self.max_decompressed_size {
            0 => usize::MAX,
            n => n,
        }
    }
}
