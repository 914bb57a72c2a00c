//! Payload compression
//!
//! Oversized values are compressed before they are persisted and tagged with
//! [`COMPRESSION_TAG`] so they can be recognized when read back. Untagged
//! strings are always treated as plain text.
//!
//! The codec fails open: a payload that cannot be compressed is stored as-is,
//! and a payload that cannot be decompressed is handed back in its raw tagged
//! form. The strict `try_*` variants surface the error instead.

use std::sync::Arc;
use thiserror::Error;

/// Literal prefix marking a string as codec output
pub const COMPRESSION_TAG: &str = "COMPRESSED:";

/// Default minimum payload length (in characters) that qualifies for compression
pub const DEFAULT_THRESHOLD: usize = 100;

/// Codec error types
#[derive(Debug, Error)]
pub enum CodecError {
    /// No compression engine is installed
    #[error("Compression engine unavailable")]
    Unavailable,

    /// The engine failed to compress a payload
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// The tagged payload does not decode to a valid string
    #[error("Corrupted payload: {0}")]
    Corrupted(String),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Reversible string transform used by the codec
pub trait Compression: Send + Sync {
    /// Compress a plain string into a transport-safe string
    fn compress(&self, input: &str) -> Result<String>;

    /// Decompress a string produced by [`Compression::compress`]
    ///
    /// Returns `None` when the input is not valid compressed data.
    fn decompress(&self, input: &str) -> Option<String>;
}

/// LZ-string compression using the URI-component alphabet
///
/// Output is byte-compatible with `LZString.compressToEncodedURIComponent`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzStringCompression;

impl Compression for LzStringCompression {
    fn compress(&self, input: &str) -> Result<String> {
        Ok(lz_str::compress_to_encoded_uri_component(input))
    }

    fn decompress(&self, input: &str) -> Option<String> {
        let wide = lz_str::decompress_from_encoded_uri_component(input)?;
        let decoded = String::from_utf16(&wide).ok()?;

        // Garbage input can decode to nothing; only the real encoding of "" may
        if decoded.is_empty() && input != lz_str::compress_to_encoded_uri_component("") {
            return None;
        }
        Some(decoded)
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Enable compression of outgoing payloads
    pub enabled: bool,
    /// Minimum payload length in UTF-16 code units
    pub threshold: usize,
    /// Keys allowed to compress (empty means any key over the threshold)
    pub keys: Vec<String>,
    /// Log before/after sizes for each operation
    pub logging: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: false, threshold: DEFAULT_THRESHOLD, keys: Vec::new(), logging: false }
    }
}

impl CompressionConfig {
    /// Create a configuration with compression enabled
    pub fn enabled(threshold: usize) -> Self {
        Self { enabled: true, threshold, ..Default::default() }
    }

    /// Restrict compression to the given keys
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable compression logging
    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }
}

/// Snapshot of the codec state, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStatus {
    /// Whether compression is enabled
    pub enabled: bool,
    /// Current threshold
    pub threshold: usize,
    /// Allow-listed keys
    pub keys: Vec<String>,
    /// Whether compression logging is on
    pub logging_enabled: bool,
    /// Whether a compression engine is installed
    pub engine_available: bool,
}

/// Check whether a string carries the compression tag
pub fn is_tagged(payload: &str) -> bool {
    payload.starts_with(COMPRESSION_TAG)
}

/// Size-gated payload codec
#[derive(Clone)]
pub struct Codec {
    config: CompressionConfig,
    engine: Option<Arc<dyn Compression>>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("config", &self.config)
            .field("engine_available", &self.engine.is_some())
            .finish()
    }
}

impl Codec {
    /// Create a codec backed by LZ-string compression
    pub fn new(config: CompressionConfig) -> Self {
        Self::with_engine(config, Arc::new(LzStringCompression))
    }

    /// Create a codec backed by a custom engine
    pub fn with_engine(config: CompressionConfig, engine: Arc<dyn Compression>) -> Self {
        Self { config, engine: Some(engine) }
    }

    /// Create a codec with no engine installed
    ///
    /// Nothing is ever compressed and tagged payloads are returned raw.
    pub fn without_engine(config: CompressionConfig) -> Self {
        Self { config, engine: None }
    }

    /// Current configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Whether an engine is installed
    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Enable compression with a threshold and optional key allow-list
    pub fn enable(&mut self, threshold: usize, keys: Vec<String>) {
        self.config.enabled = true;
        self.config.threshold = threshold;
        self.config.keys = keys;

        if self.config.logging {
            tracing::info!(threshold, keys = ?self.config.keys, "compression enabled");
        }
    }

    /// Disable compression of outgoing payloads
    ///
    /// Already-compressed payloads still decode.
    pub fn disable(&mut self) {
        self.config.enabled = false;

        if self.config.logging {
            tracing::info!("compression disabled");
        }
    }

    /// Toggle compression logging
    pub fn set_logging(&mut self, enabled: bool) {
        self.config.logging = enabled;
    }

    /// Current status
    pub fn status(&self) -> CompressionStatus {
        CompressionStatus {
            enabled: self.config.enabled,
            threshold: self.config.threshold,
            keys: self.config.keys.clone(),
            logging_enabled: self.config.logging,
            engine_available: self.is_available(),
        }
    }

    /// Decide whether the serialized value stored under `key` should compress
    ///
    /// Length is counted in UTF-16 code units, so a character outside the
    /// Basic Multilingual Plane counts twice.
    pub fn should_compress(&self, key: &str, serialized: &str) -> bool {
        if !self.config.enabled || self.engine.is_none() {
            return false;
        }

        if !self.config.keys.is_empty() {
            return self.config.keys.iter().any(|k| k == key);
        }

        serialized.encode_utf16().count() >= self.config.threshold
    }

    /// Compress a payload and tag it
    pub fn try_compress(&self, payload: &str) -> Result<String> {
        let engine = self.engine.as_ref().ok_or(CodecError::Unavailable)?;
        let compressed = engine.compress(payload)?;
        let tagged = format!("{}{}", COMPRESSION_TAG, compressed);

        if self.config.logging {
            let before = payload.encode_utf16().count();
            let after = tagged.encode_utf16().count();
            let savings = if before == 0 {
                0
            } else {
                ((1.0 - after as f64 / before as f64) * 100.0).round() as i64
            };
            tracing::info!(before, after, savings_percent = savings, "payload compressed");
        }

        Ok(tagged)
    }

    /// Compress a payload, falling back to the untagged input on failure
    pub fn compress(&self, payload: &str) -> String {
        match self.try_compress(payload) {
            Ok(tagged) => tagged,
            Err(e) => {
                tracing::error!(error = %e, "compression failed, storing plain payload");
                payload.to_string()
            }
        }
    }

    /// Decompress a tagged payload
    ///
    /// Untagged input is returned unchanged.
    pub fn try_decompress(&self, payload: &str) -> Result<String> {
        let Some(body) = payload.strip_prefix(COMPRESSION_TAG) else {
            return Ok(payload.to_string());
        };

        let engine = self.engine.as_ref().ok_or(CodecError::Unavailable)?;
        let decoded = engine.decompress(body).ok_or_else(|| {
            let preview: String = body.chars().take(32).collect();
            CodecError::Corrupted(preview)
        })?;

        if self.config.logging {
            tracing::info!(
                before = payload.encode_utf16().count(),
                after = decoded.encode_utf16().count(),
                "payload decompressed"
            );
        }

        Ok(decoded)
    }

    /// Decompress a tagged payload, leaving it raw when it cannot be decoded
    pub fn decompress(&self, payload: &str) -> String {
        match self.try_decompress(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(error = %e, "decompression failed, keeping raw payload");
                payload.to_string()
            }
        }
    }

    /// Route a serialized value through the codec if it qualifies
    pub fn encode_for_storage(&self, key: &str, serialized: String) -> String {
        if self.should_compress(key, &serialized) {
            self.compress(&serialized)
        } else {
            serialized
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingCompression;

    impl Compression for FailingCompression {
        fn compress(&self, _input: &str) -> Result<String> {
            Err(CodecError::CompressionFailed("boom".to_string()))
        }

        fn decompress(&self, _input: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = Codec::new(CompressionConfig::enabled(10));
        let original = "{\"inventory\":[\"sword\",\"shield\",\"potion\"],\"gold\":1200}";

        let tagged = codec.compress(original);
        assert!(is_tagged(&tagged));
        assert_eq!(codec.decompress(&tagged), original);
    }

    #[test]
    fn test_round_trip_unicode() {
        let codec = Codec::new(CompressionConfig::enabled(1));
        let original = "Монеты: 150 ✓ ünï";

        let tagged = codec.try_compress(original).unwrap();
        assert_eq!(codec.try_decompress(&tagged).unwrap(), original);
    }

    #[test]
    fn test_threshold_boundary() {
        let codec = Codec::new(CompressionConfig::enabled(100));

        assert!(!codec.should_compress("key", &"a".repeat(99)));
        assert!(codec.should_compress("key", &"a".repeat(100)));
    }

    #[test]
    fn test_threshold_counts_utf16_units() {
        let codec = Codec::new(CompressionConfig::enabled(4));

        // Two emoji are two chars but four code units
        assert!(codec.should_compress("key", "😀😀"));
        assert!(!codec.should_compress("key", "😀a"));
        assert!(!codec.should_compress("key", "äöü"));
    }

    #[test]
    fn test_disabled_never_compresses() {
        let codec = Codec::new(CompressionConfig::default());
        assert!(!codec.should_compress("key", &"a".repeat(1000)));
    }

    #[test]
    fn test_key_allow_list() {
        let codec = Codec::new(CompressionConfig::enabled(100).keys(["map"]));

        assert!(codec.should_compress("map", "short"));
        assert!(!codec.should_compress("coins", &"a".repeat(500)));
    }

    #[test]
    fn test_unavailable_engine() {
        let codec = Codec::without_engine(CompressionConfig::enabled(1));

        assert!(!codec.should_compress("key", "payload"));
        assert!(matches!(codec.try_compress("payload"), Err(CodecError::Unavailable)));
        assert_eq!(codec.compress("payload"), "payload");
        assert_eq!(codec.decompress("COMPRESSED:abc"), "COMPRESSED:abc");
        assert!(!codec.status().engine_available);
    }

    #[test]
    fn test_compress_failure_is_fail_open() {
        let codec =
            Codec::with_engine(CompressionConfig::enabled(1), Arc::new(FailingCompression));
        assert_eq!(codec.compress("payload"), "payload");
    }

    #[test]
    fn test_untagged_passthrough() {
        let codec = Codec::default();
        assert_eq!(codec.decompress("plain value"), "plain value");
        assert_eq!(codec.try_decompress("plain value").unwrap(), "plain value");
    }

    #[test]
    fn test_corrupted_payload_kept_raw() {
        let codec = Codec::with_engine(CompressionConfig::enabled(1), Arc::new(FailingCompression));
        let raw = "COMPRESSED:this-is-not-lz";

        assert!(matches!(codec.try_decompress(raw), Err(CodecError::Corrupted(_))));
        assert_eq!(codec.decompress(raw), raw);
    }

    #[test]
    fn test_empty_string_round_trip() {
        let codec = Codec::new(CompressionConfig::enabled(0));
        let tagged = codec.compress("");
        assert_eq!(codec.try_decompress(&tagged).unwrap(), "");
    }

    #[test]
    fn test_enable_disable() {
        let mut codec = Codec::default();
        codec.enable(5, vec!["save".to_string()]);

        let status = codec.status();
        assert!(status.enabled);
        assert_eq!(status.threshold, 5);
        assert_eq!(status.keys, vec!["save".to_string()]);

        codec.disable();
        assert!(!codec.status().enabled);
    }

    #[test]
    fn test_encode_for_storage() {
        let codec = Codec::new(CompressionConfig::enabled(10));

        assert_eq!(codec.encode_for_storage("k", "short".to_string()), "short");
        assert!(is_tagged(&codec.encode_for_storage("k", "a".repeat(50))));
    }
}
