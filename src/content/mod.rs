//! Content classification and the compiled-unit container format.
//!
//! Every entry in a root carries a [`ContentKind`]. Classification is
//! two-phase: the suffix proposes a kind, and for compiled candidates the
//! self-describing header must actually decode before the kind is
//! accepted. A corrupt or foreign binary file classifies as opaque data,
//! never as a build output.

use std::path::Path;

use thiserror::Error;

/// Compiled-unit container magic.
const MAGIC: [u8; 4] = *b"KBC1";

/// Current container format version.
const FORMAT_VERSION: u8 = 1;

/// Header size: magic + version + body length + blake3 checksum.
const HEADER_LEN: usize = 4 + 1 + 4 + 32;

// ============================================================================
// ContentKind
// ============================================================================

/// Kind of an entry, determines how the builder treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentKind {
    /// Source unit - user-edited, input to the compiler
    Source,
    /// Compiled unit - produced by the builder or shipped in a library
    Compiled,
    /// Opaque data - carried along, never compiled
    Opaque,
}

impl ContentKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Compiled => "compiled",
            Self::Opaque => "opaque",
        }
    }
}

// ============================================================================
// ContentRegistry
// ============================================================================

/// Suffix table mapping file extensions to content kinds.
///
/// An explicit value, constructed once per process and passed to every
/// root and namespace constructor. Tests build their own fixture
/// registries instead of sharing a global.
#[derive(Debug, Clone)]
pub struct ContentRegistry {
    source_suffix: String,
    compiled_suffix: String,
}

impl Default for ContentRegistry {
    fn default() -> Self {
        Self::new("src", "bin")
    }
}

impl ContentRegistry {
    pub fn new(source_suffix: impl Into<String>, compiled_suffix: impl Into<String>) -> Self {
        Self {
            source_suffix: source_suffix.into(),
            compiled_suffix: compiled_suffix.into(),
        }
    }

    /// Propose a kind from a suffix alone, without verification.
    ///
    /// A compiled candidate still needs [`classify`](Self::classify) to
    /// confirm its header decodes.
    pub fn kind_of_suffix(&self, suffix: &str) -> ContentKind {
        if suffix == self.source_suffix {
            ContentKind::Source
        } else if suffix == self.compiled_suffix {
            ContentKind::Compiled
        } else {
            ContentKind::Opaque
        }
    }

    /// Propose a kind from a file path's extension.
    pub fn kind_of_path(&self, path: &Path) -> ContentKind {
        let suffix = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.kind_of_suffix(suffix)
    }

    /// Classify an entry from its suffix and payload.
    ///
    /// Compiled candidates are verified by decoding the container header;
    /// on failure the entry is opaque data. Returns the decoded unit
    /// alongside the kind so the caller can seed the entry's cache and
    /// avoid a second read.
    pub fn classify(&self, suffix: &str, bytes: &[u8]) -> (ContentKind, Option<CompiledUnit>) {
        match self.kind_of_suffix(suffix) {
            ContentKind::Compiled => match CompiledUnit::decode(bytes) {
                Ok(unit) => (ContentKind::Compiled, Some(unit)),
                Err(_) => (ContentKind::Opaque, None),
            },
            kind => (kind, None),
        }
    }

    /// The file suffix used when persisting entries of the given kind.
    pub fn suffix_for(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Source => &self.source_suffix,
            ContentKind::Compiled => &self.compiled_suffix,
            ContentKind::Opaque => "dat",
        }
    }

    pub fn source_suffix(&self) -> &str {
        &self.source_suffix
    }

    pub fn compiled_suffix(&self) -> &str {
        &self.compiled_suffix
    }
}

// ============================================================================
// CompiledUnit
// ============================================================================

/// Errors decoding a compiled-unit container.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated container: {actual} bytes, need at least {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic: not a compiled unit")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("body length mismatch: header says {declared}, found {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// A decoded compiled unit: format version plus body bytes.
///
/// On disk the container is self-describing: magic, version byte, body
/// length (u32 LE) and a blake3 checksum of the body, followed by the
/// body itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    version: u8,
    body: Vec<u8>,
}

impl CompiledUnit {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            version: FORMAT_VERSION,
            body,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// blake3 checksum of the body.
    pub fn checksum(&self) -> blake3::Hash {
        blake3::hash(&self.body)
    }

    /// Encode into the on-disk container format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(&MAGIC);
        out.push(self.version);
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(self.checksum().as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Decode a container, verifying magic, version, length and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = bytes[4];
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let declared = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
        let body = &bytes[HEADER_LEN..];
        if body.len() != declared {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }
        let expected: [u8; 32] = bytes[9..41].try_into().unwrap_or([0; 32]);
        let actual = blake3::hash(body);
        if actual.as_bytes() != &expected {
            return Err(DecodeError::ChecksumMismatch {
                expected: hex::encode(expected),
                actual: actual.to_hex().to_string(),
            });
        }
        Ok(Self {
            version,
            body: body.to_vec(),
        })
    }
}
