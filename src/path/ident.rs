//! Hierarchical entry identifiers.
//!
//! An [`Ident`] names an entry within a root: an ordered sequence of
//! non-empty segments, written `pkg/sub/unit`. The suffix is not part of
//! the identifier; the content kind carries it.

use std::fmt;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentError {
    #[error("empty identifier")]
    Empty,

    #[error("empty segment in identifier `{0}`")]
    EmptySegment(String),
}

/// Hierarchical, order-significant identifier of an entry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    segments: Vec<String>,
}

impl Ident {
    /// Parse from `/`-separated text. Rejects empty segments.
    pub fn parse(text: &str) -> Result<Self, IdentError> {
        if text.is_empty() {
            return Err(IdentError::Empty);
        }
        let mut segments = Vec::new();
        for seg in text.split('/') {
            if seg.is_empty() {
                return Err(IdentError::EmptySegment(text.to_string()));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<String>) -> Result<Self, IdentError> {
        if segments.is_empty() {
            return Err(IdentError::Empty);
        }
        if let Some(bad) = segments.iter().find(|s| s.is_empty()) {
            return Err(IdentError::EmptySegment(bad.clone()));
        }
        Ok(Self { segments })
    }

    /// Build an identifier from a path relative to its root, dropping the
    /// file suffix from the last segment. Returns `None` for paths with
    /// non-UTF8 components or no file name.
    pub fn from_rel_path(rel: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for comp in rel.components() {
            let seg = comp.as_os_str().to_str()?;
            segments.push(seg.to_string());
        }
        let last = segments.pop()?;
        let stem = match last.rsplit_once('.') {
            Some((stem, _suffix)) if !stem.is_empty() => stem.to_string(),
            _ => last,
        };
        segments.push(stem);
        Ident::from_segments(segments).ok()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> &str {
        // Non-empty by construction
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Relative file path for this identifier with the given suffix.
    pub fn to_rel_path(&self, suffix: &str) -> std::path::PathBuf {
        let mut joined = self.segments.join("/");
        if !suffix.is_empty() {
            joined.push('.');
            joined.push_str(suffix);
        }
        std::path::PathBuf::from(joined)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

// Debug as the slash-joined form; the segment vector adds only noise.
impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_and_display() {
        let id = Ident::parse("pkg/sub/unit").unwrap();
        assert_eq!(id.segments().len(), 3);
        assert_eq!(id.to_string(), "pkg/sub/unit");
        assert_eq!(id.last(), "unit");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Ident::parse(""), Err(IdentError::Empty));
        assert!(matches!(
            Ident::parse("a//b"),
            Err(IdentError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_from_rel_path_strips_suffix() {
        let id = Ident::from_rel_path(&PathBuf::from("pkg/main.src")).unwrap();
        assert_eq!(id.to_string(), "pkg/main");
    }

    #[test]
    fn test_from_rel_path_no_suffix() {
        let id = Ident::from_rel_path(&PathBuf::from("pkg/README")).unwrap();
        assert_eq!(id.to_string(), "pkg/README");
    }

    #[test]
    fn test_from_rel_path_dotfile() {
        // A leading dot is a hidden file, not a suffix separator.
        let id = Ident::from_rel_path(&PathBuf::from(".gitignore")).unwrap();
        assert_eq!(id.to_string(), ".gitignore");
    }

    #[test]
    fn test_to_rel_path() {
        let id = Ident::parse("pkg/main").unwrap();
        assert_eq!(id.to_rel_path("bin"), PathBuf::from("pkg/main.bin"));
        assert_eq!(id.to_rel_path(""), PathBuf::from("pkg/main"));
    }

    #[test]
    fn test_ordering_is_segment_wise() {
        let a = Ident::parse("a/b").unwrap();
        let b = Ident::parse("a/c").unwrap();
        assert!(a < b);
    }
}
