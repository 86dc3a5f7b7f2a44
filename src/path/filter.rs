//! Glob-style hierarchical filters over identifiers.
//!
//! `**` matches any run of segments (including none), `*` matches exactly
//! one segment, anything else matches literally. `pkg/**` selects the
//! `pkg` subtree; `**` selects everything.

use std::fmt;

use thiserror::Error;

use super::ident::Ident;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("empty filter")]
    Empty,

    #[error("empty segment in filter `{0}`")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seg {
    /// `**` - any number of segments, including zero
    Subtree,
    /// `*` - exactly one segment
    Any,
    Literal(String),
}

/// Hierarchical inclusion filter, parsed from text like `pkg/**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    segments: Vec<Seg>,
}

impl Filter {
    /// The filter matching every identifier.
    pub fn all() -> Self {
        Self {
            segments: vec![Seg::Subtree],
        }
    }

    pub fn parse(text: &str) -> Result<Self, FilterError> {
        if text.is_empty() {
            return Err(FilterError::Empty);
        }
        let mut segments = Vec::new();
        for seg in text.split('/') {
            match seg {
                "" => return Err(FilterError::EmptySegment(text.to_string())),
                "**" => segments.push(Seg::Subtree),
                "*" => segments.push(Seg::Any),
                lit => segments.push(Seg::Literal(lit.to_string())),
            }
        }
        Ok(Self { segments })
    }

    /// Whether the identifier matches this filter.
    pub fn matches(&self, id: &Ident) -> bool {
        matches_from(&self.segments, id.segments())
    }
}

fn matches_from(pattern: &[Seg], segments: &[String]) -> bool {
    match pattern.split_first() {
        None => segments.is_empty(),
        Some((Seg::Subtree, rest)) => {
            // Try consuming zero or more segments.
            (0..=segments.len()).any(|n| matches_from(rest, &segments[n..]))
        }
        Some((Seg::Any, rest)) => !segments.is_empty() && matches_from(rest, &segments[1..]),
        Some((Seg::Literal(lit), rest)) => match segments.split_first() {
            Some((seg, tail)) => seg == lit && matches_from(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match seg {
                Seg::Subtree => write!(f, "**")?,
                Seg::Any => write!(f, "*")?,
                Seg::Literal(lit) => write!(f, "{lit}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Ident {
        Ident::parse(text).unwrap()
    }

    #[test]
    fn test_match_all() {
        let filter = Filter::all();
        assert!(filter.matches(&id("main")));
        assert!(filter.matches(&id("pkg/sub/unit")));
    }

    #[test]
    fn test_match_subtree() {
        let filter = Filter::parse("pkg/**").unwrap();
        assert!(filter.matches(&id("pkg/unit")));
        assert!(filter.matches(&id("pkg/sub/deep/unit")));
        assert!(!filter.matches(&id("other/unit")));
        // `**` matches zero segments: `pkg` itself is in the subtree.
        assert!(filter.matches(&id("pkg")));
    }

    #[test]
    fn test_match_single_star() {
        let filter = Filter::parse("pkg/*").unwrap();
        assert!(filter.matches(&id("pkg/unit")));
        assert!(!filter.matches(&id("pkg/sub/unit")));
        assert!(!filter.matches(&id("pkg")));
    }

    #[test]
    fn test_match_literal() {
        let filter = Filter::parse("pkg/main").unwrap();
        assert!(filter.matches(&id("pkg/main")));
        assert!(!filter.matches(&id("pkg/other")));
    }

    #[test]
    fn test_match_infix_subtree() {
        let filter = Filter::parse("pkg/**/test").unwrap();
        assert!(filter.matches(&id("pkg/test")));
        assert!(filter.matches(&id("pkg/a/b/test")));
        assert!(!filter.matches(&id("pkg/a/b/other")));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Filter::parse(""), Err(FilterError::Empty));
        assert!(matches!(
            Filter::parse("a//b"),
            Err(FilterError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["**", "pkg/**", "pkg/*/unit", "a/b/c"] {
            let filter = Filter::parse(text).unwrap();
            assert_eq!(filter.to_string(), text);
            assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
        }
    }
}
