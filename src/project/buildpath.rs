//! The build path document.
//!
//! A declarative description of source roots, output roots, external
//! library roots and inclusion filters, persisted as XML:
//!
//! ```xml
//! <buildpath output="bin">
//!   <rule src="src" includes="**" output="bin"/>
//!   <library path="lib/stdlib.zip" includes="**"/>
//! </buildpath>
//! ```
//!
//! The root `output` attribute is the project-wide default output folder;
//! it is substituted into rules at resolution time, not at parse time, so
//! editing it later retroactively affects every rule without an explicit
//! override. A document missing a required attribute is rejected
//! wholesale.

use std::path::PathBuf;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::path::{Filter, FilterError};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("xml error")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed attribute")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("write error")]
    Io(#[from] std::io::Error),

    #[error("missing <buildpath> root element")]
    MissingRoot,

    #[error("<{element}> element missing required `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("bad inclusion filter")]
    Filter(#[from] FilterError),
}

/// A build rule: compile sources under a folder, filtered by an
/// inclusion pattern, into an output folder. Without an explicit output
/// the project default applies; without that, sources compile in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRule {
    pub source: PathBuf,
    pub includes: Filter,
    pub output: Option<PathBuf>,
}

/// An external library: a read-only location assumed to hold
/// already-compiled units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub location: PathBuf,
    pub includes: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEntry {
    Rule(BuildRule),
    Library(Library),
}

/// The parsed build path: default output plus ordered entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildPath {
    pub default_output: Option<PathBuf>,
    pub entries: Vec<PathEntry>,
}

impl BuildPath {
    /// The conventional layout used when no document exists: everything
    /// under `src/` compiles into `bin/`.
    pub fn default_layout() -> Self {
        Self {
            default_output: Some(PathBuf::from("bin")),
            entries: vec![PathEntry::Rule(BuildRule {
                source: PathBuf::from("src"),
                includes: Filter::all(),
                output: None,
            })],
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &BuildRule> {
        self.entries.iter().filter_map(|e| match e {
            PathEntry::Rule(rule) => Some(rule),
            PathEntry::Library(_) => None,
        })
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.entries.iter().filter_map(|e| match e {
            PathEntry::Library(lib) => Some(lib),
            PathEntry::Rule(_) => None,
        })
    }

    /// Serialize to an XML document.
    pub fn to_xml(&self) -> Result<String, ParseError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("buildpath");
        if let Some(output) = &self.default_output {
            root.push_attribute(("output", output.to_string_lossy().as_ref()));
        }
        writer.write_event(Event::Start(root))?;

        for entry in &self.entries {
            match entry {
                PathEntry::Rule(rule) => {
                    let mut el = BytesStart::new("rule");
                    el.push_attribute(("src", rule.source.to_string_lossy().as_ref()));
                    el.push_attribute(("includes", rule.includes.to_string().as_str()));
                    if let Some(output) = &rule.output {
                        el.push_attribute(("output", output.to_string_lossy().as_ref()));
                    }
                    writer.write_event(Event::Empty(el))?;
                }
                PathEntry::Library(lib) => {
                    let mut el = BytesStart::new("library");
                    el.push_attribute(("path", lib.location.to_string_lossy().as_ref()));
                    el.push_attribute(("includes", lib.includes.to_string().as_str()));
                    writer.write_event(Event::Empty(el))?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("buildpath")))?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Parse an XML document. Any missing required attribute rejects the
    /// whole document; unknown elements are skipped.
    pub fn from_xml(text: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut buildpath = BuildPath::default();
        let mut saw_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(el) | Event::Empty(el) => match el.name().as_ref() {
                    b"buildpath" => {
                        saw_root = true;
                        buildpath.default_output =
                            get_attr(&el, "output")?.map(PathBuf::from);
                    }
                    b"rule" => {
                        let source = require_attr(&el, "rule", "src")?;
                        let includes = require_attr(&el, "rule", "includes")?;
                        let output = get_attr(&el, "output")?.map(PathBuf::from);
                        buildpath.entries.push(PathEntry::Rule(BuildRule {
                            source: PathBuf::from(source),
                            includes: Filter::parse(&includes)?,
                            output,
                        }));
                    }
                    b"library" => {
                        let location = require_attr(&el, "library", "path")?;
                        let includes = require_attr(&el, "library", "includes")?;
                        buildpath.entries.push(PathEntry::Library(Library {
                            location: PathBuf::from(location),
                            includes: Filter::parse(&includes)?,
                        }));
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(ParseError::MissingRoot);
        }
        Ok(buildpath)
    }
}

fn get_attr(el: &BytesStart<'_>, name: &str) -> Result<Option<String>, ParseError> {
    for attr in el.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(
    el: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, ParseError> {
    get_attr(el, attribute)?.ok_or(ParseError::MissingAttribute { element, attribute })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildPath {
        BuildPath {
            default_output: Some(PathBuf::from("bin")),
            entries: vec![
                PathEntry::Rule(BuildRule {
                    source: PathBuf::from("src"),
                    includes: Filter::parse("**").unwrap(),
                    output: None,
                }),
                PathEntry::Rule(BuildRule {
                    source: PathBuf::from("gen"),
                    includes: Filter::parse("pkg/**").unwrap(),
                    output: Some(PathBuf::from("gen-bin")),
                }),
                PathEntry::Library(Library {
                    location: PathBuf::from("lib/stdlib.zip"),
                    includes: Filter::parse("**").unwrap(),
                }),
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let path = sample();
        let xml = path.to_xml().unwrap();
        let parsed = BuildPath::from_xml(&xml).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn test_round_trip_no_default_output() {
        let path = BuildPath {
            default_output: None,
            entries: vec![PathEntry::Rule(BuildRule {
                source: PathBuf::from("src"),
                includes: Filter::all(),
                output: None,
            })],
        };
        let parsed = BuildPath::from_xml(&path.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn test_parse_explicit_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<buildpath output="out">
  <rule src="sources" includes="app/**"/>
  <library path="vendor/base.zip" includes="**"/>
</buildpath>"#;
        let path = BuildPath::from_xml(xml).unwrap();
        assert_eq!(path.default_output, Some(PathBuf::from("out")));
        assert_eq!(path.entries.len(), 2);
        assert_eq!(path.rules().count(), 1);
        assert_eq!(path.libraries().count(), 1);
    }

    #[test]
    fn test_missing_src_rejects_whole_document() {
        let xml = r#"<buildpath output="bin">
  <rule includes="**"/>
  <rule src="src" includes="**"/>
</buildpath>"#;
        assert!(matches!(
            BuildPath::from_xml(xml),
            Err(ParseError::MissingAttribute {
                element: "rule",
                attribute: "src",
            })
        ));
    }

    #[test]
    fn test_missing_library_path_rejected() {
        let xml = r#"<buildpath><library includes="**"/></buildpath>"#;
        assert!(matches!(
            BuildPath::from_xml(xml),
            Err(ParseError::MissingAttribute {
                element: "library",
                attribute: "path",
            })
        ));
    }

    #[test]
    fn test_missing_root_rejected() {
        assert!(matches!(
            BuildPath::from_xml(""),
            Err(ParseError::MissingRoot)
        ));
    }

    #[test]
    fn test_unknown_elements_skipped() {
        let xml = r#"<buildpath><unknown foo="bar"/><rule src="s" includes="**"/></buildpath>"#;
        let path = BuildPath::from_xml(xml).unwrap();
        assert_eq!(path.entries.len(), 1);
    }

    #[test]
    fn test_default_layout() {
        let path = BuildPath::default_layout();
        assert_eq!(path.default_output, Some(PathBuf::from("bin")));
        assert_eq!(path.rules().count(), 1);
    }
}
