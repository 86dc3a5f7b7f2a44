//! Project configuration (`kiln.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),
}

/// Project-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Project name, used in logs only.
    pub name: String,
    /// Location of the build path document, relative to the project root.
    pub buildpath: PathBuf,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: "project".to_string(),
            buildpath: PathBuf::from("buildpath.xml"),
        }
    }
}

/// Build behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Watch-mode debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Suffix of source units.
    pub source_suffix: String,
    /// Suffix of compiled units.
    pub compiled_suffix: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            source_suffix: "src".to_string(),
            compiled_suffix: "bin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    pub build: BuildSection,
}

impl ProjectConfig {
    /// Load from a `kiln.toml`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            debug!("config"; "no {} found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert_eq!(config.project.buildpath, PathBuf::from("buildpath.xml"));
        assert_eq!(config.build.debounce_ms, 300);
        assert_eq!(config.build.source_suffix, "src");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ProjectConfig::load(Path::new("/nonexistent/kiln.toml")).unwrap();
        assert_eq!(config.project.name, "project");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        fs::write(
            &path,
            r#"
[project]
name = "demo"

[build]
source_suffix = "calc"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.build.source_suffix, "calc");
        // Unspecified fields keep their defaults.
        assert_eq!(config.build.compiled_suffix, "bin");
        assert_eq!(config.build.debounce_ms, 300);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        fs::write(&path, "[project\nname=").unwrap();
        assert!(matches!(
            ProjectConfig::load(&path),
            Err(ConfigError::Toml(_))
        ));
    }
}
