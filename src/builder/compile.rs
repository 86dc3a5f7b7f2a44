//! The compiler seam.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::content::CompiledUnit;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A problem in the source text, anchored at a byte offset.
    #[error("{file}: {message}")]
    Syntax {
        file: PathBuf,
        offset: usize,
        message: String,
    },

    #[error("i/o error during compilation")]
    Io(#[from] io::Error),
}

/// One compiled unit, attributed to the source file it came from.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file: PathBuf,
    pub unit: CompiledUnit,
}

/// A whole-set compiler: given the source files of a pass, produce the
/// compiled units or the first error encountered.
pub trait Compiler: Send + Sync {
    fn compile(&self, files: &[PathBuf]) -> Result<Vec<Artifact>, CompileError>;
}

/// Wraps each source file's bytes in a compiled-unit container verbatim.
///
/// Stands in until a real language frontend is plugged in; exercises the
/// whole pipeline (classification, rules, output placement, flushing)
/// without one.
pub struct PassthroughCompiler;

impl Compiler for PassthroughCompiler {
    fn compile(&self, files: &[PathBuf]) -> Result<Vec<Artifact>, CompileError> {
        files
            .iter()
            .map(|file| {
                let bytes = std::fs::read(file)?;
                Ok(Artifact {
                    file: file.clone(),
                    unit: CompiledUnit::new(bytes),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_wraps_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.src");
        std::fs::write(&file, "hello").unwrap();

        let artifacts = PassthroughCompiler.compile(&[file.clone()]).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file, file);
        assert_eq!(artifacts[0].unit.body(), b"hello");
    }

    #[test]
    fn test_passthrough_missing_file_is_io_error() {
        let result = PassthroughCompiler.compile(&[PathBuf::from("/nonexistent.src")]);
        assert!(matches!(result, Err(CompileError::Io(_))));
    }
}
