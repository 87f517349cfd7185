use std::fs;
use std::path::PathBuf;

use crate::error::{CoverageError, Result};

/// Script source file on disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path as recorded by the runtime.
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the raw file contents.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|source| CoverageError::SourceRead {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the full file contents as UTF-8 text.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| CoverageError::Decode {
            path: self.path.clone(),
        })
    }
}

/// One physical line of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// 1-based line number.
    pub number: u32,

    /// Line text without its terminator.
    pub text: &'a str,

    /// `"\n"`, `"\r\n"`, a lone `"\r"`, or `""` for a final unterminated line.
    pub terminator: &'a str,
}

/// Split `text` into physical lines, keeping each terminator so the lines
/// concatenate back to the original text.
///
/// Line breaks are the ones the lexer counts: `\r\n`, `\n` and a lone `\r`.
pub fn split_lines(text: &str) -> impl Iterator<Item = SourceLine<'_>> {
    let mut rest = text;
    let mut number = 0u32;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        number += 1;

        let (len, terminator_len) = match rest.find(|c: char| c == '\n' || c == '\r') {
            Some(i) if rest[i..].starts_with("\r\n") => (i, 2),
            Some(i) => (i, 1),
            None => (rest.len(), 0),
        };
        let (text, tail) = rest.split_at(len);
        let (terminator, tail) = tail.split_at(terminator_len);
        rest = tail;

        Some(SourceLine {
            number,
            text,
            terminator,
        })
    })
}
