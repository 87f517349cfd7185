use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while extracting, collecting or rendering coverage.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// A position-table entry with an unknown coordinate reached span construction.
    #[error(
        "invalid span ({start_line:?}, {end_line:?}, {start_col:?}, {end_col:?}): all coordinates are required"
    )]
    InvalidSpan {
        start_line: Option<u32>,
        end_line: Option<u32>,
        start_col: Option<u32>,
        end_col: Option<u32>,
    },

    /// Source file missing or unreadable.
    #[error("failed to read source file {path:?}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source file is not valid UTF-8.
    #[error("failed to decode source file {path:?} as UTF-8")]
    Decode { path: PathBuf },

    /// Source failed to parse.
    #[error("syntax error in {file}: {message}")]
    Syntax { file: String, message: String },

    /// A collector already owns the trace hook on this thread.
    #[error("a coverage collector is already active on this thread")]
    CollectorActive,
}

impl CoverageError {
    /// True for the per-file failures that degrade a report instead of aborting it.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            CoverageError::SourceRead { .. }
                | CoverageError::Decode { .. }
                | CoverageError::Syntax { .. }
        )
    }
}

pub type Result<T, E = CoverageError> = std::result::Result<T, E>;
