use std::path::PathBuf;

use thiserror::Error;

use super::lexer::ParseError;

/// Failure raised while loading or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("ImportError: {0}")]
    Import(String),

    #[error("RecursionError: maximum recursion depth exceeded")]
    Recursion,

    /// Raised by a `raise` statement; carries the display form of the value.
    #[error("{0}")]
    Raised(String),

    /// Raised by the `exit` builtin.
    #[error("SystemExit: {0}")]
    Exit(i64),

    #[error("SyntaxError in {file}: {error}")]
    Syntax { file: String, error: ParseError },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    /// Location of the innermost failing statement.
    #[error("{file}, line {line}: {source}")]
    At {
        file: String,
        line: u32,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// The underlying error with any location wrapper removed.
    pub fn root(&self) -> &ScriptError {
        match self {
            ScriptError::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// Exit code if this is a system exit.
    pub fn exit_code(&self) -> Option<i64> {
        match self.root() {
            ScriptError::Exit(code) => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn has_location(&self) -> bool {
        matches!(self, ScriptError::At { .. })
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
