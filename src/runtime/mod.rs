//! Host runtime for traced scripts.
//!
//! A small interpreter for a Python-flavoured scripting language. It exposes
//! the two things a branch-coverage collector needs from its host: a syntax
//! tree with exact sub-expression positions, and a per-thread trace hook that
//! reports every executed line together with the position table of the unit
//! being executed.

pub mod ast;
mod builtins;
pub mod code;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod trace;
pub mod value;

pub use code::{Code, RawPosition};
pub use error::{ScriptError, ScriptResult};
pub use interp::{Interpreter, MAIN_MODULE};
pub use lexer::ParseError;
pub use trace::{EventKind, Frame, TraceEvent, TraceFn, gettrace, settrace};
