//! Branch-level coverage for short-circuit and conditional expressions.
//!
//! A [`collector::Collector`] records the position tables of every unit a
//! script executes, [`extract`] finds the branch sub-expressions of each
//! file, and a [`highlight::Highlighter`] reconciles the two into source text
//! where each character is covered, uncovered, or not part of a branch.

pub mod cli;
pub mod collector;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod options;
pub mod run_report;
pub mod runtime;
pub mod source;
pub mod span;
pub mod ui;
