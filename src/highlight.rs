//! Reconcile candidate branch spans with a trace session and render source
//! text with every character classified as covered, uncovered, or plain.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::warn;
use serde::Serialize;

use crate::collector::TraceSession;
use crate::error::Result;
use crate::extract;
use crate::source::{SourceFile, SourceLine, split_lines};
use crate::span::Span;

/// Classification of a rendered piece of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Part of a branch the trace reached.
    Covered,
    /// Part of a branch the trace never reached.
    Uncovered,
    /// Not part of any branch.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

/// Rendered file: segments in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledText {
    segments: Vec<Segment>,
}

impl StyledText {
    /// Append a segment; empty text is dropped.
    pub fn push(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        self.segments.push(Segment {
            text: text.to_string(),
            style,
        });
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Text without any styling.
    pub fn plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Text with covered parts wrapped as `{+..}` and uncovered parts as `{-..}`.
    pub fn annotate(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StyledText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment.style {
                Style::Covered => write!(f, "{{+{}}}", segment.text)?,
                Style::Uncovered => write!(f, "{{-{}}}", segment.text)?,
                Style::Plain => f.write_str(&segment.text)?,
            }
        }
        Ok(())
    }
}

/// One leaf candidate span and whether the trace reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchCoverage {
    pub span: Span,
    pub covered: bool,
}

/// Per-file cache entry.
#[derive(Debug, Default)]
struct FileBranches {
    /// Leaf candidates sorted by start position.
    candidates: Vec<Span>,
    visited: HashSet<Span>,
    error: Option<String>,
}

impl FileBranches {
    fn is_covered(&self, span: &Span) -> bool {
        self.visited.contains(span)
    }
}

/// Renders the files of one trace session.
pub struct Highlighter<'s> {
    session: &'s TraceSession,
    cache: RefCell<HashMap<PathBuf, Rc<FileBranches>>>,
}

impl<'s> Highlighter<'s> {
    pub fn new(session: &'s TraceSession) -> Self {
        Self {
            session,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Distinct files referenced by the session, sorted by path.
    pub fn files(&self) -> Vec<&'s Path> {
        self.session.files().into_iter().collect()
    }

    /// Leaf branches of `path` with their coverage, left to right.
    pub fn branches(&self, path: &Path) -> Vec<BranchCoverage> {
        let file = self.file(path);
        file.candidates
            .iter()
            .map(|span| BranchCoverage {
                span: *span,
                covered: file.is_covered(span),
            })
            .collect()
    }

    /// Why `path` has no candidate spans, if extraction failed.
    pub fn extraction_error(&self, path: &Path) -> Option<String> {
        self.file(path).error.clone()
    }

    /// Render `path` line by line.
    ///
    /// Concatenating the segments reproduces the file's text exactly.
    pub fn render_file(&self, path: &Path) -> Result<StyledText> {
        let text = SourceFile::new(path).read_to_string()?;
        let file = self.file(path);

        let mut out = StyledText::default();
        for line in split_lines(&text) {
            render_line(&mut out, &line, &file);
        }
        Ok(out)
    }

    fn file(&self, path: &Path) -> Rc<FileBranches> {
        if let Some(cached) = self.cache.borrow().get(path) {
            return cached.clone();
        }

        let entry = Rc::new(self.load(path));
        self.cache
            .borrow_mut()
            .insert(path.to_path_buf(), entry.clone());
        entry
    }

    fn load(&self, path: &Path) -> FileBranches {
        let visited = self.session.visited(path).copied().collect();

        match extract::parse_file(path) {
            Ok(spans) => {
                let mut candidates: Vec<Span> = spans.collect();
                candidates.sort_by_key(|span| span.start);
                FileBranches {
                    candidates,
                    visited,
                    error: None,
                }
            }
            Err(err) => {
                warn!("no branch candidates for {}: {err}", path.display());
                FileBranches {
                    candidates: Vec::new(),
                    visited,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

/// Clip `span` to the byte range it occupies on `line`.
fn clip(span: &Span, line: &SourceLine<'_>) -> (usize, usize) {
    let len = line.text.len();
    let start = if span.start.line < line.number {
        0
    } else {
        span.start.col as usize
    };
    let end = if span.end.line > line.number {
        len
    } else {
        span.end.col as usize
    };
    (start.min(len), end.min(len))
}

fn render_line(out: &mut StyledText, line: &SourceLine<'_>, file: &FileBranches) {
    let mut ranges: Vec<(usize, usize, Style)> = file
        .candidates
        .iter()
        .filter(|span| span.touches_line(line.number))
        .map(|span| {
            let (start, end) = clip(span, line);
            let style = if file.is_covered(span) {
                Style::Covered
            } else {
                Style::Uncovered
            };
            (start, end, style)
        })
        .filter(|(start, end, _)| start < end)
        .collect();
    ranges.sort_by_key(|&(start, _, _)| start);

    let off_boundary = ranges.iter().any(|&(start, end, _)| {
        !line.text.is_char_boundary(start) || !line.text.is_char_boundary(end)
    });
    if off_boundary {
        warn!("branch columns off character boundaries on line {}", line.number);
        out.push(line.text, Style::Plain);
        out.push(line.terminator, Style::Plain);
        return;
    }

    let mut cursor = 0;
    for (start, end, style) in ranges {
        debug_assert!(
            start >= cursor,
            "overlapping branch ranges on line {}",
            line.number
        );
        let start = start.max(cursor);
        let end = end.max(start);

        out.push(&line.text[cursor..start], Style::Plain);
        out.push(&line.text[start..end], style);
        cursor = end;
    }
    out.push(&line.text[cursor..], Style::Plain);
    out.push(line.terminator, Style::Plain);
}
