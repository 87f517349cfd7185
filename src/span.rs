use serde::Serialize;

use crate::error::CoverageError;

/// Position inside a source file.
///
/// Lines are 1-based. Columns are 0-based UTF-8 byte offsets into the line,
/// which is the unit the lexer counts in.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    /// 1-based line number.
    pub line: u32,

    /// 0-based byte column within `line`.
    pub col: u32,
}

impl Pos {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Half-open range of source text, `start` inclusive and `end` exclusive.
///
/// Spans are deliberately not `Ord`: containment is only a partial order, so
/// callers that need a left-to-right order sort by [`Span::start`] explicitly.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Build a span from a raw position-table entry.
    ///
    /// Fails with [`CoverageError::InvalidSpan`] if any coordinate is unknown.
    pub fn from_raw(
        start_line: Option<u32>,
        end_line: Option<u32>,
        start_col: Option<u32>,
        end_col: Option<u32>,
    ) -> Result<Self, CoverageError> {
        match (start_line, end_line, start_col, end_col) {
            (Some(sl), Some(el), Some(sc), Some(ec)) => {
                Ok(Self::new(Pos::new(sl, sc), Pos::new(el, ec)))
            }
            _ => Err(CoverageError::InvalidSpan {
                start_line,
                end_line,
                start_col,
                end_col,
            }),
        }
    }

    /// True if `self` strictly contains `other`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && self.end >= other.end && !self.equals(other)
    }

    /// Structural equality of both endpoints.
    pub fn equals(&self, other: &Span) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// True if the span covers no text.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True if any part of the span lies on `line`.
    pub fn touches_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(Pos::new(sl, sc), Pos::new(el, ec))
    }

    #[test]
    fn from_raw_requires_all_coordinates() {
        assert_eq!(
            Span::from_raw(Some(1), Some(1), Some(0), Some(3)).unwrap(),
            span(1, 0, 1, 3)
        );
        assert!(matches!(
            Span::from_raw(Some(1), Some(1), None, Some(3)),
            Err(CoverageError::InvalidSpan { .. })
        ));
        assert!(Span::from_raw(None, None, None, None).is_err());
    }

    #[test]
    fn containment_is_strict() {
        let outer = span(1, 0, 1, 10);
        let inner = span(1, 2, 1, 4);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outer));
    }

    #[test]
    fn containment_spans_lines() {
        let outer = span(1, 8, 3, 2);
        let inner = span(2, 0, 2, 40);
        assert!(outer.contains(&inner));
    }

    #[test]
    fn disjoint_and_crossing_spans_are_incomparable() {
        let a = span(1, 0, 1, 4);
        let b = span(1, 6, 1, 9);
        let c = span(1, 2, 1, 7);

        for (x, y) in [(a, b), (a, c), (b, c)] {
            assert!(!x.contains(&y));
            assert!(!y.contains(&x));
            assert!(!x.equals(&y));
        }
    }

    #[test]
    fn touches_line_is_inclusive() {
        let s = span(2, 4, 4, 1);
        assert!(!s.touches_line(1));
        assert!(s.touches_line(2));
        assert!(s.touches_line(3));
        assert!(s.touches_line(4));
        assert!(!s.touches_line(5));
    }
}
