use std::path::PathBuf;

use serde::Serialize;

use crate::highlight::BranchCoverage;

/// Covered / total branch counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchSummary {
    /// Leaf branches the trace reached.
    pub covered: usize,

    /// All leaf branches.
    pub total: usize,
}

impl BranchSummary {
    pub fn from_branches(branches: &[BranchCoverage]) -> Self {
        Self {
            covered: branches.iter().filter(|b| b.covered).count(),
            total: branches.len(),
        }
    }

    pub fn add(&mut self, other: BranchSummary) {
        self.covered += other.covered;
        self.total += other.total;
    }
}

/// Coverage of one traced source file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,

    /// Leaf branches in source order.
    pub branches: Vec<BranchCoverage>,

    pub summary: BranchSummary,

    /// Why the file could not be analysed or rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn new(path: PathBuf, branches: Vec<BranchCoverage>, error: Option<String>) -> Self {
        Self {
            path,
            summary: BranchSummary::from_branches(&branches),
            branches,
            error,
        }
    }
}

/// Machine-readable summary of one coverage run.
///
/// In `--json` mode we print this to stdout as pretty JSON.
#[derive(Debug, Serialize)]
pub struct CoverageRunReport {
    /// Tool name, stable across versions.
    pub tool: &'static str,

    /// Current crate version.
    pub version: &'static str,

    /// Script path or module name that was run.
    pub target: String,

    /// Files in path order.
    pub files: Vec<FileReport>,

    /// Totals over all files.
    pub summary: BranchSummary,

    /// Error raised by the script, if it did not finish normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CoverageRunReport {
    pub fn success(target: String, files: Vec<FileReport>) -> Self {
        let mut summary = BranchSummary::default();
        for file in &files {
            summary.add(file.summary);
        }

        Self {
            tool: "fine-coverage",
            version: env!("CARGO_PKG_VERSION"),
            target,
            files,
            summary,
            error: None,
        }
    }

    pub fn failure(target: String, files: Vec<FileReport>, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::success(target, files)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Pos, Span};

    fn branch(col: u32, covered: bool) -> BranchCoverage {
        BranchCoverage {
            span: Span::new(Pos::new(1, col), Pos::new(1, col + 1)),
            covered,
        }
    }

    #[test]
    fn totals_add_up_across_files() {
        let files = vec![
            FileReport::new(
                PathBuf::from("a.py"),
                vec![branch(0, true), branch(4, false)],
                None,
            ),
            FileReport::new(PathBuf::from("b.py"), vec![branch(2, true)], None),
        ];

        let report = CoverageRunReport::success("a.py".into(), files);
        assert_eq!(
            report.summary,
            BranchSummary {
                covered: 2,
                total: 3
            }
        );
        assert!(report.error.is_none());
    }

    #[test]
    fn failure_keeps_files_and_error() {
        let report = CoverageRunReport::failure(
            "main".into(),
            vec![FileReport::new(PathBuf::from("m.py"), Vec::new(), None)],
            "boom".into(),
        );

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["tool"], "fine-coverage");
        assert_eq!(value["error"], "boom");
        assert_eq!(value["files"][0]["summary"]["total"], 0);
        assert!(value["files"][0].get("error").is_none());
    }
}
