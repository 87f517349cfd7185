use console::{Term, style};
use std::{env, fmt::Display};

use crate::highlight::{Style, StyledText};
use crate::run_report::BranchSummary;

const RULE_WIDTH: usize = 72;

/// Small UI helper:
/// - normal mode: human output to stdout, errors to stderr
/// - `--json` mode: ALL human output to stderr (stdout stays machine-readable JSON)
/// - fancy styling only on a real TTY and when NO_COLOR/CI are not set
#[derive(Debug, Clone)]
pub struct Ui {
    out: Term,
    err: Term,
    fancy: bool,
    enabled: bool,
}

impl Ui {
    pub fn new(json: bool) -> Self {
        // In --json mode, keep stdout clean for JSON and send all human output to stderr.
        let out = if json { Term::stderr() } else { Term::stdout() };
        let err = Term::stderr();

        // Fancy output must only activate when the actual stream used for human output is a TTY.
        let out_is_tty = out.is_term();

        let no_color = env::var_os("NO_COLOR").is_some();
        let in_ci = env::var_os("CI").is_some();

        let fancy = out_is_tty && !no_color && !in_ci;

        Self {
            out,
            err,
            fancy,
            enabled: true,
        }
    }

    /// Useful for unit tests to avoid noisy output.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            fancy: false,
            enabled: false,
        }
    }

    fn write_out(&self, s: &str) {
        if self.enabled {
            let _ = self.out.write_line(s);
        }
    }

    fn write_err(&self, s: &str) {
        if self.enabled {
            let _ = self.err.write_line(s);
        }
    }

    pub fn warn(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).yellow().to_string());
        } else {
            self.write_err(&s);
        }
    }

    pub fn error(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).red().bold().to_string());
        } else {
            self.write_err(&s);
        }
    }

    /// Header rule above a rendered file.
    pub fn rule(&self, title: impl Display) {
        let head = format!("--- {title} ");
        let fill = RULE_WIDTH.saturating_sub(console::measure_text_width(&head));
        let s = format!("{head}{}", "-".repeat(fill));
        if self.fancy {
            self.write_out(&style(s).bold().to_string());
        } else {
            self.write_out(&s);
        }
    }

    /// Rendered source file. Always ends the output on a fresh line.
    pub fn source(&self, text: &StyledText) {
        let mut s = self.paint(text);
        if s.ends_with('\n') {
            s.pop();
        }
        self.write_out(&s);
    }

    /// Per-file `branches: C/T covered` line.
    pub fn summary(&self, summary: &BranchSummary) {
        let counts = format!("{}/{}", summary.covered, summary.total);
        let counts = if !self.fancy {
            counts
        } else if summary.covered == summary.total {
            style(counts).green().to_string()
        } else {
            style(counts).red().to_string()
        };
        self.write_out(&format!("branches: {counts} covered"));
    }

    /// Colors on a fancy terminal, `{+..}` / `{-..}` markers otherwise.
    fn paint(&self, text: &StyledText) -> String {
        if !self.fancy {
            return text.annotate();
        }

        text.segments()
            .iter()
            .map(|segment| match segment.style {
                Style::Covered => style(&segment.text).green().to_string(),
                Style::Uncovered => style(&segment.text).red().to_string(),
                Style::Plain => segment.text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_marks_branches() {
        let mut text = StyledText::default();
        text.push("a", Style::Covered);
        text.push(" if t else ", Style::Plain);
        text.push("b", Style::Uncovered);
        text.push("\n", Style::Plain);

        assert_eq!(Ui::silent().paint(&text), "{+a} if t else {-b}\n");
    }

    #[test]
    fn fancy_output_keeps_the_text() {
        let mut ui = Ui::silent();
        ui.fancy = true;

        let mut text = StyledText::default();
        text.push("x", Style::Covered);
        text.push(" or ", Style::Plain);
        text.push("y", Style::Uncovered);

        let painted = ui.paint(&text);
        assert_eq!(console::strip_ansi_codes(&painted), "x or y");
    }
}
