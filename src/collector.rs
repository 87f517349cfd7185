//! Execution trace collector.
//!
//! A [`Collector`] owns this thread's trace hook for exactly one traced run.
//! [`Collector::start`] installs the hook and returns a [`CollectorGuard`];
//! stopping or dropping the guard puts the previous hook back, whatever the
//! traced code did in between.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::error::{CoverageError, Result};
use crate::runtime::{Code, Frame, TraceEvent, TraceFn, gettrace, settrace};
use crate::span::Span;

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Spans reported by the runtime for one executed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitedEvent {
    /// Backing source file, `None` for code with no discoverable source.
    pub file: Option<PathBuf>,

    /// Position table of the executing unit, unknown coordinates dropped,
    /// first occurrence order.
    pub spans: Vec<Span>,
}

/// Everything recorded during one traced run, in execution order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TraceSession {
    events: Vec<VisitedEvent>,
}

impl TraceSession {
    pub fn new(events: Vec<VisitedEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[VisitedEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct source files referenced by the session, sorted by path.
    pub fn files(&self) -> BTreeSet<&Path> {
        self.events
            .iter()
            .filter_map(|event| event.file.as_deref())
            .collect()
    }

    /// Every span recorded for `file`.
    pub fn visited<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a Span> + 'a {
        self.events
            .iter()
            .filter(move |event| event.file.as_deref() == Some(file))
            .flat_map(|event| event.spans.iter())
    }
}

/// Configured, not yet running, trace collector.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    /// Only units whose qualified name starts with this prefix are traced.
    filter: Option<String>,
}

impl Collector {
    pub fn new(filter: Option<String>) -> Self {
        Self { filter }
    }

    /// Install the collector as this thread's sole trace handler.
    ///
    /// Fails with [`CoverageError::CollectorActive`] while another
    /// collector's guard is alive on the same thread.
    pub fn start(self) -> Result<CollectorGuard> {
        if ACTIVE.with(Cell::get) {
            return Err(CoverageError::CollectorActive);
        }
        ACTIVE.with(|active| active.set(true));

        let recorder = Rc::new(Recorder {
            filter: self.filter,
            events: RefCell::new(Vec::new()),
        });

        let previous = gettrace();
        settrace(Some(dispatch(recorder.clone())));
        debug!(
            "trace collector started (filter: {:?})",
            recorder.filter.as_deref()
        );

        Ok(CollectorGuard {
            recorder,
            previous,
            released: false,
        })
    }

    /// Run `f` with the collector installed and return its result together
    /// with the recorded session.
    pub fn trace<T>(self, f: impl FnOnce() -> T) -> Result<(T, TraceSession)> {
        let guard = self.start()?;
        let value = f();
        Ok((value, guard.stop()))
    }
}

/// Scope of an installed collector.
#[derive(Debug)]
pub struct CollectorGuard {
    recorder: Rc<Recorder>,
    previous: Option<TraceFn>,
    released: bool,
}

impl CollectorGuard {
    /// Restore the previous handler and hand over the recorded session.
    pub fn stop(mut self) -> TraceSession {
        self.release();
        let events = self.recorder.events.take();
        debug!("trace collector stopped after {} event(s)", events.len());
        TraceSession::new(events)
    }

    /// Number of events recorded so far.
    pub fn event_count(&self) -> usize {
        self.recorder.events.borrow().len()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        settrace(self.previous.take());
        ACTIVE.with(|active| active.set(false));
        self.released = true;
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
struct Recorder {
    filter: Option<String>,
    events: RefCell<Vec<VisitedEvent>>,
}

impl Recorder {
    fn wants(&self, code: &Code) -> bool {
        match &self.filter {
            Some(prefix) => code.qualified_name().starts_with(prefix.as_str()),
            None => true,
        }
    }

    fn process(&self, frame: &Frame<'_>, event: &TraceEvent<'_>) {
        match event {
            TraceEvent::Line => self.record_line(frame.code, frame.line),
            TraceEvent::Call
            | TraceEvent::Return(_)
            | TraceEvent::Exception(_)
            | TraceEvent::Opcode => {}
        }
    }

    fn record_line(&self, code: &Code, line: u32) {
        let file = code.filename().map(Path::to_path_buf);

        let mut seen = HashSet::new();
        let mut spans = Vec::new();
        for &(start_line, end_line, start_col, end_col) in code.positions() {
            if [start_line, end_line, start_col, end_col]
                .iter()
                .any(Option::is_none)
            {
                continue;
            }
            match Span::from_raw(start_line, end_line, start_col, end_col) {
                Ok(span) => {
                    if seen.insert(span) {
                        spans.push(span);
                    }
                }
                Err(err) => debug!(
                    "skipping position in {} at line {line}: {err}",
                    code.qualified_name()
                ),
            }
        }

        self.events.borrow_mut().push(VisitedEvent { file, spans });
    }
}

/// Global handler: decides per new frame whether it is traced.
fn dispatch(recorder: Rc<Recorder>) -> TraceFn {
    TraceFn::new(move |frame, _event| {
        if !recorder.wants(frame.code) {
            return None;
        }
        Some(local(recorder.clone()))
    })
}

/// Per-frame handler; stays installed for the frame's whole lifetime.
fn local(recorder: Rc<Recorder>) -> TraceFn {
    TraceFn::new(move |frame, event| {
        recorder.process(frame, event);
        Some(local(recorder.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Interpreter, ScriptResult};
    use crate::span::Pos;
    use std::fs;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(Pos::new(sl, sc), Pos::new(el, ec))
    }

    fn quiet() -> Interpreter {
        Interpreter::new().with_output(Box::new(std::io::sink()))
    }

    fn run_file(dir: &Path, name: &str, source: &str) -> ScriptResult<()> {
        let path = dir.join(name);
        fs::write(&path, source).unwrap();
        quiet().run_path(&path).map(|_| ())
    }

    #[test]
    fn records_the_position_table_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let guard = Collector::new(None).start().unwrap();
        run_file(dir.path(), "main.py", "x = 1 or 2\n").unwrap();
        let session = guard.stop();

        let path = dir.path().join("main.py");
        assert_eq!(
            session.events(),
            &[VisitedEvent {
                file: Some(path.clone()),
                spans: vec![
                    span(1, 0, 1, 10),
                    span(1, 4, 1, 10),
                    span(1, 4, 1, 5),
                    span(1, 9, 1, 10),
                ],
            }]
        );
        assert_eq!(session.files().into_iter().collect::<Vec<_>>(), vec![path.as_path()]);
    }

    #[test]
    fn unknown_coordinates_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let guard = Collector::new(None).start().unwrap();
        run_file(dir.path(), "main.py", "def f():\n    return 1\nf()\n").unwrap();
        let session = guard.stop();

        // module line 1, module line 3, then the body of `f`
        assert_eq!(session.events().len(), 3);
        let body = &session.events()[2];
        assert_eq!(body.spans, vec![span(2, 4, 2, 12), span(2, 11, 2, 12)]);
    }

    #[test]
    fn code_without_a_file_records_no_path() {
        let guard = Collector::new(None).start().unwrap();
        quiet().run_source("y = 2\n", "snippet").unwrap();
        let session = guard.stop();

        assert_eq!(session.events().len(), 1);
        assert_eq!(session.events()[0].file, None);
        assert!(session.files().is_empty());
    }

    #[test]
    fn opcode_events_record_nothing() {
        let guard = Collector::new(None).start().unwrap();
        let mut interp = quiet();
        interp.set_trace_opcodes(true);
        interp.run_source("y = 1 and 2\n", "ops").unwrap();
        let session = guard.stop();

        assert_eq!(session.events().len(), 1);
    }

    #[test]
    fn filter_skips_units_outside_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("helpers.py"), "def one():\n    return 1\n").unwrap();

        let guard = Collector::new(Some("helpers".into())).start().unwrap();
        run_file(dir.path(), "main.py", "import helpers\nv = helpers.one()\n").unwrap();
        let session = guard.stop();

        let helpers = dir.path().join("helpers.py");
        assert!(!session.is_empty());
        assert!(
            session
                .events()
                .iter()
                .all(|event| event.file.as_deref() == Some(helpers.as_path()))
        );
    }

    #[test]
    fn previous_handler_is_restored_after_a_script_error() {
        let sentinel = TraceFn::new(|_, _| None);
        settrace(Some(sentinel.clone()));

        let guard = Collector::new(None).start().unwrap();
        let result = quiet().run_source("raise 'boom'\n", "failing");
        let session = guard.stop();

        assert!(result.is_err());
        assert_eq!(session.events().len(), 1);
        let restored = gettrace().expect("previous handler restored");
        assert!(TraceFn::ptr_eq(&restored, &sentinel));
        settrace(None);
    }

    #[test]
    fn dropping_the_guard_restores_the_handler() {
        {
            let _guard = Collector::new(None).start().unwrap();
            assert!(gettrace().is_some());
        }
        assert!(gettrace().is_none());

        // a fresh collector can start once the previous one is gone
        let guard = Collector::new(None).start().unwrap();
        guard.stop();
    }

    #[test]
    fn nested_collectors_are_rejected() {
        let outer = Collector::new(None).start().unwrap();
        let err = Collector::new(None).start().unwrap_err();
        assert!(matches!(err, CoverageError::CollectorActive));
        assert_eq!(outer.event_count(), 0);
        outer.stop();
    }

    #[test]
    fn trace_runs_the_closure_in_scope() {
        let (result, session) = Collector::new(None)
            .trace(|| quiet().run_source("a = 1\nb = a and 0\n", "scoped").map(|_| ()))
            .unwrap();

        result.unwrap();
        assert_eq!(session.events().len(), 2);
        assert!(gettrace().is_none());
    }

    #[test]
    fn visited_collects_spans_for_one_file() {
        let a = PathBuf::from("a.py");
        let session = TraceSession::new(vec![
            VisitedEvent {
                file: Some(a.clone()),
                spans: vec![span(1, 0, 1, 1)],
            },
            VisitedEvent {
                file: Some(PathBuf::from("b.py")),
                spans: vec![span(2, 0, 2, 1)],
            },
            VisitedEvent {
                file: None,
                spans: vec![span(3, 0, 3, 1)],
            },
            VisitedEvent {
                file: Some(a.clone()),
                spans: vec![span(4, 0, 4, 1)],
            },
        ]);

        let visited: Vec<_> = session.visited(&a).copied().collect();
        assert_eq!(visited, vec![span(1, 0, 1, 1), span(4, 0, 4, 1)]);
        assert_eq!(session.files().len(), 2);
    }
}
