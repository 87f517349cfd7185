//! Per-thread trace hook.
//!
//! The interpreter reports every new frame to the installed hook with a
//! [`TraceEvent::Call`]. Whatever the hook returns becomes that frame's local
//! handler, which then sees the frame's `Line`, `Return`, `Exception` and
//! (when enabled) `Opcode` events. A local handler returning `None` stops
//! tracing of that frame.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::code::Code;
use super::error::ScriptError;
use super::value::Value;

type Handler = dyn Fn(&Frame<'_>, &TraceEvent<'_>) -> Option<TraceFn>;

/// Trace callback. The return value is the handler for subsequent events of
/// the same frame.
#[derive(Clone)]
pub struct TraceFn(Rc<Handler>);

impl TraceFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Frame<'_>, &TraceEvent<'_>) -> Option<TraceFn> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, frame: &Frame<'_>, event: &TraceEvent<'_>) -> Option<TraceFn> {
        (self.0)(frame, event)
    }

    /// True if both handles refer to the same callback.
    pub fn ptr_eq(a: &TraceFn, b: &TraceFn) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for TraceFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraceFn").finish_non_exhaustive()
    }
}

/// Kinds of trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Call,
    Line,
    Return,
    Exception,
    Opcode,
}

#[derive(Debug)]
pub enum TraceEvent<'a> {
    /// A new frame is about to run.
    Call,
    /// The frame is about to execute a new source line.
    Line,
    /// The frame is returning; `None` when unwinding because of an error.
    Return(Option<&'a Value>),
    /// An error is propagating through the frame.
    Exception(&'a ScriptError),
    /// The frame is about to evaluate an expression.
    Opcode,
}

impl TraceEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::Call => EventKind::Call,
            TraceEvent::Line => EventKind::Line,
            TraceEvent::Return(_) => EventKind::Return,
            TraceEvent::Exception(_) => EventKind::Exception,
            TraceEvent::Opcode => EventKind::Opcode,
        }
    }
}

/// Read-only view of an executing frame handed to trace handlers.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub code: &'a Rc<Code>,
    /// Line currently executing (the unit's first line for `Call`).
    pub line: u32,
}

thread_local! {
    static TRACE_HOOK: RefCell<Option<TraceFn>> = const { RefCell::new(None) };
}

/// Install `hook` as this thread's trace handler, replacing any previous one.
pub fn settrace(hook: Option<TraceFn>) {
    TRACE_HOOK.with(|slot| *slot.borrow_mut() = hook);
}

/// The currently installed trace handler.
pub fn gettrace() -> Option<TraceFn> {
    TRACE_HOOK.with(|slot| slot.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settrace_replaces_and_gettrace_returns_the_same_handler() {
        let hook = TraceFn::new(|_, _| None);
        settrace(Some(hook.clone()));

        let current = gettrace().expect("hook installed");
        assert!(TraceFn::ptr_eq(&current, &hook));

        settrace(None);
        assert!(gettrace().is_none());
    }
}
