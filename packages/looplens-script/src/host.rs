use crate::value::{Closure, PromiseKey, Value};
use std::fmt;
use std::rc::Rc;

/// Work handed to the host for later execution.
///
/// Only the interpreter can build or run one; the host stores it and passes
/// it back to [`Interpreter::run_callback`](crate::Interpreter::run_callback)
/// exactly once.
pub struct Callback {
    pub(crate) func: Rc<Closure>,
    pub(crate) arg: Option<Value>,
    /// Promise resolved with the callback's return value.
    pub(crate) settles: Option<PromiseKey>,
}

impl Callback {
    pub(crate) fn new(func: Rc<Closure>) -> Self {
        Self {
            func,
            arg: None,
            settles: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.func.name()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name())
            .field("arg", &self.arg)
            .field("settles", &self.settles)
            .finish()
    }
}

/// The runtime the interpreter schedules into.
///
/// Each method corresponds to one intercepted primitive. `line` is the source
/// line of the call expression.
pub trait Host {
    /// `console.log(...)`: arguments already formatted and joined.
    fn print(&mut self, text: &str, line: usize);

    /// `setTimeout(fn, delay)`. Returns the timer id handed back to the script.
    fn register_timer(&mut self, callback: Callback, delay: u64, line: usize) -> u64;

    /// `queueMicrotask(fn)`.
    fn schedule_deferred(&mut self, callback: Callback, line: usize);

    /// `promise.then(fn)`. `None` when the receiver is still pending and the
    /// continuation was parked on it instead of being queued.
    fn chain_then(&mut self, callback: Option<Callback>, line: usize);

    /// Continuations released by a promise that just resolved, in attachment order.
    fn release_continuations(&mut self, callbacks: Vec<Callback>);

    fn enter_function(&mut self, _name: &str, _line: usize) {}

    fn exit_function(&mut self) {}
}
