use serde::{Deserialize, Serialize};

/// What kind of call a stack frame stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// The top-level script body.
    Main,
    /// An intercepted scheduling primitive (`setTimeout`, `queueMicrotask`, `.then`).
    Primitive,
    /// A user-defined function called from script code.
    Function,
    DeferredCallback,
    TimerCallback,
    Print,
}

/// One active synchronous call on the execution stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: u64,
    pub name: String,
    pub kind: FrameKind,
    pub line: Option<usize>,
}

/// A registered timer that has not yet been promoted to the ready queue.
///
/// `remaining` mirrors `delay` and is never decremented; delays only order
/// timers, no wall-clock time is simulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTimer {
    pub id: u64,
    pub delay: u64,
    pub remaining: u64,
    /// Creation sequence, breaks ties between equal delays.
    pub seq: u64,
    pub callback: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Explicitly deferred via `queueMicrotask`.
    Microtask,
    /// A promise continuation scheduled by `.then`.
    Continuation,
    /// A timer callback promoted out of the pending set.
    Timer,
}

/// An entry in either the deferred (microtask) or the ready (macrotask) queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: u64,
    pub name: String,
    pub kind: TaskKind,
    pub callback: u64,
}

impl QueuedTask {
    /// A deferred-queue entry scheduled by `queueMicrotask`.
    pub fn microtask(id: u64, callback: u64) -> Self {
        Self {
            id,
            name: "microtask".to_string(),
            kind: TaskKind::Microtask,
            callback,
        }
    }

    /// A deferred-queue entry for a promise continuation.
    pub fn continuation(id: u64, callback: u64) -> Self {
        Self {
            id,
            name: "promise.then".to_string(),
            kind: TaskKind::Continuation,
            callback,
        }
    }

    /// The ready-queue entry for a promoted timer. Keeps the timer's id.
    pub fn ready(timer: &PendingTimer) -> Self {
        Self {
            id: timer.id,
            name: "Macrotask".to_string(),
            kind: TaskKind::Timer,
            callback: timer.callback,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.kind == TaskKind::Continuation
    }
}

/// What the event loop is doing at a given step. Purely for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Checking,
    PromotingDeferred,
    PromotingReady,
}

impl SchedulerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Checking => "checking",
            SchedulerPhase::PromotingDeferred => "promoting-deferred",
            SchedulerPhase::PromotingReady => "promoting-ready",
        }
    }
}

impl std::fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
