use crate::config::{GeneratorConfig, LineMode};
use crate::locate::LineLocator;
use crate::queue::{TaskQueue, TimerSet};
use looplens_core::{
    Frame, FrameKind, PendingTimer, QueuedTask, Recorder, SchedulerPhase, StateView, Timeline,
};
use looplens_script::{Callback, Host, ScriptError};
use slotmap::{Key, KeyData, SlotMap, new_key_type};

new_key_type! {
    struct CallbackKey;
}

/// Live scheduler state for one `generate` call.
///
/// Owns the stack, queues, output buffer and the callbacks they refer to.
/// Every mutation that matters to a viewer is followed by a snapshot.
pub(crate) struct Session<'a> {
    config: &'a GeneratorConfig,
    locator: LineLocator<'a>,
    recorder: Recorder,
    stack: Vec<Frame>,
    timers: TimerSet,
    deferred: TaskQueue,
    ready: TaskQueue,
    output: Vec<String>,
    callbacks: SlotMap<CallbackKey, Callback>,
    next_frame: u64,
    next_task: u64,
    next_seq: u64,
}

impl<'a> Session<'a> {
    pub(crate) fn new(config: &'a GeneratorConfig, source: &'a str) -> Self {
        Self {
            config,
            locator: LineLocator::new(source),
            recorder: Recorder::new(),
            stack: Vec::new(),
            timers: TimerSet::new(),
            deferred: TaskQueue::new(),
            ready: TaskQueue::new(),
            output: Vec::new(),
            callbacks: SlotMap::with_key(),
            next_frame: 0,
            next_task: 0,
            next_seq: 0,
        }
    }

    pub(crate) fn snap(
        &mut self,
        line: Option<usize>,
        description: impl Into<String>,
        phase: SchedulerPhase,
    ) {
        let view = StateView {
            stack: &self.stack,
            pending_timers: self.timers.as_slice(),
            deferred_queue: self.deferred.as_deque(),
            ready_queue: self.ready.as_deque(),
            output: &self.output,
        };
        self.recorder.record(&view, line, description, phase);
    }

    pub(crate) fn push_frame(&mut self, name: impl Into<String>, kind: FrameKind, line: Option<usize>) {
        let id = self.next_frame;
        self.next_frame += 1;
        self.stack.push(Frame {
            id,
            name: name.into(),
            kind,
            line,
        });
    }

    pub(crate) fn pop_frame(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn stack_is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub(crate) fn has_work(&self) -> bool {
        !self.deferred.is_empty() || !self.timers.is_empty() || !self.ready.is_empty()
    }

    pub(crate) fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub(crate) fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub(crate) fn pop_deferred(&mut self) -> Option<QueuedTask> {
        self.deferred.pop()
    }

    /// Moves the next due timer into the ready queue.
    pub(crate) fn promote_timer(&mut self) {
        if let Some(timer) = self.timers.take_next() {
            tracing::debug!(id = timer.id, delay = timer.delay, seq = timer.seq, "promoting timer");
            self.ready.push(QueuedTask::ready(&timer));
        }
    }

    pub(crate) fn pop_ready(&mut self) -> Option<QueuedTask> {
        self.ready.pop()
    }

    /// Moves a queued task's callback out of the arena. Each runs at most once.
    pub(crate) fn take_callback(&mut self, task: &QueuedTask) -> Option<Callback> {
        let key = CallbackKey::from(KeyData::from_ffi(task.callback));
        let callback = self.callbacks.remove(key);
        if callback.is_none() {
            tracing::error!(task = task.id, "queued task has no callback");
        }
        callback
    }

    fn store(&mut self, callback: Callback) -> u64 {
        self.callbacks.insert(callback).data().as_ffi()
    }

    fn next_task_id(&mut self) -> u64 {
        self.next_task += 1;
        self.next_task
    }

    fn enqueue_deferred(&mut self, callback: Callback, task: fn(u64, u64) -> QueuedTask) {
        let id = self.next_task_id();
        let callback = self.store(callback);
        self.deferred.push(task(id, callback));
    }

    fn highlight(&mut self, key: &str, signatures: &[String], call_site: usize) -> Option<usize> {
        match self.config.line_mode {
            LineMode::Heuristic => self.locator.resolve(key, signatures),
            LineMode::CallSite => Some(call_site),
        }
    }

    /// Records the terminal error snapshot.
    pub(crate) fn fail(&mut self, err: &ScriptError) {
        let description = if err.is_syntax() {
            // Nothing ran, so nothing is on the stack.
            self.stack.clear();
            "Error parsing code"
        } else {
            "Error executing code"
        };
        self.output.push(format!("Uncaught {err}"));
        self.snap(err.line(), description, SchedulerPhase::Idle);
    }

    /// Closes the timeline, clearing a stack left behind by an aborted run.
    pub(crate) fn close(mut self) -> Timeline {
        if self.recorder.last().is_some_and(|s| !s.stack.is_empty()) {
            self.stack.clear();
            self.snap(None, "Execution finished", SchedulerPhase::Idle);
        }
        self.recorder.finish()
    }
}

impl Host for Session<'_> {
    fn print(&mut self, text: &str, line: usize) {
        let signatures = [
            format!("console.log('{text}')"),
            format!("console.log(\"{text}\")"),
            format!("console.log({text})"),
        ];
        let hl = self.highlight(&format!("log-{text}"), &signatures, line);

        self.push_frame("console.log", FrameKind::Print, hl);
        self.snap(hl, format!("console.log('{text}')"), SchedulerPhase::Idle);

        self.output.push(text.to_string());
        self.snap(hl, format!("Output: {text}"), SchedulerPhase::Idle);

        self.pop_frame();
        self.snap(hl, "Pop console.log", SchedulerPhase::Idle);
    }

    fn register_timer(&mut self, callback: Callback, delay: u64, line: usize) -> u64 {
        let hl = self.highlight("setTimeout", &["setTimeout".to_string()], line);

        self.push_frame("setTimeout", FrameKind::Primitive, hl);
        self.snap(hl, format!("setTimeout(..., {delay})"), SchedulerPhase::Idle);

        let id = self.next_task_id();
        let seq = self.next_seq;
        self.next_seq += 1;
        let callback = self.store(callback);
        self.timers.insert(PendingTimer {
            id,
            delay,
            remaining: delay,
            seq,
            callback,
        });
        self.snap(hl, "Add to Web APIs", SchedulerPhase::Idle);

        self.pop_frame();
        self.snap(hl, "Pop setTimeout", SchedulerPhase::Idle);
        id
    }

    fn schedule_deferred(&mut self, callback: Callback, line: usize) {
        let hl = self.highlight("queueMicrotask", &["queueMicrotask".to_string()], line);

        self.push_frame("queueMicrotask", FrameKind::Primitive, hl);
        self.snap(hl, "queueMicrotask(...)", SchedulerPhase::Idle);

        self.enqueue_deferred(callback, QueuedTask::microtask);
        self.snap(hl, "Add to Microtask Queue", SchedulerPhase::Idle);

        self.pop_frame();
        self.snap(hl, "Pop queueMicrotask", SchedulerPhase::Idle);
    }

    fn chain_then(&mut self, callback: Option<Callback>, line: usize) {
        let hl = self.highlight("then", &[".then".to_string()], line);

        self.push_frame("Promise.then", FrameKind::Primitive, hl);
        self.snap(hl, "Promise.then(...)", SchedulerPhase::Idle);

        match callback {
            Some(callback) => {
                self.enqueue_deferred(callback, QueuedTask::continuation);
                self.snap(hl, "Add to Microtask Queue", SchedulerPhase::Idle);
            }
            None => self.snap(hl, "Reaction stored on pending Promise", SchedulerPhase::Idle),
        }

        self.pop_frame();
        self.snap(hl, "Pop Promise.then", SchedulerPhase::Idle);
    }

    fn release_continuations(&mut self, callbacks: Vec<Callback>) {
        for callback in callbacks {
            self.enqueue_deferred(callback, QueuedTask::continuation);
            self.snap(None, "Promise resolved -> Microtask Queue", SchedulerPhase::Idle);
        }
    }

    fn enter_function(&mut self, name: &str, line: usize) {
        self.push_frame(name, FrameKind::Function, Some(line));
        self.snap(Some(line), format!("Call {name}()"), SchedulerPhase::Idle);
    }

    fn exit_function(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        self.snap(frame.line, format!("Return from {}()", frame.name), SchedulerPhase::Idle);
    }
}
