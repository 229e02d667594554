use looplens_core::{PendingTimer, QueuedTask};
use std::collections::VecDeque;

/// A FIFO of queued tasks. Used for both the deferred and the ready queue.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<QueuedTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: QueuedTask) {
        self.queue.push_back(task);
    }

    pub fn pop(&mut self) -> Option<QueuedTask> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn as_deque(&self) -> &VecDeque<QueuedTask> {
        &self.queue
    }
}

/// Registered timers waiting to be promoted, kept in registration order.
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: Vec<PendingTimer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timer: PendingTimer) {
        self.timers.push(timer);
    }

    /// Removes the timer with the smallest delay; equal delays go by `seq`.
    pub fn take_next(&mut self) -> Option<PendingTimer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.delay, t.seq))
            .map(|(i, _)| i)?;
        Some(self.timers.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn as_slice(&self) -> &[PendingTimer] {
        &self.timers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looplens_core::TaskKind;

    fn timer(id: u64, delay: u64, seq: u64) -> PendingTimer {
        PendingTimer {
            id,
            delay,
            remaining: delay,
            seq,
            callback: id,
        }
    }

    #[test]
    fn test_timers_order_by_delay_then_registration() {
        let mut set = TimerSet::new();
        set.insert(timer(1, 10, 0));
        set.insert(timer(2, 0, 1));
        set.insert(timer(3, 10, 2));
        set.insert(timer(4, 0, 3));

        let order: Vec<u64> = std::iter::from_fn(|| set.take_next()).map(|t| t.id).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_task_queue_is_fifo() {
        let mut queue = TaskQueue::new();
        queue.push(QueuedTask::microtask(1, 1));
        queue.push(QueuedTask::continuation(2, 2));
        assert_eq!(queue.len(), 2);
        let first = queue.pop().unwrap();
        assert_eq!((first.id, first.kind), (1, TaskKind::Microtask));
        let second = queue.pop().unwrap();
        assert_eq!((second.id, second.kind), (2, TaskKind::Continuation));
        assert!(second.is_continuation());
        assert!(queue.pop().is_none());
    }
}
