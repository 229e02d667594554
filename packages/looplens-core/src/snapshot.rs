use crate::model::{Frame, PendingTimer, QueuedTask, SchedulerPhase};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Index;

/// Immutable record of every scheduling structure at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: usize,
    pub stack: Vec<Frame>,
    pub pending_timers: Vec<PendingTimer>,
    pub deferred_queue: Vec<QueuedTask>,
    pub ready_queue: Vec<QueuedTask>,
    pub output: Vec<String>,
    pub highlight_line: Option<usize>,
    pub description: String,
    pub phase: SchedulerPhase,
}

impl Snapshot {
    /// Field-wise equality ignoring `id`.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.stack == other.stack
            && self.pending_timers == other.pending_timers
            && self.deferred_queue == other.deferred_queue
            && self.ready_queue == other.ready_queue
            && self.output == other.output
            && self.highlight_line == other.highlight_line
            && self.description == other.description
            && self.phase == other.phase
    }
}

/// Borrowed view of the live scheduler state handed to the recorder.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub stack: &'a [Frame],
    pub pending_timers: &'a [PendingTimer],
    pub deferred_queue: &'a VecDeque<QueuedTask>,
    pub ready_queue: &'a VecDeque<QueuedTask>,
    pub output: &'a [String],
}

/// Appends deep copies of the live state to a timeline.
#[derive(Debug, Default)]
pub struct Recorder {
    next_id: usize,
    snapshots: Vec<Snapshot>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        state: &StateView<'_>,
        line: Option<usize>,
        description: impl Into<String>,
        phase: SchedulerPhase,
    ) -> &Snapshot {
        let snapshot = Snapshot {
            id: self.next_id,
            stack: state.stack.to_vec(),
            pending_timers: state.pending_timers.to_vec(),
            deferred_queue: state.deferred_queue.iter().cloned().collect(),
            ready_queue: state.ready_queue.iter().cloned().collect(),
            output: state.output.to_vec(),
            highlight_line: line,
            description: description.into(),
            phase,
        };
        self.next_id += 1;

        tracing::trace!(
            id = snapshot.id,
            phase = %snapshot.phase,
            stack = snapshot.stack.len(),
            "{}",
            snapshot.description
        );

        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn finish(self) -> Timeline {
        Timeline {
            snapshots: self.snapshots,
        }
    }
}

/// The ordered snapshots produced by one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    snapshots: Vec<Snapshot>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// Snapshot under a playback cursor, clamped to `[0, len - 1]`.
    pub fn at(&self, cursor: usize) -> Option<&Snapshot> {
        let last = self.snapshots.len().checked_sub(1)?;
        self.snapshots.get(cursor.min(last))
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Console output as of the final snapshot.
    pub fn final_output(&self) -> &[String] {
        self.snapshots
            .last()
            .map(|s| s.output.as_slice())
            .unwrap_or_default()
    }

    pub fn into_snapshots(self) -> Vec<Snapshot> {
        self.snapshots
    }
}

impl Index<usize> for Timeline {
    type Output = Snapshot;

    fn index(&self, index: usize) -> &Snapshot {
        &self.snapshots[index]
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
