pub mod model;
pub mod snapshot;

pub use model::{Frame, FrameKind, PendingTimer, QueuedTask, SchedulerPhase, TaskKind};
pub use snapshot::{Recorder, Snapshot, StateView, Timeline};
