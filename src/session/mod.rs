//! Scan Session Layer
//!
//! Turns a stream of recognition batches into discrete scan sessions:
//! opening a session on the first informative batch, accumulating matches,
//! and closing it once the stream stops producing new information.

pub mod coordinator;
pub mod pipeline;
pub mod state;
pub mod timer;

pub use coordinator::{BatchOutcome, SessionCoordinator, MAX_PENDING_UPDATES};
pub use pipeline::ScanPipeline;
pub use state::{ScanSession, SessionSnapshot, SessionState};
pub use timer::{GapTimer, ManualScheduler, ScheduledTask, Scheduler, TimerAction, TokioScheduler};
