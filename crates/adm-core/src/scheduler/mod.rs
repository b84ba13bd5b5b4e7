//! Adaptive download scheduler.
//!
//! Wraps a variable-target permit gate whose capacity follows the resource
//! governor, an in-flight set enforcing at-most-one transfer per remote
//! file identifier, and a JoinSet worker loop that drains submissions
//! through the transfer engine.

mod inflight;
mod permits;
mod run;
mod summary;

pub use inflight::{InFlightClaim, InFlightSet};
pub use permits::{PermitGate, PermitGuard};
pub use run::{scheduler, JobSender, SchedulerRun};
pub use summary::RunSummary;
