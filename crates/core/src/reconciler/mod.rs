//! Reconciliation engine.
//!
//! Two independent timer-driven loops keep the media library in step with
//! the subscription feed:
//! - **Announce**: submit each feed item to the download client and tag the
//!   job with its subject id
//! - **Import**: import finished jobs into the library and link the files to
//!   the subject named by the job's tag
//!
//! The tag on the download job is the only state carried between the loops,
//! so the engine keeps nothing in memory that a restart would lose.

pub mod announce;
pub mod import;

mod context;
mod runner;
mod types;
mod wait;

pub use context::{Collaborators, PassContext};
pub use runner::Reconciler;
pub use types::{
    AnnounceReport, ImportPassReport, ItemOutcome, LoopKind, PassRecord, PassSettings,
    ReconcilerError, ReconcilerStatus,
};
pub use wait::{poll_until, RetryWindow};
