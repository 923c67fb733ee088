//! Pipeline stages.
//!
//! Every stage runs as its own tokio task, creates its own output channel and is the only
//! party allowed to close it. A stage closes its output exactly once, when its input is
//! exhausted or when the shared cancellation signal fires, whichever comes first.
//!
//! The free functions [`source`], [`transform`] and [`merge`] start a stage and return only the
//! read side of its output. The stage types return a [`StageHandle`] as well, which reports the
//! phase of the stage and how it terminated.

pub mod base;
pub mod merge;
pub mod source;
pub mod transform;

pub use base::{Stage, StageContext, StageHandle, StageOutcome, StagePhase, StageSummary};
pub use merge::{MergeStage, merge};
pub use source::{SourceStage, source};
pub use transform::{TransformStage, transform};
