//! Concurrency primitives shared by every pipeline stage.
//!
//! - [`cancel`] is the one-shot, broadcast cancellation signal observed by all stages.
//! - [`channel`] implements stage-owned channels whose sends and receives race cancellation.
//! - [`tracker`] counts live stage tasks for shutdown diagnostics.

pub mod cancel;
pub mod channel;
pub mod tracker;
