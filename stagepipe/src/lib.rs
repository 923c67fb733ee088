//! Cancellable staged pipelines on top of tokio.
//!
//! A pipeline is a set of stages connected by bounded channels. A source emits a fixed
//! sequence of values, any number of transform stages pull from the source output and apply a
//! function, and a merge stage funnels the transform outputs into a single stream. Every stage
//! owns and closes its own output, and every stage stops promptly once the shared cancellation
//! signal fires.
//!
//! ```rust,no_run
//! use config::shared::PipelineConfig;
//! use stagepipe::pipeline::Pipeline;
//!
//! # async fn example() -> stagepipe::error::PipelineResult<()> {
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), |x| x * x);
//! let merged = pipeline.start()?;
//!
//! while let Some(value) = merged.recv().await {
//!     println!("{value}");
//! }
//!
//! pipeline.shutdown_and_wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod concurrency;
pub mod error;
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod stages;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
