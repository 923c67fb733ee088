use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for a stage pipeline.
///
/// Every field has a default, so an empty configuration describes the reference pipeline:
/// the values `10000, 10, 100` squared by two transform workers over single-slot channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Values emitted by the source stage, in order.
    #[serde(default = "default_values")]
    pub values: Vec<i64>,
    /// Number of transform stages pulling from the shared source output.
    #[serde(default = "default_transform_workers")]
    pub transform_workers: u16,
    /// Capacity of every stage output channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Time, in milliseconds, granted to stage tasks to wind down after cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl PipelineConfig {
    /// Default number of transform stages.
    pub const DEFAULT_TRANSFORM_WORKERS: u16 = 2;

    /// Default stage channel capacity.
    ///
    /// Bounded tokio channels need at least one slot, which is the closest to a rendezvous.
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

    /// Default shutdown grace period in milliseconds.
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

    /// Default source values.
    pub const DEFAULT_VALUES: [i64; 3] = [10000, 10, 100];

    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.transform_workers == 0 {
            return Err(ValidationError::TransformWorkersZero);
        }

        if self.channel_capacity == 0 {
            return Err(ValidationError::ChannelCapacityZero);
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            values: default_values(),
            transform_workers: default_transform_workers(),
            channel_capacity: default_channel_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_values() -> Vec<i64> {
    PipelineConfig::DEFAULT_VALUES.to_vec()
}

fn default_transform_workers() -> u16 {
    PipelineConfig::DEFAULT_TRANSFORM_WORKERS
}

fn default_channel_capacity() -> usize {
    PipelineConfig::DEFAULT_CHANNEL_CAPACITY
}

fn default_shutdown_grace_ms() -> u64 {
    PipelineConfig::DEFAULT_SHUTDOWN_GRACE_MS
}
