use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// At least one transform worker is required to consume the source.
    #[error("`transform_workers` cannot be zero")]
    TransformWorkersZero,
    /// Stage channels need room for at least one in-flight value.
    #[error("`channel_capacity` cannot be zero")]
    ChannelCapacityZero,
}
