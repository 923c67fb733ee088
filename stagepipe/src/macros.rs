//! Macros for pipeline error handling.

/// Creates a [`crate::error::PipelineError`] from an error kind and description.
///
/// Accepts an optional dynamic detail and an optional source error.
#[macro_export]
macro_rules! pipeline_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::PipelineError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::PipelineError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::PipelineError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::PipelineError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Creates and returns a [`crate::error::PipelineError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::pipeline_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::pipeline_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::pipeline_error!($kind, $desc, $detail))
    };
}
