//! Error types and result definitions for pipeline operations.
//!
//! The payload carried through the stages never fails, so errors only come from the
//! scaffolding around it: invalid configuration, misuse of the [`crate::pipeline::Pipeline`]
//! lifecycle and stage tasks that panicked. Cancellation is not an error.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use config::shared::ValidationError;

/// Convenient result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Payload stored for single [`PipelineError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for pipeline operations.
///
/// A [`PipelineError`] is either a single classified error or an aggregate of several,
/// which is what [`crate::pipeline::Pipeline::wait`] returns when more than one stage failed.
#[derive(Debug, Clone)]
pub struct PipelineError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<PipelineError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while running a pipeline.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pipeline configuration was rejected.
    ConfigError,
    /// An operation was called in the wrong lifecycle state.
    InvalidState,
    /// A stage task panicked before closing its output.
    StagePanic,
    /// A merge forwarding task panicked; the merged output was still closed.
    MergeForwarderPanic,
    /// Uncategorized error.
    Unknown,
}

impl PipelineError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors this is the kind of the first error, or [`ErrorKind::Unknown`]
    /// if the aggregate is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "Multiple errors occurred",
        }
    }

    /// Returns the dynamic detail, if any.
    ///
    /// For aggregated errors, returns the first detail found.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        PipelineError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for PipelineError {
    fn eq(&self, other: &PipelineError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f)?;
                write_backtrace(payload.backtrace.as_ref(), f)
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = backtrace.to_string();
    if rendered.trim().is_empty() {
        return Ok(());
    }

    write!(f, "\n  Backtrace:")?;
    for line in rendered.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

/// Creates a [`PipelineError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for PipelineError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> PipelineError {
        PipelineError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`PipelineError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for PipelineError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> PipelineError {
        PipelineError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for PipelineError
where
    E: Into<PipelineError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> PipelineError {
        let location = Location::caller();
        let mut errors: Vec<PipelineError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        PipelineError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<ValidationError> for PipelineError {
    #[track_caller]
    fn from(err: ValidationError) -> PipelineError {
        let detail = err.to_string();
        PipelineError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid pipeline configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
