use std::io;
use std::sync::Once;

use config::Environment;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Filter directive used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Guard that flushes buffered log lines when dropped.
///
/// Keep it alive for the whole lifetime of `main`, otherwise trailing lines are lost.
pub type LogFlusher = WorkerGuard;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The runtime environment could not be determined.
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global tracing subscriber for a binary named `app_name`.
///
/// Logs are written to standard error through a non-blocking writer, so standard output
/// stays reserved for program output. The `dev` environment renders human readable lines
/// and `prod` renders JSON. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load().map_err(TracingError::Environment)?;

    let (writer, flusher) = tracing_appender::non_blocking(io::stderr());
    let registry = tracing_subscriber::registry().with(env_filter());

    match environment {
        Environment::Dev => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_thread_names(true),
            )
            .try_init()?,
        Environment::Prod => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            )
            .try_init()?,
    }

    info!(app = app_name, %environment, "tracing initialized");

    Ok(flusher)
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Tests call this unconditionally; without the variable it does nothing so test output
/// stays quiet.
pub fn init_test_tracing() {
    if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_test_writer()
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}
