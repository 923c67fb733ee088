//! Squares a fixed set of numbers through a cancellable fan-out / fan-in pipeline.
//!
//! Every merged value is printed on its own line, followed by a diagnostic line with the
//! number of pipeline tasks still running once cancellation was requested. Logs go to
//! standard error.

use std::io;

use ::config::shared::AppConfig;
use telemetry::init_tracing;
use tracing::info;

use crate::config::load_app_config;
use crate::core::start_squares_with_config;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let app_config = load_app_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(app_config))?;

    Ok(())
}

async fn async_main(app_config: AppConfig) -> anyhow::Result<()> {
    info!(
        values = ?app_config.pipeline.values,
        transform_workers = app_config.pipeline.transform_workers,
        "starting squares"
    );

    start_squares_with_config(app_config, &mut io::stdout()).await
}
