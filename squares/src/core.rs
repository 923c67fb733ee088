use std::io::{self, Write};
use std::time::Duration;

use ::config::shared::AppConfig;
use stagepipe::concurrency::cancel::CancelTx;
use stagepipe::pipeline::Pipeline;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Squares `x`, wrapping around on overflow.
fn square(x: i64) -> i64 {
    x.wrapping_mul(x)
}

/// Runs the squares pipeline until the merged output is exhausted.
///
/// Writes every merged value to `out`, one per line, then cancels the pipeline and writes how
/// many tasks were still alive at that point. Ctrl-C or SIGTERM cancel the pipeline early.
pub async fn start_squares_with_config<W: Write>(
    app_config: AppConfig,
    out: &mut W,
) -> anyhow::Result<()> {
    let grace = Duration::from_millis(app_config.pipeline.shutdown_grace_ms);

    let mut pipeline = Pipeline::new(app_config.pipeline, square);
    let merged = pipeline.start()?;

    let shutdown_handle = spawn_shutdown_listener(pipeline.cancel_tx());

    while let Some(value) = merged.recv().await {
        writeln!(out, "{value}")?;
    }

    pipeline.shutdown();
    // Read right after cancellation, stages may still be winding down.
    writeln!(out, "Number of active tasks : {}", pipeline.active_tasks())?;
    out.flush()?;

    if pipeline.wait_for_idle(grace).await {
        info!("all pipeline tasks terminated");
    }

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    let report = pipeline.wait().await?;
    info!(merged = report.merged(), "squares completed");

    Ok(())
}

/// Spawns a task cancelling the pipeline on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener(cancel_tx: CancelTx) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = wait_for_shutdown_signal().await {
            warn!(error = %err, "failed to listen for shutdown signals");
            return;
        }

        if cancel_tx.trigger() {
            info!("pipeline cancelled by signal");
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("sigint (ctrl+c) received, cancelling pipeline");
        }
        _ = sigterm.recv() => {
            info!("sigterm received, cancelling pipeline");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("ctrl+c received, cancelling pipeline");

    Ok(())
}
