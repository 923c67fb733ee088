use std::time::Duration;

use config::shared::PipelineConfig;
use tokio::time::timeout;

use crate::concurrency::channel::StageReceiver;
use crate::stages::base::{StageHandle, StageSummary};

/// Default time a test waits for a pipeline to make progress before failing.
///
/// Pipelines in tests handle a handful of values, anything slower than this is a hang.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns a pipeline configuration emitting `values` through `transform_workers` transforms.
pub fn test_pipeline_config(values: Vec<i64>, transform_workers: u16) -> PipelineConfig {
    PipelineConfig {
        values,
        transform_workers,
        ..PipelineConfig::default()
    }
}

/// Receives every value of `rx` until it is closed.
///
/// # Panics
///
/// Panics if the channel is not closed within [`DEFAULT_TEST_TIMEOUT`], which in a test
/// means some stage never closed its output.
pub async fn collect_until_closed<T>(rx: &StageReceiver<T>) -> Vec<T> {
    let collect = async {
        let mut values = Vec::new();
        while let Some(value) = rx.recv().await {
            values.push(value);
        }
        values
    };

    match timeout(DEFAULT_TEST_TIMEOUT, collect).await {
        Ok(values) => values,
        Err(_) => panic!(
            "Stage output was not closed after {DEFAULT_TEST_TIMEOUT:?}. \
             This likely indicates a stage never observed the end of its input or cancellation."
        ),
    }
}

/// Waits for `handle` to terminate.
///
/// # Panics
///
/// Panics if the stage does not terminate within [`DEFAULT_TEST_TIMEOUT`] or if it failed.
pub async fn wait_for_stage(handle: StageHandle) -> StageSummary {
    let name = handle.name().to_string();

    match timeout(DEFAULT_TEST_TIMEOUT, handle.wait()).await {
        Ok(Ok(summary)) => summary,
        Ok(Err(err)) => panic!("Stage '{name}' failed: {err}"),
        Err(_) => panic!("Stage '{name}' did not terminate after {DEFAULT_TEST_TIMEOUT:?}"),
    }
}
