use std::sync::Arc;
use std::time::Duration;

use config::shared::PipelineConfig;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::bail;
use crate::concurrency::cancel::{CancelTx, create_cancel_channel};
use crate::concurrency::channel::StageReceiver;
use crate::concurrency::tracker::ActiveTasks;
use crate::error::{ErrorKind, PipelineResult};
use crate::metrics::register_metrics;
use crate::stages::base::{Stage, StageContext, StageHandle, StageSummary};
use crate::stages::merge::MergeStage;
use crate::stages::source::SourceStage;
use crate::stages::transform::TransformStage;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started { stages: Vec<StageHandle> },
}

/// Summaries of every stage of a pipeline that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageSummary>,
}

impl PipelineReport {
    /// Returns the summary of the stage named `name`.
    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|summary| summary.stage == name)
    }

    /// Returns how many values reached the merged output.
    pub fn merged(&self) -> usize {
        self.stage(MERGE_STAGE_NAME)
            .map(|summary| summary.emitted)
            .unwrap_or_default()
    }
}

const SOURCE_STAGE_NAME: &str = "source";
const MERGE_STAGE_NAME: &str = "merge";

/// A source feeding a pool of transform stages whose outputs are merged into one.
///
/// Every transform applies the same function `f`. Transforms pull from the shared source
/// output, so each source value is processed by exactly one of them.
#[derive(Debug)]
pub struct Pipeline<F> {
    config: Arc<PipelineConfig>,
    f: F,
    state: PipelineState,
    cancel_tx: CancelTx,
    tasks: ActiveTasks,
}

impl<F> Pipeline<F>
where
    F: Fn(i64) -> i64 + Clone + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, f: F) -> Self {
        let (cancel_tx, _) = create_cancel_channel();

        Self {
            config: Arc::new(config),
            f,
            state: PipelineState::NotStarted,
            cancel_tx,
            tasks: ActiveTasks::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_tx(&self) -> CancelTx {
        self.cancel_tx.clone()
    }

    /// Starts every stage and returns the read side of the merged output.
    ///
    /// Must be called from within a tokio runtime. Fails with [`ErrorKind::InvalidState`] if the
    /// pipeline was already started and with [`ErrorKind::ConfigError`] if the configuration is
    /// invalid.
    pub fn start(&mut self) -> PipelineResult<StageReceiver<i64>> {
        if let PipelineState::Started { .. } = self.state {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                "A pipeline can only be started once"
            );
        }

        self.config.validate()?;
        register_metrics();

        info!(
            values = self.config.values.len(),
            transform_workers = self.config.transform_workers,
            channel_capacity = self.config.channel_capacity,
            "starting pipeline"
        );

        let context = StageContext::new(self.cancel_tx.subscribe())
            .with_channel_capacity(self.config.channel_capacity)
            .with_tasks(self.tasks.clone());

        let mut stages = Vec::with_capacity(self.config.transform_workers as usize + 2);

        let (source_rx, source) =
            SourceStage::new(self.config.values.iter().copied(), context.clone())
                .with_name(SOURCE_STAGE_NAME)
                .start();
        stages.push(source);

        let mut transformed = Vec::with_capacity(self.config.transform_workers as usize);
        for index in 0..self.config.transform_workers {
            let (transform_rx, transform) =
                TransformStage::new(source_rx.clone(), self.f.clone(), context.clone())
                    .with_name(format!("transform-{index}"))
                    .start();
            transformed.push(transform_rx);
            stages.push(transform);
        }
        // The transforms hold the only views of the source output from now on.
        drop(source_rx);

        let (merged_rx, merge) = MergeStage::new(transformed, context)
            .with_name(MERGE_STAGE_NAME)
            .start();
        stages.push(merge);

        self.state = PipelineState::Started { stages };

        Ok(merged_rx)
    }

    /// Returns the number of stage and forwarding tasks currently alive.
    ///
    /// The value is a diagnostic and may lag behind during teardown.
    pub fn active_tasks(&self) -> usize {
        self.tasks.count()
    }

    /// Waits up to `grace` for every task of the pipeline to terminate.
    ///
    /// Returns `true` if the pipeline became idle in time.
    pub async fn wait_for_idle(&self, grace: Duration) -> bool {
        match timeout(grace, self.tasks.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    active_tasks = self.tasks.count(),
                    ?grace,
                    "pipeline tasks still running after the grace period"
                );
                false
            }
        }
    }

    /// Waits for every stage to terminate.
    ///
    /// The merged output must be consumed, or the pipeline cancelled, for this to complete.
    /// Errors of all failed stages are aggregated.
    pub async fn wait(self) -> PipelineResult<PipelineReport> {
        let PipelineState::Started { stages } = self.state else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(PipelineReport::default());
        };

        info!("waiting for pipeline stages to complete");

        let mut report = PipelineReport::default();
        let mut errors = vec![];
        for stage in stages {
            match stage.wait().await {
                Ok(summary) => {
                    debug!(stage = %summary.stage, emitted = summary.emitted, "stage completed");
                    report.stages.push(summary);
                }
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            info!("{} pipeline stages failed with an error", errors.len());

            return Err(errors.into());
        }

        info!(merged = report.merged(), "pipeline completed");

        Ok(report)
    }

    /// Fires the cancellation signal observed by every stage.
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if !self.cancel_tx.trigger() {
            debug!("pipeline was already cancelled");
            return;
        }

        info!("cancellation signal successfully sent to all stages");
    }

    pub async fn shutdown_and_wait(self) -> PipelineResult<PipelineReport> {
        self.shutdown();
        self.wait().await
    }
}
