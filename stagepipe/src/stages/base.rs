use std::fmt;
use std::future::Future;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::concurrency::cancel::CancelRx;
use crate::concurrency::channel::{StageReceiver, StageSender};
use crate::concurrency::tracker::ActiveTasks;
use crate::error::{ErrorKind, PipelineResult};
use crate::metrics::{
    STAGE_LABEL, STAGEPIPE_STAGES_CANCELLED_TOTAL, STAGEPIPE_VALUES_EMITTED_TOTAL,
};
use crate::pipeline_error;

/// Lifecycle phase of a stage.
///
/// A stage moves `Created → Running → Draining → Closed` when its input runs out, or
/// `Created → Running → CancelledAbort → Closed` when it stops early. `Closed` is always
/// reached and means the stage closed its output exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Created,
    Running,
    Draining,
    CancelledAbort,
    Closed,
}

impl StagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagePhase::Created => "created",
            StagePhase::Running => "running",
            StagePhase::Draining => "draining",
            StagePhase::CancelledAbort => "cancelled_abort",
            StagePhase::Closed => "closed",
        }
    }
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage stopped producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The input was exhausted and every value was forwarded.
    Drained,
    /// The cancellation signal fired.
    Cancelled,
    /// Every reader of the output went away.
    Disconnected,
    /// The stage stopped on an error.
    Failed,
}

impl StageOutcome {
    /// Combines the outcomes of several tasks of one stage, the least complete one wins.
    pub(crate) fn combine(self, other: StageOutcome) -> StageOutcome {
        match (self, other) {
            (StageOutcome::Failed, _) | (_, StageOutcome::Failed) => StageOutcome::Failed,
            (StageOutcome::Cancelled, _) | (_, StageOutcome::Cancelled) => StageOutcome::Cancelled,
            (StageOutcome::Disconnected, _) | (_, StageOutcome::Disconnected) => {
                StageOutcome::Disconnected
            }
            _ => StageOutcome::Drained,
        }
    }
}

/// Final report of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    /// Name of the stage.
    pub stage: String,
    /// Number of values the stage delivered to its output.
    pub emitted: usize,
    /// Why the stage stopped.
    pub outcome: StageOutcome,
}

/// Settings shared by every stage of a pipeline.
#[derive(Debug, Clone)]
pub struct StageContext {
    cancel_rx: CancelRx,
    channel_capacity: usize,
    tasks: ActiveTasks,
}

impl StageContext {
    /// Creates a context observing `cancel_rx`, with single-slot channels and a fresh
    /// task tracker.
    pub fn new(cancel_rx: CancelRx) -> Self {
        Self {
            cancel_rx,
            channel_capacity: 1,
            tasks: ActiveTasks::new(),
        }
    }

    /// Sets the capacity of the output channels created by stages using this context.
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    /// Registers the tasks of stages using this context in `tasks`.
    pub fn with_tasks(mut self, tasks: ActiveTasks) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn cancel_rx(&self) -> &CancelRx {
        &self.cancel_rx
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn tasks(&self) -> &ActiveTasks {
        &self.tasks
    }
}

/// A pipeline stage that owns one output channel.
pub trait Stage {
    /// Type of the values written to the output channel.
    type Output;

    /// Spawns the stage on the current tokio runtime.
    ///
    /// Returns immediately with the read side of the freshly created output channel and a
    /// handle to the running stage. Must be called from within a tokio runtime.
    fn start(self) -> (StageReceiver<Self::Output>, StageHandle);
}

/// Handle to a running stage.
///
/// The handle can be dropped without affecting the stage, which keeps running until its
/// input runs out or cancellation fires.
#[derive(Debug)]
pub struct StageHandle {
    name: String,
    phase_rx: watch::Receiver<StagePhase>,
    join_handle: JoinHandle<PipelineResult<StageSummary>>,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current phase of the stage.
    pub fn phase(&self) -> StagePhase {
        *self.phase_rx.borrow()
    }

    /// Returns a receiver notified on every phase transition.
    pub fn subscribe_phase(&self) -> watch::Receiver<StagePhase> {
        self.phase_rx.clone()
    }

    /// Returns `true` once the stage task has terminated.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Waits for the stage to terminate and returns its summary.
    ///
    /// A stage task that panicked is reported as [`ErrorKind::StagePanic`].
    pub async fn wait(self) -> PipelineResult<StageSummary> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(stage = %self.name, error = %err, "stage task failed");

                Err(pipeline_error!(
                    ErrorKind::StagePanic,
                    "Stage task panicked",
                    format!("The stage '{}' terminated abnormally: {err}", self.name)
                ))
            }
        }
    }
}

/// Publishes the phase transitions of a running stage.
#[derive(Debug)]
pub(crate) struct PhaseReporter {
    stage: String,
    phase_tx: watch::Sender<StagePhase>,
}

impl PhaseReporter {
    pub(crate) fn stage(&self) -> &str {
        &self.stage
    }

    pub(crate) fn set(&self, phase: StagePhase) {
        self.phase_tx.send_replace(phase);
        debug!(stage = %self.stage, %phase, "stage phase changed");
    }

    /// Closes `output` and moves the stage to its terminal phase.
    ///
    /// This is the only place where stages close their output channel.
    pub(crate) fn close<T>(
        &self,
        output: StageSender<T>,
        emitted: usize,
        outcome: StageOutcome,
    ) -> StageSummary {
        match outcome {
            StageOutcome::Drained => self.set(StagePhase::Draining),
            StageOutcome::Cancelled | StageOutcome::Disconnected | StageOutcome::Failed => {
                self.set(StagePhase::CancelledAbort)
            }
        }

        if outcome == StageOutcome::Cancelled {
            counter!(STAGEPIPE_STAGES_CANCELLED_TOTAL, STAGE_LABEL => self.stage.clone())
                .increment(1);
        }

        output.close();
        self.set(StagePhase::Closed);

        debug!(stage = %self.stage, emitted, ?outcome, "stage closed its output");

        StageSummary {
            stage: self.stage.clone(),
            emitted,
            outcome,
        }
    }
}

impl Drop for PhaseReporter {
    // A stage task that unwinds never reaches `close`, its output was dropped with it.
    fn drop(&mut self) {
        let reached_closed = self.phase_tx.send_if_modified(|phase| {
            if *phase == StagePhase::Closed {
                return false;
            }
            *phase = StagePhase::Closed;
            true
        });

        if reached_closed {
            debug!(stage = %self.stage, "stage ended without closing its output explicitly");
        }
    }
}

/// Closes the output of a stage and turns its run into the result returned by
/// [`StageHandle::wait`].
pub(crate) fn finish_stage<T>(
    phase: &PhaseReporter,
    output: StageSender<T>,
    emitted: usize,
    result: PipelineResult<StageOutcome>,
) -> PipelineResult<StageSummary> {
    counter!(STAGEPIPE_VALUES_EMITTED_TOTAL, STAGE_LABEL => phase.stage.clone())
        .increment(emitted as u64);

    match result {
        Ok(outcome) => Ok(phase.close(output, emitted, outcome)),
        Err(err) => {
            phase.close(output, emitted, StageOutcome::Failed);
            error!(stage = %phase.stage, error = %err, "stage stopped with an error");
            Err(err)
        }
    }
}

/// Spawns the task of a stage named `name`, registered in `tasks` for its whole lifetime.
pub(crate) fn spawn_stage<F, Fut>(name: String, tasks: &ActiveTasks, run: F) -> StageHandle
where
    F: FnOnce(PhaseReporter) -> Fut,
    Fut: Future<Output = PipelineResult<StageSummary>> + Send + 'static,
{
    let (phase_tx, phase_rx) = watch::channel(StagePhase::Created);
    let reporter = PhaseReporter {
        stage: name.clone(),
        phase_tx,
    };

    let guard = tasks.enter();
    let future = run(reporter);
    let join_handle = tokio::spawn(async move {
        let _guard = guard;
        future.await
    });

    debug!(stage = %name, "stage spawned");

    StageHandle {
        name,
        phase_rx,
        join_handle,
    }
}
