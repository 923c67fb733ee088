use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::concurrency::cancel::CancelRx;
use crate::concurrency::channel::{Received, Relay, SendOutcome, StageReceiver, stage_channel};
use crate::error::{ErrorKind, PipelineError};
use crate::failpoints::{MERGE_FORWARDER__BEFORE_SEND, stage_fail_point};
use crate::pipeline_error;
use crate::stages::base::{
    Stage, StageContext, StageHandle, StageOutcome, StagePhase, finish_stage, spawn_stage,
};

/// What a single forwarding task of a merge stage achieved.
#[derive(Debug)]
struct Forwarded {
    emitted: usize,
    outcome: StageOutcome,
}

/// Stage that funnels several inputs into one output.
///
/// Each input is drained by its own forwarding task. The stage task itself only coordinates:
/// it waits for every forwarder to finish and then closes the merged output, so the output is
/// closed exactly once and never while a forwarder might still write to it. Values from one
/// input keep their relative order, values from different inputs interleave arbitrarily.
#[derive(Debug)]
pub struct MergeStage<T> {
    name: String,
    inputs: Vec<StageReceiver<T>>,
    context: StageContext,
}

impl<T> MergeStage<T>
where
    T: Send + 'static,
{
    pub fn new(inputs: Vec<StageReceiver<T>>, context: StageContext) -> Self {
        Self {
            name: "merge".to_string(),
            inputs,
            context,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T> Stage for MergeStage<T>
where
    T: Send + 'static,
{
    type Output = T;

    fn start(self) -> (StageReceiver<T>, StageHandle) {
        let (tx, rx) = stage_channel(self.context.channel_capacity());
        let cancel_rx = self.context.cancel_rx().clone();
        let tasks = self.context.tasks().clone();
        let inputs = self.inputs;

        let handle = spawn_stage(self.name, self.context.tasks(), move |phase| async move {
            phase.set(StagePhase::Running);

            let mut forwarders = JoinSet::new();
            for (index, input) in inputs.into_iter().enumerate() {
                let relay = tx.relay();
                let cancel_rx = cancel_rx.clone();
                let guard = tasks.enter();

                forwarders.spawn(async move {
                    let _guard = guard;
                    forward(index, input, relay, cancel_rx).await
                });
            }

            debug!(
                stage = %phase.stage(),
                forwarders = forwarders.len(),
                "merge forwarders started"
            );

            let mut emitted = 0;
            let mut outcome = StageOutcome::Drained;
            let mut errors: Vec<PipelineError> = Vec::new();
            while let Some(result) = forwarders.join_next().await {
                match result {
                    Ok(Ok(forwarded)) => {
                        emitted += forwarded.emitted;
                        outcome = outcome.combine(forwarded.outcome);
                    }
                    Ok(Err(err)) => errors.push(err),
                    Err(err) => {
                        error!(stage = %phase.stage(), error = %err, "merge forwarder failed");

                        errors.push(pipeline_error!(
                            ErrorKind::MergeForwarderPanic,
                            "Merge forwarder panicked",
                            format!(
                                "A forwarder of stage '{}' terminated abnormally: {err}",
                                phase.stage()
                            )
                        ));
                    }
                }
            }

            // Every relay is gone now, closing the sender closes the merged output.
            let result = if errors.is_empty() {
                Ok(outcome)
            } else {
                Err(errors.into())
            };

            finish_stage(&phase, tx, emitted, result)
        });

        (rx, handle)
    }
}

/// Copies every value of `input` into the merged output until `input` closes or cancellation
/// fires.
async fn forward<T>(
    index: usize,
    input: StageReceiver<T>,
    relay: Relay<T>,
    mut cancel_rx: CancelRx,
) -> Result<Forwarded, PipelineError> {
    let mut emitted = 0;

    let outcome = loop {
        let value = match input.recv_or_cancel(&mut cancel_rx).await {
            Received::Value(value) => value,
            Received::Closed => break StageOutcome::Drained,
            Received::Cancelled => break StageOutcome::Cancelled,
        };

        stage_fail_point(MERGE_FORWARDER__BEFORE_SEND)?;

        match relay.send(value, &mut cancel_rx).await {
            SendOutcome::Delivered => {
                emitted += 1;
                trace!(forwarder = index, emitted, "value forwarded");
            }
            SendOutcome::Cancelled => break StageOutcome::Cancelled,
            SendOutcome::Disconnected => break StageOutcome::Disconnected,
        }
    };

    debug!(forwarder = index, emitted, ?outcome, "merge forwarder finished");

    Ok(Forwarded { emitted, outcome })
}

/// Starts a merge of `inputs` and returns the read side of the merged output.
///
/// The merged output is closed once every input is closed and drained, or earlier if
/// `cancel_rx` fires. An empty `inputs` yields an output that closes immediately.
pub fn merge<T>(inputs: Vec<StageReceiver<T>>, cancel_rx: CancelRx) -> StageReceiver<T>
where
    T: Send + 'static,
{
    let (rx, _handle) = MergeStage::new(inputs, StageContext::new(cancel_rx)).start();
    rx
}
