use tracing::trace;

use crate::concurrency::cancel::CancelRx;
use crate::concurrency::channel::{SendOutcome, StageReceiver, stage_channel};
use crate::failpoints::{SOURCE_STAGE__BEFORE_SEND, stage_fail_point};
use crate::stages::base::{
    Stage, StageContext, StageHandle, StageOutcome, StagePhase, finish_stage, spawn_stage,
};

/// Stage that emits a fixed sequence of values in order.
#[derive(Debug)]
pub struct SourceStage<T> {
    name: String,
    values: Vec<T>,
    context: StageContext,
}

impl<T> SourceStage<T>
where
    T: Send + 'static,
{
    pub fn new(values: impl IntoIterator<Item = T>, context: StageContext) -> Self {
        Self {
            name: "source".to_string(),
            values: values.into_iter().collect(),
            context,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T> Stage for SourceStage<T>
where
    T: Send + 'static,
{
    type Output = T;

    fn start(self) -> (StageReceiver<T>, StageHandle) {
        let (tx, rx) = stage_channel(self.context.channel_capacity());
        let mut cancel_rx = self.context.cancel_rx().clone();
        let values = self.values;

        let handle = spawn_stage(self.name, self.context.tasks(), move |phase| async move {
            phase.set(StagePhase::Running);

            let mut emitted = 0;
            let mut result = Ok(StageOutcome::Drained);
            for value in values {
                if let Err(err) = stage_fail_point(SOURCE_STAGE__BEFORE_SEND) {
                    result = Err(err);
                    break;
                }

                match tx.send(value, &mut cancel_rx).await {
                    SendOutcome::Delivered => {
                        emitted += 1;
                        trace!(stage = %phase.stage(), emitted, "value emitted");
                    }
                    SendOutcome::Cancelled => {
                        result = Ok(StageOutcome::Cancelled);
                        break;
                    }
                    SendOutcome::Disconnected => {
                        result = Ok(StageOutcome::Disconnected);
                        break;
                    }
                }
            }

            finish_stage(&phase, tx, emitted, result)
        });

        (rx, handle)
    }
}

/// Starts a source emitting `values` in order and returns the read side of its output.
///
/// The output is closed once every value was delivered, or earlier if `cancel_rx` fires.
pub fn source<T>(values: impl IntoIterator<Item = T>, cancel_rx: CancelRx) -> StageReceiver<T>
where
    T: Send + 'static,
{
    let (rx, _handle) = SourceStage::new(values, StageContext::new(cancel_rx)).start();
    rx
}
