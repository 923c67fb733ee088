use std::marker::PhantomData;

use tracing::trace;

use crate::concurrency::cancel::CancelRx;
use crate::concurrency::channel::{Received, SendOutcome, StageReceiver, stage_channel};
use crate::failpoints::{TRANSFORM_STAGE__BEFORE_SEND, stage_fail_point};
use crate::stages::base::{
    Stage, StageContext, StageHandle, StageOutcome, StagePhase, finish_stage, spawn_stage,
};

/// Stage that applies a function to every value of its input.
///
/// Several transform stages may read from clones of the same [`StageReceiver`], in which case
/// each input value is processed by exactly one of them.
pub struct TransformStage<T, U, F> {
    name: String,
    input: StageReceiver<T>,
    f: F,
    context: StageContext,
    _output: PhantomData<fn() -> U>,
}

impl<T, U, F> TransformStage<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + 'static,
{
    pub fn new(input: StageReceiver<T>, f: F, context: StageContext) -> Self {
        Self {
            name: "transform".to_string(),
            input,
            f,
            context,
            _output: PhantomData,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T, U, F> Stage for TransformStage<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + 'static,
{
    type Output = U;

    fn start(self) -> (StageReceiver<U>, StageHandle) {
        let (tx, rx) = stage_channel(self.context.channel_capacity());
        let mut cancel_rx = self.context.cancel_rx().clone();
        let input = self.input;
        let f = self.f;

        let handle = spawn_stage(self.name, self.context.tasks(), move |phase| async move {
            phase.set(StagePhase::Running);

            let mut emitted = 0;
            let result = loop {
                let value = match input.recv_or_cancel(&mut cancel_rx).await {
                    Received::Value(value) => value,
                    Received::Closed => break Ok(StageOutcome::Drained),
                    Received::Cancelled => break Ok(StageOutcome::Cancelled),
                };

                let output = f(value);
                if let Err(err) = stage_fail_point(TRANSFORM_STAGE__BEFORE_SEND) {
                    break Err(err);
                }

                match tx.send(output, &mut cancel_rx).await {
                    SendOutcome::Delivered => {
                        emitted += 1;
                        trace!(stage = %phase.stage(), emitted, "value transformed");
                    }
                    SendOutcome::Cancelled => break Ok(StageOutcome::Cancelled),
                    SendOutcome::Disconnected => break Ok(StageOutcome::Disconnected),
                }
            };

            // Release our view of the input before closing, so upstream can observe it.
            drop(input);
            finish_stage(&phase, tx, emitted, result)
        });

        (rx, handle)
    }
}

/// Starts a transform applying `f` to every value read from `input` and returns the read side
/// of its output.
///
/// The output is closed once `input` is closed and drained, or earlier if `cancel_rx` fires.
pub fn transform<T, U, F>(input: StageReceiver<T>, f: F, cancel_rx: CancelRx) -> StageReceiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + 'static,
{
    let (rx, _handle) = TransformStage::new(input, f, StageContext::new(cancel_rx)).start();
    rx
}
