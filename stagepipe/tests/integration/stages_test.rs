use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use stagepipe::concurrency::cancel::create_cancel_channel;
use stagepipe::concurrency::tracker::ActiveTasks;
use stagepipe::stages::{
    MergeStage, SourceStage, Stage, StageContext, StageOutcome, StagePhase, TransformStage, merge,
    source, transform,
};
use stagepipe::test_utils::pipeline::{collect_until_closed, wait_for_stage};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn free_functions_compose_into_a_pipeline() {
    init_test_tracing();
    let (_cancel_tx, cancel_rx) = create_cancel_channel();

    let numbers = source(vec![10_000i64, 10, 100], cancel_rx.clone());
    let squared = (0..2)
        .map(|_| transform(numbers.clone(), |x: i64| x * x, cancel_rx.clone()))
        .collect::<Vec<_>>();
    drop(numbers);

    let merged = merge(squared, cancel_rx);
    let mut values = merged.into_stream().collect::<Vec<_>>().await;
    values.sort();

    assert_eq!(values, vec![100, 10_000, 100_000_000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_source_emits_a_prefix() {
    init_test_tracing();

    let values = (0..10_000).collect::<Vec<i64>>();
    for _ in 0..20 {
        let (cancel_tx, cancel_rx) = create_cancel_channel();
        let (read_before_cancel, delay_us) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0..50usize), rng.gen_range(0..500u64))
        };

        let (rx, handle) =
            SourceStage::new(values.clone(), StageContext::new(cancel_rx.clone())).start();
        let output = transform(rx, |x: i64| x, cancel_rx);

        let mut received = Vec::new();
        for _ in 0..read_before_cancel {
            match output.recv().await {
                Some(value) => received.push(value),
                None => break,
            }
        }
        tokio::time::sleep(Duration::from_micros(delay_us)).await;
        cancel_tx.trigger();

        received.extend(collect_until_closed(&output).await);
        assert_eq!(received, &values[..received.len()]);

        let summary = wait_for_stage(handle).await;
        assert_eq!(summary.outcome, StageOutcome::Cancelled);
        assert!(summary.emitted >= received.len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_stage_ends_closed() {
    init_test_tracing();
    let (cancel_tx, cancel_rx) = create_cancel_channel();
    let tasks = ActiveTasks::new();
    let context = StageContext::new(cancel_rx).with_tasks(tasks.clone());

    let (numbers, source_handle) = SourceStage::new(0..100i64, context.clone()).start();
    let (doubled, transform_handle) =
        TransformStage::new(numbers, |x: i64| x * 2, context.clone()).start();
    let (merged, merge_handle) = MergeStage::new(vec![doubled], context).start();

    let mut phases = vec![
        source_handle.subscribe_phase(),
        transform_handle.subscribe_phase(),
        merge_handle.subscribe_phase(),
    ];

    assert_eq!(merged.recv().await, Some(0));
    cancel_tx.trigger();

    // Whatever was accepted before cancellation is still delivered, then the output closes.
    let rest = collect_until_closed(&merged).await;
    assert!(rest.len() <= 1);
    assert_eq!(merged.recv().await, None);

    for handle in [source_handle, transform_handle, merge_handle] {
        let summary = wait_for_stage(handle).await;
        assert_eq!(summary.outcome, StageOutcome::Cancelled);
    }
    for phase in phases.iter_mut() {
        assert_eq!(*phase.borrow_and_update(), StagePhase::Closed);
    }
    assert_eq!(tasks.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_cancellation_never_reports_disconnection() {
    init_test_tracing();

    for _ in 0..200 {
        let (cancel_tx, cancel_rx) = create_cancel_channel();
        let context = StageContext::new(cancel_rx);

        let (numbers, source_handle) = SourceStage::new(0..1_000i64, context.clone()).start();
        let (doubled, transform_handle) =
            TransformStage::new(numbers, |x: i64| x * 2, context.clone()).start();
        let (merged, merge_handle) = MergeStage::new(vec![doubled], context).start();

        assert_eq!(merged.recv().await, Some(0));
        cancel_tx.trigger();
        collect_until_closed(&merged).await;

        for handle in [source_handle, transform_handle, merge_handle] {
            let summary = wait_for_stage(handle).await;
            assert_eq!(
                summary.outcome,
                StageOutcome::Cancelled,
                "stage '{}' did not report cancellation",
                summary.stage
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_keeps_per_input_order() {
    init_test_tracing();
    let (_cancel_tx, cancel_rx) = create_cancel_channel();

    let inputs = (0..4i64)
        .map(|input| source((0..50).map(move |x| input * 1_000 + x), cancel_rx.clone()))
        .collect::<Vec<_>>();
    let merged = merge(inputs, cancel_rx);

    let values = collect_until_closed(&merged).await;
    assert_eq!(values.len(), 200);
    for input in 0..4i64 {
        let from_input = values
            .iter()
            .copied()
            .filter(|value| value / 1_000 == input)
            .collect::<Vec<_>>();
        assert_eq!(from_input, (0..50).map(|x| input * 1_000 + x).collect::<Vec<_>>());
    }
}
