use std::collections::HashSet;
use std::time::{Duration, Instant};

use config::shared::PipelineConfig;
use stagepipe::pipeline::Pipeline;
use stagepipe::stages::StageOutcome;
use stagepipe::test_utils::pipeline::{collect_until_closed, test_pipeline_config};
use telemetry::init_test_tracing;

const GRACE: Duration = Duration::from_secs(2);

fn square(x: i64) -> i64 {
    x * x
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn squares_of_default_values_are_merged() {
    init_test_tracing();

    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    let merged = pipeline.start().unwrap();

    let mut values = collect_until_closed(&merged).await;
    values.sort();
    assert_eq!(values, vec![100, 10_000, 100_000_000]);

    // Closed stays closed.
    assert_eq!(merged.recv().await, None);

    pipeline.shutdown();
    assert!(pipeline.wait_for_idle(GRACE).await);
    assert_eq!(pipeline.active_tasks(), 0);

    let report = pipeline.wait().await.unwrap();
    assert_eq!(report.merged(), 3);
    assert!(
        report
            .stages
            .iter()
            .all(|summary| summary.outcome == StageOutcome::Drained)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_before_start_yields_nothing() {
    init_test_tracing();

    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    pipeline.cancel_tx().trigger();

    let merged = pipeline.start().unwrap();
    assert!(collect_until_closed(&merged).await.is_empty());

    assert!(pipeline.wait_for_idle(GRACE).await);
    let report = pipeline.wait().await.unwrap();
    assert_eq!(report.merged(), 0);
    assert_eq!(report.stage("source").unwrap().emitted, 0);
    assert!(
        report
            .stages
            .iter()
            .all(|summary| summary.outcome == StageOutcome::Cancelled)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_transform_delays_close_until_done() {
    init_test_tracing();

    let delay = Duration::from_millis(200);
    let mut pipeline = Pipeline::new(PipelineConfig::default(), move |x| {
        if x == 10 {
            std::thread::sleep(delay);
        }
        x * x
    });

    let started = Instant::now();
    let merged = pipeline.start().unwrap();
    let mut values = collect_until_closed(&merged).await;

    assert!(started.elapsed() >= delay);
    values.sort();
    assert_eq!(values, vec![100, 10_000, 100_000_000]);

    pipeline.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_while_blocked_leaves_no_task_behind() {
    init_test_tracing();

    let config = PipelineConfig {
        values: (0..1_000).collect(),
        transform_workers: 4,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config, square);
    let merged = pipeline.start().unwrap();

    // Nobody reads, so every stage ends up blocked on a send.
    assert!(merged.recv().await.is_some());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pipeline.active_tasks() > 0);

    pipeline.shutdown();
    assert!(pipeline.wait_for_idle(GRACE).await);
    assert_eq!(pipeline.active_tasks(), 0);

    let report = pipeline.wait().await.unwrap();
    assert!(report.stage("source").unwrap().emitted < 1_000);
    assert_eq!(report.stage("merge").unwrap().outcome, StageOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_value_is_merged_exactly_once() {
    init_test_tracing();

    let values = (1..=500).collect::<Vec<i64>>();
    let mut pipeline = Pipeline::new(test_pipeline_config(values.clone(), 8), |x| x + 1);
    let merged = pipeline.start().unwrap();

    let output = collect_until_closed(&merged).await;
    assert_eq!(output.len(), values.len());
    assert_eq!(
        output.into_iter().collect::<HashSet<_>>(),
        values.iter().map(|x| x + 1).collect::<HashSet<_>>()
    );

    let report = pipeline.wait().await.unwrap();
    let transformed: usize = report
        .stages
        .iter()
        .filter(|summary| summary.stage.starts_with("transform-"))
        .map(|summary| summary.emitted)
        .sum();
    assert_eq!(transformed, values.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_worker_preserves_order() {
    init_test_tracing();

    let values = (0..200).rev().collect::<Vec<i64>>();
    let mut pipeline = Pipeline::new(test_pipeline_config(values.clone(), 1), |x| x * 3);
    let merged = pipeline.start().unwrap();

    let output = collect_until_closed(&merged).await;
    assert_eq!(output, values.iter().map(|x| x * 3).collect::<Vec<_>>());

    pipeline.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn larger_channels_produce_the_same_values() {
    init_test_tracing();

    let config = PipelineConfig {
        channel_capacity: 16,
        ..test_pipeline_config((0..100).collect(), 3)
    };
    let mut pipeline = Pipeline::new(config, square);
    let merged = pipeline.start().unwrap();

    let mut output = collect_until_closed(&merged).await;
    output.sort();
    assert_eq!(output, (0..100).map(square).collect::<Vec<_>>());

    pipeline.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_the_merged_output_stops_every_stage() {
    init_test_tracing();

    let mut pipeline = Pipeline::new(test_pipeline_config((0..1_000).collect(), 2), square);
    let merged = pipeline.start().unwrap();
    drop(merged);

    // Without cancellation, stages stop because nobody reads their output anymore.
    assert!(pipeline.wait_for_idle(GRACE).await);

    let report = pipeline.wait().await.unwrap();
    assert!(
        report
            .stages
            .iter()
            .all(|summary| summary.outcome == StageOutcome::Disconnected)
    );
}
