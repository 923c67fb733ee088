use std::time::{Duration, Instant};

use config::shared::PipelineConfig;
use stagepipe::error::ErrorKind;
use stagepipe::failpoints::{
    MERGE_FORWARDER__BEFORE_SEND, SOURCE_STAGE__BEFORE_SEND, TRANSFORM_STAGE__BEFORE_SEND,
};
use stagepipe::pipeline::Pipeline;
use stagepipe::test_utils::failpoints::CustomFailScenario;
use stagepipe::test_utils::pipeline::collect_until_closed;
use telemetry::init_test_tracing;

const GRACE: Duration = Duration::from_secs(2);

fn square(x: i64) -> i64 {
    x * x
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_transform_is_waited_for() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(TRANSFORM_STAGE__BEFORE_SEND, "1*sleep(300)")]);

    let started = Instant::now();
    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    let merged = pipeline.start().unwrap();

    let mut values = collect_until_closed(&merged).await;
    assert!(started.elapsed() >= Duration::from_millis(300));
    values.sort();
    assert_eq!(values, vec![100, 10_000, 100_000_000]);

    let report = pipeline.wait().await.unwrap();
    assert_eq!(report.merged(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_transform_is_reported_and_output_still_closes() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(TRANSFORM_STAGE__BEFORE_SEND, "1*panic")]);

    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    let merged = pipeline.start().unwrap();

    // The value held by the panicking transform is lost, the other transform handles the rest.
    let values = collect_until_closed(&merged).await;
    assert_eq!(values.len(), 2);

    assert!(pipeline.wait_for_idle(GRACE).await);
    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::StagePanic]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_forwarder_is_reported_and_output_still_closes() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(MERGE_FORWARDER__BEFORE_SEND, "1*panic")]);

    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    let merged = pipeline.start().unwrap();

    let values = collect_until_closed(&merged).await;
    assert!(values.len() < 3);

    assert!(pipeline.wait_for_idle(GRACE).await);
    assert_eq!(pipeline.active_tasks(), 0);
    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::MergeForwarderPanic]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_source_closes_downstream() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(SOURCE_STAGE__BEFORE_SEND, "return")]);

    let mut pipeline = Pipeline::new(PipelineConfig::default(), square);
    let merged = pipeline.start().unwrap();

    assert!(collect_until_closed(&merged).await.is_empty());

    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::Unknown]);
    assert!(err.detail().unwrap().contains(SOURCE_STAGE__BEFORE_SEND));
}
