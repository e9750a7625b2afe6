//! End-to-end lifecycle tests: appearance, pause/resume, removal and shutdown

use std::time::Duration;

use pretty_assertions::assert_eq;
use runtime_assessment::metrics::METRIC_UNDEFINED;
use runtime_assessment::{
    LifecycleEventKind, MetricKey, Metrics, Mode, Phase, Requirement, Verdict,
};
use serde_json::json;

use crate::helpers::*;

fn metric_requirement(target: f64) -> Requirement {
    Requirement::scalar(target)
        .with_mode(Mode::Total)
        .with_tolerance(0.5)
}

#[tokio::test]
async fn test_full_cycle_reports_metrics() {
    let transport = create_transport();
    let config = create_test_config()
        .with_channel(
            POSE,
            vec![Requirement::range(Some(0.0), Some(11.0)).with_field("x")],
        )
        .with_metric(MetricKey::Frequency, vec![metric_requirement(2.0)])
        .with_metric(MetricKey::ExecutionTime, vec![metric_requirement(10.0)]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    for i in 0..20 {
        transport.publish(POSE, json!({ "x": 5.0, "y": i }));
    }

    let report = finish_target(&mut handle, &transport, Duration::from_secs(10)).await;

    assert_eq!(
        report.metrics,
        Metrics {
            execution_time: 10.0,
            number_of_messages: 20,
            frequency: Some(2.0),
        }
    );
    assert_eq!(report.channel(POSE).unwrap().message_count, 20);
    assert_eq!(
        event_kinds(&report),
        vec![LifecycleEventKind::NodeAdded, LifecycleEventKind::NodeRemoved]
    );
    assert!(report.passed(), "report should pass: {report:#?}");
    assert_eq!(report.started_at, start_time());

    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_zero_execution_time_leaves_frequency_undefined() {
    let transport = create_transport();
    let config =
        create_test_config().with_metric(MetricKey::Frequency, vec![metric_requirement(2.0)]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[]).await;

    let report = finish_target(&mut handle, &transport, Duration::ZERO).await;

    assert_eq!(report.metrics.execution_time, 0.0);
    assert_eq!(report.metrics.frequency, None);
    assert_eq!(
        report.metric_outcomes[0].verdict,
        Verdict::Invalid(METRIC_UNDEFINED.to_string())
    );
    assert!(!report.passed());
}

#[tokio::test]
async fn test_pause_then_removal() {
    let transport = create_transport();
    let config = create_test_config().with_channel(POSE, vec![]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    handle.pause().await.unwrap();
    wait_for_phase(&handle, Phase::Paused).await;

    // assessors keep counting while the engine is paused
    for _ in 0..5 {
        transport.publish(POSE, json!(1.0));
    }

    let report = finish_target(&mut handle, &transport, Duration::from_secs(3)).await;

    assert_eq!(
        event_kinds(&report),
        vec![
            LifecycleEventKind::NodeAdded,
            LifecycleEventKind::AssessmentPaused,
            LifecycleEventKind::NodeRemoved
        ]
    );
    assert_eq!(report.metrics.number_of_messages, 5);
    assert_eq!(handle.phase(), Phase::Ended);
}

#[tokio::test]
async fn test_pause_and_resume_are_recorded() {
    let transport = create_transport();
    let mut handle = start_engine(create_test_config(), &transport);
    start_target(&handle, &transport, &[]).await;

    transport.advance(Duration::from_secs(3));
    handle.pause().await.unwrap();
    wait_for_phase(&handle, Phase::Paused).await;

    // repeated pause requests are ignored
    handle.pause().await.unwrap();

    transport.advance(Duration::from_secs(4));
    handle.resume().await.unwrap();
    wait_for_phase(&handle, Phase::Running).await;

    let report = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;

    assert_eq!(
        event_kinds(&report),
        vec![
            LifecycleEventKind::NodeAdded,
            LifecycleEventKind::AssessmentPaused,
            LifecycleEventKind::AssessmentResumed,
            LifecycleEventKind::NodeRemoved
        ]
    );
    // paused time still counts towards the execution time
    assert_eq!(report.metrics.execution_time, 8.0);
    assert_eq!(handle.events(), report.events);
}

#[tokio::test]
async fn test_shutdown_while_running_still_reports() {
    let transport = create_transport();
    let config = create_test_config().with_channel(POSE, vec![Requirement::scalar(1.0)]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    transport.publish(POSE, json!(1.0));
    transport.advance(Duration::from_secs(2));
    handle.shutdown().await.unwrap();

    let report = next_report(&mut handle).await;

    assert_eq!(event_kinds(&report), vec![LifecycleEventKind::NodeAdded]);
    assert_eq!(report.metrics.number_of_messages, 1);
    assert!(report.passed());
    assert_eq!(transport.subscriber_count(POSE), 0);

    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_while_idle_has_no_report() {
    let transport = create_transport();
    let mut handle = start_engine(create_test_config(), &transport);

    handle.shutdown().await.unwrap();

    let report = tokio::time::timeout(WAIT, handle.next_report()).await.unwrap();
    assert!(report.is_none());
    assert!(handle.events().is_empty());

    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_engine_state_snapshot() {
    let transport = create_transport();
    let handle = start_engine(create_test_config(), &transport);
    start_target(&handle, &transport, &[]).await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.phase, Phase::Running);
    assert_eq!(state.start_time, Some(start_time()));
    assert_eq!(state.metrics, Metrics::default());

    handle.shutdown().await.unwrap();
    handle.join().await.unwrap();
}
