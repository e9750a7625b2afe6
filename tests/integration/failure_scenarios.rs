//! Failure tests for the assessment engine
//!
//! These tests verify that the engine handles failures gracefully:
//! - Subscriptions that never complete
//! - Transient and fatal transport errors
//! - Assessor tasks that die mid-cycle
//! - Unknown metrics and malformed channel values

use std::collections::HashSet;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use pretty_assertions::assert_eq;
use runtime_assessment::metrics::UNKNOWN_METRIC;
use runtime_assessment::requirement::VALUE_NOT_NUMERIC;
use runtime_assessment::transport::Subscription;
use runtime_assessment::{
    ChannelStatus, EngineHandle, InMemoryTransport, MetricKey, MetricSpec, Mode, Observation,
    Phase, Requirement, Transport, TransportError, Verdict,
};
use serde_json::json;

use crate::helpers::*;

const STALLED: &str = "/turtle1/stalled";
const CRASHING: &str = "/turtle1/crashing";

/// Delegates to an in-memory transport; `CRASHING` delivers one value and then panics
struct CrashingTransport {
    inner: Arc<InMemoryTransport>,
}

#[async_trait]
impl Transport for CrashingTransport {
    async fn list_process_names(&self) -> Result<HashSet<String>, TransportError> {
        self.inner.list_process_names().await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        if channel != CRASHING {
            return self.inner.subscribe(channel).await;
        }

        let first = Observation::new(json!(1.0), self.inner.current_time());
        let crash = stream::poll_fn(|_| -> Poll<Option<Observation>> {
            panic!("channel decoder crashed")
        });
        Ok(stream::once(async move { first }).chain(crash).boxed())
    }

    fn current_time(&self) -> DateTime<Utc> {
        self.inner.current_time()
    }
}

#[tokio::test]
async fn test_subscription_timeout_is_isolated() {
    let transport = create_transport();
    transport.stall_channel(STALLED);

    let config = create_test_config()
        .with_subscribe_timeout(Duration::from_millis(50))
        .with_channel(STALLED, vec![Requirement::scalar(1.0)])
        .with_channel(POSE, vec![]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    for _ in 0..4 {
        transport.publish(POSE, json!(1.0));
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let report = finish_target(&mut handle, &transport, Duration::from_secs(2)).await;

    let stalled = report.channel(STALLED).unwrap();
    assert_matches!(
        &stalled.status,
        ChannelStatus::FailedToStart { reason } if reason.contains("timed out")
    );
    assert!(!stalled.requirement_outcomes[0].passed);

    assert_eq!(report.channel(POSE).unwrap().message_count, 4);
    assert_eq!(report.metrics.number_of_messages, 4);
    assert_eq!(report.metrics.frequency, Some(2.0));
}

#[tokio::test]
async fn test_transient_poll_failures_are_skipped() {
    let transport = create_transport();
    transport.fail_next_polls(3);

    let handle = start_engine(create_test_config(), &transport);
    start_target(&handle, &transport, &[]).await;

    assert_eq!(handle.phase(), Phase::Running);

    handle.shutdown().await.unwrap();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_is_fatal() {
    let transport = create_transport();
    let config = create_test_config().with_channel(POSE, vec![]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    transport.disconnect();

    assert!(handle.wait_for_phase(Phase::Ended).await.is_err());
    assert!(handle.next_report().await.is_none());

    let result = handle.join().await;
    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("disconnected"));
}

#[tokio::test]
async fn test_subscription_disconnect_is_fatal() {
    let transport = create_transport();
    transport.refuse_channel(STALLED);

    let config = create_test_config()
        .with_channel(POSE, vec![])
        .with_channel(STALLED, vec![Requirement::scalar(1.0)]);

    let mut handle = start_engine(config, &transport);
    transport.add_process(TARGET);

    let report = tokio::time::timeout(WAIT, handle.next_report()).await.unwrap();
    assert!(report.is_none());
    assert_eq!(transport.subscriber_count(POSE), 0);

    let result = handle.join().await;
    assert!(format!("{:#}", result.unwrap_err()).contains("disconnected"));
}

#[tokio::test]
async fn test_lost_assessor_is_reported_as_aborted() {
    let transport = create_transport();
    let crashing = Arc::new(CrashingTransport {
        inner: transport.clone(),
    });

    let config = create_test_config()
        .with_channel(CRASHING, vec![Requirement::scalar(1.0)])
        .with_channel(POSE, vec![]);

    let mut handle = EngineHandle::start(config, crashing);
    start_target(&handle, &transport, &[POSE]).await;

    for _ in 0..4 {
        transport.publish(POSE, json!(1.0));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = finish_target(&mut handle, &transport, Duration::from_secs(2)).await;

    let lost = report.channel(CRASHING).unwrap();
    assert_matches!(
        &lost.status,
        ChannelStatus::Aborted { reason } if reason.contains("assessor task failed")
    );
    assert!(!lost.requirement_outcomes[0].passed);
    assert!(!report.passed());

    assert_eq!(report.channel(POSE).unwrap().message_count, 4);
    assert_eq!(report.metrics.number_of_messages, 4);
    assert_eq!(report.metrics.frequency, Some(2.0));

    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_unknown_metric_does_not_stop_assessment() {
    let transport = create_transport();
    let mut config = create_test_config().with_metric(
        MetricKey::NumberOfMessages,
        vec![Requirement::scalar(2.0).with_mode(Mode::Total)],
    );
    config.metrics.insert(
        0,
        MetricSpec {
            metric_name: "latency".to_string(),
            requirements: vec![Requirement::scalar(1.0).with_mode(Mode::Total)],
        },
    );
    let config = config.with_channel(POSE, vec![]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    transport.publish(POSE, json!(1));
    transport.publish(POSE, json!(2));

    let report = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;

    let verdicts: Vec<_> = report
        .metric_outcomes
        .iter()
        .map(|o| (o.metric_name.as_str(), o.verdict.clone()))
        .collect();
    assert_eq!(
        verdicts,
        vec![
            ("latency", Verdict::Invalid(UNKNOWN_METRIC.to_string())),
            ("number_of_messages", Verdict::Passed)
        ]
    );
}

#[tokio::test]
async fn test_malformed_values_fail_requirement() {
    let transport = create_transport();
    let config = create_test_config().with_channel(
        POSE,
        vec![Requirement::range(Some(0.0), Some(11.0)).with_field("x")],
    );

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE]).await;

    transport.publish(POSE, json!({ "y": 3.0 }));

    let report = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;
    let outcome = &report.channel(POSE).unwrap().requirement_outcomes[0];

    assert!(!outcome.passed);
    assert_eq!(outcome.reason.as_deref(), Some(VALUE_NOT_NUMERIC));
}
