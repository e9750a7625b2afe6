//! Repeated assessment cycles of a target that restarts

use std::time::Duration;

use pretty_assertions::assert_eq;
use runtime_assessment::{LifecycleEventKind, Phase};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_each_appearance_gets_its_own_report() {
    let transport = create_transport();
    let config = create_test_config()
        .with_continuous(true)
        .with_channel(POSE, vec![]);

    let mut handle = start_engine(config, &transport);

    start_target(&handle, &transport, &[POSE]).await;
    transport.publish(POSE, json!(1.0));
    transport.publish(POSE, json!(2.0));
    let first = finish_target(&mut handle, &transport, Duration::from_secs(2)).await;

    wait_for_phase(&handle, Phase::Idle).await;
    transport.advance(Duration::from_secs(10));

    start_target(&handle, &transport, &[POSE]).await;
    for _ in 0..3 {
        transport.publish(POSE, json!(3.0));
    }
    let second = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;

    assert_eq!(first.metrics.number_of_messages, 2);
    assert_eq!(first.metrics.execution_time, 2.0);

    assert_eq!(second.metrics.number_of_messages, 3);
    assert_eq!(second.metrics.execution_time, 1.0);
    assert_eq!(second.started_at, first.ended_at + chrono::Duration::seconds(10));

    // the event history spans cycles
    assert_eq!(
        event_kinds(&second),
        vec![
            LifecycleEventKind::NodeAdded,
            LifecycleEventKind::NodeRemoved,
            LifecycleEventKind::NodeAdded,
            LifecycleEventKind::NodeRemoved
        ]
    );

    handle.shutdown().await.unwrap();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_continuous_engine() {
    let transport = create_transport();
    let mut handle = start_engine(create_test_config().with_continuous(true), &transport);

    start_target(&handle, &transport, &[]).await;
    handle.shutdown().await.unwrap();

    let report = next_report(&mut handle).await;
    assert_eq!(event_kinds(&report), vec![LifecycleEventKind::NodeAdded]);

    // no further cycle starts even though the target is still present
    assert!(handle.next_report().await.is_none());
    handle.join().await.unwrap();
}
