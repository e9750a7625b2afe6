//! Per-channel evaluation through the whole engine

use std::time::Duration;

use pretty_assertions::assert_eq;
use runtime_assessment::report::NO_VALUES_OBSERVED;
use runtime_assessment::{ChannelStatus, Comparator, Mode, Requirement};
use serde_json::json;

use crate::helpers::*;

const SPEED: &str = "/turtle1/cmd_vel";

#[tokio::test]
async fn test_temporal_consistency_failure_sticks() {
    let transport = create_transport();
    let at_most_five = Requirement::scalar(5.0).with_comparator(Comparator::Le);
    let config = create_test_config().with_channel(
        SPEED,
        vec![
            at_most_five.clone().with_temporal_consistency(true),
            at_most_five,
        ],
    );

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[SPEED]).await;

    for value in [1.0, 9.0, 2.0] {
        transport.publish(SPEED, json!(value));
    }

    let report = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;
    let channel = report.channel(SPEED).unwrap();

    // the sticky requirement keeps its failure, the other one only sees the last value
    assert!(!channel.requirement_outcomes[0].passed);
    assert!(channel.requirement_outcomes[1].passed);
    assert_eq!(channel.requirement_outcomes[0].failures, 1);
    assert_eq!(channel.requirement_outcomes[0].evaluations, 3);
    assert!(!report.passed());
}

#[tokio::test]
async fn test_channels_counted_independently() {
    let transport = create_transport();
    let config = create_test_config()
        .with_channel(POSE, vec![])
        .with_channel(SPEED, vec![]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[POSE, SPEED]).await;

    for _ in 0..3 {
        transport.publish(POSE, json!({ "x": 1.0 }));
    }
    for _ in 0..4 {
        transport.publish(SPEED, json!(0.5));
    }

    let report = finish_target(&mut handle, &transport, Duration::from_secs(7)).await;

    assert_eq!(report.channel(POSE).unwrap().message_count, 3);
    assert_eq!(report.channel(SPEED).unwrap().message_count, 4);
    assert_eq!(report.metrics.number_of_messages, 7);
    assert_eq!(report.metrics.frequency, Some(1.0));

    // reported in configuration order
    let names: Vec<_> = report.channels.iter().map(|c| c.channel_name.as_str()).collect();
    assert_eq!(names, vec![POSE, SPEED]);
}

#[tokio::test]
async fn test_time_window_ignores_early_values() {
    let transport = create_transport();
    let config = create_test_config().with_channel(
        SPEED,
        vec![Requirement::scalar(1.0).with_window(Some(Duration::from_secs(5)), None)],
    );

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[SPEED]).await;

    transport.publish(SPEED, json!(50.0));
    transport.advance(Duration::from_secs(6));
    transport.publish(SPEED, json!(1.0));

    let report = finish_target(&mut handle, &transport, Duration::from_secs(1)).await;
    let channel = report.channel(SPEED).unwrap();

    assert_eq!(channel.message_count, 2);
    assert!(channel.requirement_outcomes[0].passed);
    assert_eq!(channel.requirement_outcomes[0].evaluations, 1);
}

#[tokio::test]
async fn test_silent_channel_is_not_a_pass() {
    let transport = create_transport();
    let config = create_test_config().with_channel(SPEED, vec![Requirement::scalar(1.0)]);

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[SPEED]).await;

    let report = finish_target(&mut handle, &transport, Duration::from_secs(2)).await;
    let channel = report.channel(SPEED).unwrap();

    assert_eq!(channel.status, ChannelStatus::Completed);
    assert_eq!(channel.message_count, 0);
    assert_eq!(
        channel.requirement_outcomes[0].reason.as_deref(),
        Some(NO_VALUES_OBSERVED)
    );
    assert!(!report.passed());
}

#[tokio::test]
async fn test_absent_and_total_modes() {
    let transport = create_transport();
    let config = create_test_config().with_channel(
        SPEED,
        vec![
            // the robot never stands still
            Requirement::scalar(0.0)
                .with_mode(Mode::Absent)
                .with_tolerance(0.01),
            Requirement::scalar(3.0)
                .with_mode(Mode::Total)
                .with_comparator(Comparator::Ge),
        ],
    );

    let mut handle = start_engine(config, &transport);
    start_target(&handle, &transport, &[SPEED]).await;

    for value in [0.5, 1.0, 1.5] {
        transport.publish(SPEED, json!(value));
    }

    let report = finish_target(&mut handle, &transport, Duration::from_secs(3)).await;
    let channel = report.channel(SPEED).unwrap();

    assert!(channel.requirement_outcomes[0].passed);
    assert!(channel.requirement_outcomes[1].passed);
    assert!(report.passed());
}
