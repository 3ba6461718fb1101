//! Start-up: channel setup, prefetch and consumer registration.

use std::time::Duration;

use queue_shovel::bus::{BrokerError, InMemoryBroker};
use queue_shovel::pipeline::MessageProcessor;
use queue_shovel::sink::InMemorySink;
use queue_shovel::ShovelError;

use crate::support::{
    batch_config, logged_broker, publish_all, single_config, RecordingTerminator, QUEUE, WAIT};

// ============================================================================
// Test 1: Channel setup failure is returned from start-up
// ============================================================================

#[test]
fn channel_setup_failure_is_reported() {
    let broker = InMemoryBroker::new().with_channel_setup(|_| Err("access refused".into()));
    let sink = InMemorySink::new("events");

    let result = MessageProcessor::new(broker.clone(), sink, QUEUE, batch_config(true))
        .start_with_terminator(RecordingTerminator::default());

    match result {
        Err(ShovelError::Broker(BrokerError::ChannelSetup(reason))) => {
            assert_eq!(reason, "access refused")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("start-up should fail"),
    }
}

// ============================================================================
// Test 2: Prefetch caps the inbound batch size
// ============================================================================

#[test]
fn prefetch_caps_inbound_batch_size() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    publish_all(
        &broker,
        &[("k", "1"), ("k", "2"), ("k", "3"), ("k", "4"), ("k", "5")],
    );

    let mut config = batch_config(true);
    config.prefetch = Some(2);
    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, config)
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(5, WAIT));
    running.consumer.stop();

    assert_eq!(broker.prefetch_limit(), Some(2));
    let batches = sink.batches();
    assert!(batches.len() >= 3);
    assert!(batches.iter().all(|b| b.len() <= 2));

    // Order survives the split into several batches.
    let bodies: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r.body.as_text().unwrap().to_string())
        .collect();
    assert_eq!(bodies, vec!["1", "2", "3", "4", "5"]);
}

// ============================================================================
// Test 3: A second consumer on the same queue is rejected
// ============================================================================

#[test]
fn second_consumer_on_same_queue_is_rejected() {
    let broker = logged_broker();

    let first = MessageProcessor::new(
        broker.clone(),
        InMemorySink::new("events"),
        QUEUE,
        single_config(true, 0),
    )
    .start_with_terminator(RecordingTerminator::default())
    .unwrap();

    let second = MessageProcessor::new(
        broker.clone(),
        InMemorySink::new("events"),
        QUEUE,
        single_config(true, 0),
    )
    .start_with_terminator(RecordingTerminator::default());

    assert!(matches!(
        second,
        Err(ShovelError::Broker(BrokerError::ConsumerExists(_)))
    ));
    first.consumer.stop();
}

// ============================================================================
// Test 4: Stopping mid-batch returns messages to the queue
// ============================================================================

#[test]
fn stopping_mid_batch_returns_messages_to_the_queue() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    publish_all(&broker, &[("k", "1"), ("k", "2")]);

    // Window long enough that the batch is never released.
    let mut config = batch_config(true);
    config.batch_max_time_ms = 60_000;
    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, config)
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    running.consumer.stop();

    assert!(sink.records().is_empty());
    assert_eq!(broker.unacked(), 0);
    assert_eq!(broker.ready(QUEUE), 2);
}
