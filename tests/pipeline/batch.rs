//! Batch mode: one outbound batch and one settlement per inbound batch.

use queue_shovel::pipeline::MessageProcessor;
use queue_shovel::sink::{InMemorySink, RecordBody};

use crate::support::{batch_config, logged_broker, publish_all, RecordingTerminator, QUEUE, WAIT};

// ============================================================================
// Test 1: Successful send with ack policy acks the whole batch
// ============================================================================

#[test]
fn batch_is_forwarded_in_order_and_acked() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    publish_all(&broker, &[("k1", "a"), ("k2", "b"), ("k3", "c")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, batch_config(true))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(3, WAIT));
    running.consumer.stop();

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let bodies: Vec<_> = batches[0].iter().map(|r| r.body.clone()).collect();
    assert_eq!(
        bodies,
        vec![
            RecordBody::Text("a".into()),
            RecordBody::Text("b".into()),
            RecordBody::Text("c".into()),
        ]
    );
    let keys: Vec<_> = batches[0].iter().map(|r| r.routing_key().to_string()).collect();
    assert_eq!(keys, vec!["k1", "k2", "k3"]);

    assert_eq!(broker.acked().len(), 3);
    assert!(broker.nacked().is_empty());
    assert_eq!(broker.unacked(), 0);
    assert_eq!(running.stats.snapshot().records_sent, 3);
}

// ============================================================================
// Test 2: Sink failure nacks the batch; the redelivery goes through
// ============================================================================

#[test]
fn failed_send_nacks_and_redelivery_succeeds() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    sink.fail_next_sends(1);
    publish_all(&broker, &[("k", "x"), ("k", "y")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, batch_config(true))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(4, WAIT));
    running.consumer.stop();

    // First attempt nacked both, second attempt sent and acked both.
    assert_eq!(broker.nacked().len(), 2);
    let acked = broker.acked();
    assert_eq!(acked.len(), 2);
    assert!(acked.iter().all(|m| m.fields.redelivered));
    assert_eq!(sink.send_attempts(), 2);
    assert_eq!(sink.records().len(), 2);

    let stats = running.stats.snapshot();
    assert_eq!(stats.sends_failed, 1);
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.nacked, 2);
}

// ============================================================================
// Test 3: Without the ack policy, a successful send still nacks
// ============================================================================

#[test]
fn success_without_ack_policy_nacks_for_redelivery() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    publish_all(&broker, &[("k", "only")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, batch_config(false))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(1, WAIT));
    running.consumer.stop();

    assert!(broker.acked().is_empty());
    assert!(!broker.nacked().is_empty());
    // Forwarded at least once, and the message is still on the broker.
    assert!(!sink.records().is_empty());
    assert_eq!(broker.ready(QUEUE) + broker.unacked(), 1);
}

// ============================================================================
// Test 4: An oversized record is dropped, the rest of the batch is sent
// ============================================================================

#[test]
fn oversized_record_is_dropped_and_rest_acked() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events").with_max_batch_bytes(128);
    let big = "z".repeat(200);
    publish_all(&broker, &[("k", "small-1"), ("k", big.as_str()), ("k", "small-2")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, batch_config(true))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(3, WAIT));
    running.consumer.stop();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].body.as_text(), Some("small-1"));
    assert_eq!(records[1].body.as_text(), Some("small-2"));

    // The whole inbound batch, dropped record included, is acked.
    assert_eq!(broker.acked().len(), 3);
    assert_eq!(running.stats.snapshot().records_dropped, 1);
}

// ============================================================================
// Test 5: Binary payloads are forwarded as binary records
// ============================================================================

#[test]
fn binary_payload_is_forwarded_unchanged() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    let payload = vec![0xff, 0x00, 0xfe];
    broker.publish(QUEUE, "events", "bin", payload.clone()).unwrap();

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, batch_config(true))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(1, WAIT));
    running.consumer.stop();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].body, RecordBody::Binary(payload));
    assert_eq!(records[0].routing_key(), "bin");
}

// ============================================================================
// Test 6: Batch mode ignores the consume limit
// ============================================================================

#[test]
fn batch_mode_never_terminates() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    let terminator = RecordingTerminator::default();
    publish_all(&broker, &[("k", "1"), ("k", "2"), ("k", "3")]);

    let mut config = batch_config(true);
    config.consume_limit = 1;
    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, config)
        .start_with_terminator(terminator.clone())
        .unwrap();

    assert!(broker.wait_for_settled(3, WAIT));
    running.consumer.stop();

    assert!(terminator.calls().is_empty());
    assert_eq!(sink.records().len(), 3);
}
