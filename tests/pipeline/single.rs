//! Single mode: one record, one send and one settlement per message.

use queue_shovel::bus::InMemoryBroker;
use queue_shovel::pipeline::MessageProcessor;
use queue_shovel::sink::InMemorySink;

use crate::support::{logged_broker, publish_all, single_config, RecordingTerminator, QUEUE, WAIT};

// ============================================================================
// Test 1: Each message is sent as its own batch
// ============================================================================

#[test]
fn each_message_is_sent_as_its_own_batch() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    publish_all(&broker, &[("a", "1"), ("b", "2"), ("c", "3")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(true, 0))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(3, WAIT));
    running.consumer.stop();

    let batches = sink.batches();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() == 1));
    let order: Vec<_> = broker
        .acked()
        .iter()
        .map(|m| m.content_str().unwrap().to_string())
        .collect();
    assert_eq!(order, vec!["1", "2", "3"]);
}

// ============================================================================
// Test 2: Consume limit terminates after settling
// ============================================================================

#[test]
fn consume_limit_terminates_after_settling() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    let terminator = RecordingTerminator::default();
    publish_all(
        &broker,
        &[("k", "1"), ("k", "2"), ("k", "3"), ("k", "4"), ("k", "5")],
    );

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(true, 2))
        .start_with_terminator(terminator.clone())
        .unwrap();

    assert!(terminator.wait(WAIT));
    running.consumer.stop();

    assert_eq!(terminator.calls(), vec![2]);
    assert_eq!(sink.records().len(), 2);
    // Both counted messages were acked before termination.
    let acked: Vec<_> = broker
        .acked()
        .iter()
        .map(|m| m.content_str().unwrap().to_string())
        .collect();
    assert_eq!(acked, vec!["1", "2"]);
    // Nothing past the limit was forwarded or acked.
    assert_eq!(broker.ready(QUEUE) + broker.unacked(), 3);
}

// ============================================================================
// Test 3: Failed sends count towards the limit
// ============================================================================

#[test]
fn failed_sends_count_towards_the_limit() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    sink.set_fail_always(true);
    let terminator = RecordingTerminator::default();
    publish_all(&broker, &[("k", "1"), ("k", "2")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(true, 2))
        .start_with_terminator(terminator.clone())
        .unwrap();

    assert!(terminator.wait(WAIT));
    running.consumer.stop();

    assert_eq!(terminator.calls(), vec![2]);
    assert!(broker.acked().is_empty());
    assert!(broker.nacked().len() >= 2);
    assert!(sink.records().is_empty());
}

// ============================================================================
// Test 4: A message that does not fit the sink batch is nacked
// ============================================================================

#[test]
fn oversized_message_is_nacked() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events").with_max_batch_bytes(64);
    let terminator = RecordingTerminator::default();
    let big = "q".repeat(100);
    publish_all(&broker, &[("k", big.as_str())]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(true, 1))
        .start_with_terminator(terminator.clone())
        .unwrap();

    assert!(terminator.wait(WAIT));
    running.consumer.stop();

    // Redeliveries after termination are nacked too.
    assert!(broker.acked().is_empty());
    assert!(!broker.nacked().is_empty());
    assert_eq!(sink.send_attempts(), 0);
}

// ============================================================================
// Test 5: A failure on one message does not block the next
// ============================================================================

#[test]
fn failure_on_one_message_does_not_block_the_next() {
    let broker = logged_broker();
    let sink = InMemorySink::new("events");
    sink.fail_next_sends(1);
    publish_all(&broker, &[("k", "first"), ("k", "second")]);

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(true, 0))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    assert!(broker.wait_for_settled(3, WAIT));
    running.consumer.stop();

    let nacked = broker.nacked();
    assert_eq!(nacked.len(), 1);
    assert_eq!(nacked[0].content_str(), Some("first"));

    // The redelivery keeps its place ahead of the second message.
    let acked: Vec<_> = broker
        .acked()
        .iter()
        .map(|m| m.content_str().unwrap().to_string())
        .collect();
    assert_eq!(acked, vec!["first", "second"]);
    assert_eq!(running.stats.snapshot().sends_failed, 1);
}

// ============================================================================
// Test 6: A redelivery loop keeps broker memory flat
// ============================================================================

#[test]
fn redelivery_loop_does_not_retain_settled_messages() {
    // Production broker: no settlement log.
    let broker = InMemoryBroker::new();
    let sink = InMemorySink::new("events");
    broker
        .publish(QUEUE, "events", "k", vec![b'm'; 1024])
        .unwrap();

    let running = MessageProcessor::new(broker.clone(), sink.clone(), QUEUE, single_config(false, 0))
        .start_with_terminator(RecordingTerminator::default())
        .unwrap();

    // Success without the ack policy nacks, so the one message cycles.
    assert!(broker.wait_for_settled(50, WAIT));
    std::thread::sleep(std::time::Duration::from_millis(100));
    running.consumer.stop();

    assert!(broker.nacked_count() >= 50);
    assert_eq!(broker.acked_count(), 0);
    assert!(broker.nacked().is_empty());
    assert!(broker.acked().is_empty());
    assert_eq!(broker.ready(QUEUE) + broker.unacked(), 1);
}
