//! Integration tests for the control channel under concurrency

mod common;

use common::builders::{channel, SegmentBuilder};
use statebus_rs::config::{ChannelConfig, DEFAULT_MAX_UNCLAIMED_POLLS};
use statebus_rs::schema::PropertyDecl;
use statebus_rs::{Command, ControlChannel, Payload, StateBusError};
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const RECEIVER: u32 = 10;
const SENDERS: u32 = 4;
const PER_SENDER: u32 = 200;

#[test]
fn test_concurrent_senders_deliver_everything_in_order() {
    let segment = SegmentBuilder::new()
        .schema(vec![PropertyDecl::ring_buffer("controlChannel", 8)])
        .build();
    let receiver = channel(&segment, RECEIVER);

    let senders: Vec<_> = (1..=SENDERS)
        .map(|id| {
            let tx = channel(&segment, id);
            thread::spawn(move || {
                let mut seq = 0;
                while seq < PER_SENDER {
                    match tx.send(RECEIVER, Command::Ping, Payload::entity(seq), 0) {
                        Ok(()) => seq += 1,
                        Err(StateBusError::BufferFull { .. } | StateBusError::LockTimeout { .. }) => {
                            thread::yield_now()
                        }
                        Err(e) => panic!("unexpected send error: {}", e),
                    }
                    assert!(tx.pending() <= tx.capacity());
                }
            })
        })
        .collect();

    let mut next: HashMap<u32, u32> = HashMap::new();
    let mut received = 0;
    let deadline = Instant::now() + common::long_timeout() * 4;

    while received < SENDERS * PER_SENDER {
        assert!(Instant::now() < deadline, "only {} messages arrived", received);
        let messages = receiver.wait_for_message(common::test_timeout()).unwrap();
        for message in messages {
            let seq = message.payload.as_entity().unwrap();
            let expected = next.entry(message.sender).or_insert(0);
            assert_eq!(seq, *expected, "sender {} out of order", message.sender);
            *expected += 1;
            received += 1;
        }
    }

    for sender in senders {
        sender.join().unwrap();
    }

    assert_eq!(received, SENDERS * PER_SENDER);
    assert_eq!(receiver.pending(), 0);
    assert!(receiver.poll().unwrap().is_empty());
}

#[test]
fn test_interleaved_targets_are_kept_for_their_owner() {
    let segment = SegmentBuilder::new().build();
    let orchestrator = channel(&segment, 0);
    let scanner = channel(&segment, 1);
    let pather = channel(&segment, 2);

    orchestrator
        .send(2, Command::PathRequest, Payload::position(1, 2, 3), 1)
        .unwrap();
    orchestrator
        .send(1, Command::TargetAcquired, Payload::entity(7), 0)
        .unwrap();
    orchestrator
        .send(2, Command::TargetLost, Payload::none(), 0)
        .unwrap();
    orchestrator
        .broadcast(Command::Pause, Payload::none(), 5)
        .unwrap();

    let for_scanner = scanner.poll().unwrap();
    let commands: Vec<Command> = for_scanner.iter().map(|m| m.command).collect();
    assert_eq!(commands, vec![Command::TargetAcquired, Command::Pause]);
    assert_eq!(for_scanner[0].payload.as_entity(), Some(7));
    assert!(for_scanner[1].is_broadcast());
    assert_eq!(for_scanner[1].priority, 5);

    let for_pather = pather.poll().unwrap();
    let commands: Vec<Command> = for_pather.iter().map(|m| m.command).collect();
    assert_eq!(
        commands,
        vec![Command::PathRequest, Command::TargetLost, Command::Pause]
    );
    assert_eq!(for_pather[0].payload.as_position(), Some((1, 2, 3)));
    assert_eq!(for_pather[0].sender, 0);

    assert_eq!(orchestrator.pending(), 0);
}

#[test]
fn test_waiting_receiver_wakes_on_send_from_other_thread() {
    let segment = SegmentBuilder::new().build();
    let receiver = channel(&segment, 3);
    let sender = channel(&segment, 4);

    let handle = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(10));
        sender
            .send(3, Command::Invalidate, Payload::none(), 0)
            .unwrap();
    });

    let start = Instant::now();
    let messages = receiver.wait_for_message(common::long_timeout()).unwrap();
    handle.join().unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].command, Command::Invalidate);
    assert!(start.elapsed() < common::long_timeout());
}

#[test]
fn test_broadcast_fans_out_to_every_polling_worker() {
    let segment = SegmentBuilder::new().build();
    let orchestrator = channel(&segment, 0);
    let workers: Vec<_> = (1..=4)
        .map(|id| {
            let rx = channel(&segment, id);
            thread::spawn(move || {
                let mut shutdowns = 0;
                let deadline = Instant::now() + common::long_timeout();
                while shutdowns == 0 && Instant::now() < deadline {
                    for message in rx.wait_for_message(common::test_timeout()).unwrap() {
                        assert_eq!(message.sender, 0);
                        if message.command == Command::Shutdown {
                            shutdowns += 1;
                        }
                    }
                }
                // Nothing left for this worker after the broadcast was taken
                assert!(rx.poll().unwrap().is_empty());
                shutdowns
            })
        })
        .collect();

    orchestrator
        .broadcast(Command::Shutdown, Payload::none(), 9)
        .unwrap();

    let received: Vec<u32> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(received, vec![1, 1, 1, 1]);
    assert_eq!(orchestrator.pending(), 0);
}

#[test]
fn test_ring_recovers_from_messages_nobody_claims() {
    let segment = SegmentBuilder::new()
        .schema(vec![PropertyDecl::ring_buffer("controlChannel", 4)])
        .build();
    let sender = channel(&segment, 1);
    let receiver = channel(&segment, 2);

    // Worker 99 never attaches
    for _ in 0..4 {
        sender.send(99, Command::Ping, Payload::none(), 0).unwrap();
    }
    assert!(matches!(
        sender.send(2, Command::Pause, Payload::none(), 0),
        Err(StateBusError::BufferFull { capacity: 4 })
    ));

    for _ in 0..DEFAULT_MAX_UNCLAIMED_POLLS {
        assert!(receiver.poll().unwrap().is_empty());
    }
    assert_eq!(receiver.pending(), 0);

    sender.send(2, Command::Pause, Payload::none(), 0).unwrap();
    let messages = receiver.poll().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].command, Command::Pause);
}

#[test]
fn test_expired_messages_make_room_without_any_poller() {
    let segment = SegmentBuilder::new()
        .schema(vec![PropertyDecl::ring_buffer("controlChannel", 2)])
        .build();
    let config = ChannelConfig {
        message_ttl_ms: 50,
        ..Default::default()
    };
    let sender = ControlChannel::new(segment, &config, 1).unwrap();

    sender.send(99, Command::Ping, Payload::none(), 0).unwrap();
    sender.send(99, Command::Ping, Payload::none(), 0).unwrap();

    thread::sleep(Duration::from_millis(120));
    sender.send(98, Command::Resume, Payload::none(), 0).unwrap();
    assert_eq!(sender.pending(), 1);
}

#[test]
fn test_send_racing_a_waiting_receiver_always_wakes_it() {
    let segment = SegmentBuilder::new().build();
    let receiver = channel(&segment, 3);
    let sender = Arc::new(channel(&segment, 4));

    for round in 0..200u32 {
        let barrier = Arc::new(Barrier::new(2));
        let handle = {
            let barrier = barrier.clone();
            let sender = sender.clone();
            thread::spawn(move || {
                barrier.wait();
                sender
                    .send(3, Command::Other(100 + round), Payload::none(), 0)
                    .unwrap();
            })
        };

        barrier.wait();
        let start = Instant::now();
        let messages = receiver.wait_for_message(common::long_timeout()).unwrap();
        handle.join().unwrap();

        assert_eq!(messages.len(), 1, "round {}", round);
        assert_eq!(messages[0].command, Command::Other(100 + round));
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "round {} waited {:?}",
            round,
            start.elapsed()
        );
    }
}
