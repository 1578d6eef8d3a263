//! Control channel: a spin-locked ring buffer of fixed-size messages living
//! in the shared segment.
//!
//! The channel carries low-latency worker-to-worker events that don't fit the
//! polling model (pause, target acquired, path ready). It is the only
//! structure in the segment with several writers.
//!
//! # Layout
//!
//! ```text
//! | write_index | read_index | count | lock | slot 0 (9 lanes) | slot 1 | ...
//! | members | delivery 0 (pending, skips) | delivery 1 | ...
//! ```
//!
//! # Locking
//!
//! Every operation takes the lock lane with a bounded number of
//! compare-and-swap attempts. Giving up yields [`StateBusError::LockTimeout`];
//! the caller drops the message and carries on. The critical section only
//! copies a handful of lanes.
//!
//! # Delivery
//!
//! Each attached handle owns one bit of the `members` lane, so at most
//! [`MAX_MEMBERS`] handles share a channel. [`ControlChannel::poll`] removes
//! the unicast messages addressed to the polling worker and compacts the
//! rest back into the ring in their original order.
//!
//! A broadcast records the members attached when it was sent, minus the
//! sender. Each of them receives it exactly once; the slot is freed when no
//! attached member is still pending. Handles attaching later don't see it.
//!
//! # Eviction
//!
//! Messages older than [`ChannelConfig::message_ttl_ms`] are evicted, as are
//! unicast messages skipped by [`ChannelConfig::max_unclaimed_polls`] polls of
//! other workers. A message for a worker that never polls therefore can't
//! wedge the ring.

pub mod message;

pub use message::{Command, Message, Payload, PayloadType, BROADCAST};

use crate::config::ChannelConfig;
use crate::error::{Result, StateBusError};
use crate::schema::property::{delivery_lane, ring_header, ring_trailer};
use crate::schema::{PropertyKind, DELIVERY_LANES, MESSAGE_LANES};
use crate::segment::{SharedSegment, WaitOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Spin iterations between yields while contending for the lock
const SPINS_PER_YIELD: u32 = 64;

/// Handles that can be attached to one channel at a time
pub const MAX_MEMBERS: u32 = u32::BITS;

/// One worker's handle on the control channel.
///
/// Dropping the handle detaches it; broadcasts still pending for it no
/// longer hold their slot.
#[derive(Debug)]
pub struct ControlChannel {
    segment: Arc<SharedSegment>,
    /// First lane of the ring-buffer property
    base: usize,
    capacity: u32,
    worker_id: u32,
    /// This handle's bit in the members lane
    member: u32,
    lock_spin_limit: u32,
    message_ttl_ms: u32,
    max_unclaimed_polls: u32,
}

/// Releases the channel lock on drop
struct LockGuard<'a> {
    segment: &'a SharedSegment,
    lane: usize,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.segment.store(self.lane, 0);
    }
}

/// A queued message with its delivery record
#[derive(Debug, Clone, Copy)]
struct Queued {
    message: Message,
    /// Members a broadcast is still pending for
    pending: u32,
    skips: u32,
}

/// Result of one pass over the queued messages
#[derive(Debug, Default)]
struct Sweep {
    delivered: Vec<Message>,
    evicted: usize,
    /// Count lane value when the pass released the lock
    remaining: u32,
}

impl ControlChannel {
    /// Attach worker `worker_id` to the ring-buffer property named in `config`
    pub fn new(segment: Arc<SharedSegment>, config: &ChannelConfig, worker_id: u32) -> Result<Self> {
        if worker_id == BROADCAST {
            return Err(StateBusError::Config(
                "worker id collides with the broadcast sentinel".to_string(),
            ));
        }

        let desc = segment.schema().descriptor(&config.property)?;
        let PropertyKind::RingBuffer { max_messages } = desc.kind else {
            return Err(StateBusError::kind_mismatch(
                &config.property,
                format!("expected ring_buffer, found {}", desc.kind.name()),
            ));
        };
        let base = desc.offset;

        let mut channel = Self {
            segment,
            base,
            capacity: max_messages,
            worker_id,
            member: 0,
            lock_spin_limit: config.lock_spin_limit.max(1),
            message_ttl_ms: config.message_ttl_ms,
            max_unclaimed_polls: config.max_unclaimed_polls,
        };
        channel.member = channel.attach()?;

        tracing::debug!(
            worker = worker_id,
            member = channel.member.trailing_zeros(),
            "Attached to control channel"
        );
        Ok(channel)
    }

    pub fn segment(&self) -> &Arc<SharedSegment> {
        &self.segment
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Messages currently queued for any worker, including broadcasts some
    /// members have not polled yet
    pub fn pending(&self) -> u32 {
        self.segment.load(self.header(ring_header::COUNT))
    }

    /// Handles currently attached to the channel
    pub fn members(&self) -> u32 {
        self.segment.load(self.members_lane()).count_ones()
    }

    #[inline]
    fn header(&self, lane: usize) -> usize {
        self.base + lane
    }

    #[inline]
    fn slot(&self, index: u32) -> usize {
        self.base + ring_header::LANES + index as usize * MESSAGE_LANES
    }

    #[inline]
    fn trailer(&self) -> usize {
        self.slot(self.capacity)
    }

    #[inline]
    fn members_lane(&self) -> usize {
        self.trailer() + ring_trailer::MEMBERS
    }

    #[inline]
    fn delivery(&self, index: u32) -> usize {
        self.trailer() + ring_trailer::LANES + index as usize * DELIVERY_LANES
    }

    fn read_slot(&self, index: u32) -> Queued {
        let start = self.slot(index);
        let mut lanes = [0u32; MESSAGE_LANES];
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = self.segment.load(start + i);
        }
        let delivery = self.delivery(index);
        Queued {
            message: Message::from_lanes(&lanes),
            pending: self.segment.load(delivery + delivery_lane::PENDING),
            skips: self.segment.load(delivery + delivery_lane::SKIPS),
        }
    }

    fn write_slot(&self, index: u32, queued: &Queued) {
        let start = self.slot(index);
        for (i, lane) in queued.message.to_lanes().into_iter().enumerate() {
            self.segment.store(start + i, lane);
        }
        let delivery = self.delivery(index);
        self.segment
            .store(delivery + delivery_lane::PENDING, queued.pending);
        self.segment.store(delivery + delivery_lane::SKIPS, queued.skips);
    }

    fn lock(&self) -> Result<LockGuard<'_>> {
        let lane = self.header(ring_header::LOCK);

        for attempt in 1..=self.lock_spin_limit {
            if self.segment.compare_exchange(lane, 0, 1).is_ok() {
                return Ok(LockGuard {
                    segment: &self.segment,
                    lane,
                });
            }
            if attempt % SPINS_PER_YIELD == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }

        tracing::warn!(
            worker = self.worker_id,
            attempts = self.lock_spin_limit,
            "Control channel lock timed out"
        );
        Err(StateBusError::LockTimeout {
            attempts: self.lock_spin_limit,
        })
    }

    /// Claim a free member bit.
    ///
    /// A reused bit may still be marked pending on broadcasts queued for its
    /// previous owner, so those marks are cleared before the bit is handed out.
    fn attach(&self) -> Result<u32> {
        let _guard = self.lock()?;
        let lane = self.members_lane();

        loop {
            let current = self.segment.load(lane);
            let free = !current;
            if free == 0 {
                return Err(StateBusError::Config(format!(
                    "control channel already has {} attached handles",
                    MAX_MEMBERS
                )));
            }
            let bit = free & free.wrapping_neg();

            for index in 0..self.capacity {
                let pending = self.delivery(index) + delivery_lane::PENDING;
                self.segment
                    .store(pending, self.segment.load(pending) & !bit);
            }

            if self.segment.compare_exchange(lane, current, current | bit).is_ok() {
                return Ok(bit);
            }
        }
    }

    #[inline]
    fn expired(&self, message: &Message, now: u32) -> bool {
        self.message_ttl_ms > 0 && now.wrapping_sub(message.timestamp) > self.message_ttl_ms
    }

    /// Walk the queue under the lock, dropping expired and fully delivered
    /// messages. With `receive` set, messages for this handle are taken and
    /// unicast messages for other workers count one more skip.
    fn sweep(&self, receive: bool) -> Sweep {
        let count_lane = self.header(ring_header::COUNT);
        let mut sweep = Sweep::default();

        let count = self.segment.load(count_lane).min(self.capacity);
        if count == 0 {
            return sweep;
        }

        let now = self.segment.timestamp_ms();
        let members = self.segment.load(self.members_lane());
        let read_lane = self.header(ring_header::READ_INDEX);
        let read = self.segment.load(read_lane) % self.capacity;
        let mut kept = Vec::with_capacity(count as usize);

        for i in 0..count {
            let mut queued = self.read_slot((read + i) % self.capacity);
            let message = queued.message;

            if self.expired(&message, now) {
                tracing::warn!(
                    worker = self.worker_id,
                    sender = message.sender,
                    target = message.target,
                    command = ?message.command,
                    age_ms = now.wrapping_sub(message.timestamp),
                    "Evicted expired control message"
                );
                sweep.evicted += 1;
                continue;
            }

            if message.is_broadcast() {
                queued.pending &= members;
                if receive && queued.pending & self.member != 0 {
                    queued.pending &= !self.member;
                    sweep.delivered.push(message);
                }
                if queued.pending != 0 {
                    kept.push(queued);
                }
                continue;
            }

            if message.target == self.worker_id && receive {
                sweep.delivered.push(message);
                continue;
            }

            if receive && message.target != self.worker_id {
                queued.skips = queued.skips.saturating_add(1);
            }
            if self.max_unclaimed_polls > 0 && queued.skips >= self.max_unclaimed_polls {
                tracing::warn!(
                    worker = self.worker_id,
                    sender = message.sender,
                    target = message.target,
                    command = ?message.command,
                    skips = queued.skips,
                    "Evicted unclaimed control message"
                );
                sweep.evicted += 1;
                continue;
            }
            kept.push(queued);
        }

        // Compact what is left back to the front, oldest first
        for (i, queued) in kept.iter().enumerate() {
            self.write_slot((read + i as u32) % self.capacity, queued);
        }
        let remaining = kept.len() as u32;
        self.segment.store(read_lane, read);
        self.segment
            .store(self.header(ring_header::WRITE_INDEX), (read + remaining) % self.capacity);
        self.segment.store(count_lane, remaining);

        sweep.remaining = remaining;
        sweep
    }

    // ==================== Sending ====================

    /// Queue a message for `target`.
    ///
    /// Fails with [`StateBusError::BufferFull`] when the ring is at capacity
    /// even after evicting stale messages; the message is dropped, there is
    /// no backpressure.
    pub fn send(&self, target: u32, command: Command, payload: Payload, priority: u32) -> Result<()> {
        let message = Message {
            sender: self.worker_id,
            target,
            command,
            priority,
            timestamp: self.segment.timestamp_ms(),
            payload,
        };

        let count_lane = self.header(ring_header::COUNT);
        {
            let _guard = self.lock()?;

            let pending = if message.is_broadcast() {
                let others = self.segment.load(self.members_lane()) & !self.member;
                if others == 0 {
                    tracing::debug!(
                        worker = self.worker_id,
                        ?command,
                        "No other members attached, broadcast dropped"
                    );
                    return Ok(());
                }
                others
            } else {
                0
            };

            let mut count = self.segment.load(count_lane);
            if count >= self.capacity {
                count = self.sweep(false).remaining;
            }
            if count >= self.capacity {
                tracing::warn!(
                    worker = self.worker_id,
                    target,
                    ?command,
                    capacity = self.capacity,
                    "Control channel full, message dropped"
                );
                return Err(StateBusError::BufferFull {
                    capacity: self.capacity,
                });
            }

            let write_lane = self.header(ring_header::WRITE_INDEX);
            let write = self.segment.load(write_lane) % self.capacity;
            self.write_slot(
                write,
                &Queued {
                    message,
                    pending,
                    skips: 0,
                },
            );
            self.segment.store(write_lane, (write + 1) % self.capacity);
            self.segment.fetch_add(count_lane, 1);
        }

        tracing::trace!(worker = self.worker_id, target, ?command, "Message sent");
        self.segment.notify(count_lane);
        Ok(())
    }

    /// Queue a message for every other attached worker
    pub fn broadcast(&self, command: Command, payload: Payload, priority: u32) -> Result<()> {
        self.send(BROADCAST, command, payload, priority)
    }

    // ==================== Receiving ====================

    /// Take every queued message addressed to this worker, oldest first
    pub fn poll(&self) -> Result<Vec<Message>> {
        self.poll_observed().map(|(messages, _)| messages)
    }

    /// Poll, also returning the count lane value left behind by this poll
    fn poll_observed(&self) -> Result<(Vec<Message>, u32)> {
        let count_lane = self.header(ring_header::COUNT);
        let before;
        let sweep = {
            let _guard = self.lock()?;
            before = self.segment.load(count_lane);
            self.sweep(true)
        };

        if !sweep.delivered.is_empty() {
            tracing::trace!(
                worker = self.worker_id,
                received = sweep.delivered.len(),
                "Messages polled"
            );
        }
        if sweep.remaining != before {
            self.segment.notify(count_lane);
        }
        Ok((sweep.delivered, sweep.remaining))
    }

    /// Poll, blocking on the count lane until a message arrives or `timeout`
    /// elapses. Returns an empty list on timeout.
    ///
    /// A lock timeout while polling counts as "nothing yet" and is retried.
    pub fn wait_for_message(&self, timeout: Duration) -> Result<Vec<Message>> {
        let deadline = Instant::now() + timeout;
        let count_lane = self.header(ring_header::COUNT);

        loop {
            // The count is read under the same lock as the poll, so a send
            // landing after the poll always changes it
            let observed = match self.poll_observed() {
                Ok((messages, _)) if !messages.is_empty() => return Ok(messages),
                Ok((_, observed)) => Some(observed),
                Err(StateBusError::LockTimeout { .. }) => None,
                Err(e) => return Err(e),
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            let Some(observed) = observed else {
                std::thread::yield_now();
                continue;
            };

            if self.segment.wait(count_lane, observed, remaining) == WaitOutcome::TimedOut {
                // One last look in case the change raced the wait
                return self.poll().or_else(|e| {
                    if e.is_transient() {
                        Ok(Vec::new())
                    } else {
                        Err(e)
                    }
                });
            }
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if self.member != 0 {
            // Only this handle clears its own bit
            self.segment.fetch_sub(self.members_lane(), self.member);
            tracing::debug!(worker = self.worker_id, "Detached from control channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyDecl, SchemaCompiler};
    use crate::segment::FrameLimits;
    use std::thread;

    fn test_segment(capacity: u32) -> Arc<SharedSegment> {
        let schema = SchemaCompiler::compile(&[
            PropertyDecl::path("currentPath", 2),
            PropertyDecl::ring_buffer("controlChannel", capacity),
        ])
        .unwrap();
        Arc::new(SharedSegment::new(
            schema,
            FrameLimits {
                max_width: 1,
                max_height: 1,
            },
        ))
    }

    fn channel(segment: &Arc<SharedSegment>, worker_id: u32) -> ControlChannel {
        ControlChannel::new(segment.clone(), &ChannelConfig::default(), worker_id).unwrap()
    }

    #[test]
    fn test_send_then_poll_in_order() {
        let segment = test_segment(4);
        let sender = channel(&segment, 1);
        let receiver = channel(&segment, 2);

        sender.send(2, Command::Pause, Payload::none(), 0).unwrap();
        sender.send(2, Command::TargetAcquired, Payload::entity(7), 1).unwrap();
        assert_eq!(receiver.pending(), 2);

        let messages = receiver.poll().unwrap();
        let commands: Vec<Command> = messages.iter().map(|m| m.command).collect();
        assert_eq!(commands, vec![Command::Pause, Command::TargetAcquired]);
        assert_eq!(messages[1].payload.as_entity(), Some(7));
        assert_eq!(messages[0].sender, 1);
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn test_poll_leaves_other_workers_messages() {
        let segment = test_segment(4);
        let sender = channel(&segment, 1);
        let a = channel(&segment, 2);
        let b = channel(&segment, 3);

        sender.send(3, Command::Ping, Payload::none(), 0).unwrap();
        sender.send(2, Command::Pause, Payload::none(), 0).unwrap();
        sender.send(3, Command::Resume, Payload::none(), 0).unwrap();

        let for_a = a.poll().unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].command, Command::Pause);
        assert_eq!(a.pending(), 2);

        let for_b = b.poll().unwrap();
        let commands: Vec<Command> = for_b.iter().map(|m| m.command).collect();
        assert_eq!(commands, vec![Command::Ping, Command::Resume]);
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_capacity_plus_one_drops_last() {
        let segment = test_segment(2);
        let sender = channel(&segment, 1);

        sender.send(2, Command::Other(101), Payload::none(), 0).unwrap();
        sender.send(2, Command::Other(102), Payload::none(), 0).unwrap();
        let err = sender.send(2, Command::Other(103), Payload::none(), 0).unwrap_err();
        assert!(matches!(err, StateBusError::BufferFull { capacity: 2 }));

        let messages = channel(&segment, 2).poll().unwrap();
        let commands: Vec<Command> = messages.iter().map(|m| m.command).collect();
        assert_eq!(commands, vec![Command::Other(101), Command::Other(102)]);
    }

    #[test]
    fn test_wraps_around_the_ring() {
        let segment = test_segment(2);
        let sender = channel(&segment, 1);
        let receiver = channel(&segment, 2);

        for round in 0..5 {
            sender.send(2, Command::Other(100 + round), Payload::none(), 0).unwrap();
            let messages = receiver.poll().unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].command, Command::Other(100 + round));
        }
    }

    #[test]
    fn test_broadcast_reaches_every_member_once() {
        let segment = test_segment(4);
        let sender = channel(&segment, 1);
        let a = channel(&segment, 2);
        let b = channel(&segment, 3);
        sender.broadcast(Command::Invalidate, Payload::none(), 5).unwrap();

        let first = a.poll().unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].is_broadcast());
        assert!(a.poll().unwrap().is_empty());
        assert_eq!(sender.pending(), 1);

        let second = b.poll().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].command, Command::Invalidate);
        assert_eq!(sender.pending(), 0);
        assert!(sender.poll().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_ignores_detached_members() {
        let segment = test_segment(4);
        let sender = channel(&segment, 1);
        let a = channel(&segment, 2);
        let b = channel(&segment, 3);
        sender.broadcast(Command::Shutdown, Payload::none(), 0).unwrap();

        drop(b);
        assert_eq!(a.poll().unwrap().len(), 1);
        assert_eq!(a.pending(), 0);
    }

    #[test]
    fn test_reused_member_bit_starts_clean() {
        let segment = test_segment(4);
        let sender = channel(&segment, 1);
        let a = channel(&segment, 2);
        sender.broadcast(Command::Pause, Payload::none(), 0).unwrap();
        drop(a);

        let late = channel(&segment, 2);
        assert_eq!(late.members(), 2);
        assert!(late.poll().unwrap().is_empty());
        assert_eq!(late.pending(), 0);
    }

    #[test]
    fn test_broadcast_without_listeners_is_dropped() {
        let segment = test_segment(2);
        let sender = channel(&segment, 1);
        sender.broadcast(Command::Ping, Payload::none(), 0).unwrap();
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn test_member_limit() {
        let segment = test_segment(2);
        let handles: Vec<ControlChannel> = (0..MAX_MEMBERS).map(|id| channel(&segment, id)).collect();
        assert_eq!(handles[0].members(), MAX_MEMBERS);

        let config = ChannelConfig::default();
        assert!(matches!(
            ControlChannel::new(segment.clone(), &config, 100),
            Err(StateBusError::Config(_))
        ));

        drop(handles);
        assert!(ControlChannel::new(segment, &config, 100).is_ok());
    }

    #[test]
    fn test_expired_messages_free_the_ring() {
        let segment = test_segment(4);
        let config = ChannelConfig {
            message_ttl_ms: 200,
            max_unclaimed_polls: 0,
            ..Default::default()
        };
        let sender = ControlChannel::new(segment.clone(), &config, 1).unwrap();

        for _ in 0..4 {
            sender.send(99, Command::Ping, Payload::none(), 0).unwrap();
        }
        assert!(matches!(
            sender.send(2, Command::Pause, Payload::none(), 0),
            Err(StateBusError::BufferFull { capacity: 4 })
        ));

        thread::sleep(Duration::from_millis(300));
        sender.send(2, Command::Pause, Payload::none(), 0).unwrap();
        assert_eq!(sender.pending(), 1);

        let receiver = ControlChannel::new(segment, &config, 2).unwrap();
        let messages = receiver.poll().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].command, Command::Pause);
    }

    #[test]
    fn test_unclaimed_messages_evicted_after_foreign_polls() {
        let segment = test_segment(4);
        let config = ChannelConfig {
            message_ttl_ms: 0,
            max_unclaimed_polls: 3,
            ..Default::default()
        };
        let sender = ControlChannel::new(segment.clone(), &config, 1).unwrap();
        let receiver = ControlChannel::new(segment, &config, 2).unwrap();

        for _ in 0..4 {
            sender.send(99, Command::Ping, Payload::none(), 0).unwrap();
        }
        for _ in 0..2 {
            assert!(receiver.poll().unwrap().is_empty());
        }
        assert_eq!(receiver.pending(), 4);

        assert!(receiver.poll().unwrap().is_empty());
        assert_eq!(receiver.pending(), 0);
        sender.send(2, Command::Pause, Payload::none(), 0).unwrap();
        assert_eq!(receiver.poll().unwrap()[0].command, Command::Pause);
    }

    #[test]
    fn test_held_lock_times_out() {
        let segment = test_segment(2);
        let sender = ControlChannel::new(
            segment.clone(),
            &ChannelConfig {
                lock_spin_limit: 10,
                ..Default::default()
            },
            1,
        )
        .unwrap();

        let lock_lane = sender.header(ring_header::LOCK);
        segment.store(lock_lane, 1);
        let err = sender.send(2, Command::Ping, Payload::none(), 0).unwrap_err();
        assert!(matches!(err, StateBusError::LockTimeout { attempts: 10 }));
        assert!(err.is_transient());

        segment.store(lock_lane, 0);
        sender.send(2, Command::Ping, Payload::none(), 0).unwrap();
    }

    #[test]
    fn test_wait_for_message_wakes_on_send() {
        let segment = test_segment(4);
        let receiver = channel(&segment, 2);
        let sender = channel(&segment, 1);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender.send(2, Command::PathReady, Payload::none(), 0).unwrap();
        });

        let messages = receiver.wait_for_message(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].command, Command::PathReady);
    }

    #[test]
    fn test_wait_for_message_times_out() {
        let segment = test_segment(4);
        let receiver = channel(&segment, 2);
        let start = Instant::now();
        let messages = receiver.wait_for_message(Duration::from_millis(20)).unwrap();
        assert!(messages.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_requires_ring_buffer_property() {
        let segment = test_segment(2);
        let config = ChannelConfig {
            property: "currentPath".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ControlChannel::new(segment.clone(), &config, 1),
            Err(StateBusError::KindMismatch { .. })
        ));
        assert!(ControlChannel::new(segment, &ChannelConfig::default(), BROADCAST).is_err());
    }
}
