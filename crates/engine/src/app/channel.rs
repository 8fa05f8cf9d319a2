//! Bounded single-producer/single-consumer queue of input events.
//!
//! Slots are plain atomics, so the queue needs no `unsafe`. The producer
//! writes a slot with relaxed stores and publishes it with a release store
//! of `tail`; the consumer acquires `tail` before reading the slot. The
//! consumer releases `head` after reading, and the producer acquires `head`
//! before reusing a slot. A successful `push` therefore happens-before the
//! `pop` that returns the event.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::input::InputEvent;
use super::timeline::Timestamp;

pub const DEFAULT_INPUT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("input channel full ({capacity} pending); dropped {event:?}")]
pub struct ChannelFull {
    pub event: InputEvent,
    pub capacity: usize,
}

#[derive(Debug)]
struct ChannelShared {
    timestamps: Box<[AtomicI64]>,
    payloads: Box<[AtomicU8]>,
    /// Count of events ever popped (or cleared). Written by the consumer only.
    head: AtomicUsize,
    /// Count of events ever pushed. Written by the producer only.
    tail: AtomicUsize,
    dropped: AtomicU64,
}

impl ChannelShared {
    fn capacity(&self) -> usize {
        self.timestamps.len()
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    fn read_slot(&self, index: usize) -> InputEvent {
        let slot = index % self.capacity();
        InputEvent::from_parts(
            Timestamp(self.timestamps[slot].load(Ordering::Relaxed)),
            self.payloads[slot].load(Ordering::Relaxed),
        )
    }
}

/// Creates a channel holding up to `capacity` pending events (minimum 1).
pub fn input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let capacity = capacity.max(1);
    let shared = Arc::new(ChannelShared {
        timestamps: (0..capacity).map(|_| AtomicI64::new(0)).collect(),
        payloads: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });
    (
        InputProducer {
            shared: Arc::clone(&shared),
        },
        InputConsumer { shared },
    )
}

/// Capture side. Exactly one exists per channel; it may move to another thread.
#[derive(Debug)]
pub struct InputProducer {
    shared: Arc<ChannelShared>,
}

impl InputProducer {
    /// Never blocks. On a full channel the event is dropped and handed back.
    pub fn push(&mut self, event: InputEvent) -> Result<(), ChannelFull> {
        let shared = &self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= shared.capacity() {
            let dropped_total = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                timestamp = event.timestamp.0,
                action = ?event.action,
                capacity = shared.capacity(),
                dropped_total,
                "input_channel_full"
            );
            return Err(ChannelFull {
                event,
                capacity: shared.capacity(),
            });
        }

        let slot = tail % shared.capacity();
        shared.timestamps[slot].store(event.timestamp.0, Ordering::Relaxed);
        shared.payloads[slot].store(event.payload_code(), Ordering::Relaxed);
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Frame-loop side. Exactly one exists per channel.
#[derive(Debug)]
pub struct InputConsumer {
    shared: Arc<ChannelShared>,
}

impl InputConsumer {
    pub fn pop(&mut self) -> Option<InputEvent> {
        let shared = &self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        if head == shared.tail.load(Ordering::Acquire) {
            return None;
        }
        let event = shared.read_slot(head);
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Some(event)
    }

    /// Oldest pending event, left in place.
    pub fn peek(&self) -> Option<InputEvent> {
        let shared = &self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        if head == shared.tail.load(Ordering::Acquire) {
            return None;
        }
        Some(shared.read_slot(head))
    }

    /// Pops the oldest event only if `accept` approves it.
    pub fn pop_if(&mut self, accept: impl FnOnce(&InputEvent) -> bool) -> Option<InputEvent> {
        let event = self.peek()?;
        if !accept(&event) {
            return None;
        }
        self.pop()
    }

    /// Discards everything pushed so far. Events pushed concurrently may
    /// survive.
    pub fn clear(&mut self) {
        let tail = self.shared.tail.load(Ordering::Acquire);
        self.shared.head.store(tail, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
