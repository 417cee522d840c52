//! Bounded drop-oldest playback queue
//!
//! Decouples ingestion timing from the sink clock. Pushing past capacity
//! evicts the oldest frame, so under pressure the queue always holds the
//! newest frames. Popping never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::frame::Frame;

/// FIFO of at most `capacity` frames, shared by ingestion and the scheduler
#[derive(Debug)]
pub struct PlaybackQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl PlaybackQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Append a frame, returning the evicted oldest frame if the queue was full
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let evicted = {
            let mut frames = self.frames.lock();
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            evicted
        };

        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            trace!("Playback queue full, dropped oldest frame");
        }
        evicted
    }

    /// Take the oldest frame without waiting
    pub fn try_pop(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether no frames are queued
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Discard all queued frames, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock();
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    /// Total frames evicted by pushes past capacity
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
