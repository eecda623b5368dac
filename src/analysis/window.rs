/// Fixed-capacity sliding window of distance samples.
///
/// The window is the only state the flood detector keeps between
/// acquisition cycles. It is owned by exactly one node loop: the loop
/// appends, the rate estimator reads, nothing else touches it.

use std::collections::VecDeque;

use crate::model::{Sample, DEFAULT_WINDOW_CAPACITY, MS_PER_MINUTE};

/// FIFO of the most recent `capacity` samples, oldest first.
///
/// Invariant: `len() <= capacity()`. Samples are expected in
/// non-decreasing tick order; the buffer does not enforce this.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    /// Creates an empty window. A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds `sample` at the tail, evicting the oldest sample first when the
    /// window is already full. Never rejects a sample.
    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest sample in the window.
    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Newest sample in the window.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Minutes between the oldest and newest sample.
    ///
    /// Returns 0 when the window is not full or holds fewer than two
    /// samples. The tick difference is wraparound-safe, so the result is
    /// negative only when the samples were appended out of order.
    pub fn span_minutes(&self) -> f64 {
        if !self.is_full() || self.samples.len() < 2 {
            return 0.0;
        }
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp.diff_ms(first.timestamp) as f64 / MS_PER_MINUTE,
            _ => 0.0,
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
