use std::collections::VecDeque;

/// Bounded FIFO of round-trip samples (milliseconds) with a running mean.
///
/// When full, pushing a sample evicts the oldest one.
#[derive(Debug, Clone)]
pub struct RttSamples {
    samples: VecDeque<f32>,
    capacity: usize,
    average: f32,
}

impl RttSamples {
    /// Creates an empty buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity, average: 0.0 }
    }

    /// Appends a sample, evicting the oldest if over capacity, and returns the new mean.
    pub fn push(&mut self, sample: f32) -> f32 {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.average = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        self.average
    }

    /// Mean of the buffered samples, 0 when empty.
    pub fn average(&self) -> f32 {
        self.average
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no sample has been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}
