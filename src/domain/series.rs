// Rolling series window
use super::metric::MetricSample;
use std::collections::VecDeque;

pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Most recent samples of one metric, oldest first. Never longer than its capacity.
#[derive(Debug, Clone)]
pub struct SeriesWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl SeriesWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the back, evicting the oldest samples past capacity.
    /// Duplicate timestamps are kept as-is.
    pub fn push(&mut self, sample: MetricSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<MetricSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
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
}
