use std::collections::{HashSet, VecDeque};

use crate::execution::{ExecutionEvent, ExecutionPhase, WorkHandle};

/// Default number of one-second samples kept for the activity band.
pub const DEFAULT_ACTIVITY_SAMPLES: usize = 100;

/// Boolean-per-tick history of whether any work unit was executing.
///
/// Feed it execution events with [`observe`](Self::observe) and call
/// [`tick`](Self::tick) once per second. The history starts filled with
/// `false` so the band spans the whole chart from the first frame.
#[derive(Debug, Clone)]
pub struct ActivityHistory {
    samples: VecDeque<bool>,
    capacity: usize,
    running: HashSet<WorkHandle>,
}

impl Default for ActivityHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_SAMPLES)
    }
}

impl ActivityHistory {
    /// Create a history of `capacity` samples, all idle.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::iter::repeat(false).take(capacity).collect(),
            capacity,
            running: HashSet::new(),
        }
    }

    /// Track a started/finished signal.
    pub fn observe(&mut self, event: &ExecutionEvent) {
        match event.phase {
            ExecutionPhase::Started => {
                self.running.insert(event.handle.clone());
            }
            ExecutionPhase::Finished => {
                self.running.remove(&event.handle);
            }
        }
    }

    /// Whether any tracked work unit has started but not finished.
    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Append the current state and drop the oldest sample past capacity.
    pub fn tick(&mut self) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(self.is_running());
    }

    /// Samples oldest first.
    pub fn samples(&self) -> impl ExactSizeIterator<Item = bool> + '_ {
        self.samples.iter().copied()
    }

    /// Number of samples held, at most the capacity.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True only for a zero-capacity history.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
