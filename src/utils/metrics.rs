//! Scheduler timing metrics for the live harness.
//!
//! The scheduler thread updates these once per tick; the console reads a copy.
//! Jitter is the distance between a tick's planned release and when it actually started.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

pub const MAX_JITTER_POINTS: usize = 1_000;

#[derive(Debug, Default, Clone)]
pub struct SchedulerMetrics {
    /// Ticks run, including warm-up ticks
    pub ticks: u64,
    /// Points appended to the series buffer
    pub emitted: u64,
    /// Ticks that started after their planned release time
    pub overruns: u64,
    /// Release jitter of the most recent ticks (microseconds)
    pub jitter_us: VecDeque<u64>,
    pub max_jitter_us: u64,
    pub faults: u64,
}

impl SchedulerMetrics {
    pub fn record_tick(&mut self, jitter_us: u64, emitted: bool) {
        self.ticks += 1;
        if emitted {
            self.emitted += 1;
        }
        self.max_jitter_us = self.max_jitter_us.max(jitter_us);
        push_capped(&mut self.jitter_us, jitter_us, MAX_JITTER_POINTS);
    }

    pub fn record_overrun(&mut self) {
        self.overruns += 1;
    }

    pub fn record_fault(&mut self) {
        self.faults += 1;
    }

    pub fn mean_jitter_us(&self) -> Option<f64> {
        if self.jitter_us.is_empty() {
            return None;
        }
        Some(self.jitter_us.iter().sum::<u64>() as f64 / self.jitter_us.len() as f64)
    }
}

pub type SharedSchedulerMetrics = Arc<Mutex<SchedulerMetrics>>;

/// Appends value to buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped<T>(buf: &mut VecDeque<T>, val: T, capacity: usize) {
    while buf.len() >= capacity.max(1) {
        buf.pop_front();
    }
    buf.push_back(val);
}
