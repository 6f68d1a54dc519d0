//! series.rs
//! Live multi-channel time series fed by the signal scheduler.
//!
//! - Channel names and order are fixed at construction and shared by every point.
//! - Points are appended per channel, so channels may lag each other; never assume
//!   equal lengths at any instant.
//! - Each channel keeps at most `capacity` points (oldest dropped first).
//! - Appends, `clear()` and sink notifications happen under one lock, so a clear can
//!   never interleave inside an append.
//! - Domain window and range are display hints for downstream renderers only.

use std::{collections::VecDeque, sync::Arc};

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::utils::metrics::push_capped;

pub const DEFAULT_CHANNELS: [&str; 3] = ["Setpoint", "Input", "Output"];
pub const DEFAULT_BUFFER_CAPACITY: usize = 100_000;

/// Change notification delivered to renderer sinks.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesEvent {
    Append { timestamp: u64, start: usize, values: Vec<f64> },
    Clear,
    DomainWindow(u64),
    Range { min: f64, max: f64 },
}

/// Downstream consumer of buffer events. Called with the buffer lock held; must not block.
pub trait SeriesSink: Send + Sync {
    fn on_event(&self, event: &SeriesEvent);
}

/// Forwards events over a bounded channel; drops them when the consumer falls behind.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<SeriesEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<SeriesEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl SeriesSink for ChannelSink {
    fn on_event(&self, event: &SeriesEvent) {
        let _ = self.tx.try_send(event.clone());
    }
}

#[derive(Debug, Default)]
struct SeriesState {
    channels: Vec<VecDeque<(u64, f64)>>,
    domain_window: Option<u64>,
    range: Option<(f64, f64)>,
}

pub struct LiveSeriesBuffer {
    names: Vec<String>,
    capacity: usize,
    state: Mutex<SeriesState>,
    sinks: RwLock<Vec<Arc<dyn SeriesSink>>>,
}

impl LiveSeriesBuffer {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, capacity: usize) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let state = SeriesState {
            channels: vec![VecDeque::new(); names.len()],
            ..SeriesState::default()
        };

        Self {
            names,
            capacity: capacity.max(1),
            state: Mutex::new(state),
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Setpoint / Input / Output channels.
    pub fn with_default_channels(capacity: usize) -> Self {
        Self::new(DEFAULT_CHANNELS, capacity)
    }

    pub fn add_sink(&self, sink: Arc<dyn SeriesSink>) {
        self.sinks.write().push(sink);
    }

    pub fn channel_names(&self) -> &[String] {
        &self.names
    }

    pub fn channel_count(&self) -> usize {
        self.names.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `values[i]` to channel `i`; values or channels without a counterpart are ignored.
    pub fn append(&self, timestamp: u64, values: &[f64]) {
        self.append_from(timestamp, 0, values);
    }

    /// Like [`append`](Self::append), but only for channel indices `start..`.
    pub fn append_from(&self, timestamp: u64, start: usize, values: &[f64]) {
        let mut state = self.state.lock();
        let end = values.len().min(state.channels.len());
        if start >= end {
            return;
        }

        for (channel, &value) in state.channels[start..end].iter_mut().zip(&values[start..end]) {
            push_capped(channel, (timestamp, value), self.capacity);
        }

        self.notify(&SeriesEvent::Append {
            timestamp,
            start,
            values: values[start..end].to_vec(),
        });
    }

    /// Empties every channel; names and order are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.channels.iter_mut().for_each(VecDeque::clear);
        self.notify(&SeriesEvent::Clear);
    }

    pub fn set_domain_window(&self, length: u64) {
        let mut state = self.state.lock();
        state.domain_window = Some(length);
        self.notify(&SeriesEvent::DomainWindow(length));
    }

    pub fn set_range(&self, min: f64, max: f64) {
        let mut state = self.state.lock();
        state.range = Some((min, max));
        self.notify(&SeriesEvent::Range { min, max });
    }

    pub fn domain_window(&self) -> Option<u64> {
        self.state.lock().domain_window
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        self.state.lock().range
    }

    /// Copy of one channel's `(timestamp, value)` points, oldest first.
    pub fn points(&self, channel: usize) -> Vec<(u64, f64)> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, channel: usize) -> usize {
        self.state.lock().channels.get(channel).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().channels.iter().all(VecDeque::is_empty)
    }

    /// Consistent copy of every channel taken under a single lock.
    pub fn snapshot(&self) -> Vec<Vec<(u64, f64)>> {
        self.state
            .lock()
            .channels
            .iter()
            .map(|c| c.iter().copied().collect())
            .collect()
    }

    /// Most recent point of each channel.
    pub fn latest(&self) -> Vec<Option<(u64, f64)>> {
        self.state
            .lock()
            .channels
            .iter()
            .map(|c| c.back().copied())
            .collect()
    }

    fn notify(&self, event: &SeriesEvent) {
        for sink in self.sinks.read().iter() {
            sink.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn append_fills_each_channel_in_order() {
        let buffer = LiveSeriesBuffer::with_default_channels(16);
        buffer.append(0, &[1.0, 2.0, 3.0]);
        buffer.append(100, &[4.0, 5.0, 6.0]);

        assert_eq!(buffer.channel_names(), &["Setpoint", "Input", "Output"]);
        assert_eq!(buffer.points(0), vec![(0, 1.0), (100, 4.0)]);
        assert_eq!(buffer.points(2), vec![(0, 3.0), (100, 6.0)]);
    }

    #[test]
    fn partial_updates_let_channels_lag() {
        let buffer = LiveSeriesBuffer::with_default_channels(16);
        buffer.append(0, &[1.0]);
        buffer.append(100, &[1.0, 2.0, 3.0, 4.0]);
        buffer.append_from(200, 2, &[9.0, 9.0, 7.0]);

        assert_eq!(buffer.len(0), 2);
        assert_eq!(buffer.len(1), 1);
        assert_eq!(buffer.len(2), 2);
        assert_eq!(buffer.points(2).last(), Some(&(200, 7.0)));
    }

    #[test]
    fn clear_then_append_leaves_only_new_points() {
        let buffer = LiveSeriesBuffer::with_default_channels(16);
        for t in 0..5 {
            buffer.append(t * 100, &[1.0, 2.0, 3.0]);
        }
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.channel_count(), 3);

        buffer.append(700, &[7.0, 8.0]);
        assert_eq!(buffer.points(0), vec![(700, 7.0)]);
        assert_eq!(buffer.points(1), vec![(700, 8.0)]);
        assert!(buffer.points(2).is_empty());
    }

    #[test]
    fn capacity_drops_oldest_points() {
        let buffer = LiveSeriesBuffer::new(["a"], 3);
        for t in 0..5 {
            buffer.append(t, &[t as f64]);
        }
        assert_eq!(buffer.points(0), vec![(2, 2.0), (3, 3.0), (4, 4.0)]);
    }

    #[test]
    fn display_hints_do_not_touch_data() {
        let buffer = LiveSeriesBuffer::with_default_channels(16);
        buffer.append(0, &[1.0, 2.0, 3.0]);
        buffer.set_domain_window(20_000);
        buffer.set_range(-2.0, 2.0);

        assert_eq!(buffer.domain_window(), Some(20_000));
        assert_eq!(buffer.range(), Some((-2.0, 2.0)));
        assert_eq!(buffer.snapshot(), vec![vec![(0, 1.0)], vec![(0, 2.0)], vec![(0, 3.0)]]);
    }

    #[test]
    fn sinks_see_events_in_order() {
        let buffer = LiveSeriesBuffer::with_default_channels(16);
        let (sink, rx) = ChannelSink::new(16);
        buffer.add_sink(Arc::new(sink));

        buffer.append(0, &[1.0, 2.0, 3.0]);
        buffer.clear();
        buffer.set_domain_window(500);

        let events: Vec<SeriesEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SeriesEvent::Append { timestamp: 0, start: 0, values: vec![1.0, 2.0, 3.0] },
                SeriesEvent::Clear,
                SeriesEvent::DomainWindow(500),
            ]
        );
    }

    #[test]
    fn concurrent_clear_never_tears_an_append() {
        let buffer = Arc::new(LiveSeriesBuffer::with_default_channels(100_000));

        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for t in 0..5_000u64 {
                    buffer.append(t, &[1.0, 2.0, 3.0]);
                }
            })
        };
        for _ in 0..200 {
            buffer.clear();
            thread::yield_now();
        }
        writer.join().unwrap();

        let snapshot = buffer.snapshot();
        let times = |c: &Vec<(u64, f64)>| c.iter().map(|p| p.0).collect::<Vec<_>>();
        assert_eq!(times(&snapshot[0]), times(&snapshot[1]));
        assert_eq!(times(&snapshot[1]), times(&snapshot[2]));
    }
}
