use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use log::info;
use crate::drivers::TelemetryError;
use crate::types::Sample;
pub const DEFAULT_WINDOW_CAPACITY: usize = 500;
pub const MIN_WINDOW_CAPACITY: usize = 100;
pub const MAX_WINDOW_CAPACITY: usize = 2000;
/// Point-in-time copy of window contents, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowSnapshot {
    pub x: Vec<f64>,
    pub channels: Vec<Vec<f64>>, // channel -> samples
    /// Samples appended since the window was created, including evicted ones.
    pub total_appended: u64,
}
impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.x.len()
    }
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
    pub fn latest(&self) -> Option<Vec<f64>> {
        if self.is_empty() {
            return None;
        }
        self.channels.iter().map(|c| c.last().copied()).collect()
    }
}
/// Bounded per-channel history. Not synchronized; see [`WindowStore`].
pub struct SlidingWindow {
    x: VecDeque<f64>,
    per_channel: Vec<VecDeque<f64>>,
    capacity: usize,
    sample_interval: Duration,
    total_appended: u64,
}
impl SlidingWindow {
    pub fn new(num_channels: usize, capacity: usize, sample_interval: Duration) -> Self {
        Self {
            x: VecDeque::with_capacity(capacity),
            per_channel: (0..num_channels)
                .map(|_| VecDeque::with_capacity(capacity))
                .collect(),
            capacity,
            sample_interval,
            total_appended: 0,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn num_channels(&self) -> usize {
        self.per_channel.len()
    }
    pub fn len(&self) -> usize {
        self.x.len()
    }
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
    pub fn push(&mut self, sample: &Sample) -> Result<(), TelemetryError> {
        if sample.num_channels() != self.per_channel.len() {
            return Err(TelemetryError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: sample.num_channels(),
            });
        }
        if self.capacity == 0 {
            return Ok(());
        }
        let x = sample
            .index()
            .unwrap_or(self.total_appended as f64 * self.sample_interval.as_secs_f64());
        if self.x.len() == self.capacity {
            self.x.pop_front();
            for queue in &mut self.per_channel {
                queue.pop_front();
            }
        }
        self.x.push_back(x);
        for (queue, &value) in self.per_channel.iter_mut().zip(sample.values()) {
            queue.push_back(value);
        }
        self.total_appended += 1;
        Ok(())
    }
    pub fn snapshot(&self, take: usize) -> WindowSnapshot {
        let take = take.min(self.x.len());
        let skip = self.x.len() - take;
        WindowSnapshot {
            x: self.x.iter().skip(skip).copied().collect(),
            channels: self
                .per_channel
                .iter()
                .map(|channel| channel.iter().skip(skip).copied().collect())
                .collect(),
            total_appended: self.total_appended,
        }
    }
}
/// The one piece of state shared by the acquisition thread and the renderer.
///
/// Every call holds the lock for exactly one append, snapshot copy or swap, so
/// readers never see a half-evicted window.
pub struct WindowStore {
    inner: Mutex<SlidingWindow>,
}
impl WindowStore {
    pub fn new(
        num_channels: usize,
        capacity: usize,
        sample_interval: Duration,
    ) -> Result<Self, TelemetryError> {
        check_capacity(capacity)?;
        Ok(Self {
            inner: Mutex::new(SlidingWindow::new(num_channels, capacity, sample_interval)),
        })
    }
    fn lock(&self) -> MutexGuard<'_, SlidingWindow> {
        // A panic mid-call cannot leave the deques structurally broken.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn append(&self, sample: &Sample) -> Result<(), TelemetryError> {
        self.lock().push(sample)
    }
    pub fn snapshot(&self, take: usize) -> WindowSnapshot {
        self.lock().snapshot(take)
    }
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
    pub fn num_channels(&self) -> usize {
        self.lock().num_channels()
    }
    pub fn len(&self) -> usize {
        self.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
    /// Swaps in an empty window of `new_capacity`; prior history is dropped.
    pub fn resize(&self, new_capacity: usize) -> Result<(), TelemetryError> {
        check_capacity(new_capacity)?;
        let mut guard = self.lock();
        let fresh = SlidingWindow::new(
            guard.num_channels(),
            new_capacity,
            guard.sample_interval,
        );
        *guard = fresh;
        info!("window resized to {new_capacity} samples, history cleared");
        Ok(())
    }
    /// Drops history while keeping the current capacity.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let fresh = SlidingWindow::new(
            guard.num_channels(),
            guard.capacity(),
            guard.sample_interval,
        );
        *guard = fresh;
    }
}
pub fn check_capacity(capacity: usize) -> Result<(), TelemetryError> {
    if !(MIN_WINDOW_CAPACITY..=MAX_WINDOW_CAPACITY).contains(&capacity) {
        return Err(TelemetryError::invalid_config(format!(
            "window capacity {capacity} outside [{MIN_WINDOW_CAPACITY}, {MAX_WINDOW_CAPACITY}]"
        )));
    }
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    fn sample(v: f64) -> Sample {
        Sample::new(vec![v, -v])
    }
    #[test]
    fn holds_most_recent_samples_in_arrival_order() {
        for (capacity, appends) in [(3usize, 2usize), (3, 3), (3, 10), (5, 7)] {
            let mut window = SlidingWindow::new(2, capacity, Duration::from_millis(20));
            for i in 0..appends {
                window.push(&sample(i as f64)).unwrap();
            }
            let snap = window.snapshot(usize::MAX);
            let kept = appends.min(capacity);
            let expected: Vec<f64> = (appends - kept..appends).map(|i| i as f64).collect();
            assert_eq!(snap.len(), kept);
            assert_eq!(snap.channels[0], expected);
            assert_eq!(
                snap.channels[1],
                expected.iter().map(|v| -v).collect::<Vec<_>>()
            );
            assert_eq!(snap.total_appended, appends as u64);
        }
    }
    #[test]
    fn snapshot_returns_last_k() {
        let mut window = SlidingWindow::new(2, 10, Duration::from_millis(20));
        for i in 0..6 {
            window.push(&sample(i as f64)).unwrap();
        }
        let snap = window.snapshot(2);
        assert_eq!(snap.channels[0], vec![4.0, 5.0]);
        assert_eq!(snap.latest(), Some(vec![5.0, -5.0]));
        assert!(window.snapshot(0).is_empty());
    }
    #[test]
    fn synthetic_axis_uses_sample_interval() {
        let mut window = SlidingWindow::new(2, 4, Duration::from_millis(20));
        for i in 0..6 {
            window.push(&sample(i as f64)).unwrap();
        }
        let snap = window.snapshot(4);
        let expected = [0.04, 0.06, 0.08, 0.10];
        for (x, e) in snap.x.iter().zip(expected) {
            assert!((x - e).abs() < 1e-12);
        }
        let mut indexed = SlidingWindow::new(1, 4, Duration::from_millis(20));
        indexed.push(&Sample::with_index(42.0, vec![1.0])).unwrap();
        assert_eq!(indexed.snapshot(1).x, vec![42.0]);
    }
    #[test]
    fn rejects_wrong_channel_count() {
        let mut window = SlidingWindow::new(3, 4, Duration::from_millis(20));
        let err = window.push(&sample(1.0)).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::ChannelMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(window.is_empty());
    }
    #[test]
    fn resize_validates_and_drops_history() {
        let store = WindowStore::new(2, 100, Duration::from_millis(20)).unwrap();
        for i in 0..150 {
            store.append(&sample(i as f64)).unwrap();
        }
        assert_eq!(store.len(), 100);
        assert!(matches!(
            store.resize(50),
            Err(TelemetryError::InvalidConfiguration(_))
        ));
        assert_eq!(store.capacity(), 100);
        assert_eq!(store.len(), 100);
        store.resize(2000).unwrap();
        assert_eq!(store.capacity(), 2000);
        assert!(store.is_empty());
        assert_eq!(store.snapshot(10).total_appended, 0);
    }
    #[test]
    fn concurrent_reader_never_sees_ragged_window() {
        let store = Arc::new(WindowStore::new(2, 100, Duration::from_millis(1)).unwrap());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..5_000 {
                    store.append(&sample(i as f64)).unwrap();
                }
            })
        };
        for _ in 0..500 {
            let snap = store.snapshot(100);
            assert!(snap.len() <= 100);
            assert_eq!(snap.channels[0].len(), snap.len());
            assert_eq!(snap.channels[1].len(), snap.len());
            // Consecutive values prove nothing was shifted mid-copy.
            for pair in snap.channels[0].windows(2) {
                assert_eq!(pair[1] - pair[0], 1.0);
            }
        }
        writer.join().unwrap();
        assert_eq!(store.len(), 100);
    }
}
