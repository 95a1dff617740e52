// src/render.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::ScopeConfig;
use crate::drivers::smoothing::smooth_series;
use crate::drivers::WindowStore;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub interval: Duration,
    /// Samples taken per tick; `None` takes the whole window.
    pub display_samples: Option<usize>,
    pub smoothing_window: usize,
    pub smoothing_enabled: bool,
    pub channel_labels: Vec<String>,
}

impl RenderSettings {
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self {
            interval: config.render_interval(),
            display_samples: None,
            smoothing_window: config.smoothing_window,
            smoothing_enabled: config.smoothing_enabled,
            channel_labels: (0..config.layout().num_channels())
                .map(|ch| config.channel_label(ch))
                .collect(),
        }
    }
}

/// One plotted channel; `x` and `y` always have equal length.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSeries {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// What the presentation layer receives each tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderFrame {
    pub series: Vec<ChannelSeries>,
    /// Newest converted value per channel, for numeric readouts.
    pub latest: Option<Vec<f64>>,
    pub total_appended: u64,
    pub smoothed: bool,
}

impl RenderFrame {
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.y.is_empty())
    }
}

/// Snapshot the store and build a frame. Never waits on acquisition beyond
/// one store call.
pub fn render_once(store: &WindowStore, settings: &RenderSettings) -> RenderFrame {
    let take = settings.display_samples.unwrap_or_else(|| store.capacity());
    let snapshot = store.snapshot(take);
    let smooth = settings.smoothing_enabled && snapshot.len() >= settings.smoothing_window;
    let series = snapshot
        .channels
        .iter()
        .enumerate()
        .map(|(ch, y)| {
            let (x, y) = if smooth {
                smooth_series(&snapshot.x, y, settings.smoothing_window)
            } else {
                (snapshot.x.clone(), y.clone())
            };
            ChannelSeries {
                label: settings
                    .channel_labels
                    .get(ch)
                    .cloned()
                    .unwrap_or_else(|| format!("Channel {}", ch + 1)),
                x,
                y,
            }
        })
        .collect();
    RenderFrame {
        series,
        latest: snapshot.latest(),
        total_appended: snapshot.total_appended,
        smoothed: smooth,
    }
}

/// Receives frames from the render tick.
pub trait FrameSink: Send {
    fn present(&mut self, frame: RenderFrame);
}

impl FrameSink for Sender<RenderFrame> {
    fn present(&mut self, frame: RenderFrame) {
        self.send(frame).ok();
    }
}

/// Headless sink: logs the numeric readouts every `every` ticks.
pub struct LogSink {
    every: u64,
    ticks: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            ticks: 0,
        }
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, frame: RenderFrame) {
        self.ticks += 1;
        if self.ticks % self.every != 0 {
            return;
        }
        match &frame.latest {
            Some(values) => {
                let readout = frame
                    .series
                    .iter()
                    .zip(values)
                    .map(|(s, v)| format!("{}={v:.4}", s.label))
                    .collect::<Vec<_>>()
                    .join("  ");
                info!("[{} samples] {readout}", frame.total_appended);
            }
            None => info!("no samples yet"),
        }
    }
}

/// Fixed-interval render loop on its own thread.
pub struct RenderTicker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderTicker {
    pub fn spawn<S: FrameSink + 'static>(
        store: Arc<WindowStore>,
        settings: RenderSettings,
        mut sink: S,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut next = Instant::now();
            while flag.load(Ordering::Acquire) {
                sink.present(render_once(&store, &settings));
                next += settings.interval;
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // Fell behind; don't try to catch up with a burst of ticks.
                    next = now;
                }
            }
            debug!("render tick stopped");
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for RenderTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
