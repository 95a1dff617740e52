//! Serial telemetry scope: reads whitespace-delimited ASCII frames from a
//! serial device, keeps a bounded per-channel history and renders smoothed
//! snapshots on a fixed tick.
pub mod acquisition;
pub mod config;
pub mod drivers;
pub mod recorder;
pub mod render;
pub mod types;

pub use acquisition::{open_link, AcquisitionController, AcquisitionStats, DynController};
pub use config::ScopeConfig;
pub use drivers::{TelemetryError, WindowStore};
pub use render::{render_once, RenderFrame, RenderSettings, RenderTicker};
pub use types::{AcquisitionEvent, ConnectionMode, ControlCommand, LinkState, Sample};
