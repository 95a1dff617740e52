// src/drivers/mod.rs
// Acquisition core: link, framing, storage and signal transforms
pub mod buffer;
pub mod error;
pub mod frame;
pub mod plot;
pub mod serial;
pub mod smoothing;
pub mod source;
// Re-export the types most callers need
pub use buffer::{SlidingWindow, WindowSnapshot, WindowStore};
pub use error::{FrameError, TelemetryError};
pub use frame::{FrameLayout, FrameParser, FramingPolicy, ParseOutcome};
pub use plot::{render_frame_png, write_frame_png, PlotStyle};
pub use serial::{available_ports, SerialCommander, SerialLink};
pub use smoothing::{moving_average, resample_axis, smooth_series, UnitConversion};
pub use source::{
    scripted_link, CommandSink, LineSource, ScriptHandle, ScriptedCommander, ScriptedLink,
    SimulatedCommander, SimulatedLink,
};
