// src/types.rs
use crate::drivers::FrameError;

/// One validated frame: channel values plus the optional leading index token.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    index: Option<f64>,
    values: Vec<f64>,
}

impl Sample {
    pub fn new(values: Vec<f64>) -> Self {
        Self { index: None, values }
    }

    pub fn with_index(index: f64, values: Vec<f64>) -> Self {
        Self {
            index: Some(index),
            values,
        }
    }

    pub fn index(&self) -> Option<f64> {
        self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn num_channels(&self) -> usize {
        self.values.len()
    }

    /// Consumes the sample and returns a copy with channel values replaced by `f`.
    pub fn map_values(self, f: impl Fn(usize, f64) -> f64) -> Self {
        let values = self
            .values
            .into_iter()
            .enumerate()
            .map(|(ch, v)| f(ch, v))
            .collect();
        Self {
            index: self.index,
            values,
        }
    }
}

// Where samples come from
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

// Link lifecycle as seen by the controlling layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    Streaming,
}

/// Host -> device control lines. No acknowledgement is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
        }
    }

    /// Wire form with trailing CR/LF.
    pub fn wire_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.as_str()).into_bytes()
    }
}

// Notifications pushed from the acquisition thread to whoever listens
#[derive(Clone, Debug, PartialEq)]
pub enum AcquisitionEvent {
    Started,
    Stopped,
    LinkLost(String),
    /// `line` is the raw input that completed the rejected frame.
    MalformedFrame { line: String, error: FrameError },
}
