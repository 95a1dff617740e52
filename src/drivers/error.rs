use std::path::PathBuf;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot open serial port {port}: {reason}")]
    LinkUnavailable { port: String, reason: String },
    #[error("serial link I/O failure: {0}")]
    LinkIo(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
/// Reasons a candidate frame is rejected. Always absorbed by the pipeline.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("expected {expected} tokens, got {actual}")]
    TokenCount { expected: usize, actual: usize },
    #[error("token {token:?} is not a number")]
    InvalidNumber { token: String },
}
impl TelemetryError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        TelemetryError::InvalidConfiguration(msg.into())
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for TelemetryError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        TelemetryError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for TelemetryError {
    fn from(value: image::ImageError) -> Self {
        TelemetryError::Plot(value.to_string())
    }
}
