// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::buffer::{check_capacity, DEFAULT_WINDOW_CAPACITY};
use crate::drivers::frame::{FrameLayout, FramingPolicy};
use crate::drivers::serial::DEFAULT_BAUD_RATE;
use crate::drivers::smoothing::{UnitConversion, DEFAULT_SCALE_FACTOR};
use crate::drivers::TelemetryError;

pub const DEFAULT_SMOOTHING_WINDOW: usize = 100;

/// Runtime configuration for one acquisition session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Read timeout while connected but idle.
    pub open_timeout_ms: u64,
    /// Read timeout inside the streaming loop; bounds how long `stop` waits.
    pub stream_timeout_ms: u64,
    pub framing: FramingPolicy,
    pub tokens_per_frame: usize,
    pub leading_index: bool,
    pub channel_labels: Vec<String>,
    pub window_capacity: usize,
    pub smoothing_window: usize,
    pub smoothing_enabled: bool,
    /// Spacing of synthetic timestamps when frames carry no index.
    pub sample_interval_ms: u64,
    pub render_interval_ms: u64,
    pub scale_factor: f64,
    /// Channels the scale factor applies to; empty means all.
    pub converted_channels: Vec<usize>,
    pub log_path: Option<PathBuf>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyACM0".to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            open_timeout_ms: 1000,
            stream_timeout_ms: 50,
            framing: FramingPolicy::TokenAccumulating,
            tokens_per_frame: 4,
            leading_index: false,
            channel_labels: vec![
                "Quad phase".to_owned(),
                "In phase".to_owned(),
                "BioZ".to_owned(),
                "Adjusted BioZ".to_owned(),
            ],
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing_enabled: true,
            sample_interval_ms: 20,
            render_interval_ms: 50,
            scale_factor: DEFAULT_SCALE_FACTOR,
            converted_channels: Vec::new(),
            log_path: None,
        }
    }
}

impl ScopeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TelemetryError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, TelemetryError> {
        let config: ScopeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        let fail = |msg: String| Err(TelemetryError::InvalidConfiguration(msg));
        if self.baud_rate == 0 {
            return fail("baud rate must be non-zero".into());
        }
        if self.layout().num_channels() == 0 {
            return fail(format!(
                "{} tokens per frame leaves no channel values",
                self.tokens_per_frame
            ));
        }
        check_capacity(self.window_capacity)?;
        if self.smoothing_window == 0 {
            return fail("smoothing window must be at least 1".into());
        }
        if self.stream_timeout_ms == 0 || self.open_timeout_ms == 0 {
            return fail("read timeouts must be non-zero".into());
        }
        if self.sample_interval_ms == 0 || self.render_interval_ms == 0 {
            return fail("sample and render intervals must be non-zero".into());
        }
        if !self.scale_factor.is_finite() || self.scale_factor == 0.0 {
            return fail(format!("scale factor {} is unusable", self.scale_factor));
        }
        let channels = self.layout().num_channels();
        if let Some(bad) = self.converted_channels.iter().find(|&&ch| ch >= channels) {
            return fail(format!(
                "converted channel {bad} out of range for {channels} channels"
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.tokens_per_frame, self.leading_index)
    }

    pub fn unit_conversion(&self) -> UnitConversion {
        let conversion = UnitConversion::new(self.scale_factor);
        if self.converted_channels.is_empty() {
            conversion
        } else {
            conversion.only_channels(self.converted_channels.clone())
        }
    }

    pub fn channel_label(&self, channel: usize) -> String {
        self.channel_labels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| format!("Channel {}", channel + 1))
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScopeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.window_capacity, 500);
        assert_eq!(config.smoothing_window, 100);
        assert_eq!(config.layout().num_channels(), 4);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ScopeConfig::from_json_str(
            r#"{ "port_name": "COM4", "framing": "line", "tokens_per_frame": 3, "leading_index": true }"#,
        )
        .unwrap();
        assert_eq!(config.port_name, "COM4");
        assert_eq!(config.framing, FramingPolicy::Line);
        assert_eq!(config.layout().num_channels(), 2);
        assert_eq!(config.sample_interval(), Duration::from_millis(20));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for json in [
            r#"{ "window_capacity": 99 }"#,
            r#"{ "window_capacity": 2001 }"#,
            r#"{ "tokens_per_frame": 1, "leading_index": true }"#,
            r#"{ "smoothing_window": 0 }"#,
            r#"{ "scale_factor": 0.0 }"#,
            r#"{ "converted_channels": [4] }"#,
        ] {
            assert!(
                matches!(
                    ScopeConfig::from_json_str(json),
                    Err(TelemetryError::InvalidConfiguration(_))
                ),
                "{json} should be rejected"
            );
        }
        assert!(matches!(
            ScopeConfig::from_json_str("{ not json"),
            Err(TelemetryError::ConfigParse(_))
        ));
    }

    #[test]
    fn labels_fall_back_to_channel_number() {
        let config = ScopeConfig::default();
        assert_eq!(config.channel_label(2), "BioZ");
        assert_eq!(config.channel_label(7), "Channel 8");
        let only_last = ScopeConfig {
            converted_channels: vec![3],
            ..ScopeConfig::default()
        };
        assert!(!only_last.unit_conversion().applies_to(0));
        assert!(only_last.unit_conversion().applies_to(3));
    }
}
