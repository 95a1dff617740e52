/// Drive-current scale for a 256 µA excitation: raw magnitude / factor = ohms.
pub const DEFAULT_SCALE_FACTOR: f64 = 85.481;
/// Valid ("no padding") moving average.
///
/// Returns the input unchanged when it is shorter than `window`; otherwise the
/// output has `len - window + 1` points and `out[i] = mean(input[i..i + window])`.
pub fn moving_average(input: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || input.len() < window {
        return input.to_vec();
    }
    // Each output depends only on its own window; no running sum.
    let w = window as f64;
    input
        .windows(window)
        .map(|chunk| chunk.iter().sum::<f64>() / w)
        .collect()
}
/// `count` evenly spaced points spanning the first and last value of `x`.
pub fn resample_axis(x: &[f64], count: usize) -> Vec<f64> {
    let (Some(&start), Some(&end)) = (x.first(), x.last()) else {
        return Vec::new();
    };
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}
/// Smooths one channel and rebuilds a matching x-axis.
pub fn smooth_series(x: &[f64], y: &[f64], window: usize) -> (Vec<f64>, Vec<f64>) {
    let smoothed = moving_average(y, window);
    if smoothed.len() == y.len() {
        return (x.to_vec(), smoothed);
    }
    let axis = resample_axis(x, smoothed.len());
    (axis, smoothed)
}
/// Static linear conversion from raw device magnitude to ohms.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitConversion {
    scale_factor: f64,
    /// Channels to convert; `None` converts all of them.
    channels: Option<Vec<usize>>,
}
impl UnitConversion {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            channels: None,
        }
    }
    pub fn only_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = Some(channels);
        self
    }
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
    pub fn convert(&self, raw: f64) -> f64 {
        raw / self.scale_factor
    }
    pub fn applies_to(&self, channel: usize) -> bool {
        self.channels
            .as_ref()
            .map_or(true, |list| list.contains(&channel))
    }
    pub fn convert_channel(&self, channel: usize, raw: f64) -> f64 {
        if self.applies_to(channel) {
            self.convert(raw)
        } else {
            raw
        }
    }
}
impl Default for UnitConversion {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE_FACTOR)
    }
}
