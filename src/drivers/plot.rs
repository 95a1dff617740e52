use std::io::Cursor;
use std::path::Path;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::error::TelemetryError;
use crate::render::RenderFrame;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            // red / green / blue / purple, matching the bench scope traces
            palette: vec![RED, GREEN, BLUE, RGBColor(160, 32, 240), CYAN, YELLOW, WHITE],
        }
    }
}
/// Draws every channel of a rendered frame on one chart and encodes it as PNG.
pub fn render_frame_png(frame: &RenderFrame, style: &PlotStyle) -> Result<Vec<u8>, TelemetryError> {
    if frame.is_empty() {
        return Err(TelemetryError::Plot("render frame has no samples".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (x_min, x_max) = bounds(frame.series.iter().flat_map(|s| s.x.iter().copied()));
        let (y_min, y_max) = bounds(frame.series.iter().flat_map(|s| s.y.iter().copied()));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                "Real-Time Sensor Data (Sliding Window)",
                ("sans-serif", 20).into_font().color(&WHITE),
            )
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;
        for (idx, series) in frame.series.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            let points = series.x.iter().copied().zip(series.y.iter().copied());
            chart
                .draw_series(LineSeries::new(points, &color))?
                .label(series.label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        chart
            .configure_series_labels()
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
pub fn write_frame_png(
    frame: &RenderFrame,
    style: &PlotStyle,
    path: impl AsRef<Path>,
) -> Result<(), TelemetryError> {
    let png = render_frame_png(frame, style)?;
    let path = path.as_ref();
    std::fs::write(path, png).map_err(|source| TelemetryError::File {
        path: path.to_path_buf(),
        source,
    })
}
// Padded min/max; a flat or single-point range is widened so the axis has height.
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, TelemetryError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| TelemetryError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ChannelSeries;
    #[test]
    #[ignore = "needs a system sans-serif font"]
    fn renders_png_signature() {
        let frame = RenderFrame {
            series: vec![ChannelSeries {
                label: "BioZ".into(),
                x: (0..32).map(|i| i as f64 * 0.02).collect(),
                y: (0..32).map(|i| (i as f64).sin()).collect(),
            }],
            latest: None,
            total_appended: 32,
            smoothed: false,
        };
        let png = render_frame_png(&frame, &PlotStyle::default()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
    #[test]
    fn empty_frame_is_rejected() {
        let err = render_frame_png(&RenderFrame::default(), &PlotStyle::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::Plot(_)));
    }
    #[test]
    fn flat_series_gets_nonzero_range() {
        assert_eq!(bounds([3.0, 3.0].into_iter()), (2.0, 4.0));
        assert_eq!(bounds(std::iter::empty()), (0.0, 1.0));
    }
}
