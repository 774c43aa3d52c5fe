//! Cluster report serialization and the diagnostic scatter plot.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::grouping::Bucket;
use crate::utils::{read_and_parse_json, write_sorted_json};

pub const REPORT_FILE_NAME: &str = "k-means_cluster_result_ssd.json";
pub const SCATTER_FILE_NAME: &str = "scatter.png";

/// The anchors chosen for one threshold layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerAnchors {
    pub final_centro: Vec<[f64; 2]>,
    pub thresh: f64,
}

/// Write the report as a key-sorted JSON array with a 4-space indent.
pub fn write_report(path: &Path, layers: &[LayerAnchors]) -> Result<()> {
    write_sorted_json(path, &layers)?;
    info!("Cluster result saved as {}", path.display());
    Ok(())
}

pub fn read_report(path: &Path) -> Result<Vec<LayerAnchors>> {
    read_and_parse_json(path)
}

#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// Width and height of the square image in pixels.
    pub size: u32,
    /// Margin around the plot area in pixels.
    pub margin: u32,
    /// Both axes span `0..axis_max` in box pixels.
    pub axis_max: f64,
    /// Spacing of the grid lines in box pixels.
    pub grid_step: f64,
    /// Bucket colours, cycled per threshold.
    pub bucket_colors: Vec<[u8; 3]>,
    /// Opacity of the box samples.
    pub sample_alpha: f32,
    pub centroid_color: [u8; 3],
    pub centroid_radius: i32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            size: 600,
            margin: 40,
            axis_max: 310.0,
            grid_step: 50.0,
            bucket_colors: vec![[0x33, 0xcc, 0xff], [0x00, 0xff, 0x00]],
            sample_alpha: 0.2,
            centroid_color: [255, 0, 0],
            centroid_radius: 4,
        }
    }
}

impl PlotOptions {
    /// Reject layouts that leave no plot area or would never finish the grid.
    pub fn validate(&self) -> Result<()> {
        if self.size <= 2 * self.margin {
            return Err(Error::InvalidParameter(format!(
                "plot size {} leaves no room inside a {} px margin",
                self.size, self.margin
            )));
        }
        if !(self.axis_max.is_finite() && self.axis_max > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "plot axis_max must be positive, got {}",
                self.axis_max
            )));
        }
        if !(self.grid_step.is_finite() && self.grid_step > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "plot grid_step must be positive, got {}",
                self.grid_step
            )));
        }
        if !(0.0..=1.0).contains(&self.sample_alpha) {
            return Err(Error::InvalidParameter(format!(
                "plot sample_alpha must be in [0, 1], got {}",
                self.sample_alpha
            )));
        }
        Ok(())
    }
}

struct PlotFrame {
    origin_x: f32,
    origin_y: f32,
    extent: f32,
    axis_max: f64,
}

impl PlotFrame {
    fn new(options: &PlotOptions) -> Self {
        let margin = options.margin as f32;
        Self {
            origin_x: margin,
            origin_y: options.size as f32 - margin,
            extent: options.size as f32 - 2.0 * margin,
            axis_max: options.axis_max,
        }
    }

    // Pixel position of a (width, height) value, None when outside the axes
    fn project(&self, x: f64, y: f64) -> Option<(f32, f32)> {
        if !(0.0..=self.axis_max).contains(&x) || !(0.0..=self.axis_max).contains(&y) {
            return None;
        }
        let scale = self.extent / self.axis_max as f32;
        Some((
            self.origin_x + x as f32 * scale,
            self.origin_y - y as f32 * scale,
        ))
    }
}

// Alpha-blend a small dot onto the image
fn blend_dot(image: &mut RgbImage, (cx, cy): (f32, f32), color: [u8; 3], alpha: f32) {
    let (cx, cy) = (cx.round() as i64, cy.round() as i64);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            if dx * dx + dy * dy > 1 {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
                continue;
            }
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for (channel, value) in pixel.0.iter_mut().zip(color) {
                let blended = *channel as f32 * (1.0 - alpha) + value as f32 * alpha;
                *channel = blended.round() as u8;
            }
        }
    }
}

/// Draw the box samples (coloured per bucket) and the chosen anchors.
pub fn draw_scatter(
    buckets: &[Bucket],
    layers: &[LayerAnchors],
    options: &PlotOptions,
) -> Result<RgbImage> {
    options.validate()?;
    let mut image = RgbImage::from_pixel(options.size, options.size, Rgb([255, 255, 255]));
    let frame = PlotFrame::new(options);

    let grid = Rgb([225, 225, 225]);
    let mut value = 0.0;
    while value <= options.axis_max {
        if let (Some((x, y0)), Some((_, y1))) = (
            frame.project(value, 0.0),
            frame.project(value, options.axis_max),
        ) {
            draw_line_segment_mut(&mut image, (x, y0), (x, y1), grid);
        }
        if let (Some((x0, y)), Some((x1, _))) = (
            frame.project(0.0, value),
            frame.project(options.axis_max, value),
        ) {
            draw_line_segment_mut(&mut image, (x0, y), (x1, y), grid);
        }
        value += options.grid_step;
    }
    draw_hollow_rect_mut(
        &mut image,
        Rect::at(options.margin as i32, options.margin as i32)
            .of_size(frame.extent as u32 + 1, frame.extent as u32 + 1),
        Rgb([0, 0, 0]),
    );

    for (i, bucket) in buckets.iter().enumerate() {
        let color = options
            .bucket_colors
            .get(i % options.bucket_colors.len().max(1))
            .copied()
            .unwrap_or([0x33, 0xcc, 0xff]);
        for b in &bucket.boxes {
            if let Some(p) = frame.project(b.width, b.height) {
                blend_dot(&mut image, p, color, options.sample_alpha);
            }
        }
    }

    for layer in layers {
        for [w, h] in &layer.final_centro {
            if let Some((x, y)) = frame.project(*w, *h) {
                draw_filled_circle_mut(
                    &mut image,
                    (x.round() as i32, y.round() as i32),
                    options.centroid_radius,
                    Rgb(options.centroid_color),
                );
            }
        }
    }

    Ok(image)
}

/// Render the scatter plot to `<out_dir>/scatter.png` and return its path.
pub fn render_scatter(
    buckets: &[Bucket],
    layers: &[LayerAnchors],
    out_dir: &Path,
    options: &PlotOptions,
) -> Result<PathBuf> {
    let path = out_dir.join(SCATTER_FILE_NAME);
    draw_scatter(buckets, layers, options)?
        .save(&path)
        .map_err(|source| Error::Image {
            path: path.clone(),
            source,
        })?;
    info!("Scatter plot saved as {}", path.display());
    Ok(path)
}
