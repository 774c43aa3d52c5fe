use log::debug;

use crate::types::{AnnotationSet, BoxSize, ProcessingStats};

/// Per-axis rescaling applied to box sizes before clustering, normalising
/// the source resolution to the detector input resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub width: f64,
    pub height: f64,
}

impl ScaleFactor {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 1.0)
    }

    /// Scale a raw size and round to whole pixels, ties to even.
    pub fn apply(&self, width: f64, height: f64) -> BoxSize {
        BoxSize::new(
            (width * self.width).round_ties_even(),
            (height * self.height).round_ties_even(),
        )
    }
}

impl Default for ScaleFactor {
    // 640x960 ground truth resized to a 300x600 network input
    fn default() -> Self {
        Self::new(0.46875, 0.625)
    }
}

/// Flatten every annotation entry into a list of rescaled box sizes.
///
/// Entries with a missing or zero width or height are skipped and counted in
/// the returned statistics.
pub fn extract_boxes(
    annotations: &AnnotationSet,
    scale: ScaleFactor,
) -> (Vec<BoxSize>, ProcessingStats) {
    let mut stats = ProcessingStats::new();
    let mut boxes = Vec::new();

    for (folder, images) in annotations {
        for (image_name, record) in images {
            stats.images_seen += 1;
            if record.is_empty() {
                stats.empty_images += 1;
                continue;
            }

            for entry in &record.annotations {
                match entry.size() {
                    Some((width, height)) => {
                        boxes.push(scale.apply(width, height));
                        stats.entries_kept += 1;
                    }
                    None => {
                        debug!(
                            "Skipping entry in {}/{}: missing {:?}",
                            folder,
                            image_name,
                            entry.missing_size_fields()
                        );
                        stats.entries_skipped += 1;
                    }
                }
            }
        }
    }

    (boxes, stats)
}
