//! Partition box sizes into per-layer buckets by diagonal length.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::types::BoxSize;

/// Strictly increasing, positive diagonal-length cutoffs in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdLadder(Vec<f64>);

impl ThresholdLadder {
    pub fn new(thresholds: Vec<f64>) -> Result<Self> {
        let positive = thresholds.iter().all(|t| t.is_finite() && *t > 0.0);
        let increasing = thresholds.windows(2).all(|w| w[0] < w[1]);
        if thresholds.is_empty() || !positive || !increasing {
            return Err(Error::InvalidThresholds(thresholds));
        }
        Ok(Self(thresholds))
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.0.last().copied().unwrap_or(0.0)
    }
}

/// What happens to the first box found at or above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryPolicy {
    /// The box stays in the pool and is the first candidate for the next
    /// threshold.
    #[default]
    CarryForward,
    /// The box is consumed and discarded. Reproduces anchor sets produced by
    /// earlier versions of this tool.
    Drop,
}

/// The boxes assigned to one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub threshold: f64,
    pub boxes: Vec<BoxSize>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn points(&self) -> Vec<[f64; 2]> {
        self.boxes.iter().map(|b| b.to_array()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleGroups {
    /// One bucket per threshold, in ladder order.
    pub buckets: Vec<Bucket>,
    /// Boxes that ended up in no bucket.
    pub unassigned: usize,
}

/// Group boxes into disjoint buckets, one per threshold of the ladder.
///
/// A box with squared diagonal `d²` goes to the first threshold `t` (in
/// ascending order) with `d² < t²`. Boxes are consumed in ascending `d²`
/// order through a cursor over a sorted copy; the input is left untouched.
pub fn group_boxes(
    boxes: &[BoxSize],
    ladder: &ThresholdLadder,
    policy: BoundaryPolicy,
) -> ScaleGroups {
    // Ties are consumed in reverse input order, matching a descending stable
    // sort popped from its end.
    let mut sorted: Vec<BoxSize> = boxes.iter().rev().copied().collect();
    sorted.sort_by(|a, b| a.diagonal_sq().total_cmp(&b.diagonal_sq()));

    let mut buckets = Vec::with_capacity(ladder.len());
    let mut cursor = 0;
    let mut dropped = 0;

    for &threshold in ladder.thresholds() {
        let limit = threshold * threshold;
        let start = cursor;
        while cursor < sorted.len() && sorted[cursor].diagonal_sq() < limit {
            cursor += 1;
        }
        debug!("Threshold {}: {} box(es)", threshold, cursor - start);
        buckets.push(Bucket {
            threshold,
            boxes: sorted[start..cursor].to_vec(),
        });

        if policy == BoundaryPolicy::Drop && cursor < sorted.len() {
            dropped += 1;
            cursor += 1;
        }
    }

    let unassigned = sorted.len() - buckets.iter().map(Bucket::len).sum::<usize>();
    if unassigned > 0 {
        info!(
            "{} box(es) not assigned to any threshold ({} dropped at boundaries)",
            unassigned, dropped
        );
    }

    ScaleGroups {
        buckets,
        unassigned,
    }
}
