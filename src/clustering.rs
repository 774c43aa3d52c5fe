//! Per-layer k-means with an elbow stopping rule.
//!
//! For every bucket, k-means is run for k = 2, 3, ... and the distortion of
//! each trial is compared to the previous one. As soon as a trial fails to
//! bring the distortion below `score_ratio` times the previous distortion the
//! search stops for that layer.

use log::{error, info, warn};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::grouping::Bucket;
use crate::kmeans::{KMeans, KMeansOptions, Point};
use crate::report::LayerAnchors;

/// Which trial is kept once the elbow rule stops the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElbowPick {
    /// The last trial that still improved on its predecessor.
    #[default]
    Previous,
    /// The trial that triggered the stop. Reproduces anchor sets produced by
    /// earlier versions of this tool.
    Current,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveOptions {
    /// Cluster counts 2..max_k (exclusive) are tried, at least k = 2.
    pub max_k: usize,
    /// A trial stops the search when `distortion >= score_ratio * previous`.
    pub score_ratio: f64,
    pub seed: u64,
    pub n_init: usize,
    pub pick: ElbowPick,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            max_k: 10,
            score_ratio: 0.8,
            seed: 0,
            n_init: KMeansOptions::default().n_init,
            pick: ElbowPick::Previous,
        }
    }
}

/// One k-means run of the search.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub k: usize,
    pub centroids: Vec<Point>,
    pub labels: Vec<usize>,
    /// Sum of squared distances, lower is better.
    pub distortion: f64,
    /// Informational only.
    pub elapsed: Duration,
}

/// Every trial run for one bucket and the one that was selected.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerResult {
    pub threshold: f64,
    pub trials: Vec<Trial>,
    /// Index into `trials`, `None` for an empty bucket.
    pub selected: Option<usize>,
}

impl LayerResult {
    pub fn selected_trial(&self) -> Option<&Trial> {
        self.selected.and_then(|i| self.trials.get(i))
    }

    pub fn anchors(&self) -> LayerAnchors {
        LayerAnchors {
            thresh: self.threshold,
            final_centro: self
                .selected_trial()
                .map(|t| t.centroids.clone())
                .unwrap_or_default(),
        }
    }
}

pub struct AdaptiveKMeans {
    options: AdaptiveOptions,
}

impl AdaptiveKMeans {
    pub fn new(options: AdaptiveOptions) -> Result<Self> {
        if options.max_k < 2 {
            return Err(Error::InvalidParameter(format!(
                "max_k must be >= 2, got {}",
                options.max_k
            )));
        }
        if !(options.score_ratio > 0.0 && options.score_ratio <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "score_ratio must be in (0, 1], got {}",
                options.score_ratio
            )));
        }
        if options.n_init == 0 {
            return Err(Error::InvalidParameter("n_init must be >= 1".to_string()));
        }
        if options.max_k < 3 {
            warn!("max_k < 3: only k = 2 is tried, the elbow rule never applies");
        }
        Ok(Self { options })
    }

    /// Largest k tried per bucket.
    pub fn last_k(&self) -> usize {
        (self.options.max_k - 1).max(2)
    }

    /// Run the elbow search over every bucket, in order.
    pub fn cluster(&self, buckets: &[Bucket]) -> Result<Vec<LayerResult>> {
        buckets.iter().map(|b| self.cluster_bucket(b)).collect()
    }

    /// Run the elbow search over every bucket and keep only the anchors.
    pub fn anchors(&self, buckets: &[Bucket]) -> Result<Vec<LayerAnchors>> {
        Ok(self
            .cluster(buckets)?
            .iter()
            .map(LayerResult::anchors)
            .collect())
    }

    pub fn cluster_bucket(&self, bucket: &Bucket) -> Result<LayerResult> {
        let mut result = LayerResult {
            threshold: bucket.threshold,
            trials: Vec::new(),
            selected: None,
        };
        if bucket.is_empty() {
            info!("Threshold {}: empty bucket, no anchors", bucket.threshold);
            return Ok(result);
        }

        info!(
            "Threshold {}: clustering {} box(es)",
            bucket.threshold,
            bucket.len()
        );
        let points = bucket.points();
        let mut last_distortion = f64::INFINITY;

        for k in 2..=self.last_k() {
            let trial = self.run_trial(&points, k).inspect_err(|e| {
                error!(
                    "k-means failed for threshold {} with k={}: {}",
                    bucket.threshold, k, e
                );
            })?;
            info!(
                "clustering for k={}, processing time={:?}, score={}",
                k, trial.elapsed, trial.distortion
            );

            let distortion = trial.distortion;
            result.trials.push(trial);
            result.selected = Some(result.trials.len() - 1);

            if distortion >= self.options.score_ratio * last_distortion {
                info!(
                    "current score is {:.2}% of last score, stop clustering for threshold {}",
                    100.0 * distortion / last_distortion,
                    bucket.threshold
                );
                if self.options.pick == ElbowPick::Previous {
                    result.selected = Some(result.trials.len().saturating_sub(2));
                }
                break;
            }
            last_distortion = distortion;
        }

        if let Some(trial) = result.selected_trial() {
            info!("Threshold {}: selected k={}", bucket.threshold, trial.k);
        }
        Ok(result)
    }

    fn run_trial(&self, points: &[Point], k: usize) -> Result<Trial> {
        let kmeans = KMeans::new(KMeansOptions {
            n_clusters: k,
            n_init: self.options.n_init,
            seed: self.options.seed,
            ..KMeansOptions::default()
        });

        let start = Instant::now();
        let fit = kmeans.fit(points)?;
        let elapsed = start.elapsed();

        Ok(Trial {
            k,
            distortion: fit.distortion(),
            centroids: fit.centroids,
            labels: fit.labels,
            elapsed,
        })
    }
}
