//! Seeded k-means over 2-D points.
//!
//! Greedy k-means++ seeding followed by Lloyd iterations, best of `n_init`
//! restarts. The conventions follow scikit-learn's `KMeans`: the tolerance is
//! relative to the mean per-feature variance of the data, and [`KMeansFit::score`]
//! is the *negated* inertia, so higher is better. Use
//! [`KMeansFit::distortion`] for the lower-is-better sum of squared distances.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

pub type Point = [f64; 2];

/// Options for a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansOptions {
    /// Number of clusters.
    pub n_clusters: usize,
    /// Maximum Lloyd iterations per run.
    pub max_iter: usize,
    /// Convergence tolerance on the total squared centre shift, relative to
    /// the mean per-feature variance.
    pub tol: f64,
    /// Number of seeded restarts, the run with the lowest inertia is kept.
    pub n_init: usize,
    /// Seed of the random generator driving the initialisation.
    pub seed: u64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: 0,
        }
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub centroids: Vec<Point>,
    /// Cluster index of every input point, in input order.
    pub labels: Vec<usize>,
    /// Sum of squared distances of the points to their assigned centroid.
    pub inertia: f64,
    pub n_iter: usize,
}

impl KMeansFit {
    /// Library-convention score of the fitted data: `-inertia`.
    pub fn score(&self) -> f64 {
        -self.inertia
    }

    /// Sum of squared distances, lower is better.
    pub fn distortion(&self) -> f64 {
        -self.score()
    }
}

/// Negated sum of squared distances from each point to its nearest centroid.
pub fn score(centroids: &[Point], points: &[Point]) -> f64 {
    -points
        .iter()
        .map(|p| nearest(centroids, p).1)
        .sum::<f64>()
}

pub struct KMeans {
    options: KMeansOptions,
}

impl KMeans {
    pub fn new(options: KMeansOptions) -> Self {
        Self { options }
    }

    pub fn with_clusters(n_clusters: usize, seed: u64) -> Self {
        Self::new(KMeansOptions {
            n_clusters,
            seed,
            ..KMeansOptions::default()
        })
    }

    pub fn fit(&self, points: &[Point]) -> Result<KMeansFit> {
        let KMeansOptions {
            n_clusters,
            max_iter,
            tol,
            n_init,
            seed,
        } = self.options;

        if n_clusters == 0 || max_iter == 0 || n_init == 0 {
            return Err(Error::InvalidParameter(format!(
                "k-means needs n_clusters, max_iter and n_init >= 1, got {:?}",
                self.options
            )));
        }
        if points.len() < n_clusters {
            return Err(Error::TooFewPoints {
                n_samples: points.len(),
                n_clusters,
            });
        }

        let tol = tol * mean_variance(points);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..n_init {
            let centers = init_plus_plus(points, n_clusters, &mut rng);
            let run = lloyd(points, centers, max_iter, tol);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best.ok_or_else(|| Error::InvalidParameter("k-means produced no run".to_string()))
    }
}

fn dist_sq(a: &Point, b: &Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

// Index of and squared distance to the nearest centre, ties to the lowest index
fn nearest(centers: &[Point], p: &Point) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centers.iter().enumerate() {
        let d = dist_sq(c, p);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn mean_variance(points: &[Point]) -> f64 {
    let n = points.len() as f64;
    let mut total = 0.0;
    for axis in 0..2 {
        let mean = points.iter().map(|p| p[axis]).sum::<f64>() / n;
        total += points.iter().map(|p| (p[axis] - mean).powi(2)).sum::<f64>() / n;
    }
    total / 2.0
}

// Sample an index with probability proportional to `weights`
fn sample_weighted(weights: &[f64], total: f64, rng: &mut StdRng) -> usize {
    if total <= 0.0 {
        return rng.gen_range(0..weights.len());
    }
    let target = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if acc > target {
            return i;
        }
    }
    weights.len() - 1
}

// Greedy k-means++: each new centre is the best of 2 + ln(k) weighted draws
fn init_plus_plus(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let n_local_trials = 2 + (k as f64).ln().floor() as usize;

    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);

    let mut closest: Vec<f64> = points.iter().map(|p| dist_sq(&centers[0], p)).collect();
    let mut potential: f64 = closest.iter().sum();

    while centers.len() < k {
        let mut best: Option<(usize, Vec<f64>, f64)> = None;
        for _ in 0..n_local_trials {
            let candidate = sample_weighted(&closest, potential, rng);
            let trial: Vec<f64> = points
                .iter()
                .zip(&closest)
                .map(|(p, &d)| d.min(dist_sq(&points[candidate], p)))
                .collect();
            let trial_potential: f64 = trial.iter().sum();
            if best.as_ref().map_or(true, |b| trial_potential < b.2) {
                best = Some((candidate, trial, trial_potential));
            }
        }

        if let Some((candidate, trial, trial_potential)) = best {
            centers.push(points[candidate]);
            closest = trial;
            potential = trial_potential;
        }
    }

    centers
}

fn assign(points: &[Point], centers: &[Point], labels: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (idx, d) = nearest(centers, p);
        *label = idx;
        inertia += d;
    }
    inertia
}

fn lloyd(points: &[Point], mut centers: Vec<Point>, max_iter: usize, tol: f64) -> KMeansFit {
    let k = centers.len();
    let mut labels = vec![usize::MAX; points.len()];
    let mut previous = labels.clone();
    let mut n_iter = 0;

    for iteration in 0..max_iter {
        assign(points, &centers, &mut labels);

        let mut sums = vec![[0.0f64; 2]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(&labels) {
            sums[label][0] += p[0];
            sums[label][1] += p[1];
            counts[label] += 1;
        }

        let mut updated: Vec<Point> = sums
            .iter()
            .zip(&counts)
            .zip(&centers)
            .map(|((sum, &count), old)| {
                if count == 0 {
                    *old
                } else {
                    [sum[0] / count as f64, sum[1] / count as f64]
                }
            })
            .collect();
        relocate_empty_clusters(points, &labels, &centers, &counts, &mut updated);

        let shift: f64 = centers.iter().zip(&updated).map(|(a, b)| dist_sq(a, b)).sum();
        centers = updated;
        n_iter = iteration + 1;

        if labels == previous || shift <= tol {
            break;
        }
        previous.clone_from(&labels);
    }

    let inertia = assign(points, &centers, &mut labels);
    KMeansFit {
        centroids: centers,
        labels,
        inertia,
        n_iter,
    }
}

// Empty clusters take over the points farthest from their current centre
fn relocate_empty_clusters(
    points: &[Point],
    labels: &[usize],
    centers: &[Point],
    counts: &[usize],
    updated: &mut [Point],
) {
    let empty: Vec<usize> = (0..counts.len()).filter(|&c| counts[c] == 0).collect();
    if empty.is_empty() {
        return;
    }

    let mut far: Vec<(usize, f64)> = points
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (p, &label))| (i, dist_sq(p, &centers[label])))
        .collect();
    far.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    for (cluster, (idx, _)) in empty.into_iter().zip(far) {
        updated[cluster] = points[idx];
    }
}
