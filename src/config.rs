use clap::{Parser, ValueEnum};
use std::str::FromStr;

use crate::clustering::ElbowPick;
use crate::error::Result;
use crate::extract::ScaleFactor;
use crate::grouping::{BoundaryPolicy, ThresholdLadder};

/// Cluster ground-truth box sizes into per-scale anchor boxes.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct AnchorArgs {
    /// Root directory holding one sub-directory per dataset folder
    #[arg(short = 'd', long = "file_path")]
    pub file_path: String,

    /// Only JSON files whose name contains this label are loaded
    #[arg(long = "json_label", default_value = "annotation")]
    pub json_label: String,

    /// Directory where the cluster report and scatter plot are written
    #[arg(short = 'o', long = "save_path")]
    pub save_path: String,

    /// Threshold ladder preset, ignored when --thresholds is given
    #[arg(long = "dataset", value_enum, default_value = "caltech")]
    pub dataset: DatasetPreset,

    /// Ascending diagonal-length thresholds in pixels, comma separated
    #[arg(long = "thresholds", value_delimiter = ',')]
    pub thresholds: Vec<f64>,

    /// Upper bound (exclusive) of the cluster counts tried per layer
    #[arg(long = "max_k", default_value_t = 10, value_parser = validate_max_k)]
    pub max_k: usize,

    /// Stop when the distortion is not below this fraction of the previous one
    #[arg(long = "score_ratio", default_value_t = 0.75, value_parser = validate_ratio)]
    pub score_ratio: f64,

    /// Seed for k-means initialisation
    #[arg(long = "seed", default_value_t = 0)]
    pub seed: u64,

    /// Number of k-means restarts per trial, the best one is kept
    #[arg(long = "n_init", default_value_t = 10, value_parser = validate_count)]
    pub n_init: usize,

    /// Factor applied to box widths before rounding
    #[arg(long = "wfactor", default_value_t = 0.46875, value_parser = validate_factor)]
    pub wfactor: f64,

    /// Factor applied to box heights before rounding
    #[arg(long = "hfactor", default_value_t = 0.625, value_parser = validate_factor)]
    pub hfactor: f64,

    /// Discard the first box above each threshold instead of carrying it forward
    #[arg(long = "drop_boundary_box")]
    pub drop_boundary_box: bool,

    /// Keep the centroids of the trial that triggered the elbow stop
    #[arg(long = "keep_stopping_k")]
    pub keep_stopping_k: bool,

    /// Skip rendering the scatter plot
    #[arg(long = "no_plot")]
    pub no_plot: bool,
}

impl AnchorArgs {
    pub fn threshold_ladder(&self) -> Result<ThresholdLadder> {
        if self.thresholds.is_empty() {
            ThresholdLadder::new(self.dataset.thresholds().to_vec())
        } else {
            ThresholdLadder::new(self.thresholds.clone())
        }
    }

    pub fn scale_factor(&self) -> ScaleFactor {
        ScaleFactor::new(self.wfactor, self.hfactor)
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        if self.drop_boundary_box {
            BoundaryPolicy::Drop
        } else {
            BoundaryPolicy::CarryForward
        }
    }

    pub fn elbow_pick(&self) -> ElbowPick {
        if self.keep_stopping_k {
            ElbowPick::Current
        } else {
            ElbowPick::Previous
        }
    }
}

// Known threshold ladders. The thresholds are the diagonal length of one
// grid cell at each detector layer.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum DatasetPreset {
    /// Caltech pedestrian, grid sizes [22, 17, 9, 4, 2, 1]
    Caltech,
    /// Berkeley DeepDrive, grid sizes [19, 10, 5, 3, 2, 1]
    Bdd,
}

impl DatasetPreset {
    pub fn thresholds(self) -> &'static [f64] {
        match self {
            DatasetPreset::Caltech => &[13.63, 17.64, 33.33, 75.0, 150.0, 300.0],
            DatasetPreset::Bdd => &[15.78, 30.0, 60.0, 100.0, 150.0, 300.0],
        }
    }
}

/// Convert UAVDT text ground truth into JSON benchmark files.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct ConvertArgs {
    /// Directory holding the `*_gt_whole.txt` ground-truth files
    #[arg(short = 'd', long = "file_path")]
    pub file_path: String,

    /// Directory whose entries name the training sequences
    #[arg(long = "train_path")]
    pub train_path: String,

    /// Directory whose entries name the testing sequences
    #[arg(long = "test_path")]
    pub test_path: String,

    /// Suffix identifying the ground-truth files to convert
    #[arg(long = "file_label", default_value = "_gt_whole.txt")]
    pub file_label: String,

    /// Base name of the generated JSON files
    #[arg(long = "save_name", default_value = "UAV-benchmark-M-VIVA.json")]
    pub save_name: String,
}

/// Package JSON annotations and JPEG images into sharded TFRecord files.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct RecordArgs {
    /// Dataset root, also where the record files are written
    #[arg(short = 'd', long = "file_path")]
    pub file_path: String,

    /// Name of the record file (shards get a `-NNNNN-of-NNNNN` suffix)
    #[arg(long = "tfrecord_name", default_value = "UAV_test.record")]
    pub tfrecord_name: String,

    /// Only JSON files whose name contains this label are packaged
    #[arg(long = "json_label", default_value = "test")]
    pub json_label: String,

    /// Number of shards, no sharding when <= 1
    #[arg(long = "shard_number", default_value_t = 10)]
    pub shard_number: usize,

    /// Sub-directory of the dataset root holding the JSON annotations
    #[arg(long = "label_dir", default_value = "GT_json")]
    pub label_dir: String,

    /// Sub-directory of the dataset root holding the image folders
    #[arg(long = "image_dir", default_value = "UAV-benchmark-M")]
    pub image_dir: String,
}

// Validate that the ratio is in (0, 1]
pub fn validate_ratio(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if val > 0.0 && val <= 1.0 => Ok(val),
        _ => Err("RATIO must be in (0.0, 1.0]".to_string()),
    }
}

// At least two clusters are always tried
pub fn validate_max_k(s: &str) -> Result<usize, String> {
    match usize::from_str(s) {
        Ok(val) if val >= 2 => Ok(val),
        _ => Err("MAX_K must be an integer >= 2".to_string()),
    }
}

pub fn validate_count(s: &str) -> Result<usize, String> {
    match usize::from_str(s) {
        Ok(val) if val >= 1 => Ok(val),
        _ => Err("value must be a positive integer".to_string()),
    }
}

pub fn validate_factor(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if val > 0.0 && val.is_finite() => Ok(val),
        _ => Err("FACTOR must be a positive number".to_string()),
    }
}
