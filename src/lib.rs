//! Detection dataset preparation tools
//!
//! This library backs three offline tools: converting UAVDT text ground truth
//! into JSON benchmarks, packaging benchmarks and images into TFRecord files,
//! and clustering ground-truth box sizes into per-layer anchor boxes.

pub mod clustering;
pub mod config;
pub mod error;
pub mod extract;
pub mod grouping;
pub mod io;
pub mod kmeans;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod types;
pub mod uavdt;
pub mod utils;

// Re-export commonly used types and functions
pub use clustering::{AdaptiveKMeans, AdaptiveOptions, ElbowPick, LayerResult, Trial};
pub use config::{AnchorArgs, ConvertArgs, DatasetPreset, RecordArgs};
pub use error::{Error, Result};
pub use extract::{extract_boxes, ScaleFactor};
pub use grouping::{group_boxes, BoundaryPolicy, Bucket, ScaleGroups, ThresholdLadder};
pub use io::load_json_annotations;
pub use kmeans::{KMeans, KMeansFit, KMeansOptions};
pub use pipeline::{run_anchor_clustering, run_record_creation, run_uavdt_conversion};
pub use report::{read_report, render_scatter, write_report, LayerAnchors, PlotOptions};
pub use types::{AnnotationSet, BoxSize, ImageAnnotations, ImageRecord, ObjectEntry};
