use log::info;
use std::path::{Path, PathBuf};

use crate::clustering::{AdaptiveKMeans, AdaptiveOptions};
use crate::config::{AnchorArgs, ConvertArgs, RecordArgs};
use crate::error::Result;
use crate::extract::extract_boxes;
use crate::grouping::group_boxes;
use crate::io::load_json_annotations;
use crate::record::{load_benchmarks, write_records};
use crate::report::{render_scatter, write_report, LayerAnchors, PlotOptions, REPORT_FILE_NAME};
use crate::uavdt::{convert_files, divide_list, split_file_name};
use crate::utils::{ensure_output_directory, list_dir_names, write_sorted_json};

/// Anchor clustering pipeline: load, extract, group, cluster, report.
pub fn run_anchor_clustering(args: &AnchorArgs) -> Result<Vec<LayerAnchors>> {
    let ladder = args.threshold_ladder()?;
    let clusterer = AdaptiveKMeans::new(AdaptiveOptions {
        max_k: args.max_k,
        score_ratio: args.score_ratio,
        seed: args.seed,
        n_init: args.n_init,
        pick: args.elbow_pick(),
    })?;

    let annotations = load_json_annotations(Path::new(&args.file_path), &args.json_label)?;
    let (boxes, stats) = extract_boxes(&annotations, args.scale_factor());
    stats.print_summary();
    info!("Extracted {} box(es)", boxes.len());

    info!("Grouping boxes by threshold ladder {:?}...", ladder.thresholds());
    let groups = group_boxes(&boxes, &ladder, args.boundary_policy());

    let layers = clusterer.anchors(&groups.buckets)?;

    let save_dir = ensure_output_directory(Path::new(&args.save_path))?;
    write_report(&save_dir.join(REPORT_FILE_NAME), &layers)?;
    if !args.no_plot {
        render_scatter(&groups.buckets, &layers, &save_dir, &PlotOptions::default())?;
    }

    Ok(layers)
}

/// UAVDT text ground truth to train/test JSON benchmarks. Returns the paths
/// of the written files.
pub fn run_uavdt_conversion(args: &ConvertArgs) -> Result<Vec<PathBuf>> {
    let gt_dir = Path::new(&args.file_path);
    let gt_files = list_dir_names(gt_dir)?;
    let train_entries = list_dir_names(Path::new(&args.train_path))?;
    let test_entries = list_dir_names(Path::new(&args.test_path))?;

    let (train_files, test_files) = divide_list(&gt_files, &train_entries, &test_entries);
    info!(
        "{} training and {} testing ground-truth file(s)",
        train_files.len(),
        test_files.len()
    );

    let mut written = Vec::new();
    for (split, files) in [("train", train_files), ("test", test_files)] {
        let images = convert_files(gt_dir, &files, &args.file_label)?;
        let path = gt_dir.join(split_file_name(&args.save_name, split));
        write_sorted_json(&path, &images)?;
        info!("Saved {} benchmark as {}", split, path.display());
        written.push(path);
    }
    Ok(written)
}

/// JSON benchmarks plus images to (sharded) TFRecord files. Returns the number
/// of examples and the written files.
pub fn run_record_creation(args: &RecordArgs) -> Result<(usize, Vec<PathBuf>)> {
    let root = Path::new(&args.file_path);
    let benchmarks = load_benchmarks(&root.join(&args.label_dir), &args.json_label)?;
    info!("Loaded {} benchmark file(s)", benchmarks.len());

    write_records(
        &benchmarks,
        &root.join(&args.image_dir),
        &root.join(&args.tfrecord_name),
        args.shard_number,
    )
}
