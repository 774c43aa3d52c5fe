//! Conversion of UAVDT text ground truth into JSON benchmark files.
//!
//! Each row of a `*_gt_whole.txt` file reads
//! `frame,target_id,left,top,width,height,out_of_view,occlusion,category`.

use log::{debug, info};
use serde_json::json;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageAnnotations, ImageRecord, ObjectEntry};
use crate::utils::create_progress_bar;

pub const IMAGE_WIDTH: u32 = 1024;
pub const IMAGE_HEIGHT: u32 = 540;

const FIELDS_PER_ROW: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundTruthRow {
    pub frame: i64,
    pub target_id: i64,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub out_of_view: i64,
    pub occlusion: i64,
    pub category: i64,
}

/// Class name of a UAVDT category id.
pub fn category_label(id: i64) -> Option<&'static str> {
    match id {
        1 => Some("car"),
        2 => Some("truck"),
        3 => Some("bus"),
        _ => None,
    }
}

/// Parse ground-truth rows. Values may be written as floats and are
/// truncated to integers. Blank lines and `#` comments are ignored.
pub fn parse_ground_truth(path: &Path, content: &str) -> Result<Vec<GroundTruthRow>> {
    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values = line
            .split(',')
            .map(|field| {
                let field = field.trim();
                field
                    .parse::<f64>()
                    .map(|v| v as i64)
                    .map_err(|e| Error::Parse {
                        path: path.to_path_buf(),
                        line: index + 1,
                        message: format!("invalid number {:?}: {}", field, e),
                    })
            })
            .collect::<Result<Vec<i64>>>()?;

        let [frame, target_id, left, top, width, height, out_of_view, occlusion, category] =
            <[i64; FIELDS_PER_ROW]>::try_from(values.as_slice()).map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                message: format!("expected {} fields, got {}", FIELDS_PER_ROW, values.len()),
            })?;

        rows.push(GroundTruthRow {
            frame,
            target_id,
            left,
            top,
            width,
            height,
            out_of_view,
            occlusion,
            category,
        });
    }
    Ok(rows)
}

pub fn read_ground_truth(path: &Path) -> Result<Vec<GroundTruthRow>> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_ground_truth(path, &content)
}

/// Sequence name of a ground-truth file, e.g. `M0101_gt_whole.txt` -> `M0101`.
pub fn sequence_name(file_name: &str, file_label: &str) -> String {
    file_name.replace(file_label, "")
}

/// Image name of a frame inside a sequence, e.g. `M0101/img000001.jpg`.
pub fn frame_image_name(sequence: &str, frame: i64) -> String {
    format!("{}/img{:06}.jpg", sequence, frame)
}

/// Add the rows of one sequence to `images`, one record per frame.
pub fn convert_sequence(
    path: &Path,
    sequence: &str,
    mut rows: Vec<GroundTruthRow>,
    images: &mut ImageAnnotations,
) -> Result<()> {
    rows.sort_by_key(|row| (row.frame, row.target_id));

    for row in rows {
        let label = category_label(row.category).ok_or_else(|| Error::UnknownCategory {
            path: path.to_path_buf(),
            id: row.category,
        })?;

        let name = frame_image_name(sequence, row.frame);
        let record = images.entry(name.clone()).or_insert_with(|| ImageRecord {
            name: Some(name),
            width: Some(IMAGE_WIDTH),
            height: Some(IMAGE_HEIGHT),
            annotations: Vec::new(),
        });
        record.annotations.push(ObjectEntry {
            label: Some(label.to_string()),
            id: Some(row.target_id),
            shape: Some(json!(["Box", 1])),
            category: Some("sideways".to_string()),
            x: Some(row.left as f64),
            y: Some(row.top as f64),
            width: Some(row.width as f64),
            height: Some(row.height as f64),
        });
    }
    Ok(())
}

// Sequence prefix of a file or directory name, `M0101_gt_whole.txt` -> `M0101`
fn sequence_prefix(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

/// Split ground-truth files into train and test lists by their sequence
/// prefix. Only files whose name contains `whole` are considered.
pub fn divide_list(
    gt_files: &[String],
    train_entries: &[String],
    test_entries: &[String],
) -> (Vec<String>, Vec<String>) {
    let train: Vec<&str> = train_entries.iter().map(|s| sequence_prefix(s)).collect();
    let test: Vec<&str> = test_entries.iter().map(|s| sequence_prefix(s)).collect();

    let mut train_files = Vec::new();
    let mut test_files = Vec::new();
    for name in gt_files.iter().filter(|name| name.contains("whole")) {
        let prefix = sequence_prefix(name);
        if train.contains(&prefix) {
            train_files.push(name.clone());
        } else if test.contains(&prefix) {
            test_files.push(name.clone());
        }
    }
    (train_files, test_files)
}

/// Convert every listed ground-truth file carrying `file_label` into one
/// merged benchmark.
pub fn convert_files(
    gt_dir: &Path,
    files: &[String],
    file_label: &str,
) -> Result<ImageAnnotations> {
    let files: Vec<&String> = files.iter().filter(|f| f.contains(file_label)).collect();
    let pb = create_progress_bar(files.len() as u64, "Convert");
    let mut images = ImageAnnotations::new();

    for file_name in files {
        let path = gt_dir.join(file_name);
        let rows = read_ground_truth(&path)?;
        debug!("{}: {} row(s)", path.display(), rows.len());
        convert_sequence(&path, &sequence_name(file_name, file_label), rows, &mut images)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Converted {} frame(s)", images.len());
    Ok(images)
}

/// Output file name of a split, `UAV.json` + `train` -> `UAV-train.json`.
pub fn split_file_name(save_name: &str, split: &str) -> String {
    match save_name.strip_suffix(".json") {
        Some(stem) => format!("{}-{}.json", stem, split),
        None => format!("{}-{}", save_name, split),
    }
}
