use log::{debug, info};
use std::path::Path;

use crate::error::Result;
use crate::types::{AnnotationSet, ImageAnnotations};
use crate::utils::{list_dir_names, matching_json_files, read_and_parse_json};

/// Load every JSON benchmark file under `root/<folder>/` whose name contains
/// `json_label`, keyed by dataset folder.
///
/// Entries of `root` whose name contains a `.` are treated as files and
/// skipped. Several matching files in one folder are merged; on duplicate
/// image names the file that sorts last wins.
pub fn load_json_annotations(root: &Path, json_label: &str) -> Result<AnnotationSet> {
    let mut annotation_set = AnnotationSet::new();

    for folder in list_dir_names(root)? {
        if folder.contains('.') {
            continue;
        }
        let folder_path = root.join(&folder);
        if !folder_path.is_dir() {
            continue;
        }

        let json_paths = matching_json_files(&folder_path, json_label)?;

        for json_path in json_paths {
            debug!("Loading annotations from {}", json_path.display());
            let images: ImageAnnotations = read_and_parse_json(&json_path)?;
            annotation_set
                .entry(folder.clone())
                .or_default()
                .extend(images);
        }
    }

    info!(
        "Loaded annotations for {} dataset folder(s) under {}",
        annotation_set.len(),
        root.display()
    );
    Ok(annotation_set)
}
