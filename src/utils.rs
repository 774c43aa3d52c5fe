use glob::{glob, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Read and parse a single JSON file from a buffered file stream.
pub fn read_and_parse_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::json(path, e))
}

/// Write `value` as pretty JSON with sorted object keys and a 4-space indent.
pub fn write_sorted_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    // serde_json::Map is a BTreeMap without the preserve_order feature, so
    // going through Value sorts the keys at every level.
    let value = serde_json::to_value(value).map_err(|e| Error::json(path, e))?;

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::json(path, e))?;
    writer.flush().map_err(|e| Error::io(path, e))
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Make sure an output directory exists, keeping anything already in it
pub fn ensure_output_directory(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        log::info!("Creating output directory {}", path.display());
        fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    Ok(path.to_path_buf())
}

/// Sorted names of the entries of a directory
pub fn list_dir_names(path: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(path)
        .map_err(|e| Error::io(path, e))?
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(|e| Error::io(path, e))
        })
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Sorted `*.json` files directly inside `dir` whose name contains `label`.
/// Unreadable entries are errors.
pub fn matching_json_files(dir: &Path, label: &str) -> Result<Vec<PathBuf>> {
    let pattern = Path::new(&Pattern::escape(&dir.to_string_lossy())).join("*.json");
    let pattern = pattern.to_string_lossy();

    let mut paths = Vec::new();
    for entry in glob(&pattern)
        .map_err(|e| Error::InvalidParameter(format!("bad glob pattern {pattern}: {e}")))?
    {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::io(path, e.into_error())
        })?;
        if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(label))
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
