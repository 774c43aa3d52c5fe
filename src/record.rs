//! Packaging of JSON benchmarks and JPEG images into TFRecord files.
//!
//! A record is framed as `u64 length | u32 masked crc(length) | data |
//! u32 masked crc(data)`, all little endian, where the CRC is CRC-32C. The
//! payload of every record is a serialized `tf.train.Example`.

use log::{info, warn};
use prost::Message;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ImageAnnotations, ImageRecord};
use crate::utils::{create_progress_bar, matching_json_files, read_and_parse_json};

/// The subset of `tensorflow/core/example/{example,feature}.proto` needed to
/// write detection examples.
pub mod proto {
    use std::collections::BTreeMap;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BytesList {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub value: Vec<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct FloatList {
        #[prost(float, repeated, tag = "1")]
        pub value: Vec<f32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Int64List {
        #[prost(int64, repeated, tag = "1")]
        pub value: Vec<i64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Feature {
        #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
        pub kind: Option<feature::Kind>,
    }

    pub mod feature {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum Kind {
            #[prost(message, tag = "1")]
            BytesList(super::BytesList),
            #[prost(message, tag = "2")]
            FloatList(super::FloatList),
            #[prost(message, tag = "3")]
            Int64List(super::Int64List),
        }
    }

    impl Feature {
        pub fn bytes(value: Vec<Vec<u8>>) -> Self {
            Self {
                kind: Some(feature::Kind::BytesList(BytesList { value })),
            }
        }

        pub fn floats(value: Vec<f32>) -> Self {
            Self {
                kind: Some(feature::Kind::FloatList(FloatList { value })),
            }
        }

        pub fn int64s(value: Vec<i64>) -> Self {
            Self {
                kind: Some(feature::Kind::Int64List(Int64List { value })),
            }
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Features {
        #[prost(btree_map = "string, message", tag = "1")]
        pub feature: BTreeMap<String, Feature>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Example {
        #[prost(message, optional, tag = "1")]
        pub features: Option<Features>,
    }
}

use proto::{Example, Feature, Features};

const CRC_MASK_DELTA: u32 = 0xa282_ead8;

/// Masked CRC-32C as used by the TFRecord framing.
pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(CRC_MASK_DELTA)
}

/// Writes framed records to any byte sink.
pub struct RecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, data: &[u8]) -> io::Result<()> {
        let length = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(&masked_crc32c(&length).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc32c(data).to_le_bytes())
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Read every record of a TFRecord file, verifying both checksums.
pub fn read_records(path: &Path) -> Result<Vec<Vec<u8>>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let corrupt = |message: &str| {
        Error::io(
            path,
            io::Error::new(io::ErrorKind::InvalidData, message.to_string()),
        )
    };

    let mut records = Vec::new();
    loop {
        let mut length = [0u8; 8];
        match reader.read_exact(&mut length) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::io(path, e)),
        }

        let mut crc = [0u8; 4];
        reader.read_exact(&mut crc).map_err(|e| Error::io(path, e))?;
        if u32::from_le_bytes(crc) != masked_crc32c(&length) {
            return Err(corrupt("length checksum mismatch"));
        }

        let mut data = vec![0u8; u64::from_le_bytes(length) as usize];
        reader.read_exact(&mut data).map_err(|e| Error::io(path, e))?;
        reader.read_exact(&mut crc).map_err(|e| Error::io(path, e))?;
        if u32::from_le_bytes(crc) != masked_crc32c(&data) {
            return Err(corrupt("data checksum mismatch"));
        }
        records.push(data);
    }
    Ok(records)
}

/// Output paths for `num_shards` shards, `<base>-00000-of-00010` style.
pub fn shard_paths(base: &Path, num_shards: usize) -> Vec<PathBuf> {
    let base = base.to_string_lossy();
    (0..num_shards)
        .map(|i| PathBuf::from(format!("{}-{:05}-of-{:05}", base, i, num_shards)))
        .collect()
}

/// Spreads records round-robin over several files by example index.
pub struct ShardedRecordWriter {
    shards: Vec<(PathBuf, RecordWriter<BufWriter<File>>)>,
}

impl ShardedRecordWriter {
    /// A single file at `base` when `num_shards <= 1`, otherwise one file per
    /// shard.
    pub fn create(base: &Path, num_shards: usize) -> Result<Self> {
        let paths = if num_shards <= 1 {
            vec![base.to_path_buf()]
        } else {
            shard_paths(base, num_shards)
        };

        let shards = paths
            .into_iter()
            .map(|path| {
                let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
                Ok((path, RecordWriter::new(BufWriter::new(file))))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shards })
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Write the record of example `index` to shard `index % num_shards`.
    pub fn write(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let shard = index % self.shards.len();
        let (path, writer) = &mut self.shards[shard];
        writer.write_record(data).map_err(|e| Error::io(path.as_path(), e))
    }

    /// Flush every shard and return their paths.
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        self.shards
            .into_iter()
            .map(|(path, writer)| {
                writer.into_inner().map_err(|e| Error::io(&path, e))?;
                Ok(path)
            })
            .collect()
    }
}

/// Class id of a label, case insensitive. 0 is reserved as background.
pub fn class_id(label: &str) -> Option<i64> {
    match label.to_lowercase().as_str() {
        "car" => Some(1),
        "truck" => Some(2),
        "bus" => Some(3),
        _ => None,
    }
}

/// Build the detection example of one image record. `image_key` names the
/// image when the record carries no `name`.
pub fn build_example(
    image_dir: &Path,
    image_key: &str,
    record: &ImageRecord,
) -> Result<Example> {
    let name = record.name.as_deref().unwrap_or(image_key);
    let (width, height) = match (record.width, record.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::InvalidParameter(format!(
                "image record {} has no valid width/height",
                name
            )))
        }
    };

    let image_path = image_dir.join(name);
    let encoded = fs::read(&image_path).map_err(|e| Error::io(&image_path, e))?;
    let format = name.rsplit('.').next().unwrap_or_default().to_string();

    let (mut xmins, mut xmaxs, mut ymins, mut ymaxs) = (vec![], vec![], vec![], vec![]);
    let mut classes_text = Vec::new();
    let mut classes = Vec::new();

    for object in &record.annotations {
        let missing = object.missing_geometry_fields();
        if !missing.is_empty() {
            warn!("{}: skipping object missing {:?}", name, missing);
            continue;
        }
        let (Some(x), Some(y), Some((w, h)), Some(label)) =
            (object.x, object.y, object.size(), object.label.as_deref())
        else {
            continue;
        };
        let Some(class) = class_id(label) else {
            warn!("{}: skipping object with unknown class {:?}", name, label);
            continue;
        };

        xmins.push((x / width as f64) as f32);
        xmaxs.push(((x + w) / width as f64) as f32);
        ymins.push((y / height as f64) as f32);
        ymaxs.push(((y + h) / height as f64) as f32);
        classes_text.push(label.to_lowercase().into_bytes());
        classes.push(class);
    }

    let mut feature = BTreeMap::new();
    feature.insert("image/height".into(), Feature::int64s(vec![height as i64]));
    feature.insert("image/width".into(), Feature::int64s(vec![width as i64]));
    feature.insert("image/filename".into(), Feature::bytes(vec![name.as_bytes().to_vec()]));
    feature.insert("image/source_id".into(), Feature::bytes(vec![name.as_bytes().to_vec()]));
    feature.insert("image/encoded".into(), Feature::bytes(vec![encoded]));
    feature.insert("image/format".into(), Feature::bytes(vec![format.into_bytes()]));
    feature.insert("image/object/bbox/xmin".into(), Feature::floats(xmins));
    feature.insert("image/object/bbox/xmax".into(), Feature::floats(xmaxs));
    feature.insert("image/object/bbox/ymin".into(), Feature::floats(ymins));
    feature.insert("image/object/bbox/ymax".into(), Feature::floats(ymaxs));
    feature.insert("image/object/class/text".into(), Feature::bytes(classes_text));
    feature.insert("image/object/class/label".into(), Feature::int64s(classes));

    Ok(Example {
        features: Some(Features { feature }),
    })
}

/// Load every JSON benchmark in `label_dir` whose name contains `json_label`,
/// in file name order.
pub fn load_benchmarks(
    label_dir: &Path,
    json_label: &str,
) -> Result<Vec<(PathBuf, ImageAnnotations)>> {
    let paths = matching_json_files(label_dir, json_label)?;

    paths
        .into_iter()
        .map(|path| {
            let images = read_and_parse_json(&path)?;
            Ok((path, images))
        })
        .collect()
}

/// Encode every image of the benchmarks and write the records. Returns the
/// number of examples and the written files.
pub fn write_records(
    benchmarks: &[(PathBuf, ImageAnnotations)],
    image_dir: &Path,
    output_base: &Path,
    num_shards: usize,
) -> Result<(usize, Vec<PathBuf>)> {
    let images: Vec<(&String, &ImageRecord)> = benchmarks
        .iter()
        .flat_map(|(_, images)| images.iter())
        .collect();

    let pb = create_progress_bar(images.len() as u64, "Encode");
    let encoded = images
        .par_iter()
        .map(|(key, record)| {
            let example = build_example(image_dir, key, record)?;
            pb.inc(1);
            Ok(example.encode_to_vec())
        })
        .collect::<Result<Vec<Vec<u8>>>>()?;
    pb.finish_and_clear();
    info!("Created {} example(s)", encoded.len());

    let mut writer = ShardedRecordWriter::create(output_base, num_shards)?;
    for (index, data) in encoded.iter().enumerate() {
        writer.write(index, data)?;
    }
    let paths = writer.finish()?;
    Ok((encoded.len(), paths))
}
