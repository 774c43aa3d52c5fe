use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

// A ground-truth box reduced to its size, in pixels after rescaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f64,
    pub height: f64,
}

impl BoxSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Squared diagonal length, used both as the sort key and for the
    /// threshold comparison when grouping by scale.
    pub fn diagonal_sq(&self) -> f64 {
        self.width * self.width + self.height * self.height
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.width, self.height]
    }
}

impl From<[f64; 2]> for BoxSize {
    fn from([width, height]: [f64; 2]) -> Self {
        Self { width, height }
    }
}

// One annotated object inside an image record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub label: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_integer"
    )]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub category: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "whole_number",
        deserialize_with = "lenient_number"
    )]
    pub x: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "whole_number",
        deserialize_with = "lenient_number"
    )]
    pub y: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "whole_number",
        deserialize_with = "lenient_number"
    )]
    pub width: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "whole_number",
        deserialize_with = "lenient_number"
    )]
    pub height: Option<f64>,
}

impl ObjectEntry {
    /// Names of the size fields that are absent or zero.
    pub fn missing_size_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.width.is_some_and(|w| w != 0.0) {
            missing.push("width");
        }
        if !self.height.is_some_and(|h| h != 0.0) {
            missing.push("height");
        }
        missing
    }

    /// Names of the fields needed to place the object in an image.
    pub fn missing_geometry_fields(&self) -> Vec<&'static str> {
        let mut missing = self.missing_size_fields();
        if self.x.is_none() {
            missing.push("x");
        }
        if self.y.is_none() {
            missing.push("y");
        }
        if self.label.is_none() {
            missing.push("label");
        }
        missing
    }

    /// The (width, height) pair when both are present and non-zero.
    pub fn size(&self) -> Option<(f64, f64)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w != 0.0 && h != 0.0 => Some((w, h)),
            _ => None,
        }
    }
}

// The annotation record of one image. Some benchmarks store `{}` for images
// without objects, so every field is optional. A field of the wrong type is
// read as absent, and an annotation that is not an object becomes an empty
// entry, so a single odd entry is skipped downstream instead of failing the
// whole file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_dimension"
    )]
    pub width: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_dimension"
    )]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub annotations: Vec<ObjectEntry>,
}

impl ImageRecord {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.annotations.is_empty()
    }
}

// Pixel values are written as integers when they have no fractional part
fn whole_number<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => serializer.serialize_some(&(*v as i64)),
        Some(v) => serializer.serialize_some(v),
        None => serializer.serialize_none(),
    }
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_f64())
}

// Whole floats such as `640.0` are accepted
fn whole_value(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .filter(|v| v.fract() == 0.0 && v.abs() < 9.0e15)
}

fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64().or_else(|| whole_value(&value).map(|v| v as i64)))
}

fn lenient_dimension<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(whole_value(&value)
        .filter(|v| (0.0..=u32::MAX as f64).contains(v))
        .map(|v| v as u32))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_entries<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ObjectEntry>, D::Error> {
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| ObjectEntry::deserialize(item).unwrap_or_default())
        .collect())
}

/// Image name -> annotation record, as stored in one JSON benchmark file.
pub type ImageAnnotations = BTreeMap<String, ImageRecord>;

/// Dataset folder -> merged image annotations of that folder.
pub type AnnotationSet = BTreeMap<String, ImageAnnotations>;

// Struct to hold processing statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub images_seen: usize,
    pub empty_images: usize,
    pub entries_kept: usize,
    pub entries_skipped: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Images seen: {}", self.images_seen);
        log::info!("Images without annotations: {}", self.empty_images);
        log::info!("Annotation entries kept: {}", self.entries_kept);

        if self.entries_skipped > 0 {
            log::warn!(
                "Skipped annotation entries (missing or zero size fields): {}",
                self.entries_skipped
            );
        }
    }
}
