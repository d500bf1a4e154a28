//! labelme per-image annotation records.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::Compact;

/// Schema version written into converted labelme files.
pub const LABELME_VERSION: &str = "3.16.2";
pub const LINE_COLOR: [u8; 4] = [0, 255, 0, 128];
pub const FILL_COLOR: [u8; 4] = [255, 0, 0, 128];
pub const POLYGON_SHAPE: &str = "polygon";
pub const ISCROWD_FLAG: &str = "iscrowd";

pub type Flags = BTreeMap<String, Value>;

/// One labelme file: an image reference and its shapes.
///
/// Every field is optional on input so an empty object still parses; the
/// converter decides whether the record is usable.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelmeRecord {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: Flags,
    #[serde(default)]
    pub line_color: Option<[u8; 4]>,
    #[serde(default)]
    pub fill_color: Option<[u8; 4]>,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub image_width: u32,
    #[serde(default)]
    pub image_height: u32,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub shapes: Vec<Shape>,
}

impl LabelmeRecord {
    /// An empty record carrying the fixed version tag and placeholder colors.
    pub fn new(image_path: impl Into<String>, image_width: u32, image_height: u32) -> Self {
        LabelmeRecord {
            version: Some(LABELME_VERSION.into()),
            flags: Flags::new(),
            line_color: Some(LINE_COLOR),
            fill_color: Some(FILL_COLOR),
            image_path: image_path.into(),
            image_width,
            image_height,
            image_data: None,
            shapes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Shape {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub line_color: Option<[u8; 4]>,
    #[serde(default)]
    pub fill_color: Option<[u8; 4]>,
    #[serde(default, serialize_with = "serialize_compact_points")]
    pub points: Vec<[f64; 2]>,
    #[serde(default = "default_shape_type")]
    pub shape_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: Flags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
}

impl Shape {
    pub fn polygon(label: impl Into<String>, points: Vec<[f64; 2]>, is_crowd: bool) -> Self {
        let mut flags = Flags::new();
        flags.insert(ISCROWD_FLAG.into(), Value::Bool(is_crowd));
        Shape {
            label: label.into(),
            line_color: None,
            fill_color: None,
            points,
            shape_type: POLYGON_SHAPE.into(),
            flags,
            group_id: None,
        }
    }

    /// True when the shape's `iscrowd` flag is `true` or numerically 1
    /// (`1`, `1.0`). Anything else, strings included, is not crowd.
    pub fn is_crowd(&self) -> bool {
        match self.flags.get(ISCROWD_FLAG) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            _ => false,
        }
    }
}

fn default_shape_type() -> String {
    POLYGON_SHAPE.into()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[allow(clippy::ptr_arg)]
fn serialize_compact_points<S: Serializer>(
    points: &Vec<[f64; 2]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(points.iter().map(|[x, y]| [Compact(*x), Compact(*y)]))
}
