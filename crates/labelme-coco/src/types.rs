use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const DEFAULT_DESCRIPTION: &str = "BORUN";
pub const DEFAULT_CONTRIBUTOR: &str = "BORUN Consortium";

/// Top-level COCO dataset structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub info: Option<Info>,
    #[serde(default)]
    pub licenses: Vec<License>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Info {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub contributor: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

impl Info {
    /// Informational block written at the top of every converted file.
    pub fn stamped(description: &str, contributor: &str, date: NaiveDate) -> Self {
        Info {
            description: Some(description.to_string()),
            url: Some(" ".into()),
            version: Some("1.0".into()),
            year: u32::try_from(date.year()).ok(),
            contributor: Some(contributor.to_string()),
            date_created: Some(date.format("%Y/%m/%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct License {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

impl License {
    pub fn placeholder() -> Self {
        License {
            url: Some(" ".into()),
            id: 1,
            name: Some("License".into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    #[serde(default)]
    pub license: Option<u64>,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub coco_url: Option<String>,
    pub height: u32,
    pub width: u32,
    #[serde(default)]
    pub date_captured: Option<String>,
    #[serde(default)]
    pub flickr_url: Option<String>,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: CategoryRef,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default, serialize_with = "serialize_compact_opt")]
    pub area: Option<f64>,
    #[serde(default, serialize_with = "serialize_compact_bbox")]
    pub bbox: Option<[f64; 4]>,
    #[serde(
        default,
        deserialize_with = "deserialize_iscrowd",
        serialize_with = "serialize_iscrowd"
    )]
    pub iscrowd: bool,
}

impl Annotation {
    /// The first polygon ring, if the segmentation is in polygon form.
    pub fn primary_ring(&self) -> Option<&[f64]> {
        match &self.segmentation {
            Some(Segmentation::Polygon(rings)) => rings.first().map(|r| r.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Polygon format: list of polygons, each a flat list of [x, y, x, y, ...] coordinates.
    Polygon(#[serde(serialize_with = "serialize_compact_rings")] Vec<Vec<f64>>),
    /// Compressed RLE format (as stored in COCO JSON results).
    CompressedRle { size: [u32; 2], counts: String },
    /// Uncompressed RLE format.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    #[serde(default)]
    pub supercategory: Option<String>,
    pub id: CategoryRef,
    pub name: String,
}

/// A category id as written in a COCO file.
///
/// Ids that are not a non-negative integer (or a numeric string) are kept
/// verbatim in `Invalid` so one bad annotation does not reject the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CategoryRef {
    Code(u64),
    Invalid(String),
}

impl CategoryRef {
    pub fn code(&self) -> Option<u64> {
        match self {
            CategoryRef::Code(code) => Some(*code),
            CategoryRef::Invalid(_) => None,
        }
    }
}

impl From<u64> for CategoryRef {
    fn from(code: u64) -> Self {
        CategoryRef::Code(code)
    }
}

impl fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryRef::Code(code) => write!(f, "{}", code),
            CategoryRef::Invalid(raw) => write!(f, "{}", raw),
        }
    }
}

impl Serialize for CategoryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CategoryRef::Code(code) => serializer.serialize_u64(*code),
            CategoryRef::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for CategoryRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_u64() {
                Some(code) => CategoryRef::Code(code),
                None => CategoryRef::Invalid(n.to_string()),
            },
            Value::String(s) => match s.trim().parse() {
                Ok(code) => CategoryRef::Code(code),
                Err(_) => CategoryRef::Invalid(s),
            },
            other => CategoryRef::Invalid(other.to_string()),
        })
    }
}

/// Category ids appear both as integers and as numeric strings (`"3000"`).
pub(crate) fn deserialize_code<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(u64),
        Str(String),
    }
    match Code::deserialize(deserializer)? {
        Code::Int(i) => Ok(i),
        Code::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid category id '{}'", s))),
    }
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

fn serialize_iscrowd<S: Serializer>(iscrowd: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*iscrowd))
}

/// A coordinate that prints without a fraction when it has none.
pub(crate) struct Compact(pub f64);

impl Serialize for Compact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // 2^53: beyond this f64 cannot represent every integer
        if self.0.fract() == 0.0 && self.0.abs() < 9_007_199_254_740_992.0 {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

#[allow(clippy::ptr_arg)]
fn serialize_compact_rings<S: Serializer>(
    rings: &Vec<Vec<f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        rings
            .iter()
            .map(|ring| ring.iter().map(|&v| Compact(v)).collect::<Vec<_>>()),
    )
}

fn serialize_compact_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&Compact(*v)),
        None => serializer.serialize_none(),
    }
}

fn serialize_compact_bbox<S: Serializer>(
    bbox: &Option<[f64; 4]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bbox {
        Some(bb) => serializer.collect_seq(bb.iter().map(|&v| Compact(v))),
        None => serializer.serialize_none(),
    }
}
