use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while converting between labelme and COCO records.
///
/// The shape-level variants (`UnknownLabel`, `UnknownCode`, `InvalidCode`,
/// `OddLength`, `DegeneratePolygon`, `MissingPolygon`) never abort a file:
/// the mappers collect them as [`crate::convert::Skip`] entries.
/// `EmptyRecord` and `MissingImageField` skip a whole file. I/O and parse
/// errors abort the current file only.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unknown label '{label}'")]
    UnknownLabel { label: String },

    #[error("unknown category id {code}")]
    UnknownCode { code: u64 },

    #[error("invalid category id '{raw}'")]
    InvalidCode { raw: String },

    #[error("segmentation has odd length {len}")]
    OddLength { len: usize },

    #[error("degenerate polygon with {points} point(s)")]
    DegeneratePolygon { points: usize },

    #[error("annotation has no polygon segmentation")]
    MissingPolygon,

    #[error("record is empty or has no shapes")]
    EmptyRecord,

    #[error("record has shapes but no {field}")]
    MissingImageField { field: &'static str },

    #[error("duplicate label '{label}' in category table")]
    DuplicateLabel { label: String },

    #[error("duplicate category id {code} in category table")]
    DuplicateCode { code: u64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ConvertError::Json {
            path: path.into(),
            source,
        }
    }
}
