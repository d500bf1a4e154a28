//! Conversion between labelme polygon annotations and single-image COCO
//! datasets.

pub mod batch;
pub mod category;
pub mod coco;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod labelme;
pub mod types;

pub use batch::{convert_dir, BatchOptions, BatchSummary, Direction};
pub use category::{CategoryEntry, CategoryTable, LabelSet};
pub use coco::CocoIndex;
pub use convert::{coco_to_labelme, labelme_to_coco, Conversion, Skip, SkipSource};
pub use error::ConvertError;
pub use labelme::{LabelmeRecord, Shape};
pub use types::{
    Annotation, Category, CategoryRef, Dataset, Image, Info, License, Segmentation,
};
