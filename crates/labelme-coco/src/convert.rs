//! Record mapping between labelme and COCO.
//!
//! Both directions are lenient: a shape or annotation that cannot be mapped
//! is left out and reported in [`Conversion::skipped`], and the rest of the
//! record is still converted. Only a record with nothing to convert fails as
//! a whole, with [`ConvertError::EmptyRecord`].

use std::collections::HashSet;
use std::fmt;

use log::debug;

use crate::category::CategoryTable;
use crate::coco::{CocoIndex, SUBJECT_IMAGE_ID};
use crate::error::ConvertError;
use crate::geometry::{to_flat_coordinates, to_point_pairs, validate_polygon};
use crate::labelme::{LabelmeRecord, Shape};
use crate::types::{
    Annotation, Category, CategoryRef, Dataset, Image, Info, License, Segmentation,
};

/// A converted record plus everything that was left out of it.
#[derive(Debug)]
pub struct Conversion<T> {
    pub record: T,
    pub skipped: Vec<Skip>,
}

/// Where a skipped item came from in the source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipSource {
    /// 0-based position in the labelme `shapes` array.
    Shape(usize),
    /// A COCO annotation, by its `id` and raw `category_id`.
    Annotation { id: u64, category_id: CategoryRef },
}

#[derive(Debug)]
pub struct Skip {
    pub source: SkipSource,
    pub error: ConvertError,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            SkipSource::Shape(i) => write!(f, "shape #{}: {}", i, self.error),
            SkipSource::Annotation { id, category_id } => write!(
                f,
                "annotation {} (category {}): {}",
                id, category_id, self.error
            ),
        }
    }
}

/// Convert one labelme record into a single-image COCO dataset.
///
/// The image gets id 0. Categories are listed once each, in the order their
/// first annotation appears. Area and bbox are written as zeros. A record
/// with shapes must name its image and give a non-zero size.
pub fn labelme_to_coco(
    record: &LabelmeRecord,
    table: &CategoryTable,
    info: Info,
) -> Result<Conversion<Dataset>, ConvertError> {
    if record.shapes.is_empty() {
        return Err(ConvertError::EmptyRecord);
    }
    if record.image_path.trim().is_empty() {
        return Err(ConvertError::MissingImageField { field: "imagePath" });
    }
    if record.image_width == 0 {
        return Err(ConvertError::MissingImageField { field: "imageWidth" });
    }
    if record.image_height == 0 {
        return Err(ConvertError::MissingImageField { field: "imageHeight" });
    }

    let mut dataset = Dataset {
        info: Some(info),
        licenses: vec![License::placeholder()],
        images: vec![Image {
            license: Some(1),
            file_name: record.image_path.clone(),
            coco_url: Some(" ".into()),
            height: record.image_height,
            width: record.image_width,
            date_captured: Some(" ".into()),
            flickr_url: Some(" ".into()),
            id: SUBJECT_IMAGE_ID,
        }],
        annotations: Vec::new(),
        categories: Vec::new(),
    };
    let mut seen_codes = HashSet::new();
    let mut skipped = Vec::new();

    for (i, shape) in record.shapes.iter().enumerate() {
        let id = dataset.annotations.len() as u64;
        match shape_to_annotation(shape, table, id) {
            Ok((code, ann)) => {
                if seen_codes.insert(code) {
                    dataset.categories.push(Category {
                        supercategory: None,
                        id: code.into(),
                        name: shape.label.clone(),
                    });
                }
                dataset.annotations.push(ann);
            }
            Err(error) => skipped.push(Skip {
                source: SkipSource::Shape(i),
                error,
            }),
        }
    }

    Ok(Conversion {
        record: dataset,
        skipped,
    })
}

fn shape_to_annotation(
    shape: &Shape,
    table: &CategoryTable,
    id: u64,
) -> Result<(u64, Annotation), ConvertError> {
    let category_id = table.code_for_label(&shape.label)?;
    validate_polygon(&shape.points)?;

    let ring = to_flat_coordinates(&shape.points)
        .into_iter()
        .map(|v| v as f64)
        .collect();
    let iscrowd = shape.is_crowd() || table.forces_crowd(category_id);

    let ann = Annotation {
        id,
        image_id: SUBJECT_IMAGE_ID,
        category_id: category_id.into(),
        segmentation: Some(Segmentation::Polygon(vec![ring])),
        area: Some(0.0),
        bbox: Some([0.0; 4]),
        iscrowd,
    };
    Ok((category_id, ann))
}

/// Convert the subject image of a COCO dataset into a labelme record.
///
/// Only annotations of the subject image (see [`CocoIndex::subject_image`])
/// are considered, and only their first polygon ring.
pub fn coco_to_labelme(
    coco: &CocoIndex,
    table: &CategoryTable,
) -> Result<Conversion<LabelmeRecord>, ConvertError> {
    let image = coco.subject_image().ok_or(ConvertError::EmptyRecord)?;
    let mut record = LabelmeRecord::new(image.file_name.clone(), image.width, image.height);
    let mut skipped = Vec::new();

    for ann in coco.anns_for_img(image.id) {
        match annotation_to_shape(ann, coco, table) {
            Ok(shape) => record.shapes.push(shape),
            Err(error) => skipped.push(Skip {
                source: SkipSource::Annotation {
                    id: ann.id,
                    category_id: ann.category_id.clone(),
                },
                error,
            }),
        }
    }

    Ok(Conversion { record, skipped })
}

fn annotation_to_shape(
    ann: &Annotation,
    coco: &CocoIndex,
    table: &CategoryTable,
) -> Result<Shape, ConvertError> {
    let code = ann
        .category_id
        .code()
        .ok_or_else(|| ConvertError::InvalidCode {
            raw: ann.category_id.to_string(),
        })?;
    let label = table.label_for_code(code)?;
    if let Some(cat) = coco.get_cat(code) {
        if cat.name != label {
            debug!(
                "category {} is '{}' in the file but '{}' in the table",
                code, cat.name, label
            );
        }
    }

    let ring = ann.primary_ring().ok_or(ConvertError::MissingPolygon)?;
    let points = to_point_pairs(ring)?;
    validate_polygon(&points)?;

    let is_crowd = ann.iscrowd || table.forces_crowd(code);
    Ok(Shape::polygon(label, points, is_crowd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::IGNORE_CODE;
    use chrono::NaiveDate;

    fn info() -> Info {
        Info::stamped(
            "test",
            "tester",
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        )
    }

    fn square(label: &str) -> Shape {
        Shape::polygon(
            label,
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            false,
        )
    }

    fn record(shapes: Vec<Shape>) -> LabelmeRecord {
        let mut rec = LabelmeRecord::new("img.jpg", 100, 100);
        rec.shapes = shapes;
        rec
    }

    fn ann(id: u64, category_id: u64, ring: Vec<f64>, iscrowd: bool) -> Annotation {
        Annotation {
            id,
            image_id: 0,
            category_id: category_id.into(),
            segmentation: Some(Segmentation::Polygon(vec![ring])),
            area: Some(0.0),
            bbox: Some([0.0; 4]),
            iscrowd,
        }
    }

    fn coco(annotations: Vec<Annotation>) -> CocoIndex {
        CocoIndex::from_dataset(Dataset {
            info: None,
            licenses: vec![],
            images: vec![Image {
                license: None,
                file_name: "img.jpg".into(),
                coco_url: None,
                height: 50,
                width: 60,
                date_captured: None,
                flickr_url: None,
                id: 0,
            }],
            annotations,
            categories: vec![],
        })
    }

    #[test]
    fn test_labelme_to_coco_square() {
        let table = CategoryTable::legacy();
        let conv = labelme_to_coco(&record(vec![square("car")]), &table, info()).unwrap();
        let ds = conv.record;
        assert!(conv.skipped.is_empty());
        assert_eq!(ds.images.len(), 1);
        assert_eq!(ds.images[0].id, 0);
        assert_eq!(ds.images[0].width, 100);
        assert_eq!(ds.categories.len(), 1);
        assert_eq!(ds.categories[0].name, "car");
        assert_eq!(ds.categories[0].id, CategoryRef::Code(200));
        let a = &ds.annotations[0];
        assert_eq!(a.category_id, CategoryRef::Code(200));
        assert_eq!(a.primary_ring().unwrap(), &[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
        assert!(!a.iscrowd);
        assert_eq!(a.area, Some(0.0));
        assert_eq!(a.bbox, Some([0.0; 4]));
    }

    #[test]
    fn test_labelme_to_coco_dedups_categories() {
        let table = CategoryTable::legacy();
        let shapes = (0..5).map(|_| square("car")).collect();
        let ds = labelme_to_coco(&record(shapes), &table, info())
            .unwrap()
            .record;
        assert_eq!(ds.categories.len(), 1);
        assert_eq!(ds.annotations.len(), 5);
        assert!(ds.annotations.iter().all(|a| a.category_id.code() == Some(200)));
        let ids: Vec<u64> = ds.annotations.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_labelme_to_coco_category_order_and_skips() {
        let table = CategoryTable::legacy();
        let mut two_points = square("bus");
        two_points.points.truncate(2);
        let shapes = vec![
            square("person"),
            square("dragon"),
            two_points,
            square("car"),
            square("person"),
        ];
        let conv = labelme_to_coco(&record(shapes), &table, info()).unwrap();
        let names: Vec<&str> = conv.record.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["person", "car"]);
        let ids: Vec<u64> = conv.record.annotations.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        assert_eq!(conv.skipped.len(), 2);
        assert_eq!(conv.skipped[0].source, SkipSource::Shape(1));
        assert!(matches!(
            conv.skipped[0].error,
            ConvertError::UnknownLabel { .. }
        ));
        assert_eq!(conv.skipped[1].source, SkipSource::Shape(2));
        assert!(matches!(
            conv.skipped[1].error,
            ConvertError::DegeneratePolygon { points: 2 }
        ));
    }

    #[test]
    fn test_labelme_to_coco_empty() {
        let table = CategoryTable::legacy();
        let res = labelme_to_coco(&LabelmeRecord::default(), &table, info());
        assert!(matches!(res, Err(ConvertError::EmptyRecord)));
    }

    #[test]
    fn test_labelme_to_coco_crowd() {
        let mut crowd = square("car");
        crowd.flags.insert("iscrowd".into(), true.into());
        let table = CategoryTable::legacy();
        let ds = labelme_to_coco(&record(vec![crowd]), &table, info())
            .unwrap()
            .record;
        assert!(ds.annotations[0].iscrowd);
    }

    #[test]
    fn test_ignore_is_crowd_in_extended_only() {
        let extended = CategoryTable::extended();
        let ds = labelme_to_coco(&record(vec![square("ignore")]), &extended, info())
            .unwrap()
            .record;
        assert_eq!(ds.annotations[0].category_id.code(), Some(IGNORE_CODE));
        assert!(ds.annotations[0].iscrowd);

        let c = coco(vec![ann(0, IGNORE_CODE, vec![0.0, 0.0, 5.0, 0.0, 5.0, 5.0], false)]);
        let rec = coco_to_labelme(&c, &extended).unwrap().record;
        assert!(rec.shapes[0].is_crowd());

        // the legacy set has no "ignore" entry, so code 0 is simply unknown
        let legacy = CategoryTable::legacy();
        let conv = coco_to_labelme(&c, &legacy).unwrap();
        assert!(conv.record.shapes.is_empty());
        assert!(matches!(
            conv.skipped[0].error,
            ConvertError::UnknownCode { code: 0 }
        ));
    }

    #[test]
    fn test_coco_to_labelme_basic() {
        let table = CategoryTable::legacy();
        let c = coco(vec![
            ann(0, 200, vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0], false),
            ann(1, 100, vec![1.0, 1.0, 2.0, 2.0, 3.0, 1.0, 2.0, 0.0], true),
        ]);
        let conv = coco_to_labelme(&c, &table).unwrap();
        assert!(conv.skipped.is_empty());
        let rec = conv.record;
        assert_eq!(rec.version.as_deref(), Some("3.16.2"));
        assert!(rec.flags.is_empty());
        assert_eq!(rec.image_path, "img.jpg");
        assert_eq!(rec.image_width, 60);
        assert_eq!(rec.image_height, 50);
        assert_eq!(rec.shapes.len(), 2);
        assert_eq!(rec.shapes[0].label, "car");
        assert_eq!(rec.shapes[0].points, vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]);
        assert_eq!(rec.shapes[0].shape_type, "polygon");
        assert!(!rec.shapes[0].is_crowd());
        assert_eq!(rec.shapes[1].label, "person");
        assert!(rec.shapes[1].is_crowd());
    }

    #[test]
    fn test_coco_to_labelme_skips_bad_geometry() {
        let table = CategoryTable::legacy();
        let mut rle = ann(3, 200, vec![], false);
        rle.segmentation = Some(Segmentation::CompressedRle {
            size: [4, 4],
            counts: "x".into(),
        });
        let c = coco(vec![
            ann(0, 200, vec![0.0, 0.0, 1.0, 1.0, 2.0], false),
            ann(1, 200, vec![0.0, 0.0, 1.0, 1.0], false),
            ann(2, 300, vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0], false),
            rle,
        ]);
        let conv = coco_to_labelme(&c, &table).unwrap();
        assert_eq!(conv.record.shapes.len(), 1);
        assert_eq!(conv.record.shapes[0].label, "bus");

        assert_eq!(conv.skipped.len(), 3);
        assert!(matches!(conv.skipped[0].error, ConvertError::OddLength { len: 5 }));
        assert!(matches!(
            conv.skipped[1].error,
            ConvertError::DegeneratePolygon { points: 2 }
        ));
        assert!(matches!(conv.skipped[2].error, ConvertError::MissingPolygon));
        assert_eq!(
            conv.skipped[0].source,
            SkipSource::Annotation {
                id: 0,
                category_id: CategoryRef::Code(200)
            }
        );
    }

    #[test]
    fn test_coco_to_labelme_no_images() {
        let table = CategoryTable::legacy();
        let c = CocoIndex::from_dataset(Dataset {
            info: None,
            licenses: vec![],
            images: vec![],
            annotations: vec![],
            categories: vec![],
        });
        assert!(matches!(
            coco_to_labelme(&c, &table),
            Err(ConvertError::EmptyRecord)
        ));
    }

    #[test]
    fn test_skip_display() {
        let skip = Skip {
            source: SkipSource::Annotation {
                id: 4,
                category_id: CategoryRef::Code(250),
            },
            error: ConvertError::OddLength { len: 7 },
        };
        assert_eq!(
            skip.to_string(),
            "annotation 4 (category 250): segmentation has odd length 7"
        );
    }

    #[test]
    fn test_labelme_to_coco_requires_image_fields() {
        let table = CategoryTable::legacy();
        let mut rec = LabelmeRecord::default();
        rec.shapes.push(square("car"));
        assert!(matches!(
            labelme_to_coco(&rec, &table, info()),
            Err(ConvertError::MissingImageField { field: "imagePath" })
        ));

        rec.image_path = "img.jpg".into();
        rec.image_height = 100;
        assert!(matches!(
            labelme_to_coco(&rec, &table, info()),
            Err(ConvertError::MissingImageField { field: "imageWidth" })
        ));

        rec.image_width = 100;
        rec.image_height = 0;
        assert!(matches!(
            labelme_to_coco(&rec, &table, info()),
            Err(ConvertError::MissingImageField { field: "imageHeight" })
        ));
    }

    #[test]
    fn test_coco_to_labelme_skips_invalid_category_id() {
        let table = CategoryTable::legacy();
        let mut bad = ann(1, 0, vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0], false);
        bad.category_id = CategoryRef::Invalid("-1".into());
        let c = coco(vec![
            ann(0, 200, vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0], false),
            bad,
        ]);
        let conv = coco_to_labelme(&c, &table).unwrap();
        assert_eq!(conv.record.shapes.len(), 1);
        assert_eq!(conv.record.shapes[0].label, "car");
        assert_eq!(conv.skipped.len(), 1);
        assert!(matches!(
            conv.skipped[0].error,
            ConvertError::InvalidCode { ref raw } if raw == "-1"
        ));
        assert_eq!(
            conv.skipped[0].to_string(),
            "annotation 1 (category -1): invalid category id '-1'"
        );
    }
}
