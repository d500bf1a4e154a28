//! COCO dataset loading and lookup.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConvertError;
use crate::types::{Annotation, Category, Dataset, Image};

/// Image id the converters treat as the subject of a single-image file.
pub const SUBJECT_IMAGE_ID: u64 = 0;

/// A loaded COCO dataset with lookup indices.
pub struct CocoIndex {
    pub dataset: Dataset,
    /// img_id -> index into dataset.images
    imgs: HashMap<u64, usize>,
    /// cat_id -> index into dataset.categories
    cats: HashMap<u64, usize>,
    /// img_id -> [index into dataset.annotations, ...] in file order
    img_to_anns: HashMap<u64, Vec<usize>>,
}

impl CocoIndex {
    /// Load a COCO annotation JSON file and build indices.
    pub fn load(annotation_file: &Path) -> Result<Self, ConvertError> {
        let file =
            std::fs::File::open(annotation_file).map_err(|e| ConvertError::io(annotation_file, e))?;
        let reader = std::io::BufReader::new(file);
        let dataset: Dataset =
            serde_json::from_reader(reader).map_err(|e| ConvertError::json(annotation_file, e))?;
        Ok(Self::from_dataset(dataset))
    }

    /// Build an index over an already-loaded Dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut index = CocoIndex {
            dataset,
            imgs: HashMap::new(),
            cats: HashMap::new(),
            img_to_anns: HashMap::new(),
        };
        index.create_index();
        index
    }

    fn create_index(&mut self) {
        // first entry wins on duplicate ids
        for (i, img) in self.dataset.images.iter().enumerate() {
            self.imgs.entry(img.id).or_insert(i);
        }
        for (i, cat) in self.dataset.categories.iter().enumerate() {
            if let Some(code) = cat.id.code() {
                self.cats.entry(code).or_insert(i);
            }
        }
        for (i, ann) in self.dataset.annotations.iter().enumerate() {
            self.img_to_anns.entry(ann.image_id).or_default().push(i);
        }
    }

    /// Get a single image by ID.
    pub fn get_img(&self, id: u64) -> Option<&Image> {
        self.imgs.get(&id).map(|&i| &self.dataset.images[i])
    }

    /// Get a single category by ID.
    pub fn get_cat(&self, id: u64) -> Option<&Category> {
        self.cats.get(&id).map(|&i| &self.dataset.categories[i])
    }

    /// The image a single-image file describes: id 0, else the first entry.
    pub fn subject_image(&self) -> Option<&Image> {
        self.get_img(SUBJECT_IMAGE_ID)
            .or_else(|| self.dataset.images.first())
    }

    /// Annotations referencing `img_id`, in file order.
    pub fn anns_for_img(&self, img_id: u64) -> impl Iterator<Item = &Annotation> + '_ {
        self.img_to_anns
            .get(&img_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&i| &self.dataset.annotations[i])
    }
}
