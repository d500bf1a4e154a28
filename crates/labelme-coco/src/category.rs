//! Label name <-> category code tables.
//!
//! Two built-in label sets exist and they are not compatible with each other:
//! a file must be converted back with the same table that produced it. The
//! table is chosen by the caller and passed into the converters.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::ConvertError;
use crate::types::deserialize_code;

/// The legacy 8-class set.
const LEGACY: &[(&str, u64)] = &[
    ("line", 3000),
    ("person", 100),
    ("car", 200),
    ("truck", 250),
    ("bus", 300),
    ("motocycle", 350),
    ("bicycle", 450),
    ("traffic light", 2000),
];

/// The 19-class extended set with lane-marking subtypes.
const EXTENDED: &[(&str, u64)] = &[
    ("ignore", 0),
    ("person", 100),
    ("car", 200),
    ("truck", 250),
    ("bus", 300),
    ("motocycle", 350),
    ("bicycle", 450),
    ("traffic light", 2000),
    ("traffic sign", 2100),
    ("lane solid white", 3001),
    ("lane dashed white", 3002),
    ("lane solid yellow", 3003),
    ("lane dashed yellow", 3004),
    ("lane double yellow", 3005),
    ("lane road edge", 3006),
    ("lane stop line", 3007),
    ("lane crosswalk", 3008),
    ("lane arrow", 3009),
    ("lane other", 3010),
];

/// Code of the extended set's "ignore" region, always emitted as crowd.
pub const IGNORE_CODE: u64 = 0;

/// Built-in label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSet {
    Legacy,
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    #[serde(deserialize_with = "deserialize_code")]
    pub id: u64,
}

/// Immutable, ordered label <-> code mapping.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    entries: Vec<CategoryEntry>,
    /// Code whose annotations are always crowd regions, if any.
    crowd_code: Option<u64>,
    by_label: HashMap<String, usize>,
    by_code: HashMap<u64, usize>,
}

/// On-disk form of a configuration-supplied table.
#[derive(Debug, Deserialize)]
struct TableFile {
    categories: Vec<CategoryEntry>,
    #[serde(default)]
    crowd_id: Option<u64>,
}

impl CategoryTable {
    /// Build a table, rejecting duplicate labels or codes.
    pub fn new(entries: Vec<CategoryEntry>, crowd_code: Option<u64>) -> Result<Self, ConvertError> {
        let table = Self::index(entries, crowd_code);
        if table.by_label.len() != table.entries.len() {
            let mut seen = HashSet::new();
            if let Some(dup) = table.entries.iter().find(|e| !seen.insert(e.name.as_str())) {
                return Err(ConvertError::DuplicateLabel {
                    label: dup.name.clone(),
                });
            }
        }
        if table.by_code.len() != table.entries.len() {
            let mut seen = HashSet::new();
            if let Some(dup) = table.entries.iter().find(|e| !seen.insert(e.id)) {
                return Err(ConvertError::DuplicateCode { code: dup.id });
            }
        }
        Ok(table)
    }

    fn index(entries: Vec<CategoryEntry>, crowd_code: Option<u64>) -> Self {
        let by_label = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let by_code = entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        CategoryTable {
            entries,
            crowd_code,
            by_label,
            by_code,
        }
    }

    pub fn legacy() -> Self {
        Self::builtin(LEGACY, None)
    }

    pub fn extended() -> Self {
        Self::builtin(EXTENDED, Some(IGNORE_CODE))
    }

    pub fn from_label_set(set: LabelSet) -> Self {
        match set {
            LabelSet::Legacy => Self::legacy(),
            LabelSet::Extended => Self::extended(),
        }
    }

    fn builtin(pairs: &[(&str, u64)], crowd_code: Option<u64>) -> Self {
        let entries = pairs
            .iter()
            .map(|&(name, id)| CategoryEntry {
                name: name.to_string(),
                id,
            })
            .collect();
        Self::index(entries, crowd_code)
    }

    /// Load a table from a JSON file of the form
    /// `{"categories": [{"id": 100, "name": "person"}, ...], "crowd_id": 0}`.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let file = std::fs::File::open(path).map_err(|e| ConvertError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        let table: TableFile =
            serde_json::from_reader(reader).map_err(|e| ConvertError::json(path, e))?;
        Self::new(table.categories, table.crowd_id)
    }

    pub fn code_for_label(&self, label: &str) -> Result<u64, ConvertError> {
        self.by_label
            .get(label)
            .map(|&i| self.entries[i].id)
            .ok_or_else(|| ConvertError::UnknownLabel {
                label: label.to_string(),
            })
    }

    pub fn label_for_code(&self, code: u64) -> Result<&str, ConvertError> {
        self.by_code
            .get(&code)
            .map(|&i| self.entries[i].name.as_str())
            .ok_or(ConvertError::UnknownCode { code })
    }

    /// Whether annotations of `code` are always written as crowd regions.
    pub fn forces_crowd(&self, code: u64) -> bool {
        self.crowd_code == Some(code)
    }

    pub fn crowd_code(&self) -> Option<u64> {
        self.crowd_code
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
