//! Sequential conversion of every matching file in a directory.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::category::CategoryTable;
use crate::coco::CocoIndex;
use crate::convert::{coco_to_labelme, labelme_to_coco, Skip};
use crate::error::ConvertError;
use crate::labelme::LabelmeRecord;
use crate::types::{Info, DEFAULT_CONTRIBUTOR, DEFAULT_DESCRIPTION};

/// File name suffix marking a converted COCO file.
pub const COCO_SUFFIX: &str = "_new.json";
const JSON_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LabelmeToCoco,
    CocoToLabelme,
}

impl Direction {
    pub fn default_pattern(self) -> &'static str {
        match self {
            Direction::LabelmeToCoco => "*.json",
            Direction::CocoToLabelme => "*_new.json",
        }
    }

    /// Output file name for `input`: `x.json` <-> `x_new.json`.
    pub fn output_name(self, input: &Path) -> String {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = match self {
            Direction::LabelmeToCoco => name.strip_suffix(JSON_SUFFIX),
            Direction::CocoToLabelme => name
                .strip_suffix(COCO_SUFFIX)
                .or_else(|| name.strip_suffix(JSON_SUFFIX)),
        }
        .unwrap_or(name.as_str());
        match self {
            Direction::LabelmeToCoco => format!("{}{}", base, COCO_SUFFIX),
            Direction::CocoToLabelme => format!("{}{}", base, JSON_SUFFIX),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LabelmeToCoco => write!(f, "labelme -> coco"),
            Direction::CocoToLabelme => write!(f, "coco -> labelme"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Glob pattern relative to the source directory; `None` uses the
    /// direction's default.
    pub pattern: Option<String>,
    pub pretty: bool,
    pub description: String,
    pub contributor: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            pattern: None,
            pretty: false,
            description: DEFAULT_DESCRIPTION.into(),
            contributor: DEFAULT_CONTRIBUTOR.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    /// Files left out as a whole (empty records, or shapes without an image).
    pub skipped_files: usize,
    /// Files that could not be read, parsed or written.
    pub failed_files: usize,
    /// Shapes or annotations left out of converted files.
    pub skipped_shapes: usize,
}

/// Files in `dir` matching `pattern`, sorted by file name.
pub fn enumerate(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConvertError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let mut paths: Vec<PathBuf> = glob::glob(&full)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("cannot read {}: {}", err.path().display(), err.error());
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn is_coco_output(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(COCO_SUFFIX))
        .unwrap_or(false)
}

/// Convert every matching file in `src` and write the results into `dst`.
///
/// Per-file problems are logged and counted; only failing to prepare `dst`
/// or an invalid pattern aborts the run.
pub fn convert_dir(
    direction: Direction,
    src: &Path,
    dst: &Path,
    table: &CategoryTable,
    options: &BatchOptions,
) -> Result<BatchSummary, ConvertError> {
    std::fs::create_dir_all(dst).map_err(|e| ConvertError::io(dst, e))?;

    let pattern = options
        .pattern
        .as_deref()
        .unwrap_or_else(|| direction.default_pattern());
    let mut inputs = enumerate(src, pattern)?;
    if direction == Direction::LabelmeToCoco {
        inputs.retain(|path| !is_coco_output(path));
    }
    info!(
        "{}: {} file(s) in {} matching '{}'",
        direction,
        inputs.len(),
        src.display(),
        pattern
    );

    let date = chrono::Local::now().date_naive();
    let mut summary = BatchSummary::default();

    for input in &inputs {
        let output = dst.join(direction.output_name(input));
        if output == *input {
            warn!(
                "{}: output would overwrite the input, skipping",
                input.display()
            );
            summary.skipped_files += 1;
            continue;
        }

        match convert_file(direction, input, &output, table, options, date) {
            Ok(skipped) => {
                for skip in &skipped {
                    warn!("{}: skipped {}", input.display(), skip);
                }
                summary.skipped_shapes += skipped.len();
                summary.converted += 1;
            }
            Err(err @ (ConvertError::EmptyRecord | ConvertError::MissingImageField { .. })) => {
                warn!("{}: {}, skipping file", input.display(), err);
                summary.skipped_files += 1;
            }
            Err(err) => {
                error!("{}: {}", input.display(), err);
                summary.failed_files += 1;
            }
        }
    }

    info!(
        "{}: {} converted, {} skipped, {} failed, {} shape(s) left out",
        direction,
        summary.converted,
        summary.skipped_files,
        summary.failed_files,
        summary.skipped_shapes
    );
    Ok(summary)
}

/// Convert a single file, returning the shapes or annotations left out.
pub fn convert_file(
    direction: Direction,
    input: &Path,
    output: &Path,
    table: &CategoryTable,
    options: &BatchOptions,
    date: NaiveDate,
) -> Result<Vec<Skip>, ConvertError> {
    let skipped = match direction {
        Direction::LabelmeToCoco => {
            let record: LabelmeRecord = read_json(input)?;
            let info = Info::stamped(&options.description, &options.contributor, date);
            let conv = labelme_to_coco(&record, table, info)?;
            write_json(output, &conv.record, options.pretty)?;
            conv.skipped
        }
        Direction::CocoToLabelme => {
            let coco = CocoIndex::load(input)?;
            let conv = coco_to_labelme(&coco, table)?;
            write_json(output, &conv.record, options.pretty)?;
            conv.skipped
        }
    };
    info!("{} -> {}", input.display(), output.display());
    Ok(skipped)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConvertError> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ConvertError::json(path, e))
}

/// Serialize `value` into `path`. The target only appears once the whole
/// document is written; a failed write leaves no file behind.
fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), ConvertError> {
    // same directory as the target so `persist` is a plain rename
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ConvertError::io(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let written = if pretty {
            serde_json::to_writer_pretty(&mut writer, value)
        } else {
            serde_json::to_writer(&mut writer, value)
        };
        written.map_err(|e| ConvertError::json(path, e))?;
        writer.flush().map_err(|e| ConvertError::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| ConvertError::io(path, e.error))?;
    Ok(())
}
