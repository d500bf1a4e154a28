use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use labelme_coco::{convert_dir, BatchOptions, CategoryTable, Direction, LabelSet};
use log::info;

#[derive(Parser)]
#[command(name = "labelme-coco")]
#[command(about = "Convert annotation files between labelme polygons and single-image COCO datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert labelme files (*.json) into COCO files (*_new.json)
    #[command(name = "labelme2coco")]
    LabelmeToCoco(ConvertArgs),
    /// Convert COCO files (*_new.json) back into labelme files (*.json)
    #[command(name = "coco2labelme")]
    CocoToLabelme(ConvertArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Directory containing the source JSON files
    src: PathBuf,

    /// Directory to write converted files into (created if missing)
    dst: PathBuf,

    /// Built-in label set to map label names to category ids
    #[arg(long, value_enum, default_value = "legacy")]
    label_set: LabelSetArg,

    /// JSON category table to use instead of a built-in label set
    #[arg(long)]
    categories: Option<PathBuf>,

    /// Glob pattern for source files, relative to SRC
    #[arg(long)]
    pattern: Option<String>,

    /// Write indented JSON
    #[arg(long)]
    pretty: bool,

    /// Dataset description written into COCO info blocks
    #[arg(long, default_value = labelme_coco::types::DEFAULT_DESCRIPTION)]
    description: String,

    /// Contributor written into COCO info blocks
    #[arg(long, default_value = labelme_coco::types::DEFAULT_CONTRIBUTOR)]
    contributor: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum LabelSetArg {
    /// 8 classes: line, person, car, truck, bus, motocycle, bicycle, traffic light
    Legacy,
    /// 19 classes with lane-marking subtypes and an always-crowd "ignore" class
    Extended,
}

impl From<LabelSetArg> for LabelSet {
    fn from(arg: LabelSetArg) -> Self {
        match arg {
            LabelSetArg::Legacy => LabelSet::Legacy,
            LabelSetArg::Extended => LabelSet::Extended,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();

    let cli = Cli::parse();
    let (direction, args) = match cli.command {
        Command::LabelmeToCoco(args) => (Direction::LabelmeToCoco, args),
        Command::CocoToLabelme(args) => (Direction::CocoToLabelme, args),
    };

    let table = match &args.categories {
        Some(path) => {
            info!("Loading category table from {:?}...", path);
            CategoryTable::load(path)?
        }
        None => CategoryTable::from_label_set(args.label_set.into()),
    };
    if table.is_empty() {
        return Err("category table has no entries".into());
    }
    let names: Vec<&str> = table.iter().map(|e| e.name.as_str()).collect();
    info!("Using {} categories: {}", table.len(), names.join(", "));
    if let Some(code) = table.crowd_code() {
        info!("Annotations with category {} are always crowd regions", code);
    }

    let options = BatchOptions {
        pattern: args.pattern,
        pretty: args.pretty,
        description: args.description,
        contributor: args.contributor,
    };
    let summary = convert_dir(direction, &args.src, &args.dst, &table, &options)?;

    if summary.failed_files > 0 {
        eprintln!(
            "{} file(s) failed to convert; see the log above",
            summary.failed_files
        );
        std::process::exit(1);
    }

    Ok(())
}
