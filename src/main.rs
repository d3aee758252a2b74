use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use coco_mots::dataset::CLASS_COL;
use coco_mots::{CocoMotsDataset, DatasetConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

/// Inspect a COCO split and prepare it for MOTS pretraining.
#[derive(Parser, Debug)]
#[command(name = "coco-mots")]
#[command(about = "Inspect COCO splits and warm the resized image cache for MOTS pretraining")]
struct Cli {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Dataset root holding annotations/ and the image directories
    #[arg(long, global = true, help = "Dataset root (default: $COCO_MOTS_DATADIR/COCO)")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = "instances_train2017.json",
          help = "Annotation file inside <data-dir>/annotations")]
    json_file: String,

    #[arg(long, global = true, default_value = "train2017",
          help = "Split name, also the image sub-directory")]
    name: String,

    #[arg(long, global = true, default_value = "416x416", value_parser = parse_img_size,
          help = "Target size as HEIGHTxWIDTH")]
    img_size: (u32, u32),

    #[arg(long, global = true, default_value_t = 0.0,
          help = "Boxes must be strictly larger than this on both axes")]
    min_sz: f64,

    #[arg(long, global = true, default_value_t = coco_mots::config::DEFAULT_MAX_INST,
          help = "Maximum instances kept per image")]
    max_inst: usize,

    #[arg(long, global = true, value_delimiter = ',',
          help = "Category allow-list, e.g. person,car")]
    categories: Vec<String>,

    #[arg(long, global = true, value_delimiter = ',',
          help = "Output class table for the allow-list")]
    full_names: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print sample count, class table and instance statistics
    Stats,
    /// Build the resized image cache ahead of training
    WarmCache,
    /// Pull random pretraining samples and print their shapes
    Sample {
        #[arg(short = 'n', long, default_value_t = 4)]
        count: usize,

        #[arg(long, help = "Seed for reproducible draws")]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.dataset.into_config()?;

    match cli.command {
        Command::Stats => stats(config),
        Command::WarmCache => warm_cache(config),
        Command::Sample { count, seed } => sample(config, count, seed),
    }
}

impl DatasetArgs {
    fn into_config(self) -> Result<DatasetConfig> {
        let data_dir = self
            .data_dir
            .unwrap_or_else(coco_mots::config::default_data_dir);
        let mut config = DatasetConfig::new(data_dir)
            .with_split(self.json_file, self.name)
            .with_img_size(self.img_size.0, self.img_size.1)
            .with_min_sz(self.min_sz)
            .with_max_inst(self.max_inst);

        match (self.categories.is_empty(), self.full_names.is_empty()) {
            (true, true) => {}
            (false, false) => config = config.with_categories(self.categories, self.full_names),
            (false, true) => config = config.with_categories(self.categories.clone(), self.categories),
            (true, false) => return Err(anyhow!("--full-names requires --categories")),
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse "HxW" (or a single number for a square) into (height, width)
fn parse_img_size(s: &str) -> Result<(u32, u32)> {
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid image size component: {}", v))
    };
    match s.split_once(['x', 'X']) {
        Some((h, w)) => Ok((parse(h)?, parse(w)?)),
        None => {
            let side = parse(s)?;
            Ok((side, side))
        }
    }
}

fn stats(config: DatasetConfig) -> Result<()> {
    let dataset = CocoMotsDataset::new(config)?;
    let records = dataset.records();

    let instances: Vec<usize> = records.iter().map(|r| r.num_instances()).collect();
    let total: usize = instances.iter().sum();
    let max = instances.iter().copied().max().unwrap_or(0);

    let class_names: Vec<String> = match &dataset.config().cat_names_full {
        Some(full) => full.clone(),
        None => dataset
            .class_ids()
            .iter()
            .map(|&id| {
                dataset
                    .index()
                    .category(id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default()
            })
            .collect(),
    };
    let mut per_class = vec![0usize; class_names.len()];
    for record in records {
        for cls in record.labels.column(CLASS_COL) {
            if let Some(slot) = per_class.get_mut(*cls as usize) {
                *slot += 1;
            }
        }
    }

    println!("samples:          {}", dataset.len());
    println!("with instances:   {}", dataset.valid_indices().len());
    println!("instances:        {}", total);
    println!("max per sample:   {}", max);
    if !records.is_empty() {
        println!("mean per sample:  {:.2}", total as f64 / records.len() as f64);
    }
    println!("classes:");
    for (id, (name, count)) in class_names.iter().zip(&per_class).enumerate() {
        if *count > 0 {
            println!("  {:>3} {:<20} {}", id, name, count);
        }
    }
    Ok(())
}

fn warm_cache(config: DatasetConfig) -> Result<()> {
    let dataset = CocoMotsDataset::new(config.with_cache(true))?;
    println!(
        "cache ready: {} ({} samples)",
        dataset.cache_path().display(),
        dataset.len()
    );
    Ok(())
}

fn sample(config: DatasetConfig, count: usize, seed: Option<u64>) -> Result<()> {
    let dataset = CocoMotsDataset::new(config)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for _ in 0..count {
        let item = dataset.pull_item(&mut rng)?;
        let frame = item
            .frames
            .first()
            .ok_or_else(|| anyhow!("sample {} has no frames", item.img_id))?;
        let masks = frame.masks.as_ref().map(|m| m.dim());
        println!(
            "sample {:>6}  orig {:?}  image {:?}  labels {:?}  masks {:?}",
            item.img_id,
            item.img_info,
            frame.image.dim(),
            frame.labels.dim(),
            masks
        );
    }
    Ok(())
}
