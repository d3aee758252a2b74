//! # COCO MOTS Dataset Adapter
//!
//! Exposes COCO-format images, boxes and instance masks to a multi-object tracking
//! and segmentation training pipeline.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `coco`: annotation file parsing, the in-memory index, mask rasterization
//! - `dataset`: per-image label derivation, image/mask loading, sample retrieval
//! - `core`: the memory-mapped resized image cache
//! - `config`: configuration and validation
//! - `error`: the crate error type
//!
//! Resizing lives in the `coco-scale` member crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use coco_mots::{CocoMotsDataset, DatasetConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = DatasetConfig::new("/data/COCO")
//!     .with_split("instances_val2017.json", "val2017")
//!     .with_img_size(416, 416)
//!     .with_min_sz(2.0);
//! let dataset = CocoMotsDataset::new(config)?;
//!
//! // Single-object track: instance 0 of sample 0, three frames.
//! let frames = dataset.pull_item_id(0, 0, 3)?;
//! assert_eq!(frames.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod coco;
pub mod config;
pub mod core;
pub mod dataset;
pub mod error;

pub use config::DatasetConfig;
pub use dataset::{CocoMotsDataset, Frame, Preprocess, PulledItem, SampleRecord};

/// Re-export error types for convenience
pub use error::{DatasetError, DatasetResult, HasRecoverySuggestion, HasSeverity};
