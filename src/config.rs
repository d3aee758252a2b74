//! # Configuration Module
//!
//! Construction parameters for [`CocoMotsDataset`](crate::dataset::CocoMotsDataset),
//! with defaults matching the standard COCO 2017 train split and validation that
//! runs before any file is touched.
//!
//! ## Directory Layout
//!
//! ```text
//! <data_dir>/annotations/<json_file>        COCO instances file
//! <data_dir>/<name>/<file_name>             image files
//! <data_dir>/img_resized_cache_<name>.array optional resized image cache
//! ```
//!
//! ## Configuration Parameters
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `data_dir` | `$COCO_MOTS_DATADIR/COCO` | Dataset root |
//! | `json_file` | `instances_train2017.json` | Annotation file name |
//! | `name` | `train2017` | Image sub-directory / split name |
//! | `img_size` | `(416, 416)` | Target `(height, width)` |
//! | `cache` | `false` | Build and use the resized image cache |
//! | `min_sz` | `0.0` | Boxes must be strictly larger on both axes |
//! | `cat_names_in_coco` | `None` | Category allow-list |
//! | `cat_names_full` | `None` | Output class table for the allow-list |
//! | `max_inst` | `100` | Instance cap per sample |
//!
//! ## Examples
//!
//! ```rust
//! use coco_mots::config::DatasetConfig;
//!
//! let config = DatasetConfig::new("/data/COCO")
//!     .with_split("instances_val2017.json", "val2017")
//!     .with_img_size(640, 640)
//!     .with_categories(vec!["person".into()], vec!["person".into(), "car".into()]);
//!
//! assert!(config.validate().is_ok());
//! assert!(config.annotation_path().ends_with("annotations/instances_val2017.json"));
//! ```

use std::path::PathBuf;

use crate::error::{DatasetError, DatasetResult};

/// Environment variable that overrides the global data directory.
pub const DATADIR_ENV: &str = "COCO_MOTS_DATADIR";

/// Default instance cap per sample.
pub const DEFAULT_MAX_INST: usize = 100;

/// Configuration structure for the COCO MOTS dataset adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    /// Dataset root directory holding `annotations/` and the image split directories.
    pub data_dir: PathBuf,

    /// COCO json file name inside `<data_dir>/annotations`.
    pub json_file: String,

    /// Split name; also the image sub-directory and the cache file suffix.
    pub name: String,

    /// Target `(height, width)` every image is fitted into.
    pub img_size: (u32, u32),

    /// Pre-decode every resized image into a memory-mapped cache file.
    ///
    /// Cached pixels cannot be combined with instance-mask sampling.
    pub cache: bool,

    /// Minimum clipped box width and height, exclusive.
    pub min_sz: f64,

    /// Category names to keep. `None` keeps every category.
    pub cat_names_in_coco: Option<Vec<String>>,

    /// Output class table; a kept category's class id is its position here.
    pub cat_names_full: Option<Vec<String>>,

    /// Maximum number of instances kept per image.
    pub max_inst: usize,
}

impl Default for DatasetConfig {
    /// Default values target `instances_train2017.json` at 416x416 with no cache.
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            json_file: "instances_train2017.json".to_string(),
            name: "train2017".to_string(),
            img_size: (416, 416),
            cache: false,
            min_sz: 0.0,
            cat_names_in_coco: None,
            cat_names_full: None,
            max_inst: DEFAULT_MAX_INST,
        }
    }
}

/// `<global data dir>/COCO`, where the global data dir comes from
/// [`DATADIR_ENV`] or falls back to `./datasets`.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var_os(DATADIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("datasets"));
    base.join("COCO")
}

impl DatasetConfig {
    /// Creates a default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Select the annotation file and image split.
    pub fn with_split(mut self, json_file: impl Into<String>, name: impl Into<String>) -> Self {
        self.json_file = json_file.into();
        self.name = name.into();
        self
    }

    /// Set the target size as `(height, width)`.
    pub fn with_img_size(mut self, height: u32, width: u32) -> Self {
        self.img_size = (height, width);
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_min_sz(mut self, min_sz: f64) -> Self {
        self.min_sz = min_sz;
        self
    }

    pub fn with_max_inst(mut self, max_inst: usize) -> Self {
        self.max_inst = max_inst;
        self
    }

    /// Restrict categories to `allow` and remap them into `full`.
    pub fn with_categories(mut self, allow: Vec<String>, full: Vec<String>) -> Self {
        self.cat_names_in_coco = Some(allow);
        self.cat_names_full = Some(full);
        self
    }

    /// Validates the configuration parameters.
    ///
    /// # Validation Rules
    ///
    /// - both `img_size` axes must be greater than 0
    /// - `max_inst` must be greater than 0
    /// - `min_sz` must be finite and non-negative
    /// - an allow-list requires a full-name table containing every allowed name
    pub fn validate(&self) -> DatasetResult<()> {
        let (h, w) = self.img_size;
        if h == 0 || w == 0 {
            return Err(DatasetError::config(
                "img_size",
                format!("{}x{}", h, w),
                "both axes must be greater than 0",
            ));
        }
        if self.max_inst == 0 {
            return Err(DatasetError::config(
                "max_inst",
                "0",
                "must be greater than 0",
            ));
        }
        if !self.min_sz.is_finite() || self.min_sz < 0.0 {
            return Err(DatasetError::config(
                "min_sz",
                self.min_sz.to_string(),
                "must be a finite, non-negative size",
            ));
        }
        if let Some(allow) = &self.cat_names_in_coco {
            let full = self.cat_names_full.as_ref().ok_or_else(|| {
                DatasetError::config(
                    "cat_names_full",
                    "None",
                    "required when cat_names_in_coco is set",
                )
            })?;
            if let Some(missing) = allow.iter().find(|name| !full.contains(*name)) {
                return Err(DatasetError::config(
                    "cat_names_full",
                    missing.clone(),
                    "every allowed category needs an output class id",
                ));
            }
        }
        Ok(())
    }

    /// `<data_dir>/annotations/<json_file>`
    pub fn annotation_path(&self) -> PathBuf {
        self.data_dir.join("annotations").join(&self.json_file)
    }

    /// `<data_dir>/<name>`
    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// `<data_dir>/img_resized_cache_<name>.array`
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("img_resized_cache_{}.array", self.name))
    }
}
