//! # COCO MOTS Dataset
//!
//! [`CocoMotsDataset`] turns a COCO instances file into training samples for
//! multi-object tracking and segmentation pretraining. Static images stand in for
//! motion sequences: every pulled sample is a list of identical frames.
//!
//! ## Entry Points
//!
//! - [`CocoMotsDataset::pull_item`]: a random image with at least one instance, its
//!   label rows and instance masks, duplicated into two frames.
//! - [`CocoMotsDataset::pull_item_id`]: one instance of one image as a single-object
//!   track of `num_frames` frames.
//! - [`CocoMotsDataset::get_item`]: `pull_item` followed by the optional
//!   [`Preprocess`] stage.
//!
//! ## Example
//!
//! ```rust,no_run
//! use coco_mots::config::DatasetConfig;
//! use coco_mots::dataset::CocoMotsDataset;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dataset = CocoMotsDataset::new(DatasetConfig::new("/data/COCO"))?;
//! let item = dataset.pull_item(&mut rand::thread_rng())?;
//! assert_eq!(item.frames.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod annotations;
pub mod loader;

use std::path::PathBuf;
use std::time::Instant;

use ndarray::{s, Array2, Array3};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::coco::CocoIndex;
use crate::config::DatasetConfig;
use crate::core::image_cache::ImageCache;
use crate::error::{DatasetError, DatasetResult};

pub use annotations::{ClassMap, FilterSettings, SampleRecord, CLASS_COL, INSTANCE_COL, LABEL_COLS};

/// Frames returned by [`CocoMotsDataset::pull_item`].
pub const PRETRAIN_FRAMES: usize = 2;

/// One frame of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Resized BGR image, `(H, W, 3)`, no padding.
    pub image: Array3<u8>,
    /// `(N, 6)` label rows: `[x1, y1, x2, y2, class_id, instance_id]`.
    pub labels: Array2<f64>,
    /// `(H, W, N)` instance masks, present for segmentation samples only.
    pub masks: Option<Array3<f32>>,
}

/// A randomly pulled sample with its bookkeeping.
#[derive(Debug, Clone)]
pub struct PulledItem {
    pub frames: Vec<Frame>,
    /// Original `(height, width)` of the image.
    pub img_info: (u32, u32),
    /// Sample index the frames were taken from.
    pub img_id: usize,
}

/// Augmentation stage applied by [`CocoMotsDataset::get_item`].
pub trait Preprocess: Send + Sync {
    fn preprocess(&self, frames: Vec<Frame>, input_dim: (u32, u32)) -> anyhow::Result<Vec<Frame>>;
}

impl<F> Preprocess for F
where
    F: Fn(Vec<Frame>, (u32, u32)) -> anyhow::Result<Vec<Frame>> + Send + Sync,
{
    fn preprocess(&self, frames: Vec<Frame>, input_dim: (u32, u32)) -> anyhow::Result<Vec<Frame>> {
        self(frames, input_dim)
    }
}

/// COCO images, boxes and instance masks exposed as tracking samples.
pub struct CocoMotsDataset {
    config: DatasetConfig,
    index: CocoIndex,
    ids: Vec<u64>,
    class_ids: Vec<u64>,
    classes: Vec<String>,
    records: Vec<SampleRecord>,
    /// Sample indices with at least one retained instance.
    valid: Vec<usize>,
    cache: Option<ImageCache>,
    preproc: Option<Box<dyn Preprocess>>,
}

impl CocoMotsDataset {
    /// Load the annotation index, derive every sample record and, when
    /// `config.cache` is set, open or build the resized image cache.
    pub fn new(config: DatasetConfig) -> DatasetResult<Self> {
        config.validate()?;
        let index = CocoIndex::from_file(config.annotation_path())?;
        Self::from_index(config, index)
    }

    /// Like [`new`](Self::new) but with an index that is already loaded.
    pub fn from_index(config: DatasetConfig, index: CocoIndex) -> DatasetResult<Self> {
        config.validate()?;
        let started = Instant::now();

        let ids = annotations::select_image_ids(&index, &config);
        let mut class_ids = index.cat_ids();
        class_ids.sort_unstable();
        let classes = index.categories().iter().map(|c| c.name.clone()).collect();

        let class_map = ClassMap::from_config(&index, &config);
        let settings = FilterSettings::from(&config);
        let records = ids
            .iter()
            .map(|&id| annotations::derive_record(&index, id, &settings, &class_map))
            .collect::<DatasetResult<Vec<_>>>()?;
        let valid: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.num_instances() > 0)
            .map(|(i, _)| i)
            .collect();

        info!(
            samples = records.len(),
            with_instances = valid.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sample records derived"
        );

        let mut dataset = Self {
            config,
            index,
            ids,
            class_ids,
            classes,
            records,
            valid,
            cache: None,
            preproc: None,
        };
        if dataset.config.cache {
            dataset.cache = Some(dataset.build_cache()?);
        }
        Ok(dataset)
    }

    /// Attach the augmentation stage used by [`get_item`](Self::get_item).
    pub fn with_preproc(mut self, preproc: impl Preprocess + 'static) -> Self {
        self.preproc = Some(Box::new(preproc));
        self
    }

    fn build_cache(&self) -> DatasetResult<ImageCache> {
        let image_dir = self.config.image_dir();
        let target = self.config.img_size;
        let records = &self.records;
        ImageCache::open_or_build(self.cache_path(), records.len(), target, |i| {
            loader::load_resized_img(&image_dir.join(&records[i].file_name), target)
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn index(&self) -> &CocoIndex {
        &self.index
    }

    /// Image id of every sample, in sample order.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Category names in annotation-file order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// All category ids, sorted; a category's rank here is its default class id.
    pub fn class_ids(&self) -> &[u64] {
        &self.class_ids
    }

    /// Target `(height, width)` handed to the preprocessing stage.
    pub fn input_dim(&self) -> (u32, u32) {
        self.config.img_size
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&SampleRecord> {
        self.records.get(index)
    }

    /// Indices of samples with at least one retained instance.
    pub fn valid_indices(&self) -> &[usize] {
        &self.valid
    }

    /// Label rows of one sample.
    pub fn load_anno(&self, index: usize) -> DatasetResult<&Array2<f64>> {
        Ok(&self.checked_record(index, "sample")?.labels)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.config.cache_path()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    fn checked_record(&self, index: usize, what: &str) -> DatasetResult<&SampleRecord> {
        self.records
            .get(index)
            .ok_or_else(|| DatasetError::index_out_of_range(what, index, self.records.len()))
    }

    pub fn load_image(&self, index: usize) -> DatasetResult<Array3<u8>> {
        let record = self.checked_record(index, "sample")?;
        loader::load_image(&self.config.image_dir().join(&record.file_name))
    }

    pub fn load_resized_img(&self, index: usize) -> DatasetResult<Array3<u8>> {
        let record = self.checked_record(index, "sample")?;
        loader::load_resized_img(
            &self.config.image_dir().join(&record.file_name),
            self.config.img_size,
        )
    }

    pub fn load_mask(&self, index: usize) -> DatasetResult<Array3<f32>> {
        let record = self.checked_record(index, "sample")?;
        loader::load_mask(&self.index, record, self.config.img_size)
    }

    pub fn load_resized_mask(&self, index: usize) -> DatasetResult<Array3<f32>> {
        let record = self.checked_record(index, "sample")?;
        loader::load_resized_mask(&self.index, record, self.config.img_size)
    }

    /// Resized image of one sample, from the cache when present.
    fn resized_image(&self, index: usize) -> DatasetResult<Array3<u8>> {
        match &self.cache {
            Some(cache) => {
                let record = self.checked_record(index, "sample")?;
                cache.slot(index, record.resized_info)
            }
            None => self.load_resized_img(index),
        }
    }

    /// Pull a random sample with at least one instance, masks included.
    ///
    /// The image and masks are resized to fit the input size, and the result holds
    /// [`PRETRAIN_FRAMES`] identical frames.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::UnsupportedCombination`] when the image cache is enabled
    /// - [`DatasetError::NoValidSample`] when no sample has a retained instance
    /// - [`DatasetError::InstanceMismatch`] when label rows and masks disagree
    pub fn pull_item<R: Rng + ?Sized>(&self, rng: &mut R) -> DatasetResult<PulledItem> {
        if self.cache.is_some() {
            return Err(DatasetError::unsupported("cached images", "instance masks")
                .with_recovery_suggestion("construct the dataset with cache disabled"));
        }
        let &index = self
            .valid
            .choose(rng)
            .ok_or_else(|| DatasetError::no_valid_sample(self.records.len()))?;
        let record = &self.records[index];

        let image = self.load_resized_img(index)?;
        let masks = self.load_resized_mask(index)?;
        let mask_slices = masks.dim().2;
        if record.num_instances() != mask_slices {
            return Err(DatasetError::instance_mismatch(
                index,
                record.num_instances(),
                mask_slices,
            ));
        }
        debug!(index, instances = mask_slices, "pulled pretraining sample");

        let frame = Frame {
            image,
            labels: record.labels.clone(),
            masks: Some(masks),
        };
        Ok(PulledItem {
            frames: vec![frame; PRETRAIN_FRAMES],
            img_info: record.img_info,
            img_id: index,
        })
    }

    /// One instance of sample `seq_id` as a single-object track of `num_frames`
    /// identical frames.
    ///
    /// The selected row is copied and its class id set to 0: every tracked object
    /// shares one class. Works with or without the image cache.
    pub fn pull_item_id(
        &self,
        seq_id: usize,
        obj_id: usize,
        num_frames: usize,
    ) -> DatasetResult<Vec<Frame>> {
        let record = self.checked_record(seq_id, "sequence")?;
        if obj_id >= record.num_instances() {
            return Err(DatasetError::index_out_of_range(
                "instance",
                obj_id,
                record.num_instances(),
            ));
        }

        let image = self.resized_image(seq_id)?;
        let mut target = record.labels.slice(s![obj_id..obj_id + 1, ..]).to_owned();
        target[[0, CLASS_COL]] = 0.0;

        Ok(vec![
            Frame {
                image,
                labels: target,
                masks: None,
            };
            num_frames
        ])
    }

    /// Random pretraining sample passed through the preprocessing stage.
    ///
    /// `index` only has to be in range: samples are drawn at random, and the chosen
    /// sample index is reported in [`PulledItem::img_id`].
    pub fn get_item(&self, index: usize) -> anyhow::Result<PulledItem> {
        self.checked_record(index, "sample")?;
        let mut item = self.pull_item(&mut rand::thread_rng())?;
        if let Some(preproc) = &self.preproc {
            item.frames = preproc.preprocess(item.frames, self.input_dim())?;
        }
        Ok(item)
    }
}

impl std::fmt::Debug for CocoMotsDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CocoMotsDataset")
            .field("config", &self.config)
            .field("samples", &self.records.len())
            .field("with_instances", &self.valid.len())
            .field("cache", &self.cache.as_ref().map(|c| c.path().to_path_buf()))
            .field("preproc", &self.preproc.is_some())
            .finish()
    }
}
