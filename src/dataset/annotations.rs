//! Per-image label derivation.
//!
//! One filtering pass decides which annotations of an image survive. The label rows
//! and the annotation ids used later for mask rasterization come out of the same pass,
//! so the box table and the mask stack always describe the same instances.

use coco_scale::{build_plan, Size};
use ndarray::Array2;

use crate::coco::{Annotation, CocoIndex};
use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult};

/// Columns of a label row: `[x1, y1, x2, y2, class_id, instance_id]`.
pub const LABEL_COLS: usize = 6;
/// Column holding the output class id.
pub const CLASS_COL: usize = 4;
/// Column holding the 1-based instance index.
pub const INSTANCE_COL: usize = 5;
/// Category ids above this are reserved in COCO and never used.
pub const MAX_CATEGORY_ID: u64 = 80;

/// Everything derived once per image at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub img_id: u64,
    /// `(N, 6)` label rows in resized-image coordinates.
    pub labels: Array2<f64>,
    /// Original `(height, width)`.
    pub img_info: (u32, u32),
    /// `(height, width)` after the aspect-preserving resize.
    pub resized_info: (u32, u32),
    /// Scale factor from original to resized coordinates.
    pub ratio: f64,
    pub file_name: String,
    /// Annotation ids of the retained instances, one per label row.
    pub ann_ids: Vec<u64>,
}

impl SampleRecord {
    pub fn num_instances(&self) -> usize {
        self.labels.nrows()
    }
}

/// How a COCO category id becomes an output class id.
#[derive(Debug, Clone)]
pub enum ClassMap {
    /// Rank of the id among all category ids, sorted ascending.
    Rank(Vec<u64>),
    /// Only `allow` names are kept; the class id is the name's position in `full`.
    Named { allow: Vec<String>, full: Vec<String> },
}

impl ClassMap {
    pub fn from_config(index: &CocoIndex, config: &DatasetConfig) -> Self {
        match (&config.cat_names_in_coco, &config.cat_names_full) {
            (Some(allow), Some(full)) => ClassMap::Named {
                allow: allow.clone(),
                full: full.clone(),
            },
            _ => {
                let mut ids = index.cat_ids();
                ids.sort_unstable();
                ClassMap::Rank(ids)
            }
        }
    }

    /// Output class id for `cat_id`, or `None` when the category is filtered out.
    pub fn resolve(&self, index: &CocoIndex, cat_id: u64) -> DatasetResult<Option<usize>> {
        match self {
            ClassMap::Rank(ids) => ids
                .binary_search(&cat_id)
                .map(Some)
                .map_err(|_| unknown_category(cat_id)),
            ClassMap::Named { allow, full } => {
                let name = &index
                    .category(cat_id)
                    .ok_or_else(|| unknown_category(cat_id))?
                    .name;
                if !allow.contains(name) {
                    return Ok(None);
                }
                full.iter().position(|n| n == name).map(Some).ok_or_else(|| {
                    DatasetError::config(
                        "cat_names_full",
                        name.clone(),
                        "allowed category has no output class id",
                    )
                })
            }
        }
    }
}

fn unknown_category(cat_id: u64) -> DatasetError {
    DatasetError::annotation(
        "categories",
        format!("category id {} is not in the category table", cat_id),
    )
}

/// Filter thresholds applied to every image.
#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub min_sz: f64,
    pub max_inst: usize,
    /// Target `(height, width)`.
    pub img_size: (u32, u32),
}

impl From<&DatasetConfig> for FilterSettings {
    fn from(config: &DatasetConfig) -> Self {
        Self {
            min_sz: config.min_sz,
            max_inst: config.max_inst,
            img_size: config.img_size,
        }
    }
}

/// Box clipped to the image: `[x1, y1, x2, y2]`.
pub fn clean_bbox(bbox: &[f64; 4], width: f64, height: f64) -> [f64; 4] {
    let x1 = bbox[0].max(0.0);
    let y1 = bbox[1].max(0.0);
    let x2 = width.min(x1 + bbox[2].max(0.0));
    let y2 = height.min(y1 + bbox[3].max(0.0));
    [x1, y1, x2, y2]
}

/// True when the annotation keeps a positive area and a clipped box strictly larger
/// than `min_sz` on both axes.
fn passes_size(ann: &Annotation, bbox: &[f64; 4], min_sz: f64) -> bool {
    ann.area > 0.0 && bbox[2] - bbox[0] > min_sz && bbox[3] - bbox[1] > min_sz
}

/// Build the record for one image id.
pub fn derive_record(
    index: &CocoIndex,
    img_id: u64,
    settings: &FilterSettings,
    classes: &ClassMap,
) -> DatasetResult<SampleRecord> {
    let img = index.image(img_id).ok_or_else(|| {
        DatasetError::annotation("images", format!("image id {} is not indexed", img_id))
    })?;
    let (width, height) = (img.width as f64, img.height as f64);

    let mut kept: Vec<(u64, [f64; 4], usize)> = Vec::new();
    for ann in index.annotations_for(img_id, Some(false)) {
        if kept.len() == settings.max_inst {
            break;
        }
        if ann.category_id > MAX_CATEGORY_ID {
            continue;
        }
        let bbox = clean_bbox(&ann.bbox, width, height);
        if !passes_size(ann, &bbox, settings.min_sz) {
            continue;
        }
        if let Some(cls) = classes.resolve(index, ann.category_id)? {
            kept.push((ann.id, bbox, cls));
        }
    }

    let plan = build_plan(
        Size {
            w: img.width,
            h: img.height,
        },
        Size::from_hw(settings.img_size),
    );

    // Truncated output sizes can sit a fraction of a pixel inside the scaled image edge.
    let limits = [plan.out.w as f64, plan.out.h as f64];
    let mut labels = Array2::<f64>::zeros((kept.len(), LABEL_COLS));
    for (ix, (_, bbox, cls)) in kept.iter().enumerate() {
        let mut row = labels.row_mut(ix);
        for (k, &v) in bbox.iter().enumerate() {
            row[k] = plan.scale_coord(v).min(limits[k % 2]);
        }
        row[CLASS_COL] = *cls as f64;
        row[INSTANCE_COL] = (ix + 1) as f64;
    }

    Ok(SampleRecord {
        img_id,
        labels,
        img_info: (img.height, img.width),
        resized_info: plan.out.hw(),
        ratio: plan.ratio,
        file_name: img.file_name_or_default(),
        ann_ids: kept.into_iter().map(|(id, _, _)| id).collect(),
    })
}

/// Image ids to sample from: every image, or the images holding at least one of the
/// allowed categories. First-seen order, no duplicates.
pub fn select_image_ids(index: &CocoIndex, config: &DatasetConfig) -> Vec<u64> {
    match &config.cat_names_in_coco {
        None => index.img_ids(),
        Some(allow) => {
            let mut seen = std::collections::HashSet::new();
            index
                .cat_ids_by_names(allow.as_slice())
                .into_iter()
                .flat_map(|cat| index.img_ids_for_cat(cat))
                .filter(|id| seen.insert(*id))
                .collect()
        }
    }
}
