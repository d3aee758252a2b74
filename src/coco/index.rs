//! # Annotation Index
//!
//! In-memory index over a COCO instances file: image metadata, annotations grouped by
//! image, categories, and the reverse category-to-image mapping. Built once at startup
//! and read-only afterwards, so it can be shared freely across loader threads.
//!
//! Query methods return ids in annotation-file order, the order every derived sample
//! list depends on.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use ndarray::Array2;
use tracing::info;

use super::mask;
use super::types::{Annotation, Category, Dataset, Image, RleCounts, Segmentation};
use crate::error::{DatasetError, DatasetResult};

/// Read-only index over one COCO instances file.
#[derive(Debug)]
pub struct CocoIndex {
    images: Vec<Image>,
    annotations: Vec<Annotation>,
    categories: Vec<Category>,
    img_pos: HashMap<u64, usize>,
    ann_pos: HashMap<u64, usize>,
    cat_pos: HashMap<u64, usize>,
    img_to_anns: HashMap<u64, Vec<usize>>,
    cat_to_imgs: HashMap<u64, Vec<u64>>,
}

impl CocoIndex {
    /// Load and index an annotation file.
    ///
    /// A missing or malformed file is fatal; nothing is recovered.
    pub fn from_file(path: impl AsRef<Path>) -> DatasetResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading annotations into memory");
        let started = Instant::now();

        let file = File::open(path).map_err(|e| {
            DatasetError::io_at("open annotation file", path, e)
                .with_recovery_suggestion("check data_dir and json_file")
        })?;
        let dataset: Dataset = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            DatasetError::annotation(path.display().to_string(), e.to_string())
                .with_operation("parse annotation file")
        })?;

        let index = Self::from_dataset(dataset)?;
        info!(
            images = index.images.len(),
            annotations = index.annotations.len(),
            categories = index.categories.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index created"
        );
        Ok(index)
    }

    /// Index an already parsed dataset.
    pub fn from_dataset(dataset: Dataset) -> DatasetResult<Self> {
        let Dataset {
            images,
            annotations,
            categories,
            ..
        } = dataset;

        let img_pos = position_map(&images, |img| img.id, "image")?;
        let ann_pos = position_map(&annotations, |ann| ann.id, "annotation")?;
        let cat_pos = position_map(&categories, |cat| cat.id, "category")?;

        let mut img_to_anns: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut cat_to_imgs: HashMap<u64, Vec<u64>> = HashMap::new();
        for (pos, ann) in annotations.iter().enumerate() {
            img_to_anns.entry(ann.image_id).or_default().push(pos);
            cat_to_imgs
                .entry(ann.category_id)
                .or_default()
                .push(ann.image_id);
        }

        Ok(Self {
            images,
            annotations,
            categories,
            img_pos,
            ann_pos,
            cat_pos,
            img_to_anns,
            cat_to_imgs,
        })
    }

    /// All image ids, in file order.
    pub fn img_ids(&self) -> Vec<u64> {
        self.images.iter().map(|img| img.id).collect()
    }

    /// All category ids, in file order.
    pub fn cat_ids(&self) -> Vec<u64> {
        self.categories.iter().map(|cat| cat.id).collect()
    }

    /// Ids of categories whose name is in `names`, in file order.
    pub fn cat_ids_by_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<u64> {
        self.categories
            .iter()
            .filter(|cat| names.iter().any(|n| n.as_ref() == cat.name))
            .map(|cat| cat.id)
            .collect()
    }

    /// Distinct ids of images with at least one annotation of `cat_id`.
    pub fn img_ids_for_cat(&self, cat_id: u64) -> Vec<u64> {
        let mut ids = self.cat_to_imgs.get(&cat_id).cloned().unwrap_or_default();
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(*id));
        ids
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn image(&self, id: u64) -> Option<&Image> {
        self.img_pos.get(&id).map(|&pos| &self.images[pos])
    }

    pub fn category(&self, id: u64) -> Option<&Category> {
        self.cat_pos.get(&id).map(|&pos| &self.categories[pos])
    }

    pub fn annotation(&self, id: u64) -> Option<&Annotation> {
        self.ann_pos.get(&id).map(|&pos| &self.annotations[pos])
    }

    /// Annotations of one image, in file order. `iscrowd` filters on the crowd flag.
    pub fn annotations_for(&self, img_id: u64, iscrowd: Option<bool>) -> Vec<&Annotation> {
        self.img_to_anns
            .get(&img_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| &self.annotations[pos])
                    .filter(|ann| iscrowd.is_none_or(|crowd| ann.iscrowd == crowd))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Annotation ids of one image, in file order.
    pub fn ann_ids(&self, img_id: u64, iscrowd: Option<bool>) -> Vec<u64> {
        self.annotations_for(img_id, iscrowd)
            .into_iter()
            .map(|ann| ann.id)
            .collect()
    }

    /// Binary `(h, w)` mask of one annotation in its image's pixel grid.
    pub fn ann_to_mask(&self, ann: &Annotation) -> DatasetResult<Array2<u8>> {
        let img = self.image(ann.image_id).ok_or_else(|| {
            DatasetError::annotation(
                format!("annotation {}", ann.id),
                format!("references unknown image {}", ann.image_id),
            )
        })?;
        let (h, w) = (img.height, img.width);

        let column_major = match &ann.segmentation {
            None => vec![0u8; h as usize * w as usize],
            Some(Segmentation::Polygons(polys)) => mask::decode_polygons(polys, h, w),
            Some(Segmentation::Rle { size, counts }) => {
                let [rh, rw] = *size;
                if (rh, rw) != (h, w) {
                    return Err(DatasetError::annotation(
                        format!("annotation {}", ann.id),
                        format!("rle size {}x{} differs from image {}x{}", rh, rw, h, w),
                    ));
                }
                let rle = match counts {
                    RleCounts::Uncompressed(c) => mask::fr_uncompressed(c, h, w),
                    RleCounts::Compressed(s) => mask::fr_string(s, h, w)?,
                };
                mask::decode(&rle)
            }
        };

        Ok(mask::to_array(&column_major, h, w))
    }
}

fn position_map<T>(
    items: &[T],
    id: impl Fn(&T) -> u64,
    what: &str,
) -> DatasetResult<HashMap<u64, usize>> {
    let mut map = HashMap::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        if map.insert(id(item), pos).is_some() {
            return Err(DatasetError::annotation(
                "annotation file",
                format!("duplicate {} id {}", what, id(item)),
            ));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> CocoIndex {
        let json = r#"{
            "images": [
                {"id": 3, "width": 6, "height": 5, "file_name": "c.jpg"},
                {"id": 1, "width": 6, "height": 5}
            ],
            "annotations": [
                {"id": 10, "image_id": 3, "category_id": 2, "bbox": [1, 1, 3, 2], "area": 6,
                 "iscrowd": 0, "segmentation": [[1, 1, 4, 1, 4, 3, 1, 3]]},
                {"id": 11, "image_id": 3, "category_id": 1, "bbox": [0, 0, 6, 5], "area": 30,
                 "iscrowd": 1, "segmentation": {"size": [5, 6], "counts": [0, 30]}},
                {"id": 12, "image_id": 1, "category_id": 2, "bbox": [0, 0, 1, 1], "area": 1,
                 "iscrowd": 0},
                {"id": 13, "image_id": 3, "category_id": 2, "bbox": [0, 0, 1, 1], "area": 1,
                 "iscrowd": 0}
            ],
            "categories": [{"id": 2, "name": "car"}, {"id": 1, "name": "person"}]
        }"#;
        CocoIndex::from_dataset(serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn ids_keep_file_order() {
        let index = sample_index();
        assert_eq!(index.img_ids(), vec![3, 1]);
        assert_eq!(index.cat_ids(), vec![2, 1]);
        assert_eq!(index.cat_ids_by_names(&["person"]), vec![1]);
        assert_eq!(index.ann_ids(3, None), vec![10, 11, 13]);
        assert_eq!(index.ann_ids(3, Some(false)), vec![10, 13]);
        assert!(index.ann_ids(99, None).is_empty());
    }

    #[test]
    fn images_per_category_are_distinct() {
        let index = sample_index();
        assert_eq!(index.img_ids_for_cat(2), vec![3, 1]);
        assert_eq!(index.img_ids_for_cat(1), vec![3]);
        assert!(index.img_ids_for_cat(42).is_empty());
    }

    #[test]
    fn masks_from_polygons_rle_and_missing_segmentation() {
        let index = sample_index();

        let poly = index.ann_to_mask(index.annotation(10).unwrap()).unwrap();
        assert_eq!(poly.dim(), (5, 6));
        assert_eq!(poly.iter().map(|&v| v as u32).sum::<u32>(), 6);
        assert_eq!(poly[[1, 1]], 1);
        assert_eq!(poly[[0, 0]], 0);

        let crowd = index.ann_to_mask(index.annotation(11).unwrap()).unwrap();
        assert!(crowd.iter().all(|&v| v == 1));

        let none = index.ann_to_mask(index.annotation(12).unwrap()).unwrap();
        assert!(none.iter().all(|&v| v == 0));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"{"images": [{"id": 1, "width": 1, "height": 1},
                                  {"id": 1, "width": 1, "height": 1}]}"#;
        let err = CocoIndex::from_dataset(serde_json::from_str(json).unwrap()).unwrap_err();
        assert_eq!(err.category(), "annotation");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CocoIndex::from_file("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.category(), "io");
    }
}
