//! Common test utilities for the dataset integration tests.
//!
//! [`CocoFixture`] writes a small COCO split into a temporary directory: an
//! instances file under `annotations/` and one PNG per image under `train2017/`.

#![allow(dead_code)]

use std::path::Path;

use coco_mots::DatasetConfig;
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const PERSON: u64 = 1;
pub const BICYCLE: u64 = 2;
pub const CAR: u64 = 3;
pub const SPLIT: &str = "train2017";
pub const JSON_FILE: &str = "instances_train2017.json";

pub struct CocoFixture {
    pub dir: TempDir,
    images: Vec<(u64, u32, u32)>,
    annotations: Vec<Value>,
    next_ann_id: u64,
    seed: u64,
}

impl CocoFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            images: Vec::new(),
            annotations: Vec::new(),
            next_ann_id: 1,
            seed: 7,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Add an image of `width x height` pixels.
    pub fn image(&mut self, id: u64, width: u32, height: u32) -> &mut Self {
        self.images.push((id, width, height));
        self
    }

    /// Add a rectangular instance whose polygon matches its box.
    pub fn rect(&mut self, image_id: u64, category_id: u64, x: f64, y: f64, w: f64, h: f64) -> &mut Self {
        let poly = vec![x, y, x + w, y, x + w, y + h, x, y + h];
        self.push_annotation(image_id, category_id, [x, y, w, h], w * h, false, json!([poly]))
    }

    /// Add a crowd region covering the whole image as uncompressed RLE.
    pub fn crowd(&mut self, image_id: u64, category_id: u64) -> &mut Self {
        let (_, w, h) = *self
            .images
            .iter()
            .find(|(id, _, _)| *id == image_id)
            .expect("crowd region on a known image");
        let seg = json!({"size": [h, w], "counts": [0, h * w]});
        self.push_annotation(
            image_id,
            category_id,
            [0.0, 0.0, w as f64, h as f64],
            (w * h) as f64,
            true,
            seg,
        )
    }

    fn push_annotation(
        &mut self,
        image_id: u64,
        category_id: u64,
        bbox: [f64; 4],
        area: f64,
        iscrowd: bool,
        segmentation: Value,
    ) -> &mut Self {
        self.annotations.push(json!({
            "id": self.next_ann_id,
            "image_id": image_id,
            "category_id": category_id,
            "bbox": bbox,
            "area": area,
            "iscrowd": iscrowd as u8,
            "segmentation": segmentation,
        }));
        self.next_ann_id += 1;
        self
    }

    pub fn file_name(id: u64) -> String {
        format!("{:012}.png", id)
    }

    /// Write the annotation file and images; returns a config rooted at the fixture.
    pub fn write(&self) -> DatasetConfig {
        let root = self.root();
        std::fs::create_dir_all(root.join("annotations")).expect("create annotations dir");
        std::fs::create_dir_all(root.join(SPLIT)).expect("create image dir");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let images: Vec<Value> = self
            .images
            .iter()
            .map(|&(id, width, height)| {
                let color = Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]);
                RgbImage::from_pixel(width, height, color)
                    .save(root.join(SPLIT).join(Self::file_name(id)))
                    .expect("write fixture image");
                json!({
                    "id": id,
                    "width": width,
                    "height": height,
                    "file_name": Self::file_name(id),
                })
            })
            .collect();

        let dataset = json!({
            "info": {"description": "fixture"},
            "images": images,
            "annotations": self.annotations,
            "categories": [
                {"id": PERSON, "name": "person", "supercategory": "person"},
                {"id": BICYCLE, "name": "bicycle", "supercategory": "vehicle"},
                {"id": CAR, "name": "car", "supercategory": "vehicle"},
            ],
        });
        std::fs::write(
            root.join("annotations").join(JSON_FILE),
            serde_json::to_vec(&dataset).expect("serialize fixture"),
        )
        .expect("write annotation file");

        DatasetConfig::new(root).with_split(JSON_FILE, SPLIT)
    }
}

/// Fixture with `n` images of random size and random (partly out-of-bounds) boxes.
pub fn random_fixture(seed: u64, n: u64) -> CocoFixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fixture = CocoFixture::new();
    fixture.seed = seed;
    for id in 1..=n {
        let (w, h) = (rng.gen_range(16..96), rng.gen_range(16..96));
        fixture.image(id, w, h);
        for _ in 0..rng.gen_range(0..6) {
            let cat = rng.gen_range(PERSON..=CAR);
            let x = rng.gen_range(-8.0..w as f64);
            let y = rng.gen_range(-8.0..h as f64);
            let bw = rng.gen_range(0.0..40.0);
            let bh = rng.gen_range(0.0..40.0);
            fixture.rect(id, cat, x, y, bw, bh);
        }
    }
    fixture
}
