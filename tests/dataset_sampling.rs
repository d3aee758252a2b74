//! Random and indexed sample retrieval.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use coco_mots::dataset::{CLASS_COL, Frame, PRETRAIN_FRAMES};
use coco_mots::{CocoMotsDataset, DatasetError};
use common::{CAR, CocoFixture, PERSON, random_fixture};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn two_image_fixture() -> CocoFixture {
    let mut fixture = CocoFixture::new();
    fixture
        .image(1, 80, 60)
        .rect(1, PERSON, 4.0, 4.0, 30.0, 40.0)
        .rect(1, CAR, 40.0, 10.0, 30.0, 20.0)
        .image(2, 40, 40);
    fixture
}

#[test]
fn test_pull_item_duplicates_a_valid_frame() {
    let fixture = two_image_fixture();
    let dataset = CocoMotsDataset::new(fixture.write().with_img_size(48, 48)).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..8 {
        let item = dataset.pull_item(&mut rng).unwrap();
        // Image 2 has no instances and is never drawn.
        assert_eq!(item.img_id, 0);
        assert_eq!(item.img_info, (60, 80));
        assert_eq!(item.frames.len(), PRETRAIN_FRAMES);
        assert_eq!(item.frames[0], item.frames[1]);

        let frame = &item.frames[0];
        assert_eq!(frame.image.dim(), (36, 48, 3));
        assert_eq!(frame.labels.nrows(), 2);
        let masks = frame.masks.as_ref().unwrap();
        assert_eq!(masks.dim(), (36, 48, 2));
        assert!(masks.iter().all(|&v| (-1e-4..=1.0 + 1e-4).contains(&v)));
    }
}

#[test]
fn test_pull_item_samples_every_valid_index() {
    let fixture = random_fixture(5, 12);
    let dataset = CocoMotsDataset::new(fixture.write().with_img_size(32, 32)).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let mut seen = vec![false; dataset.len()];
    for _ in 0..400 {
        let item = dataset.pull_item(&mut rng).unwrap();
        assert!(dataset.record(item.img_id).unwrap().num_instances() > 0);
        seen[item.img_id] = true;
    }
    for &i in dataset.valid_indices() {
        assert!(seen[i], "valid sample {} never drawn", i);
    }
}

#[test]
fn test_pull_item_without_instances_fails() {
    let mut fixture = CocoFixture::new();
    fixture.image(1, 32, 32).image(2, 32, 32);
    let dataset = CocoMotsDataset::new(fixture.write()).unwrap();

    let err = dataset.pull_item(&mut StdRng::seed_from_u64(0)).unwrap_err();
    assert!(matches!(err, DatasetError::NoValidSample { samples: 2, .. }));
}

#[test]
fn test_pull_item_id_single_object_track() {
    let fixture = two_image_fixture();
    let dataset = CocoMotsDataset::new(fixture.write().with_img_size(48, 48)).unwrap();
    let stored = dataset.load_anno(0).unwrap().clone();
    assert_eq!(stored[[1, CLASS_COL]], 2.0);

    let frames = dataset.pull_item_id(0, 1, 3).unwrap();
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!(frame, &frames[0]);
        assert_eq!(frame.labels.dim(), (1, 6));
        assert_eq!(frame.labels[[0, CLASS_COL]], 0.0);
        for col in [0, 1, 2, 3, 5] {
            assert_eq!(frame.labels[[0, col]], stored[[1, col]]);
        }
        assert_eq!(frame.image.dim(), (36, 48, 3));
        assert!(frame.masks.is_none());
    }

    // The stored labels are untouched.
    assert_eq!(dataset.load_anno(0).unwrap(), &stored);
}

#[test]
fn test_pull_item_id_out_of_range() {
    let fixture = two_image_fixture();
    let dataset = CocoMotsDataset::new(fixture.write()).unwrap();

    let err = dataset.pull_item_id(5, 0, 3).unwrap_err();
    assert!(matches!(err, DatasetError::IndexOutOfRange { index: 5, len: 2, .. }));
    let err = dataset.pull_item_id(0, 2, 3).unwrap_err();
    assert!(matches!(err, DatasetError::IndexOutOfRange { index: 2, len: 2, .. }));
    let err = dataset.pull_item_id(1, 0, 3).unwrap_err();
    assert!(matches!(err, DatasetError::IndexOutOfRange { len: 0, .. }));
}

#[test]
fn test_get_item_runs_preprocess() {
    let fixture = two_image_fixture();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let dataset = CocoMotsDataset::new(fixture.write().with_img_size(48, 48))
        .unwrap()
        .with_preproc(move |mut frames: Vec<Frame>, input_dim: (u32, u32)| -> anyhow::Result<Vec<Frame>> {
            assert_eq!(input_dim, (48, 48));
            seen.fetch_add(1, Ordering::SeqCst);
            for frame in &mut frames {
                frame.labels.column_mut(CLASS_COL).fill(7.0);
            }
            Ok(frames)
        });

    let item = dataset.get_item(1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(item.frames.len(), 2);
    assert!(item.frames[0].labels.column(CLASS_COL).iter().all(|&c| c == 7.0));

    assert!(dataset.get_item(9).is_err());
}

#[test]
fn test_missing_image_is_an_error() {
    let fixture = two_image_fixture();
    let config = fixture.write();
    std::fs::remove_file(config.image_dir().join(CocoFixture::file_name(1))).unwrap();
    let dataset = CocoMotsDataset::new(config).unwrap();

    let err = dataset.pull_item(&mut StdRng::seed_from_u64(3)).unwrap_err();
    assert_eq!(err.category(), "io");
}
