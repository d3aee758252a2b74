//! COCO annotation file parsing, indexing and mask rasterization.

pub mod index;
pub mod mask;
pub mod types;

pub use index::CocoIndex;
pub use types::{Annotation, Category, Image, Segmentation};
