//! # Core Infrastructure Module
//!
//! Storage shared by every sample: the disk-backed resized image cache.

pub mod image_cache;

pub use image_cache::ImageCache;
