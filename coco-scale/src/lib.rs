// SPDX-License-Identifier: MIT
//! # coco-scale: Aspect-Preserving Resizing for Training Samples
//!
//! This crate computes resize plans and performs SIMD-accelerated CPU resizing for
//! dataset images and per-instance masks. Every sample is scaled by a single ratio
//! so that it fits inside a fixed target box without distortion; the same ratio is
//! applied to box coordinates so labels stay aligned with pixels.
//!
//! ## Key Components
//!
//! - [`presets`]: `Size`, `ScalePlan` and the ratio computation
//! - [`cpu`]: bilinear resizing of 3-channel u8 images and f32 mask planes
//!
//! ## Usage Example
//!
//! ```rust
//! use coco_scale::presets::{build_plan, Size};
//!
//! let plan = build_plan(Size { w: 640, h: 480 }, Size { w: 416, h: 416 });
//! assert_eq!((plan.out.w, plan.out.h), (416, 312));
//! assert!((plan.ratio - 0.65).abs() < 1e-12);
//! ```
//!
//! Pixel data is resized through [`cpu::scale_rgb_cpu`] into a caller-provided
//! buffer, so a long-lived [`fast_image_resize::Resizer`] can be reused across samples.

pub mod cpu;
pub mod presets;

pub use cpu::ScaleError;
pub use presets::{build_plan, ScalePlan, Size};
