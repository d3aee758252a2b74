// SPDX-License-Identifier: MIT
//! # Resize Plan Computation
//!
//! A plan fixes the output dimensions and the scale ratio for one source image.
//! The ratio is `min(target_h / h, target_w / w)`: the image is fitted inside the
//! target box with its aspect ratio preserved. Unlike a display scaler, upscaling is
//! allowed, because every training sample must fill the same input resolution.
//!
//! Output dimensions are truncated (not rounded) so they never exceed the target box,
//! and clamped to 1px so degenerate inputs still produce a valid image.

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    /// Build a size from a `(height, width)` pair, the order used by label metadata.
    pub fn from_hw((h, w): (u32, u32)) -> Self {
        Self { w, h }
    }

    /// Return the size as a `(height, width)` pair.
    pub fn hw(self) -> (u32, u32) {
        (self.h, self.w)
    }

    /// Number of pixels covered by this size.
    pub fn area(self) -> usize {
        (self.w as usize) * (self.h as usize)
    }
}

/// Complete resize plan computed from a source size and a target box.
#[derive(Clone, Copy, Debug)]
pub struct ScalePlan {
    /// Original input dimensions
    pub input: Size,
    /// Target box the output must fit into
    pub target: Size,
    /// Final computed output dimensions
    pub out: Size,
    /// Uniform scale factor applied to both axes
    pub ratio: f64,
}

impl ScalePlan {
    /// Map a coordinate from the source frame into the resized frame.
    #[inline]
    pub fn scale_coord(&self, v: f64) -> f64 {
        v * self.ratio
    }

    /// True when resizing would leave the pixels untouched.
    pub fn is_identity(&self) -> bool {
        self.input == self.out
    }
}

/// Compute the aspect-preserving plan that fits `input` inside `target`.
///
/// # Examples
///
/// ```rust
/// use coco_scale::presets::{build_plan, Size};
///
/// // Landscape input is limited by its width.
/// let plan = build_plan(Size { w: 640, h: 480 }, Size { w: 416, h: 416 });
/// assert_eq!(plan.out, Size { w: 416, h: 312 });
///
/// // Small inputs are scaled up.
/// let plan = build_plan(Size { w: 100, h: 200 }, Size { w: 416, h: 416 });
/// assert_eq!(plan.out, Size { w: 208, h: 416 });
/// ```
pub fn build_plan(input: Size, target: Size) -> ScalePlan {
    let (rh, rw) = axis_ratios(input, target);
    let ratio = rh.min(rw);
    let (w, h) = (input.w.max(1) as f64, input.h.max(1) as f64);

    // The limiting axis lands exactly on the target; float products can fall one ulp short.
    let out = if rh == rw {
        Size {
            w: target.w.max(1),
            h: target.h.max(1),
        }
    } else if rh < rw {
        Size {
            w: ((w * ratio) as u32).clamp(1, target.w.max(1)),
            h: target.h.max(1),
        }
    } else {
        Size {
            w: target.w.max(1),
            h: ((h * ratio) as u32).clamp(1, target.h.max(1)),
        }
    };

    ScalePlan {
        input,
        target,
        out,
        ratio,
    }
}

/// Ratio that fits `input` within `target` while preserving aspect ratio.
pub fn fit_ratio(input: Size, target: Size) -> f64 {
    let (rh, rw) = axis_ratios(input, target);
    rh.min(rw)
}

fn axis_ratios(input: Size, target: Size) -> (f64, f64) {
    let (w, h) = (input.w.max(1) as f64, input.h.max(1) as f64);
    (target.h as f64 / h, target.w as f64 / w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_width_limited() {
        let plan = build_plan(Size { w: 640, h: 480 }, Size { w: 416, h: 416 });
        assert!((plan.ratio - 0.65).abs() < 1e-12);
        assert_eq!(plan.out.hw(), (312, 416));
    }

    #[test]
    fn portrait_is_height_limited() {
        let plan = build_plan(Size { w: 427, h: 640 }, Size { w: 416, h: 416 });
        assert!((plan.ratio - 0.65).abs() < 1e-12);
        assert_eq!(plan.out.h, 416);
        // 427 * 0.65 = 277.55, truncated
        assert_eq!(plan.out.w, 277);
    }

    #[test]
    fn non_square_target() {
        let plan = build_plan(Size { w: 1000, h: 1000 }, Size { w: 800, h: 400 });
        assert!((plan.ratio - 0.4).abs() < 1e-12);
        assert_eq!(plan.out, Size { w: 400, h: 400 });
    }

    #[test]
    fn exact_fit_is_identity() {
        let plan = build_plan(Size { w: 416, h: 416 }, Size { w: 416, h: 416 });
        assert!(plan.is_identity());
        assert_eq!(plan.scale_coord(10.0), 10.0);
    }

    #[test]
    fn degenerate_output_clamped() {
        let plan = build_plan(Size { w: 10_000, h: 1 }, Size { w: 100, h: 100 });
        assert_eq!(plan.out.h, 1);
        assert_eq!(plan.out.w, 100);
    }
}
