// SPDX-License-Identifier: MIT
// CPU scaler built on fast_image_resize (SIMD-accelerated).
// 3-channel u8 images and single-channel f32 masks, bilinear interpolation.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::{F32, U8x3};
use fir::{FilterType, ResizeAlg, ResizeOptions, Resizer};

use crate::presets::{ScalePlan, Size};

#[derive(Debug)]
pub enum ScaleError {
    BufferTooSmall,
    SourceSizeMismatch { expected: usize, actual: usize },
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ScaleError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::BufferTooSmall => write!(f, "Output buffer too small"),
            ScaleError::SourceSizeMismatch { expected, actual } => {
                write!(f, "Source buffer holds {} values, expected {}", actual, expected)
            }
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Bilinear interpolation, no antialiasing kernel; matches a classic linear resize.
fn linear_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear))
}

/// Resize a tightly packed 3-channel u8 image.
/// `dst` must hold at least `plan.out.w * plan.out.h * 3` bytes; only that prefix is written.
pub fn scale_rgb_cpu(
    resizer: &mut Resizer,
    src: &[u8],
    src_size: Size,
    plan: &ScalePlan,
    dst: &mut [u8],
) -> Result<(), ScaleError> {
    let src_len = src_size.area() * 3;
    if src.len() != src_len {
        return Err(ScaleError::SourceSizeMismatch { expected: src_len, actual: src.len() });
    }
    let dst_len = plan.out.area() * 3;
    if dst.len() < dst_len {
        return Err(ScaleError::BufferTooSmall);
    }

    if src_size == plan.out {
        dst[..dst_len].copy_from_slice(src);
        return Ok(());
    }

    let src_view = TypedImageRef::<U8x3>::from_buffer(src_size.w, src_size.h, src)?;
    let mut dst_image = TypedImage::<U8x3>::from_buffer(plan.out.w, plan.out.h, &mut dst[..dst_len])?;
    resizer.resize_typed::<U8x3>(&src_view, &mut dst_image, &linear_options())?;

    Ok(())
}

/// Resize a row-major f32 plane (one instance mask) to `plan.out`.
pub fn scale_mask_cpu(
    resizer: &mut Resizer,
    src: &[f32],
    src_size: Size,
    plan: &ScalePlan,
) -> Result<Vec<f32>, ScaleError> {
    if src.len() != src_size.area() {
        return Err(ScaleError::SourceSizeMismatch { expected: src_size.area(), actual: src.len() });
    }
    if src_size == plan.out {
        return Ok(src.to_vec());
    }

    // Built from typed pixels so the f32 buffer alignment is guaranteed.
    let pixels: Vec<F32> = src.iter().map(|&v| F32::new(v)).collect();
    let src_image = TypedImage::<F32>::from_pixels(src_size.w, src_size.h, pixels)
        .map_err(|_| ScaleError::ImageBuf(fir::ImageBufferError::InvalidBufferSize))?;
    let mut dst_image = TypedImage::<F32>::new(plan.out.w, plan.out.h);
    resizer.resize_typed::<F32>(&src_image, &mut dst_image, &linear_options())?;

    Ok(dst_image.pixels().iter().map(|p| p.0).collect())
}
