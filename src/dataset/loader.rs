//! Image and instance-mask loading for one sample.
//!
//! Images come back as `(H, W, 3)` u8 arrays in BGR channel order. Masks come back as
//! `(H, W, N)` f32 stacks, one slice per retained instance, in the same order as the
//! label rows of the sample.

use std::path::Path;

use coco_scale::cpu::{scale_mask_cpu, scale_rgb_cpu};
use coco_scale::{build_plan, Size};
use fast_image_resize::Resizer;
use image::ImageReader;
use ndarray::{s, Array2, Array3};
use tracing::debug;

use super::annotations::SampleRecord;
use crate::coco::CocoIndex;
use crate::error::{DatasetError, DatasetResult};

/// Decode an image file into a BGR `(H, W, 3)` array.
pub fn load_image(path: &Path) -> DatasetResult<Array3<u8>> {
    let reader = ImageReader::open(path)
        .map_err(|e| DatasetError::io_at("open image", path, e))?
        .with_guessed_format()
        .map_err(|e| DatasetError::io_at("probe image format", path, e))?;
    let decoded = reader
        .decode()
        .map_err(|e| DatasetError::decode(path, Some(e)))?;

    let rgb = decoded.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w == 0 || h == 0 {
        return Err(DatasetError::decode(path, None));
    }

    let mut raw = rgb.into_raw();
    for px in raw.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    Ok(Array3::from_shape_vec((h as usize, w as usize, 3), raw)?)
}

/// Fit an `(H, W, 3)` image inside `target_hw` with bilinear interpolation.
/// No padding is added.
pub fn resize_image(
    resizer: &mut Resizer,
    img: &Array3<u8>,
    target_hw: (u32, u32),
) -> DatasetResult<Array3<u8>> {
    let (h, w, _) = img.dim();
    let src_size = Size {
        w: w as u32,
        h: h as u32,
    };
    let plan = build_plan(src_size, Size::from_hw(target_hw));

    let src = img.as_standard_layout();
    let src = src.as_slice().unwrap_or_default();
    let mut dst = vec![0u8; plan.out.area() * 3];
    scale_rgb_cpu(resizer, src, src_size, &plan, &mut dst)?;

    Ok(Array3::from_shape_vec(
        (plan.out.h as usize, plan.out.w as usize, 3),
        dst,
    )?)
}

/// Decode then resize to fit `target_hw`.
pub fn load_resized_img(path: &Path, target_hw: (u32, u32)) -> DatasetResult<Array3<u8>> {
    let img = load_image(path)?;
    let mut resizer = Resizer::new();
    resize_image(&mut resizer, &img, target_hw)
}

/// Rasterize the retained instances of `record` at original resolution.
///
/// A sample without instances yields a `(target_h, target_w, 0)` stack.
pub fn load_mask(
    index: &CocoIndex,
    record: &SampleRecord,
    target_hw: (u32, u32),
) -> DatasetResult<Array3<f32>> {
    if record.ann_ids.is_empty() {
        return Ok(empty_stack(target_hw));
    }

    let (h, w) = (record.img_info.0 as usize, record.img_info.1 as usize);
    let mut stack = Array3::<f32>::zeros((h, w, record.ann_ids.len()));
    for (k, &ann_id) in record.ann_ids.iter().enumerate() {
        let ann = index.annotation(ann_id).ok_or_else(|| {
            DatasetError::annotation(
                "annotations",
                format!("annotation id {} is not indexed", ann_id),
            )
        })?;
        let mask = index.ann_to_mask(ann)?;
        if mask.dim() != (h, w) {
            return Err(DatasetError::annotation(
                format!("annotation {}", ann_id),
                format!(
                    "mask is {}x{} but image {} is {}x{}",
                    mask.nrows(),
                    mask.ncols(),
                    record.img_id,
                    h,
                    w
                ),
            ));
        }
        stack
            .slice_mut(s![.., .., k])
            .assign(&mask.mapv(f32::from));
    }

    debug!(
        img_id = record.img_id,
        instances = record.ann_ids.len(),
        "rasterized instance masks"
    );
    Ok(stack)
}

/// [`load_mask`] followed by a bilinear resize of every slice to fit `target_hw`.
///
/// The instance axis is kept even when only one instance is present.
pub fn load_resized_mask(
    index: &CocoIndex,
    record: &SampleRecord,
    target_hw: (u32, u32),
) -> DatasetResult<Array3<f32>> {
    let masks = load_mask(index, record, target_hw)?;
    let (h, w, n) = masks.dim();
    if n == 0 {
        return Ok(empty_stack(target_hw));
    }

    let src_size = Size {
        w: w as u32,
        h: h as u32,
    };
    let plan = build_plan(src_size, Size::from_hw(target_hw));
    let (oh, ow) = (plan.out.h as usize, plan.out.w as usize);

    let mut resizer = Resizer::new();
    let mut out = Array3::<f32>::zeros((oh, ow, n));
    for k in 0..n {
        let plane: Vec<f32> = masks.slice(s![.., .., k]).iter().copied().collect();
        let scaled = scale_mask_cpu(&mut resizer, &plane, src_size, &plan)?;
        let scaled = Array2::from_shape_vec((oh, ow), scaled)?;
        out.slice_mut(s![.., .., k]).assign(&scaled);
    }
    Ok(out)
}

fn empty_stack((h, w): (u32, u32)) -> Array3<f32> {
    Array3::zeros((h as usize, w as usize, 0))
}
