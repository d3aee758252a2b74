//! Run-length encoded instance masks.
//!
//! Pixel coverage follows the reference COCO mask API exactly, so masks line up with
//! the boxes and areas recorded in the annotation file. RLE runs are laid out in
//! column-major order and always start with a run of zeros.

use ndarray::Array2;

use crate::error::{DatasetError, DatasetResult};

/// Run-length encoding of a binary `h x w` mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Alternating runs of 0s and 1s, starting with 0s.
    pub counts: Vec<u32>,
}

impl Rle {
    /// An all-zero mask.
    pub fn empty(h: u32, w: u32) -> Self {
        Self {
            h,
            w,
            counts: vec![h * w],
        }
    }

    fn len(&self) -> usize {
        self.h as usize * self.w as usize
    }
}

/// Foreground pixel count.
pub fn area(rle: &Rle) -> u64 {
    rle.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
}

/// Decode into a column-major `h * w` buffer; runs beyond the mask are ignored.
pub fn decode(rle: &Rle) -> Vec<u8> {
    let n = rle.len();
    let mut mask = vec![0u8; n];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in &rle.counts {
        let end = (idx + c as usize).min(n);
        mask[idx..end].fill(v);
        idx = end;
        v ^= 1;
    }
    mask
}

/// Uncompressed RLE as stored in annotation files for crowd regions.
pub fn fr_uncompressed(counts: &[u32], h: u32, w: u32) -> Rle {
    Rle {
        h,
        w,
        counts: counts.to_vec(),
    }
}

/// Parse the compressed string form: 5-bit groups offset by 48, bit 5 continues,
/// bit 4 of the last group sign-extends; counts from the third on are deltas
/// against the count two positions back.
pub fn fr_string(s: &str, h: u32, w: u32) -> DatasetResult<Rle> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::with_capacity(bytes.len());
    let mut p = 0usize;

    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0u32;
        loop {
            let c = *bytes.get(p).ok_or_else(|| {
                DatasetError::annotation("rle counts", "compressed counts end mid-value")
            })? as i64
                - 48;
            x |= (c & 0x1f) << (5 * k);
            p += 1;
            k += 1;
            if c & 0x20 == 0 {
                if c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
            if k >= 12 {
                return Err(DatasetError::annotation(
                    "rle counts",
                    "compressed count does not terminate",
                ));
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        counts.push(x as u32);
    }

    Ok(Rle { h, w, counts })
}

/// Rasterize one polygon given as flat `[x0, y0, x1, y1, ...]` pixel coordinates.
///
/// The boundary is walked on a 5x upsampled grid; a pixel is inside when its center
/// lies inside the polygon.
pub fn fr_poly(xy: &[f64], h: u32, w: u32) -> Rle {
    const SCALE: f64 = 5.0;
    let k = xy.len() / 2;
    if k == 0 {
        return Rle::empty(h, w);
    }

    let x: Vec<i64> = (0..=k).map(|j| (SCALE * xy[(j % k) * 2] + 0.5) as i64).collect();
    let y: Vec<i64> = (0..=k).map(|j| (SCALE * xy[(j % k) * 2 + 1] + 0.5) as i64).collect();

    // Dense boundary points on the upsampled grid.
    let mut u: Vec<i64> = Vec::new();
    let mut v: Vec<i64> = Vec::new();
    for j in 0..k {
        let (mut xs, mut xe, mut ys, mut ye) = (x[j], x[j + 1], y[j], y[j + 1]);
        let dx = (xe - xs).abs();
        let dy = (ys - ye).abs();
        let flip = (dx >= dy && xs > xe) || (dx < dy && ys > ye);
        if flip {
            std::mem::swap(&mut xs, &mut xe);
            std::mem::swap(&mut ys, &mut ye);
        }
        if dx >= dy {
            let s = if dx == 0 { 0.0 } else { (ye - ys) as f64 / dx as f64 };
            for d in 0..=dx {
                let t = if flip { dx - d } else { d };
                u.push(t + xs);
                v.push((ys as f64 + s * t as f64 + 0.5) as i64);
            }
        } else {
            let s = (xe - xs) as f64 / dy as f64;
            for d in 0..=dy {
                let t = if flip { dy - d } else { d };
                v.push(t + ys);
                u.push((xs as f64 + s * t as f64 + 0.5) as i64);
            }
        }
    }

    // Column crossings back on the pixel grid, as column-major offsets.
    let (hf, wf) = (h as f64, w as f64);
    let mut a: Vec<u64> = Vec::new();
    for j in 1..u.len() {
        if u[j] == u[j - 1] {
            continue;
        }
        let xd = (if u[j] < u[j - 1] { u[j] } else { u[j] - 1 }) as f64;
        let xd = (xd + 0.5) / SCALE - 0.5;
        if xd.floor() != xd || xd < 0.0 || xd > wf - 1.0 {
            continue;
        }
        let yd = (if v[j] < v[j - 1] { v[j] } else { v[j - 1] }) as f64;
        let yd = ((yd + 0.5) / SCALE - 0.5).clamp(0.0, hf).ceil();
        a.push(xd as u64 * h as u64 + yd as u64);
    }
    a.push(h as u64 * w as u64);
    a.sort_unstable();

    let mut prev = 0u64;
    for e in a.iter_mut() {
        let t = *e;
        *e -= prev;
        prev = t;
    }

    // Zero-length runs fold their neighbour into the previous run.
    let mut counts: Vec<u32> = Vec::with_capacity(a.len());
    counts.push(a[0] as u32);
    let mut j = 1;
    while j < a.len() {
        if a[j] > 0 {
            counts.push(a[j] as u32);
            j += 1;
        } else {
            j += 1;
            if j < a.len() {
                if let Some(last) = counts.last_mut() {
                    *last += a[j] as u32;
                }
                j += 1;
            }
        }
    }

    Rle { h, w, counts }
}

/// Union of several polygons belonging to one object, as a column-major buffer.
pub fn decode_polygons(polygons: &[Vec<f64>], h: u32, w: u32) -> Vec<u8> {
    let mut mask = vec![0u8; h as usize * w as usize];
    for poly in polygons {
        for (dst, src) in mask.iter_mut().zip(decode(&fr_poly(poly, h, w))) {
            *dst |= src;
        }
    }
    mask
}

/// Reorder a column-major buffer into a row-major `(h, w)` array.
pub fn to_array(column_major: &[u8], h: u32, w: u32) -> Array2<u8> {
    let (h, w) = (h as usize, w as usize);
    Array2::from_shape_fn((h, w), |(y, x)| column_major[x * h + y])
}
