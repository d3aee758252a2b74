//! # Resized Image Cache
//!
//! A disk-backed, memory-mapped array holding one resized image per sample, so
//! decode and resize run once instead of once per epoch.
//!
//! ## Layout
//!
//! ```text
//! offset(i) = i * H * W * 3
//!
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │ slot 0       │ slot 1       │ ... │ slot N-1     │   u8, row-major, no header
//! │ H x W x 3    │ H x W x 3    │     │ H x W x 3    │
//! └──────────────┴──────────────┴─────┴──────────────┘
//! ```
//!
//! Each resized image sits in the top-left corner of its slot; the remainder of the
//! slot stays zero. `H x W` is the configured target size.
//!
//! ## Population
//!
//! A missing file is created at full length, mapped, and filled by a bounded rayon
//! pool of `min(8, cores)` workers. Every worker owns a disjoint slot from
//! `par_chunks_mut`, so the mapping is written without locks. The file is flushed,
//! then re-mapped read-write for the lifetime of the cache.
//!
//! An existing file is reused as-is. Only its byte length is checked: content from a
//! different target size with the same length is not detected.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use memmap2::{MmapMut, MmapOptions};
use ndarray::Array3;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::error::{DatasetError, DatasetResult};

/// Upper bound on cache population workers.
pub const MAX_CACHE_WORKERS: usize = 8;

/// Memory-mapped array of `count` fixed-shape `(H, W, 3)` u8 slots.
#[derive(Debug)]
pub struct ImageCache {
    path: PathBuf,
    mmap: MmapMut,
    count: usize,
    slot_hw: (u32, u32),
}

impl ImageCache {
    /// Open the cache at `path`, building it first when the file does not exist.
    ///
    /// `loader(i)` must return the resized `(h, w, 3)` image of sample `i`, with
    /// `h` and `w` no larger than `slot_hw`. It runs concurrently on the worker pool.
    pub fn open_or_build<F>(
        path: impl AsRef<Path>,
        count: usize,
        slot_hw: (u32, u32),
        loader: F,
    ) -> DatasetResult<Self>
    where
        F: Fn(usize) -> DatasetResult<Array3<u8>> + Sync,
    {
        let path = path.as_ref();
        if count == 0 {
            return Err(DatasetError::cache(
                path.display().to_string(),
                "no samples to cache",
            ));
        }
        let expected_len = count * slot_len(slot_hw);

        if path.exists() {
            let actual_len = std::fs::metadata(path)
                .map_err(|e| DatasetError::io_at("stat image cache", path, e))?
                .len();
            if actual_len != expected_len as u64 {
                return Err(DatasetError::cache(
                    path.display().to_string(),
                    format!(
                        "file holds {} bytes, expected {} for {} samples at {}x{}",
                        actual_len, expected_len, count, slot_hw.0, slot_hw.1
                    ),
                )
                .with_operation("open image cache")
                .with_recovery_suggestion("delete the cache file so it is rebuilt"));
            }
            warn!(
                path = %path.display(),
                "reusing existing image cache; delete it if img_size or the image set changed"
            );
        } else {
            let gib = expected_len as f64 / (1u64 << 30) as f64;
            warn!(
                path = %path.display(),
                samples = count,
                "caching resized images needs {:.1} GiB of disk; the first run takes a while",
                gib
            );
            build(path, count, slot_hw, &loader)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap: map_read_write(path)?,
            count,
            slot_hw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot shape as `(height, width)`.
    pub fn slot_hw(&self) -> (u32, u32) {
        self.slot_hw
    }

    /// Copy of the top-left `resized_hw` region of slot `index`.
    pub fn slot(&self, index: usize, resized_hw: (u32, u32)) -> DatasetResult<Array3<u8>> {
        if index >= self.count {
            return Err(DatasetError::index_out_of_range("cache slot", index, self.count));
        }
        let (sh, sw) = self.slot_hw;
        let (h, w) = resized_hw;
        if h > sh || w > sw {
            return Err(DatasetError::cache(
                self.path.display().to_string(),
                format!("region {}x{} exceeds slot {}x{}", h, w, sh, sw),
            ));
        }

        let len = slot_len(self.slot_hw);
        let slot = &self.mmap[index * len..(index + 1) * len];
        let (h, w, sw) = (h as usize, w as usize, sw as usize);
        let mut out = Vec::with_capacity(h * w * 3);
        for row in slot.chunks_exact(sw * 3).take(h) {
            out.extend_from_slice(&row[..w * 3]);
        }
        Ok(Array3::from_shape_vec((h, w, 3), out)?)
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "releasing image cache mapping");
    }
}

fn slot_len((h, w): (u32, u32)) -> usize {
    h as usize * w as usize * 3
}

/// Number of population workers: `min(8, available cores)`.
pub fn worker_count() -> usize {
    num_cpus::get().clamp(1, MAX_CACHE_WORKERS)
}

fn build<F>(path: &Path, count: usize, slot_hw: (u32, u32), loader: &F) -> DatasetResult<()>
where
    F: Fn(usize) -> DatasetResult<Array3<u8>> + Sync,
{
    let started = Instant::now();
    let len = slot_len(slot_hw);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| DatasetError::io_at("create image cache", path, e))?;
    file.set_len((count * len) as u64)
        .map_err(|e| DatasetError::io_at("size image cache", path, e))?;
    // SAFETY: the file was just created by this process and is not shared yet.
    let mut mmap = unsafe { MmapOptions::new().map_mut(&file) }
        .map_err(|e| DatasetError::io_at("map image cache", path, e))?;

    let workers = worker_count();
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("coco-cache-{}", i))
        .build()
        .map_err(|e| DatasetError::external("rayon", e))?;

    let done = AtomicUsize::new(0);
    let step = (count / 10).max(1);
    let filled = pool.install(|| {
        mmap.par_chunks_mut(len)
            .enumerate()
            .try_for_each(|(index, slot)| {
                let img = loader(index)?;
                copy_into_slot(slot, &img, slot_hw, index)?;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % step == 0 || n == count {
                    info!(cached = n, total = count, "caching images");
                }
                Ok(())
            })
    });

    let flushed = filled.and_then(|()| {
        mmap.flush()
            .map_err(|e| DatasetError::io_at("flush image cache", path, e))
    });
    drop(mmap);

    if let Err(e) = flushed {
        // A half-written cache would be trusted on the next run.
        let _ = std::fs::remove_file(path);
        return Err(e);
    }

    info!(
        path = %path.display(),
        samples = count,
        workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "image cache populated"
    );
    Ok(())
}

fn copy_into_slot(
    slot: &mut [u8],
    img: &Array3<u8>,
    slot_hw: (u32, u32),
    index: usize,
) -> DatasetResult<()> {
    let (h, w, c) = img.dim();
    let (sh, sw) = (slot_hw.0 as usize, slot_hw.1 as usize);
    if c != 3 || h > sh || w > sw {
        return Err(DatasetError::cache(
            format!("slot {}", index),
            format!("image {}x{}x{} does not fit slot {}x{}x3", h, w, c, sh, sw),
        ));
    }

    let img = img.as_standard_layout();
    let src = img.as_slice().unwrap_or_default();
    for (dst_row, src_row) in slot.chunks_exact_mut(sw * 3).zip(src.chunks_exact(w * 3)) {
        dst_row[..w * 3].copy_from_slice(src_row);
    }
    Ok(())
}

fn map_read_write(path: &Path) -> DatasetResult<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| DatasetError::io_at("open image cache", path, e))?;
    // SAFETY: the cache file is owned by this dataset; callers must not truncate it
    // while the mapping is alive.
    unsafe { MmapOptions::new().map_mut(&file) }
        .map_err(|e| DatasetError::io_at("map image cache", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(h: usize, w: usize, v: u8) -> Array3<u8> {
        Array3::from_elem((h, w, 3), v)
    }

    #[test]
    fn build_fills_slots_top_left_with_zero_padding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_resized_cache_test.array");

        let cache = ImageCache::open_or_build(&path, 3, (4, 6), |i| {
            Ok(solid(2 + i % 2, 6 - i, i as u8 + 1))
        })
        .unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            (3 * 4 * 6 * 3) as u64
        );

        let slot = cache.slot(1, (3, 5)).unwrap();
        assert_eq!(slot.dim(), (3, 5, 3));
        assert!(slot.iter().all(|&v| v == 2));

        // Padding beyond the resized region stays zero.
        let full = cache.slot(1, (4, 6)).unwrap();
        assert_eq!(full[[3, 0, 0]], 0);
        assert_eq!(full[[0, 5, 0]], 0);
        assert_eq!(full[[2, 4, 2]], 2);
    }

    #[test]
    fn existing_cache_is_reused_without_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.array");
        ImageCache::open_or_build(&path, 2, (2, 2), |_| Ok(solid(2, 2, 7))).unwrap();

        let calls = AtomicUsize::new(0);
        let cache = ImageCache::open_or_build(&path, 2, (2, 2), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(solid(2, 2, 9))
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(cache.slot(0, (2, 2)).unwrap().iter().all(|&v| v == 7));
    }

    #[test]
    fn wrong_length_cache_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.array");
        ImageCache::open_or_build(&path, 2, (2, 2), |_| Ok(solid(2, 2, 1))).unwrap();

        let err = ImageCache::open_or_build(&path, 2, (4, 4), |_| Ok(solid(4, 4, 1))).unwrap_err();
        assert_eq!(err.category(), "cache");
    }

    #[test]
    fn failed_population_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.array");
        let result = ImageCache::open_or_build(&path, 4, (2, 2), |i| {
            if i == 2 {
                Err(DatasetError::decode("broken.jpg", None))
            } else {
                Ok(solid(2, 2, 1))
            }
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn oversized_image_and_bad_index_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.array");
        assert!(ImageCache::open_or_build(&path, 1, (2, 2), |_| Ok(solid(3, 2, 1))).is_err());

        let cache = ImageCache::open_or_build(&path, 1, (2, 2), |_| Ok(solid(2, 2, 1))).unwrap();
        assert_eq!(cache.slot(1, (2, 2)).unwrap_err().category(), "index_out_of_range");
        assert!(cache.slot(0, (3, 2)).is_err());
    }

    #[test]
    fn worker_count_is_bounded() {
        let n = worker_count();
        assert!((1..=MAX_CACHE_WORKERS).contains(&n));
    }
}
