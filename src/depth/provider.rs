use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::assets::decode::SourceImage;
use crate::depth::ingest::RawDepth;
use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::foundation::math::Fingerprint;

/// Depth-estimation collaborator. Implementations wrap model inference or precomputed data.
///
/// Calls are expected to finish in bounded time; the engine runs them off the tick path.
pub trait DepthProvider: Send + Sync {
    /// Estimate depth for `image`. Failures should be reported as
    /// [`DepthwallError::DepthEstimationFailed`].
    fn estimate(&self, image: &SourceImage) -> DepthwallResult<RawDepth>;
}

/// Foreground/background segmentation collaborator.
pub trait SegmentationProvider: Send + Sync {
    /// Foreground mask for `image`. Failures should be reported as
    /// [`DepthwallError::SegmentationFailed`].
    fn foreground_mask(&self, image: &SourceImage) -> DepthwallResult<ForegroundMask>;
}

/// Returns a fixed estimate for every image.
#[derive(Clone, Debug)]
pub struct StaticDepth(pub RawDepth);

impl DepthProvider for StaticDepth {
    fn estimate(&self, _image: &SourceImage) -> DepthwallResult<RawDepth> {
        Ok(self.0.clone())
    }
}

/// Reads a precomputed depth image (8/16-bit grayscale or float) from disk.
#[derive(Clone, Debug)]
pub struct DepthImageFile {
    path: PathBuf,
}

impl DepthImageFile {
    /// Provider reading `path` on every estimate.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the depth image.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DepthProvider for DepthImageFile {
    fn estimate(&self, _image: &SourceImage) -> DepthwallResult<RawDepth> {
        let img = image::open(&self.path).map_err(|e| {
            DepthwallError::depth_estimation(format!(
                "failed to read depth image '{}': {e}",
                self.path.display()
            ))
        })?;
        Ok(RawDepth::from_image(&img))
    }
}

/// Binary foreground mask at source resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForegroundMask {
    width: u32,
    height: u32,
    mask: Vec<bool>,
}

impl ForegroundMask {
    /// Wrap a row-major mask.
    pub fn new(width: u32, height: u32, mask: Vec<bool>) -> DepthwallResult<Self> {
        let canvas = Canvas::new(width, height)?;
        if mask.len() != canvas.pixel_count() {
            return Err(DepthwallError::validation(format!(
                "mask {width}x{height} expects {} entries, got {}",
                canvas.pixel_count(),
                mask.len()
            )));
        }
        Ok(Self {
            width,
            height,
            mask,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `true` where the pixel at row-major index `i` is foreground.
    pub fn is_foreground(&self, i: usize) -> bool {
        self.mask[i]
    }

    /// Number of foreground pixels.
    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Content hash used in cache keys.
    pub fn fingerprint(&self) -> u64 {
        let mut fp = Fingerprint::new("depthwall.mask");
        fp.write_u32(self.width);
        fp.write_u32(self.height);
        let packed: Vec<u8> = self.mask.iter().map(|&m| u8::from(m)).collect();
        fp.write_bytes(&packed);
        fp.finish()
    }

    /// Nearest-neighbour resample to `target`.
    pub fn resized(&self, target: Canvas) -> Self {
        if target.width == self.width && target.height == self.height {
            return self.clone();
        }
        let (sw, sh) = (self.width as usize, self.height as usize);
        let (tw, th) = (target.width as usize, target.height as usize);
        let mut mask = Vec::with_capacity(tw * th);
        for y in 0..th {
            let sy = ((y * sh) / th).min(sh - 1);
            for x in 0..tw {
                let sx = ((x * sw) / tw).min(sw - 1);
                mask.push(self.mask[sy * sw + sx]);
            }
        }
        Self {
            width: target.width,
            height: target.height,
            mask,
        }
    }
}

/// Reads a cut-out image: alpha above `threshold` marks foreground when the image has an alpha
/// channel, luma above `threshold` otherwise. The result is resized to the source image.
#[derive(Clone, Debug)]
pub struct MaskImageFile {
    path: PathBuf,
    threshold: u8,
}

impl MaskImageFile {
    /// Provider with the default threshold (127).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold: 127,
        }
    }

    /// Override the foreground threshold.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    fn read(&self) -> anyhow::Result<ForegroundMask> {
        let img = image::open(&self.path)
            .with_context(|| format!("read mask image '{}'", self.path.display()))?;
        let (width, height) = (img.width(), img.height());
        let mask: Vec<bool> = if img.color().has_alpha() {
            img.to_rgba8()
                .pixels()
                .map(|p| p.0[3] > self.threshold)
                .collect()
        } else {
            img.to_luma8()
                .pixels()
                .map(|p| p.0[0] > self.threshold)
                .collect()
        };
        Ok(ForegroundMask::new(width, height, mask)?)
    }
}

impl SegmentationProvider for MaskImageFile {
    fn foreground_mask(&self, image: &SourceImage) -> DepthwallResult<ForegroundMask> {
        let mask = self
            .read()
            .map_err(|e| DepthwallError::segmentation(format!("{e:#}")))?;
        Ok(mask.resized(image.canvas()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/depth/provider.rs"]
mod tests;
