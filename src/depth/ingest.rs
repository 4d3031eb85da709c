use std::sync::Arc;

use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::foundation::math::{Fingerprint, clamp01};

/// Sample storage for a raw depth estimate, in the encoding the estimator produced.
#[derive(Clone, Debug, PartialEq)]
pub enum RawDepthSamples {
    /// 8-bit integer depth.
    U8(Vec<u8>),
    /// 16-bit integer depth.
    U16(Vec<u16>),
    /// Floating point depth; may contain non-finite samples.
    F32(Vec<f32>),
}

impl RawDepthSamples {
    fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    fn to_f32(&self) -> Vec<f32> {
        match self {
            Self::U8(v) => v.iter().map(|&s| f32::from(s)).collect(),
            Self::U16(v) => v.iter().map(|&s| f32::from(s)).collect(),
            Self::F32(v) => v.clone(),
        }
    }
}

/// Unnormalized depth estimate of arbitrary size and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDepth {
    /// Width of the sample grid.
    pub width: u32,
    /// Height of the sample grid.
    pub height: u32,
    /// Row-major samples, `width * height` of them.
    pub samples: RawDepthSamples,
}

impl RawDepth {
    /// 8-bit samples.
    pub fn from_u8(width: u32, height: u32, samples: Vec<u8>) -> Self {
        Self {
            width,
            height,
            samples: RawDepthSamples::U8(samples),
        }
    }

    /// 16-bit samples.
    pub fn from_u16(width: u32, height: u32, samples: Vec<u16>) -> Self {
        Self {
            width,
            height,
            samples: RawDepthSamples::U16(samples),
        }
    }

    /// Float samples.
    pub fn from_f32(width: u32, height: u32, samples: Vec<f32>) -> Self {
        Self {
            width,
            height,
            samples: RawDepthSamples::F32(samples),
        }
    }

    /// Take the luma channel of a decoded depth image, keeping its bit depth.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        match img {
            image::DynamicImage::ImageRgb32F(_) | image::DynamicImage::ImageRgba32F(_) => {
                Self::from_f32(width, height, img.to_luma32f().into_raw())
            }
            image::DynamicImage::ImageLuma16(_)
            | image::DynamicImage::ImageLumaA16(_)
            | image::DynamicImage::ImageRgb16(_)
            | image::DynamicImage::ImageRgba16(_) => {
                Self::from_u16(width, height, img.to_luma16().into_raw())
            }
            _ => Self::from_u8(width, height, img.to_luma8().into_raw()),
        }
    }
}

/// Which end of the raw value range is closest to the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthConvention {
    /// Small raw values are near (metric depth).
    #[default]
    NearIsLow,
    /// Large raw values are near (relative inverse depth / disparity).
    NearIsHigh,
}

/// Resampling filter used when the raw grid and the source image differ in size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resample {
    /// Nearest sample.
    Nearest,
    /// Bilinear interpolation between the four surrounding samples.
    #[default]
    Bilinear,
}

/// Options for [`ingest`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestOpts {
    /// Orientation of the raw values.
    pub convention: DepthConvention,
    /// Filter used when resizing.
    pub resample: Resample,
}

/// Normalized depth buffer: one value in `[0, 1]` per source pixel, `0` nearest.
#[derive(Clone, Debug)]
pub struct DepthMap {
    width: u32,
    height: u32,
    values: Arc<Vec<f32>>,
    fingerprint: u64,
}

impl DepthMap {
    /// Wrap already-normalized values; each is clamped to `[0, 1]` (NaN becomes 0).
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> DepthwallResult<Self> {
        let canvas = Canvas::new(width, height)
            .map_err(|_| DepthwallError::invalid_depth("depth map dimensions must be non-zero"))?;
        if values.len() != canvas.pixel_count() {
            return Err(DepthwallError::invalid_depth(format!(
                "expected {} depth samples for {width}x{height}, got {}",
                canvas.pixel_count(),
                values.len()
            )));
        }
        let values: Vec<f32> = values.into_iter().map(clamp01).collect();

        let mut fp = Fingerprint::new("depthwall.depth");
        fp.write_u32(width);
        fp.write_u32(height);
        fp.write_f32s(&values);

        Ok(Self {
            width,
            height,
            values: Arc::new(values),
            fingerprint: fp.finish(),
        })
    }

    /// Constant map, used when a raw estimate is unusable.
    pub fn uniform(canvas: Canvas, value: f32) -> DepthwallResult<Self> {
        Self::new(
            canvas.width,
            canvas.height,
            vec![clamp01(value); canvas.pixel_count()],
        )
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as a [`Canvas`].
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Depth at `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Content hash over dimensions and values.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Normalize a raw estimate into a [`DepthMap`] of `target` size.
///
/// Non-finite samples take the farthest finite value. The grid is resized to `target`, then
/// linearly rescaled so the minimum maps to 0 and the maximum to 1 (inverted for
/// [`DepthConvention::NearIsHigh`]). A constant map yields a uniform 0.5 map.
#[tracing::instrument(skip(raw), fields(raw_w = raw.width, raw_h = raw.height))]
pub fn ingest(raw: &RawDepth, target: Canvas, opts: &IngestOpts) -> DepthwallResult<DepthMap> {
    if raw.width == 0 || raw.height == 0 {
        return Err(DepthwallError::invalid_depth(
            "raw depth dimensions must be non-zero",
        ));
    }
    let expected = (raw.width as usize) * (raw.height as usize);
    if raw.samples.len() != expected {
        return Err(DepthwallError::invalid_depth(format!(
            "raw depth {}x{} expects {expected} samples, got {}",
            raw.width,
            raw.height,
            raw.samples.len()
        )));
    }
    target
        .validate()
        .map_err(|e| DepthwallError::invalid_depth(format!("target size: {e}")))?;

    let mut values = raw.samples.to_f32();
    let (lo, hi) = finite_range(&values)
        .ok_or_else(|| DepthwallError::invalid_depth("depth map has no finite sample"))?;
    let farthest = match opts.convention {
        DepthConvention::NearIsLow => hi,
        DepthConvention::NearIsHigh => lo,
    };
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = farthest;
    }

    let values = if raw.width == target.width && raw.height == target.height {
        values
    } else {
        match opts.resample {
            Resample::Nearest => resize_nearest(&values, raw.width, raw.height, target),
            Resample::Bilinear => resize_bilinear(&values, raw.width, raw.height, target),
        }
    };

    let (lo, hi) = finite_range(&values)
        .ok_or_else(|| DepthwallError::invalid_depth("depth map has no finite sample"))?;
    let range = hi - lo;
    if range <= f32::EPSILON * hi.abs().max(1.0) {
        tracing::debug!("constant depth map; using uniform 0.5");
        return DepthMap::uniform(target, 0.5);
    }

    let normalized = values
        .into_iter()
        .map(|v| {
            let n = (v - lo) / range;
            match opts.convention {
                DepthConvention::NearIsLow => n,
                DepthConvention::NearIsHigh => 1.0 - n,
            }
        })
        .collect();
    DepthMap::new(target.width, target.height, normalized)
}

fn finite_range(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn resize_nearest(src: &[f32], sw: u32, sh: u32, target: Canvas) -> Vec<f32> {
    let (sw, sh) = (sw as usize, sh as usize);
    let (tw, th) = (target.width as usize, target.height as usize);
    let mut out = Vec::with_capacity(tw * th);
    for y in 0..th {
        let sy = ((y * sh) / th).min(sh - 1);
        for x in 0..tw {
            let sx = ((x * sw) / tw).min(sw - 1);
            out.push(src[sy * sw + sx]);
        }
    }
    out
}

fn resize_bilinear(src: &[f32], sw: u32, sh: u32, target: Canvas) -> Vec<f32> {
    let (sw, sh) = (sw as usize, sh as usize);
    let (tw, th) = (target.width as usize, target.height as usize);
    let scale_x = sw as f32 / tw as f32;
    let scale_y = sh as f32 / th as f32;

    let mut out = Vec::with_capacity(tw * th);
    for y in 0..th {
        // Pixel-center alignment.
        let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (sh - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let ty = fy - y0 as f32;
        for x in 0..tw {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (sw - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let tx = fx - x0 as f32;

            let v = src[y0 * sw + x0] * (1.0 - tx) * (1.0 - ty)
                + src[y0 * sw + x1] * tx * (1.0 - ty)
                + src[y1 * sw + x0] * (1.0 - tx) * ty
                + src[y1 * sw + x1] * tx * ty;
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/depth/ingest.rs"]
mod tests;
