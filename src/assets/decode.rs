use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::foundation::math::{Fingerprint, mul_div255_u8};

/// Decoded source photograph.
///
/// Pixels are RGBA8 with alpha flattened over black, so every pixel is opaque and the buffer is
/// valid both as straight and premultiplied RGBA. `fingerprint` identifies the content for
/// caching.
#[derive(Clone, Debug)]
pub struct SourceImage {
    width: u32,
    height: u32,
    rgba8: Arc<Vec<u8>>,
    fingerprint: u64,
}

impl SourceImage {
    /// Wrap straight RGBA8 pixels, flattening any translucency over black.
    pub fn from_rgba8(width: u32, height: u32, mut rgba8: Vec<u8>) -> DepthwallResult<Self> {
        let expected = Canvas::new(width, height)?.rgba_len()?;
        if rgba8.len() != expected {
            return Err(DepthwallError::validation(format!(
                "source image expects {expected} bytes for {width}x{height}, got {}",
                rgba8.len()
            )));
        }
        flatten_over_black_in_place(&mut rgba8);

        let mut fp = Fingerprint::new("depthwall.image");
        fp.write_u32(width);
        fp.write_u32(height);
        fp.write_bytes(&rgba8);

        Ok(Self {
            width,
            height,
            rgba8: Arc::new(rgba8),
            fingerprint: fp.finish(),
        })
    }

    /// Convert an already decoded `image` buffer.
    pub fn from_dynamic(img: image::DynamicImage) -> DepthwallResult<Self> {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.into_raw())
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

    /// Opaque RGBA8 bytes, row-major.
    pub fn rgba8(&self) -> &[u8] {
        &self.rgba8
    }

    /// Content hash over dimensions and pixels.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// RGBA of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.rgba8[i],
            self.rgba8[i + 1],
            self.rgba8[i + 2],
            self.rgba8[i + 3],
        ]
    }
}

/// Decode encoded image bytes (PNG, JPEG, ...) into a [`SourceImage`].
pub fn decode_image(bytes: &[u8]) -> DepthwallResult<SourceImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    SourceImage::from_dynamic(dyn_img)
}

/// Read and decode an image file.
#[tracing::instrument]
pub fn load_image(path: &Path) -> DepthwallResult<SourceImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    decode_image(&bytes)
}

fn flatten_over_black_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        px[0] = mul_div255_u8(u16::from(px[0]), a);
        px[1] = mul_div255_u8(u16::from(px[1]), a);
        px[2] = mul_div255_u8(u16::from(px[2]), a);
        px[3] = 255;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
