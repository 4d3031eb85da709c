use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDateTime;

use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::parallax::scheduler::LayerOffset;

/// A composited output frame.
///
/// Pixels are premultiplied RGBA8; the compositor guarantees every pixel is opaque, so the bytes
/// are also valid straight RGBA.
#[derive(Clone, Debug)]
pub struct RenderFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Wall-clock time shown by the clock, if one was drawn.
    pub timestamp: Option<NaiveDateTime>,
    /// Per-layer offsets the frame was composited with.
    pub offsets: Vec<LayerOffset>,
    /// Offset applied to the clock overlay.
    pub overlay_offset: Option<LayerOffset>,
    /// Project generation the layers came from.
    pub generation: u64,
}

impl RenderFrame {
    /// Frame dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// `true` if no pixel has alpha below 255.
    pub fn is_opaque(&self) -> bool {
        self.data.chunks_exact(4).all(|p| p[3] == 255)
    }

    /// Encode as a lossless PNG.
    pub fn to_png_bytes(&self) -> DepthwallResult<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| DepthwallError::validation("frame buffer size mismatch"))?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .context("encode frame png")?;
        Ok(buf)
    }

    /// Write the frame as PNG to `path`.
    pub fn write_png(&self, path: &Path) -> DepthwallResult<()> {
        let bytes = self.to_png_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
        Ok(())
    }
}
