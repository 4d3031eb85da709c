use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDateTime;

use crate::assets::color::Rgba8;
use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::foundation::math::mul_div255_u8;
use crate::overlay::glyphs::rasterize_builtin;
use crate::overlay::text::{CoverageMask, TextLayoutEngine};
use crate::render::composite::over;

/// Typeface used by the clock.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockFont {
    /// Embedded 5×7 bitmap face.
    #[default]
    Builtin,
    /// TrueType/OpenType file.
    File(PathBuf),
}

/// Where the overlay sits in the back-to-front order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPlacement {
    /// Above every layer.
    #[default]
    Top,
    /// Right above the layer whose band contains the clock depth; nearer layers cover it.
    InDepth,
}

/// Drop shadow under the time line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ShadowStyle {
    /// Offset in pixels, applied to both axes.
    pub offset_px: i32,
    /// Shadow color.
    pub color: Rgba8,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            offset_px: 4,
            color: Rgba8::new(0, 0, 0, 120),
        }
    }
}

/// Appearance and placement of the clock overlay.
///
/// Sizes and positions are fractions of the output canvas so one style fits every resolution.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClockStyle {
    /// Draw the clock at all.
    pub enabled: bool,
    /// Typeface.
    pub font: ClockFont,
    /// `strftime` pattern of the time line.
    pub time_format: String,
    /// `strftime` pattern of the date line; `None` hides it.
    pub date_format: Option<String>,
    /// Time line color.
    pub color: Rgba8,
    /// Date line color.
    pub date_color: Rgba8,
    /// Shadow under the time line.
    pub shadow: Option<ShadowStyle>,
    /// Horizontal anchor; the time line is centered on it.
    pub anchor_x: f32,
    /// Vertical anchor; the top edge of the time line.
    pub anchor_y: f32,
    /// Time line height as a fraction of the canvas height.
    pub time_size: f32,
    /// Date line height as a fraction of the canvas height.
    pub date_size: f32,
    /// Distance from the date's top edge to the time's top edge, fraction of canvas height.
    pub date_offset: f32,
    /// Depth of the clock in `[0, 1]`; picks the band whose motion it follows.
    pub depth: f32,
    /// Draw order.
    pub placement: OverlayPlacement,
}

impl Default for ClockStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            font: ClockFont::Builtin,
            time_format: "%H:%M".to_owned(),
            date_format: Some("%a %b %d".to_owned()),
            color: Rgba8::new(255, 255, 255, 255),
            date_color: Rgba8::new(255, 255, 255, 200),
            shadow: Some(ShadowStyle::default()),
            anchor_x: 0.5,
            anchor_y: 0.25,
            time_size: 0.15,
            date_size: 0.03,
            date_offset: 0.05,
            depth: 0.5,
            placement: OverlayPlacement::Top,
        }
    }
}

impl ClockStyle {
    /// Check patterns and ranges.
    pub fn validate(&self) -> DepthwallResult<()> {
        check_format("time_format", &self.time_format)?;
        if let Some(f) = &self.date_format {
            check_format("date_format", f)?;
        }
        for (name, v) in [
            ("anchor_x", self.anchor_x),
            ("anchor_y", self.anchor_y),
            ("depth", self.depth),
            ("date_offset", self.date_offset),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(DepthwallError::validation(format!(
                    "clock {name} must be in [0, 1], got {v}"
                )));
            }
        }
        for (name, v) in [("time_size", self.time_size), ("date_size", self.date_size)] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(DepthwallError::validation(format!(
                    "clock {name} must be in (0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

fn check_format(name: &str, pattern: &str) -> DepthwallResult<()> {
    if chrono::format::StrftimeItems::new(pattern)
        .any(|item| matches!(item, chrono::format::Item::Error))
    {
        return Err(DepthwallError::validation(format!(
            "clock {name} '{pattern}' is not a valid strftime pattern"
        )));
    }
    Ok(())
}

fn format_timestamp(ts: &NaiveDateTime, pattern: &str) -> DepthwallResult<String> {
    let mut out = String::new();
    write!(out, "{}", ts.format(pattern)).map_err(|_| {
        DepthwallError::validation(format!("cannot format timestamp with '{pattern}'"))
    })?;
    Ok(out)
}

/// Rendered clock: premultiplied RGBA8 covering only the text's bounding box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overlay {
    /// Buffer width.
    pub width: u32,
    /// Buffer height.
    pub height: u32,
    /// Top-left corner in canvas pixels, before parallax.
    pub origin: (i32, i32),
    /// Premultiplied RGBA8 bytes.
    pub rgba8_premul: Vec<u8>,
}

impl Overlay {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            origin: (0, 0),
            rgba8_premul: Vec::new(),
        }
    }

    /// `true` when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Render the clock for `timestamp` on a `canvas`-sized output.
///
/// One-shot form of [`ClockRenderer::render`].
pub fn render_overlay(
    timestamp: &NaiveDateTime,
    style: &ClockStyle,
    canvas: Canvas,
) -> DepthwallResult<Overlay> {
    let mut r = ClockRenderer::new(style.clone())?;
    Ok(Arc::unwrap_or_clone(r.render(timestamp, canvas)?))
}

struct CachedOverlay {
    time_text: String,
    date_text: Option<String>,
    canvas: Canvas,
    overlay: Arc<Overlay>,
}

/// Clock renderer that reuses the previous overlay while the displayed text is unchanged.
pub struct ClockRenderer {
    style: ClockStyle,
    font_bytes: Option<Arc<Vec<u8>>>,
    last: Option<CachedOverlay>,
}

impl ClockRenderer {
    /// Validate `style` and load its font file, if any.
    pub fn new(style: ClockStyle) -> DepthwallResult<Self> {
        style.validate()?;
        let font_bytes = match &style.font {
            ClockFont::Builtin => None,
            ClockFont::File(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("read clock font '{}'", path.display()))?;
                // Fail early on unusable fonts rather than on the first tick.
                TextLayoutEngine::new(&bytes)?;
                Some(Arc::new(bytes))
            }
        };
        Ok(Self {
            style,
            font_bytes,
            last: None,
        })
    }

    /// Style in use.
    pub fn style(&self) -> &ClockStyle {
        &self.style
    }

    /// Overlay for `timestamp`; cheap when the formatted text matches the previous call.
    pub fn render(
        &mut self,
        timestamp: &NaiveDateTime,
        canvas: Canvas,
    ) -> DepthwallResult<Arc<Overlay>> {
        if !self.style.enabled {
            return Ok(Arc::new(Overlay::empty()));
        }
        let time_text = format_timestamp(timestamp, &self.style.time_format)?;
        let date_text = match &self.style.date_format {
            Some(f) => Some(format_timestamp(timestamp, f)?),
            None => None,
        };

        if let Some(last) = &self.last
            && last.time_text == time_text
            && last.date_text == date_text
            && last.canvas == canvas
        {
            return Ok(last.overlay.clone());
        }

        let overlay = Arc::new(self.draw(&time_text, date_text.as_deref(), canvas)?);
        tracing::trace!(time = %time_text, "clock re-rendered");
        self.last = Some(CachedOverlay {
            time_text,
            date_text,
            canvas,
            overlay: overlay.clone(),
        });
        Ok(overlay)
    }

    fn rasterize(
        &self,
        engine: &mut Option<TextLayoutEngine>,
        text: &str,
        size_px: f32,
    ) -> DepthwallResult<CoverageMask> {
        let Some(bytes) = &self.font_bytes else {
            return Ok(rasterize_builtin(text, size_px));
        };
        let mut e = match engine.take() {
            Some(e) => e,
            None => TextLayoutEngine::new(bytes)?,
        };
        let out = e.rasterize(text, size_px);
        *engine = Some(e);
        out
    }

    fn draw(&self, time: &str, date: Option<&str>, canvas: Canvas) -> DepthwallResult<Overlay> {
        let s = &self.style;
        let (cw, ch) = (canvas.width as f32, canvas.height as f32);
        let mut engine = None;

        let time_mask = self.rasterize(&mut engine, time, s.time_size * ch)?;
        let date_mask = match date {
            Some(d) => self.rasterize(&mut engine, d, s.date_size * ch)?,
            None => CoverageMask::empty(),
        };

        let time_top = (s.anchor_y * ch).round() as i32;
        let time_left = (s.anchor_x * cw - time_mask.width as f32 / 2.0).round() as i32;
        let date_top = time_top - (s.date_offset * ch).round() as i32;
        let date_left = (s.anchor_x * cw - date_mask.width as f32 / 2.0).round() as i32;

        // (mask, left, top, color) in draw order.
        let mut items: Vec<(&CoverageMask, i32, i32, [u8; 4])> = Vec::new();
        if let Some(shadow) = s.shadow {
            items.push((
                &time_mask,
                time_left + shadow.offset_px,
                time_top + shadow.offset_px,
                shadow.color.to_premul(),
            ));
        }
        items.push((&time_mask, time_left, time_top, s.color.to_premul()));
        items.push((&date_mask, date_left, date_top, s.date_color.to_premul()));
        items.retain(|(m, ..)| !m.is_empty());
        if items.is_empty() {
            return Ok(Overlay::empty());
        }

        let x0 = items.iter().map(|i| i.1).min().unwrap_or(0);
        let y0 = items.iter().map(|i| i.2).min().unwrap_or(0);
        let x1 = items.iter().map(|i| i.1 + i.0.width as i32).max().unwrap_or(0);
        let y1 = items.iter().map(|i| i.2 + i.0.height as i32).max().unwrap_or(0);
        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);

        let mut rgba = vec![0u8; (w as usize) * (h as usize) * 4];
        for (mask, left, top, color) in items {
            let ox = (left - x0) as usize;
            let oy = (top - y0) as usize;
            for my in 0..mask.height as usize {
                let row = &mask.coverage[my * mask.width as usize..(my + 1) * mask.width as usize];
                for (mx, &cov) in row.iter().enumerate() {
                    if cov == 0 {
                        continue;
                    }
                    let src = [
                        mul_div255_u8(u16::from(color[0]), u16::from(cov)),
                        mul_div255_u8(u16::from(color[1]), u16::from(cov)),
                        mul_div255_u8(u16::from(color[2]), u16::from(cov)),
                        mul_div255_u8(u16::from(color[3]), u16::from(cov)),
                    ];
                    let i = ((oy + my) * w as usize + ox + mx) * 4;
                    let dst = [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]];
                    rgba[i..i + 4].copy_from_slice(&over(dst, src));
                }
            }
        }

        Ok(Overlay {
            width: w,
            height: h,
            origin: (x0, y0),
            rgba8_premul: rgba,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/clock.rs"]
mod tests;
