use rayon::prelude::*;

use crate::foundation::core::{Affine, Canvas};
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::decompose::{Layer, LayerStack};
use crate::overlay::clock::{Overlay, OverlayPlacement};
use crate::parallax::scheduler::LayerOffset;
use crate::render::composite::{PremulRgba8, over, over_row_in_place};
use crate::render::frame::RenderFrame;

/// Clock overlay to draw in a composite.
#[derive(Clone, Copy, Debug)]
pub struct OverlayDraw<'a> {
    /// Rendered overlay.
    pub overlay: &'a Overlay,
    /// Parallax offset of the overlay's band (translation only).
    pub offset: LayerOffset,
    /// Draw order.
    pub placement: OverlayPlacement,
    /// Clock depth, used by [`OverlayPlacement::InDepth`].
    pub depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Layer(usize),
    Overlay,
}

/// Source row/column lookup for one layer at one offset.
struct SampleMap {
    cols: Vec<usize>,
    rows: Vec<usize>,
}

impl SampleMap {
    fn new(source: Canvas, canvas: Canvas, offset: &LayerOffset) -> Self {
        let fit = source.cover_scale(canvas);
        let forward = Affine::translate(canvas.center().to_vec2() + offset.translation())
            * Affine::scale(fit * offset.scale)
            * Affine::translate(-source.center().to_vec2());
        let [a, _, _, d, e, f] = forward.inverse().as_coeffs();

        let axis = |n: u32, max: u32, k: f64, t: f64| -> Vec<usize> {
            (0..n)
                .map(|o| {
                    let s = (k * (f64::from(o) + 0.5) + t).floor();
                    s.clamp(0.0, f64::from(max - 1)) as usize
                })
                .collect()
        };
        Self {
            cols: axis(canvas.width, source.width, a, e),
            rows: axis(canvas.height, source.height, d, f),
        }
    }
}

/// Merge `stack` back-to-front at `offsets`, plus an optional clock overlay, into a
/// `canvas`-sized frame.
///
/// Layers are cover-fitted to the canvas, translated and scaled about its center, and sampled
/// nearest-neighbour with edge clamping. Any pixel still translucent afterwards is completed with
/// the farthest layer's edge color, so the frame is always opaque.
#[tracing::instrument(level = "trace", skip_all)]
pub fn composite(
    stack: &LayerStack,
    offsets: &[LayerOffset],
    overlay: Option<OverlayDraw<'_>>,
    canvas: Canvas,
) -> DepthwallResult<RenderFrame> {
    canvas.validate()?;
    if offsets.len() != stack.count() || offsets.iter().enumerate().any(|(k, o)| o.rank != k) {
        return Err(DepthwallError::validation(
            "composite expects one offset per layer in rank order",
        ));
    }
    if offsets
        .iter()
        .any(|o| !o.dx.is_finite() || !o.dy.is_finite() || !(o.scale > 0.0))
    {
        return Err(DepthwallError::validation(
            "layer offsets must be finite with a positive scale",
        ));
    }
    if let Some(o) = &overlay
        && o.overlay.rgba8_premul.len() != (o.overlay.width as usize) * (o.overlay.height as usize) * 4
    {
        return Err(DepthwallError::validation("overlay buffer size mismatch"));
    }

    let source = stack.canvas();
    let layers = stack.layers();
    let maps: Vec<SampleMap> = offsets
        .iter()
        .map(|o| SampleMap::new(source, canvas, o))
        .collect();

    let n = layers.len();
    let mut steps: Vec<Step> = Vec::with_capacity(n + 1);
    let overlay_after = overlay.as_ref().and_then(|o| match o.placement {
        OverlayPlacement::Top => None,
        OverlayPlacement::InDepth => Some(stack.band_index_for_depth(o.depth)),
    });
    for k in (0..n).rev() {
        steps.push(Step::Layer(k));
        if overlay.is_some() && overlay_after == Some(k) {
            steps.push(Step::Overlay);
        }
    }
    if overlay.is_some() && overlay_after.is_none() {
        steps.push(Step::Overlay);
    }

    let overlay_pos = overlay.as_ref().map(|o| {
        (
            o.overlay.origin.0 + o.offset.dx.round() as i32,
            o.overlay.origin.1 + o.offset.dy.round() as i32,
        )
    });
    let edge = edge_color(&layers[n - 1]);

    let row_bytes = canvas.width as usize * 4;
    let mut data = vec![0u8; canvas.rgba_len()?];
    data.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(oy, row)| {
            for step in &steps {
                match *step {
                    Step::Layer(k) => draw_layer_row(row, &layers[k], &maps[k], oy, source),
                    Step::Overlay => {
                        if let (Some(o), Some(pos)) = (&overlay, overlay_pos) {
                            draw_overlay_row(row, o.overlay, pos, oy, canvas);
                        }
                    }
                }
            }
            for px in row.chunks_exact_mut(4) {
                if px[3] != 255 {
                    let out = over(edge, [px[0], px[1], px[2], px[3]]);
                    px.copy_from_slice(&out);
                }
            }
        });

    Ok(RenderFrame {
        width: canvas.width,
        height: canvas.height,
        data,
        timestamp: None,
        offsets: offsets.to_vec(),
        overlay_offset: overlay.map(|o| o.offset),
        generation: 0,
    })
}

fn draw_layer_row(row: &mut [u8], layer: &Layer, map: &SampleMap, oy: usize, source: Canvas) {
    let sy = map.rows[oy];
    let src_row_bytes = source.width as usize * 4;
    let src = &layer.rgba8_premul()[sy * src_row_bytes..(sy + 1) * src_row_bytes];
    for (px, &sx) in row.chunks_exact_mut(4).zip(&map.cols) {
        let s = &src[sx * 4..sx * 4 + 4];
        match s[3] {
            0 => {}
            255 => px.copy_from_slice(s),
            _ => {
                let out = over([px[0], px[1], px[2], px[3]], [s[0], s[1], s[2], s[3]]);
                px.copy_from_slice(&out);
            }
        }
    }
}

fn draw_overlay_row(row: &mut [u8], ov: &Overlay, pos: (i32, i32), oy: usize, canvas: Canvas) {
    if ov.width == 0 || ov.height == 0 {
        return;
    }
    let local_y = oy as i64 - i64::from(pos.1);
    if local_y < 0 || local_y >= i64::from(ov.height) {
        return;
    }
    let x_start = i64::from(pos.0).max(0);
    let x_end = (i64::from(pos.0) + i64::from(ov.width)).min(i64::from(canvas.width));
    if x_start >= x_end {
        return;
    }
    let ov_row_bytes = ov.width as usize * 4;
    let ly = local_y as usize;
    let lx0 = (x_start - i64::from(pos.0)) as usize;
    let lx1 = (x_end - i64::from(pos.0)) as usize;
    let src = &ov.rgba8_premul[ly * ov_row_bytes + lx0 * 4..ly * ov_row_bytes + lx1 * 4];
    over_row_in_place(&mut row[x_start as usize * 4..x_end as usize * 4], src);
}

/// Mean color of the layer's border pixels, forced opaque.
fn edge_color(layer: &Layer) -> PremulRgba8 {
    let c = layer.canvas();
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    let mut add = |x: u32, y: u32| {
        let p = layer.pixel(x, y);
        if p[3] > 0 {
            for i in 0..3 {
                sum[i] += u64::from(p[i]) * 255 / u64::from(p[3]);
            }
            count += 1;
        }
    };
    for x in 0..c.width {
        add(x, 0);
        add(x, c.height - 1);
    }
    for y in 0..c.height {
        add(0, y);
        add(c.width - 1, y);
    }
    if count == 0 {
        return [0, 0, 0, 255];
    }
    [
        (sum[0] / count).min(255) as u8,
        (sum[1] / count).min(255) as u8,
        (sum[2] / count).min(255) as u8,
        255,
    ]
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
