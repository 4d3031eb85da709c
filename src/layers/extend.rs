use std::collections::VecDeque;

use crate::assets::decode::SourceImage;
use crate::foundation::core::CancelToken;
use crate::foundation::error::DepthwallResult;
use crate::layers::decompose::Layer;

/// Hole-filling strategy applied to each layer after banding.
///
/// Only pixels owned by nearer layers (occlusion holes) may be filled, and only with opaque
/// colors; owned pixels keep the source color and pixels owned by farther layers stay
/// transparent so those layers show through. `margin` bounds the fill distance in pixels; `None`
/// means unbounded.
///
/// Built-in strategies are picked with [`ExtensionStrategy`]; other implementations plug in
/// through [`decompose_with_extender`](crate::decompose_with_extender), which checks the
/// ownership rules on every layer they return.
pub trait LayerExtender: Send + Sync {
    /// Stable identifier, recorded in [`DecomposeKey`](crate::DecomposeKey) for plugged-in
    /// extenders.
    fn name(&self) -> &str;

    /// Fill occlusion holes of `layer`.
    fn extend(
        &self,
        layer: Layer,
        margin: Option<u32>,
        cancel: &CancelToken,
    ) -> DepthwallResult<Layer>;
}

/// Selectable extension strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStrategy {
    /// Nearest in-band pixel along the row, column as fallback.
    #[default]
    RowExtrapolate,
    /// Breadth-first dilation of the layer's own content.
    Dilate,
}

/// Preferred side when two in-band pixels are equally near along a row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftBias {
    /// Take the left neighbour.
    #[default]
    Left,
    /// Take the right neighbour.
    Right,
}

impl ExtensionStrategy {
    /// Instantiate the strategy.
    pub fn extender(self, bias: ShiftBias) -> Box<dyn LayerExtender> {
        match self {
            Self::RowExtrapolate => Box::new(RowExtrapolate { bias }),
            Self::Dilate => Box::new(Dilate),
        }
    }
}

/// Copies the nearest in-band color along the row (the primary shift axis).
///
/// Rows without an in-band pixel within the margin fall back to the nearest in-band pixel in the
/// same column.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowExtrapolate {
    /// Tie-break between equidistant left and right candidates.
    pub bias: ShiftBias,
}

const NONE: u32 = u32::MAX;

impl LayerExtender for RowExtrapolate {
    fn name(&self) -> &str {
        match self.bias {
            ShiftBias::Left => "row_extrapolate_left",
            ShiftBias::Right => "row_extrapolate_right",
        }
    }

    fn extend(
        &self,
        mut layer: Layer,
        margin: Option<u32>,
        cancel: &CancelToken,
    ) -> DepthwallResult<Layer> {
        let max_d = margin.unwrap_or(u32::MAX);
        if max_d == 0 {
            return Ok(layer);
        }
        let (w, h) = (layer.canvas.width as usize, layer.canvas.height as usize);
        let k = layer.rank;
        let rank_map = layer.rank_map.clone();
        let ranks = rank_map.ranks();

        let mut left = vec![NONE; w];
        let mut right = vec![NONE; w];
        let mut pending = vec![false; w * h];
        let mut any_pending = false;

        for y in 0..h {
            cancel.check()?;
            let row = &ranks[y * w..(y + 1) * w];

            let mut last = NONE;
            for x in 0..w {
                if row[x] == k {
                    last = x as u32;
                }
                left[x] = last;
            }
            let mut next = NONE;
            for x in (0..w).rev() {
                if row[x] == k {
                    next = x as u32;
                }
                right[x] = next;
            }

            for x in 0..w {
                if row[x] >= k {
                    continue;
                }
                let dl = (left[x] != NONE).then(|| x as u32 - left[x]);
                let dr = (right[x] != NONE).then(|| right[x] - x as u32);
                let pick = match (dl, dr) {
                    (Some(a), Some(b)) if a < b => Some((left[x], a)),
                    (Some(a), Some(b)) if b < a => Some((right[x], b)),
                    (Some(a), Some(_)) => match self.bias {
                        ShiftBias::Left => Some((left[x], a)),
                        ShiftBias::Right => Some((right[x], a)),
                    },
                    (Some(a), None) => Some((left[x], a)),
                    (None, Some(b)) => Some((right[x], b)),
                    (None, None) => None,
                };
                match pick {
                    Some((sx, d)) if d <= max_d => {
                        layer.copy_pixel(y * w + sx as usize, y * w + x);
                    }
                    _ => {
                        pending[y * w + x] = true;
                        any_pending = true;
                    }
                }
            }
        }

        if !any_pending {
            return Ok(layer);
        }

        let mut up = vec![NONE; h];
        let mut down = vec![NONE; h];
        for x in 0..w {
            if x % 64 == 0 {
                cancel.check()?;
            }
            let mut last = NONE;
            for y in 0..h {
                if ranks[y * w + x] == k {
                    last = y as u32;
                }
                up[y] = last;
            }
            let mut next = NONE;
            for y in (0..h).rev() {
                if ranks[y * w + x] == k {
                    next = y as u32;
                }
                down[y] = next;
            }
            for y in 0..h {
                if !pending[y * w + x] {
                    continue;
                }
                let du = (up[y] != NONE).then(|| y as u32 - up[y]);
                let dd = (down[y] != NONE).then(|| down[y] - y as u32);
                let pick = match (du, dd) {
                    (Some(a), Some(b)) if b < a => Some((down[y], b)),
                    (Some(a), _) => Some((up[y], a)),
                    (None, Some(b)) => Some((down[y], b)),
                    (None, None) => None,
                };
                if let Some((sy, d)) = pick
                    && d <= max_d
                {
                    layer.copy_pixel(sy as usize * w + x, y * w + x);
                }
            }
        }
        Ok(layer)
    }
}

/// Grows the layer's own content outward one pixel per step (4-neighbourhood), up to the margin.
///
/// Cheaper to reason about than [`RowExtrapolate`] but blurs structure along diagonals and leaves
/// holes farther than the margin transparent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dilate;

impl LayerExtender for Dilate {
    fn name(&self) -> &str {
        "dilate"
    }

    fn extend(
        &self,
        mut layer: Layer,
        margin: Option<u32>,
        cancel: &CancelToken,
    ) -> DepthwallResult<Layer> {
        let max_d = margin.unwrap_or(u32::MAX);
        if max_d == 0 {
            return Ok(layer);
        }
        let (w, h) = (layer.canvas.width as usize, layer.canvas.height as usize);
        let k = layer.rank;
        let rank_map = layer.rank_map.clone();
        let ranks = rank_map.ranks();

        // Owning source pixel for every reached pixel.
        let mut origin = vec![NONE; w * h];
        let mut queue: VecDeque<(usize, u32)> = VecDeque::new();
        for (i, &r) in ranks.iter().enumerate() {
            if r == k {
                origin[i] = i as u32;
                queue.push_back((i, 0));
            }
        }

        let mut popped = 0usize;
        while let Some((i, d)) = queue.pop_front() {
            popped += 1;
            if popped % w.max(1024) == 0 {
                cancel.check()?;
            }
            if d >= max_d {
                continue;
            }
            let (x, y) = (i % w, i / w);
            let neighbours = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for j in neighbours.into_iter().flatten() {
                if origin[j] != NONE || ranks[j] >= k {
                    continue;
                }
                origin[j] = origin[i];
                layer.copy_pixel(origin[i] as usize, j);
                queue.push_back((j, d + 1));
            }
        }
        Ok(layer)
    }
}

/// Give every still-transparent pixel its source color, making the layer fully opaque.
pub(crate) fn backfill_from_source(layer: &mut Layer, source: &SourceImage) {
    let src = source.rgba8();
    for (dst, s) in layer
        .pixels
        .chunks_exact_mut(4)
        .zip(src.chunks_exact(4))
    {
        if dst[3] == 0 {
            dst.copy_from_slice(s);
            dst[3] = 255;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layers/extend.rs"]
mod tests;
