use std::sync::Arc;

use rayon::prelude::*;

use crate::assets::decode::SourceImage;
use crate::depth::ingest::DepthMap;
use crate::depth::provider::ForegroundMask;
use crate::foundation::core::{CancelToken, Canvas};
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::band::{BandingPolicy, Bands, DepthBand, MAX_LAYERS};
use crate::layers::extend::{ExtensionStrategy, LayerExtender, ShiftBias, backfill_from_source};

/// Owning layer rank of every source pixel.
///
/// This is the single source of truth for layer membership; it is shared by all layers of a
/// stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankMap {
    width: u32,
    height: u32,
    ranks: Arc<Vec<u8>>,
}

impl RankMap {
    pub(crate) fn new(width: u32, height: u32, ranks: Vec<u8>) -> DepthwallResult<Self> {
        let canvas = Canvas::new(width, height)?;
        if ranks.len() != canvas.pixel_count() {
            return Err(DepthwallError::validation(format!(
                "rank map {width}x{height} expects {} entries, got {}",
                canvas.pixel_count(),
                ranks.len()
            )));
        }
        Ok(Self {
            width,
            height,
            ranks: Arc::new(ranks),
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

    /// Row-major ranks.
    pub fn ranks(&self) -> &[u8] {
        &self.ranks
    }

    /// Rank owning `(x, y)`.
    pub fn rank_at(&self, x: u32, y: u32) -> u8 {
        self.ranks[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Pixel count per rank for a stack of `n` layers.
    pub fn counts(&self, n: usize) -> Vec<usize> {
        let mut out = vec![0usize; n];
        for &r in self.ranks.iter() {
            if let Some(c) = out.get_mut(usize::from(r)) {
                *c += 1;
            }
        }
        out
    }
}

/// One depth layer: premultiplied RGBA8 at source resolution.
///
/// Owned pixels carry the source color at full alpha. Extension may give occlusion holes a
/// color; every other pixel is fully transparent. Alpha is therefore always 0 or 255.
#[derive(Clone, Debug)]
pub struct Layer {
    pub(crate) rank: u8,
    pub(crate) band: DepthBand,
    pub(crate) canvas: Canvas,
    pub(crate) pixels: Vec<u8>,
    pub(crate) rank_map: RankMap,
}

impl Layer {
    /// Layer rank, 0 nearest.
    pub fn rank(&self) -> usize {
        usize::from(self.rank)
    }

    /// Depth band this layer owns.
    pub fn band(&self) -> DepthBand {
        self.band
    }

    /// Parallax weight derived from the band's representative depth.
    pub fn parallax_factor(&self) -> f32 {
        self.band.parallax_factor()
    }

    /// Layer dimensions (equal to the source image).
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Premultiplied RGBA8 bytes.
    pub fn rgba8_premul(&self) -> &[u8] {
        &self.pixels
    }

    /// Membership map shared across the stack.
    pub fn rank_map(&self) -> &RankMap {
        &self.rank_map
    }

    /// `true` if `(x, y)` belongs to this layer's band.
    pub fn owns(&self, x: u32, y: u32) -> bool {
        self.rank_map.rank_at(x, y) == self.rank
    }

    /// Number of pixels owned by this layer.
    pub fn owned_pixel_count(&self) -> usize {
        self.rank_map
            .ranks()
            .iter()
            .filter(|&&r| r == self.rank)
            .count()
    }

    /// Premultiplied RGBA at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.canvas.width as usize) + (x as usize)) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// `true` when no pixel is transparent.
    pub fn is_fully_opaque(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 255)
    }

    /// Overwrite `(x, y)` with premultiplied `rgba`. Used by [`LayerExtender`] implementations.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = ((y as usize) * (self.canvas.width as usize) + (x as usize)) * 4;
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }

    pub(crate) fn copy_pixel(&mut self, from: usize, to: usize) {
        self.pixels.copy_within(from * 4..from * 4 + 4, to * 4);
    }
}

/// Identity of a decomposition: equal keys produce byte-identical stacks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DecomposeKey {
    /// Source image fingerprint.
    pub image: u64,
    /// Depth map fingerprint.
    pub depth: u64,
    /// Foreground mask fingerprint, if a mask was used.
    pub mask: Option<u64>,
    /// Layer count.
    pub count: u8,
    /// Banding policy.
    pub banding: BandingPolicy,
    /// Extension strategy.
    pub extension: ExtensionStrategy,
    /// Row tie-break.
    pub shift_bias: ShiftBias,
    /// Extension margin in pixels.
    pub margin_px: u32,
    /// Name of a plugged-in [`LayerExtender`]; `None` when `extension` was used.
    #[serde(default)]
    pub extender: Option<String>,
}

/// Ordered layers (nearest first) built from one image and depth map.
#[derive(Clone, Debug)]
pub struct LayerStack {
    bands: Bands,
    layers: Vec<Layer>,
    rank_map: RankMap,
    key: DecomposeKey,
}

impl LayerStack {
    pub(crate) fn from_parts(
        bands: Bands,
        rank_map: RankMap,
        pixels: Vec<Vec<u8>>,
        key: DecomposeKey,
    ) -> DepthwallResult<Self> {
        let canvas = Canvas::new(rank_map.width(), rank_map.height())?;
        let len = canvas.rgba_len()?;
        if pixels.len() != bands.count() || pixels.iter().any(|p| p.len() != len) {
            return Err(DepthwallError::validation(
                "layer buffers do not match band count or canvas size",
            ));
        }
        let layers = pixels
            .into_iter()
            .enumerate()
            .map(|(k, pixels)| Layer {
                rank: k as u8,
                band: bands.band(k),
                canvas,
                pixels,
                rank_map: rank_map.clone(),
            })
            .collect();
        Ok(Self {
            bands,
            layers,
            rank_map,
            key,
        })
    }

    /// Number of layers.
    pub fn count(&self) -> usize {
        self.layers.len()
    }

    /// Band partition.
    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    /// Layers, nearest first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Shared membership map.
    pub fn rank_map(&self) -> &RankMap {
        &self.rank_map
    }

    /// Decomposition identity.
    pub fn key(&self) -> &DecomposeKey {
        &self.key
    }

    /// Source dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.rank_map.width(),
            height: self.rank_map.height(),
        }
    }

    /// Index of the band containing depth `d`.
    pub fn band_index_for_depth(&self, d: f32) -> usize {
        self.bands.rank_of(d)
    }
}

impl DecomposeKey {
    /// Key that [`decompose_with`] would produce for these inputs.
    pub fn for_inputs(
        image: &SourceImage,
        depth: &DepthMap,
        mask: Option<&ForegroundMask>,
        n: usize,
        opts: &DecomposeOpts,
    ) -> Self {
        Self {
            image: image.fingerprint(),
            depth: depth.fingerprint(),
            mask: mask.map(ForegroundMask::fingerprint),
            count: n.min(usize::from(u8::MAX)) as u8,
            banding: opts.banding,
            extension: opts.extension,
            shift_bias: opts.shift_bias,
            margin_px: opts.margin_px,
            extender: None,
        }
    }
}

/// Knobs for [`decompose`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecomposeOpts {
    /// Banding policy.
    pub banding: BandingPolicy,
    /// Hole-filling strategy.
    pub extension: ExtensionStrategy,
    /// Row tie-break for [`ExtensionStrategy::RowExtrapolate`].
    pub shift_bias: ShiftBias,
    /// Maximum fill distance for all but the farthest layer.
    pub margin_px: u32,
    /// Optional worker thread count; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for DecomposeOpts {
    fn default() -> Self {
        Self {
            banding: BandingPolicy::EqualWidth,
            extension: ExtensionStrategy::RowExtrapolate,
            shift_bias: ShiftBias::Left,
            margin_px: 27,
            threads: None,
        }
    }
}

/// Split `image` into `n` depth layers.
///
/// See [`decompose_with`] for segmentation masks and cancellation.
pub fn decompose(
    image: &SourceImage,
    depth: &DepthMap,
    n: usize,
    opts: &DecomposeOpts,
) -> DepthwallResult<LayerStack> {
    decompose_with(image, depth, n, opts, None, &CancelToken::new())
}

/// Split `image` into `n` depth layers, nearest first.
///
/// Pixels in `mask` are forced into layer 0. Each layer is extended into occlusion holes; the
/// farthest layer is extended without bound and back-filled from the source so it is fully
/// opaque. The result depends only on the inputs. Returns [`DepthwallError::Cancelled`] once
/// `cancel` fires.
pub fn decompose_with(
    image: &SourceImage,
    depth: &DepthMap,
    n: usize,
    opts: &DecomposeOpts,
    mask: Option<&ForegroundMask>,
    cancel: &CancelToken,
) -> DepthwallResult<LayerStack> {
    let extender = opts.extension.extender(opts.shift_bias);
    run(image, depth, n, opts, mask, (extender.as_ref(), false), cancel)
}

/// [`decompose_with`] using `extender` instead of `opts.extension`.
///
/// Every layer the extender returns is checked against the [`LayerExtender`] rules; a violation
/// fails the run with [`DepthwallError::DecompositionFailed`]. The stack's key records
/// [`LayerExtender::name`].
pub fn decompose_with_extender(
    image: &SourceImage,
    depth: &DepthMap,
    n: usize,
    opts: &DecomposeOpts,
    mask: Option<&ForegroundMask>,
    extender: &dyn LayerExtender,
    cancel: &CancelToken,
) -> DepthwallResult<LayerStack> {
    run(image, depth, n, opts, mask, (extender, true), cancel)
}

/// Extender and whether it was supplied by the caller.
type Plugged<'a> = (&'a dyn LayerExtender, bool);

#[tracing::instrument(skip_all, fields(n = n, w = image.width(), h = image.height()))]
fn run(
    image: &SourceImage,
    depth: &DepthMap,
    n: usize,
    opts: &DecomposeOpts,
    mask: Option<&ForegroundMask>,
    extender: Plugged<'_>,
    cancel: &CancelToken,
) -> DepthwallResult<LayerStack> {
    if n == 0 || n > MAX_LAYERS {
        return Err(DepthwallError::validation(format!(
            "layer count must be in 1..={MAX_LAYERS}, got {n}"
        )));
    }
    if image.canvas() != depth.canvas() {
        return Err(DepthwallError::invalid_depth(format!(
            "depth map is {}x{} but image is {}x{}",
            depth.width(),
            depth.height(),
            image.width(),
            image.height()
        )));
    }
    if let Some(m) = mask
        && (m.width() != image.width() || m.height() != image.height())
    {
        return Err(DepthwallError::validation(
            "foreground mask must match the image size",
        ));
    }

    let build = || build_stack(image, depth, n, opts, mask, extender, cancel);
    match opts.threads {
        Some(t) => build_thread_pool(t)?.install(build),
        None => build(),
    }
}

fn build_stack(
    image: &SourceImage,
    depth: &DepthMap,
    n: usize,
    opts: &DecomposeOpts,
    mask: Option<&ForegroundMask>,
    (extender, plugged): Plugged<'_>,
    cancel: &CancelToken,
) -> DepthwallResult<LayerStack> {
    let bands = Bands::build(opts.banding, depth, n)?;
    cancel.check()?;

    let w = image.width() as usize;
    let values = depth.values();
    let mut ranks = vec![0u8; values.len()];
    ranks
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, r) in row.iter_mut().enumerate() {
                let i = y * w + x;
                let forced = mask.is_some_and(|m| m.is_foreground(i));
                *r = if forced {
                    0
                } else {
                    bands.rank_of(values[i]) as u8
                };
            }
        });
    let rank_map = RankMap::new(image.width(), image.height(), ranks)?;
    cancel.check()?;

    let layers = (0..n)
        .into_par_iter()
        .map(|k| {
            build_layer(
                k,
                n,
                image,
                &bands,
                &rank_map,
                (extender, plugged),
                opts.margin_px,
                cancel,
            )
        })
        .collect::<DepthwallResult<Vec<Layer>>>()?;
    cancel.check()?;

    let mut key = DecomposeKey::for_inputs(image, depth, mask, n, opts);
    if plugged {
        key.extender = Some(extender.name().to_owned());
    }
    tracing::debug!(counts = ?rank_map.counts(n), "decomposed");

    Ok(LayerStack {
        bands,
        layers,
        rank_map,
        key,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_layer(
    k: usize,
    n: usize,
    image: &SourceImage,
    bands: &Bands,
    rank_map: &RankMap,
    (extender, plugged): Plugged<'_>,
    margin_px: u32,
    cancel: &CancelToken,
) -> DepthwallResult<Layer> {
    cancel.check()?;
    let rank = k as u8;
    let src = image.rgba8();
    let mut pixels = vec![0u8; src.len()];
    for ((dst, s), &r) in pixels
        .chunks_exact_mut(4)
        .zip(src.chunks_exact(4))
        .zip(rank_map.ranks())
    {
        if r == rank {
            dst.copy_from_slice(s);
            dst[3] = 255;
        }
    }

    let layer = Layer {
        rank,
        band: bands.band(k),
        canvas: image.canvas(),
        pixels,
        rank_map: rank_map.clone(),
    };
    let farthest = k + 1 == n;
    let margin = if farthest { None } else { Some(margin_px) };
    let mut layer = extender.extend(layer, margin, cancel)?;
    if plugged {
        check_extension(&layer, rank, src, extender.name())?;
    }
    if farthest {
        backfill_from_source(&mut layer, image);
    }
    Ok(layer)
}

/// Enforce the [`LayerExtender`] rules on a layer returned by a plugged-in extender.
fn check_extension(layer: &Layer, rank: u8, src: &[u8], name: &str) -> DepthwallResult<()> {
    let broken = |what: &str| {
        DepthwallError::decomposition(format!("extender '{name}' {what} in layer {rank}"))
    };
    if layer.rank != rank || layer.pixels.len() != src.len() {
        return Err(broken("returned a different layer"));
    }
    for ((px, s), &r) in layer
        .pixels
        .chunks_exact(4)
        .zip(src.chunks_exact(4))
        .zip(layer.rank_map.ranks())
    {
        let transparent = px == [0, 0, 0, 0];
        match r.cmp(&rank) {
            std::cmp::Ordering::Equal if px != s => {
                return Err(broken("changed an owned pixel"));
            }
            std::cmp::Ordering::Greater if !transparent => {
                return Err(broken("painted a pixel owned by a farther layer"));
            }
            std::cmp::Ordering::Less if !transparent && px[3] != 255 => {
                return Err(broken("left a translucent fill"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn build_thread_pool(threads: usize) -> DepthwallResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(DepthwallError::validation(
            "decomposition 'threads' must be >= 1 when set",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| {
            DepthwallError::decomposition(format!("failed to build rayon thread pool: {e}"))
        })
}

#[cfg(test)]
#[path = "../../tests/unit/layers/decompose.rs"]
mod tests;
