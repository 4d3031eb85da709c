use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::assets::decode::{SourceImage, load_image};
use crate::depth::ingest::{DepthMap, ingest};
use crate::depth::provider::{DepthImageFile, DepthProvider, MaskImageFile, SegmentationProvider};
use crate::foundation::core::{CancelToken, Canvas, lock};
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::cache::{DiskLayerCache, LayerCache};
use crate::layers::decompose::{DecomposeKey, LayerStack, decompose_with};
use crate::overlay::clock::ClockRenderer;
use crate::parallax::scheduler::{ParallaxState, compute_offsets, offset_for_depth};
use crate::render::compositor::{OverlayDraw, composite};
use crate::render::frame::RenderFrame;
use crate::session::config::EngineConfig;
use crate::session::events::{EngineEvent, EventSender};

/// External collaborators a project is built from.
#[derive(Clone, Default)]
pub struct Providers {
    /// Source image; read from `source.image` when unset.
    pub image: Option<SourceImage>,
    /// Depth estimator; without one the image is flat.
    pub depth: Option<Arc<dyn DepthProvider>>,
    /// Foreground segmenter.
    pub segmentation: Option<Arc<dyn SegmentationProvider>>,
}

impl Providers {
    /// File-backed providers named by `config.source`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let src = &config.source;
        Self {
            image: None,
            depth: src
                .depth
                .as_ref()
                .map(|p| Arc::new(DepthImageFile::new(p)) as Arc<dyn DepthProvider>),
            segmentation: src.mask.as_ref().map(|p| {
                Arc::new(MaskImageFile::new(p).with_threshold(src.mask_threshold))
                    as Arc<dyn SegmentationProvider>
            }),
        }
    }

    /// Use an already decoded image.
    pub fn with_image(mut self, image: SourceImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Use `provider` for depth.
    pub fn with_depth(mut self, provider: impl DepthProvider + 'static) -> Self {
        self.depth = Some(Arc::new(provider));
        self
    }

    /// Use `provider` for foreground masks.
    pub fn with_segmentation(mut self, provider: impl SegmentationProvider + 'static) -> Self {
        self.segmentation = Some(Arc::new(provider));
        self
    }
}

/// Per-run context supplied by the engine.
pub(crate) struct GenerateCtx<'a> {
    pub(crate) memory: Option<&'a Mutex<LayerCache>>,
    pub(crate) disk: Option<&'a DiskLayerCache>,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) events: Option<&'a EventSender>,
    pub(crate) generation: u64,
}

/// A decomposed wallpaper: source, depth, and layers for one configuration snapshot.
///
/// Immutable once built. A new image or layer setting produces a new project.
pub struct WallpaperProject {
    config: Arc<EngineConfig>,
    source: SourceImage,
    depth: DepthMap,
    stack: Arc<LayerStack>,
    generation: u64,
    from_cache: bool,
}

impl WallpaperProject {
    /// Build a project outside the engine, using the configured disk cache if any.
    ///
    /// Every failure is reported as [`DepthwallError::DecompositionFailed`].
    pub fn generate(config: Arc<EngineConfig>, providers: &Providers) -> DepthwallResult<Self> {
        let disk = config.cache_dir.as_ref().map(DiskLayerCache::new);
        let cancel = CancelToken::new();
        let ctx = GenerateCtx {
            memory: None,
            disk: disk.as_ref(),
            cancel: &cancel,
            events: None,
            generation: 0,
        };
        Self::generate_with(config, providers, &ctx)
    }

    pub(crate) fn generate_with(
        config: Arc<EngineConfig>,
        providers: &Providers,
        ctx: &GenerateCtx<'_>,
    ) -> DepthwallResult<Self> {
        build(config, providers, ctx).map_err(DepthwallError::into_decomposition_failure)
    }

    /// Configuration snapshot the project was built from.
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Decoded source image.
    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    /// Normalized depth map.
    pub fn depth(&self) -> &DepthMap {
        &self.depth
    }

    /// Layers.
    pub fn stack(&self) -> &Arc<LayerStack> {
        &self.stack
    }

    /// Decomposition run that produced the project.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` when the layers were loaded from a cache instead of computed.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Output size: the configured canvas, else the source size.
    pub fn canvas(&self) -> Canvas {
        self.config.output_canvas(self.source.canvas())
    }

    /// A clock renderer for the project's clock style.
    pub fn clock_renderer(&self) -> DepthwallResult<ClockRenderer> {
        ClockRenderer::new(self.config.clock.clone())
    }

    /// Produce one frame: offsets for `state`, the clock for `at` (if given), then composite.
    pub fn render_frame(
        &self,
        state: &ParallaxState,
        at: Option<NaiveDateTime>,
        clock: &mut ClockRenderer,
    ) -> DepthwallResult<RenderFrame> {
        let canvas = self.canvas();
        let parallax = &self.config.parallax;
        let offsets = compute_offsets(state, &self.stack, parallax);

        let overlay = match at {
            Some(ts) if clock.style().enabled => Some(clock.render(&ts, canvas)?),
            _ => None,
        };
        let draw = overlay.as_deref().filter(|o| !o.is_empty()).map(|o| {
            let style = clock.style();
            OverlayDraw {
                overlay: o,
                offset: offset_for_depth(state, style.depth, &self.stack, parallax),
                placement: style.placement,
                depth: style.depth,
            }
        });

        let mut frame = composite(&self.stack, &offsets, draw, canvas)?;
        frame.timestamp = at;
        frame.generation = self.generation;
        Ok(frame)
    }
}

fn build(
    config: Arc<EngineConfig>,
    providers: &Providers,
    ctx: &GenerateCtx<'_>,
) -> DepthwallResult<WallpaperProject> {
    let source = match &providers.image {
        Some(img) => img.clone(),
        None => load_image(&config.source.image)?,
    };
    ctx.cancel.check()?;
    let canvas = source.canvas();

    let depth = match &providers.depth {
        Some(p) => {
            let raw = p.estimate(&source)?;
            ctx.cancel.check()?;
            match ingest(&raw, canvas, &config.ingest_opts()) {
                Ok(d) => d,
                Err(DepthwallError::InvalidDepthMap(reason)) => {
                    match ctx.events {
                        Some(ev) => ev.emit(EngineEvent::DepthFallback { reason }),
                        None => tracing::warn!(%reason, "depth map rejected, using flat depth"),
                    }
                    DepthMap::uniform(canvas, 0.5)?
                }
                Err(e) => return Err(e),
            }
        }
        None => {
            tracing::debug!("no depth provider, using flat depth");
            DepthMap::uniform(canvas, 0.5)?
        }
    };
    ctx.cancel.check()?;

    let mask = match &providers.segmentation {
        Some(p) => {
            let m = p.foreground_mask(&source)?;
            Some(if m.width() == canvas.width && m.height() == canvas.height {
                m
            } else {
                m.resized(canvas)
            })
        }
        None => None,
    };
    ctx.cancel.check()?;

    let n = config.layers.count;
    let opts = config.decompose_opts(canvas);
    let key = DecomposeKey::for_inputs(&source, &depth, mask.as_ref(), n, &opts);

    let mut from_cache = true;
    let stack = if let Some(hit) = ctx.memory.and_then(|m| lock(m).get(&key)) {
        tracing::debug!("layer stack from memory cache");
        hit
    } else if let Some(hit) = ctx.disk.and_then(|d| d.load(&key)) {
        tracing::debug!("layer stack from disk cache");
        let hit = Arc::new(hit);
        if let Some(m) = ctx.memory {
            lock(m).insert(hit.clone());
        }
        hit
    } else {
        from_cache = false;
        let stack = Arc::new(decompose_with(
            &source,
            &depth,
            n,
            &opts,
            mask.as_ref(),
            ctx.cancel,
        )?);
        if let Some(d) = ctx.disk
            && let Err(e) = d.store(&stack)
        {
            tracing::warn!(error = %e, "could not write layer cache");
        }
        if let Some(m) = ctx.memory {
            lock(m).insert(stack.clone());
        }
        stack
    };

    Ok(WallpaperProject {
        config,
        source,
        depth,
        stack,
        generation: ctx.generation,
        from_cache,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/session/project.rs"]
mod tests;
