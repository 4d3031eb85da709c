//! Depthwall turns a single photograph into a parallax desktop wallpaper with a live clock.
//!
//! The expensive work happens once per image: a depth estimate is normalized into a
//! [`DepthMap`], and [`decompose`] splits the photograph into a [`LayerStack`] of depth bands
//! whose occlusion holes are pre-filled. Every tick after that is cheap:
//!
//! - [`compute_offsets`] turns elapsed time or the pointer into per-layer offsets
//! - [`ClockRenderer`] draws the time and date into a small overlay
//! - [`composite`] merges layers and overlay back-to-front into an opaque [`RenderFrame`]
//!
//! [`Engine`] runs both paths: decomposition on a worker thread that newer requests supersede,
//! and ticks on a fixed cadence that hand frames to a [`WallpaperSink`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod depth;
mod foundation;
mod layers;
mod overlay;
mod parallax;
mod render;
mod session;

pub use crate::assets::color::Rgba8;
pub use crate::assets::decode::{SourceImage, decode_image, load_image};
pub use crate::depth::ingest::{
    DepthConvention, DepthMap, IngestOpts, RawDepth, RawDepthSamples, Resample, ingest,
};
pub use crate::depth::provider::{
    DepthImageFile, DepthProvider, ForegroundMask, MaskImageFile, SegmentationProvider,
    StaticDepth,
};
pub use crate::foundation::core::{Affine, CancelToken, Canvas, Point, Vec2};
pub use crate::foundation::error::{DepthwallError, DepthwallResult};
pub use crate::layers::band::{BandingPolicy, Bands, DepthBand, MAX_LAYERS};
pub use crate::layers::cache::{DiskLayerCache, LayerCache};
pub use crate::layers::decompose::{
    DecomposeKey, DecomposeOpts, Layer, LayerStack, RankMap, decompose, decompose_with,
    decompose_with_extender,
};
pub use crate::layers::extend::{
    Dilate, ExtensionStrategy, LayerExtender, RowExtrapolate, ShiftBias,
};
pub use crate::overlay::clock::{
    ClockFont, ClockRenderer, ClockStyle, Overlay, OverlayPlacement, ShadowStyle, render_overlay,
};
pub use crate::parallax::scheduler::{
    LayerOffset, ParallaxConfig, ParallaxMode, ParallaxState, compute_offsets, offset_for_depth,
};
pub use crate::render::composite::{PremulRgba8, over};
pub use crate::render::compositor::{OverlayDraw, composite};
pub use crate::render::frame::RenderFrame;
pub use crate::session::config::{
    EngineConfig, LayersConfig, OutputConfig, RenderConfig, SourceConfig,
};
pub use crate::session::events::{EVENT_QUEUE_CAPACITY, EngineEvent, EngineState};
pub use crate::session::project::{Providers, WallpaperProject};
pub use crate::session::render_loop::{Engine, TickOutcome};
pub use crate::session::sink::{CommandSink, InMemorySink, PngFileSink, WallpaperSink};
