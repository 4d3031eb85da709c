use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::depth::ingest::{DepthConvention, IngestOpts, Resample};
use crate::foundation::core::Canvas;
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::band::{BandingPolicy, MAX_LAYERS};
use crate::layers::decompose::DecomposeOpts;
use crate::layers::extend::{ExtensionStrategy, ShiftBias};
use crate::overlay::clock::{ClockFont, ClockStyle};
use crate::parallax::scheduler::ParallaxConfig;

/// Where the source image and its analysis inputs come from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Photograph to turn into a wallpaper.
    pub image: PathBuf,
    /// Precomputed depth image; without one the image is treated as flat.
    pub depth: Option<PathBuf>,
    /// Foreground cut-out image.
    pub mask: Option<PathBuf>,
    /// Mask values above this count as foreground.
    pub mask_threshold: u8,
    /// Orientation of the depth image values.
    pub convention: DepthConvention,
    /// Resampling used when the depth image size differs from the photograph.
    pub resample: Resample,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            depth: None,
            mask: None,
            mask_threshold: 127,
            convention: DepthConvention::NearIsHigh,
            resample: Resample::Bilinear,
        }
    }
}

/// Layer decomposition settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayersConfig {
    /// Number of depth layers.
    pub count: usize,
    /// How depth bands are chosen.
    pub banding: BandingPolicy,
    /// Hole filling strategy.
    pub extension: ExtensionStrategy,
    /// Row tie-break for row extrapolation.
    pub shift_bias: ShiftBias,
    /// Fill distance; derived from the parallax amplitude when unset.
    pub margin_px: Option<u32>,
    /// Worker threads for decomposition; `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            count: 5,
            banding: BandingPolicy::EqualWidth,
            extension: ExtensionStrategy::RowExtrapolate,
            shift_bias: ShiftBias::Left,
            margin_px: None,
            threads: None,
        }
    }
}

/// Render loop settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Time between ticks.
    pub tick_interval_ms: u64,
    /// Output size; the source size when unset.
    pub canvas: Option<Canvas>,
    /// Upper bound on one decomposition run.
    pub decomposition_timeout_ms: u64,
    /// Align ticks to multiples of the interval on the wall clock.
    pub align_ticks: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            canvas: None,
            decomposition_timeout_ms: 120_000,
            align_ticks: true,
        }
    }
}

/// Where frames go.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory.
    pub dir: PathBuf,
    /// PNG file name inside `dir`.
    pub file_name: String,
    /// Program and arguments run after each write; `{path}` is replaced by the PNG path.
    pub command: Option<Vec<String>>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
            file_name: "wallpaper.png".to_owned(),
            command: None,
        }
    }
}

impl OutputConfig {
    /// Full path of the written PNG.
    pub fn frame_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Immutable engine configuration, usually loaded from JSON.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source inputs.
    pub source: SourceConfig,
    /// Decomposition.
    pub layers: LayersConfig,
    /// Motion.
    pub parallax: ParallaxConfig,
    /// Clock overlay.
    pub clock: ClockStyle,
    /// Cadence and output size.
    pub render: RenderConfig,
    /// Frame destination.
    pub output: OutputConfig,
    /// On-disk layer cache root.
    pub cache_dir: Option<PathBuf>,
    /// In-memory layer cache capacity.
    pub cache_capacity: usize,
    /// `tracing` level name used by the CLI.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            layers: LayersConfig::default(),
            parallax: ParallaxConfig::default(),
            clock: ClockStyle::default(),
            render: RenderConfig::default(),
            output: OutputConfig::default(),
            cache_dir: None,
            cache_capacity: 4,
            log_level: "info".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a JSON reader. Paths are kept as written.
    pub fn from_reader<R: std::io::Read>(r: R) -> DepthwallResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| DepthwallError::serde(format!("parse engine config JSON: {e}")))
    }

    /// Parse a configuration file; relative paths resolve against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> DepthwallResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            DepthwallError::validation(format!("open config '{}': {e}", path.display()))
        })?;
        let mut cfg = Self::from_reader(BufReader::new(f))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.resolve_paths(base);
        Ok(cfg)
    }

    /// Rebase every relative path onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.source.image);
        if let Some(p) = &mut self.source.depth {
            fix(p);
        }
        if let Some(p) = &mut self.source.mask {
            fix(p);
        }
        if let ClockFont::File(p) = &mut self.clock.font {
            fix(p);
        }
        fix(&mut self.output.dir);
        if let Some(p) = &mut self.cache_dir {
            fix(p);
        }
    }

    /// Check every section.
    pub fn validate(&self) -> DepthwallResult<()> {
        if self.layers.count == 0 || self.layers.count > MAX_LAYERS {
            return Err(DepthwallError::validation(format!(
                "layers.count must be in 1..={MAX_LAYERS}, got {}",
                self.layers.count
            )));
        }
        if self.layers.threads == Some(0) {
            return Err(DepthwallError::validation("layers.threads must be non-zero"));
        }
        self.parallax.validate()?;
        self.clock.validate()?;
        if self.render.tick_interval_ms == 0 {
            return Err(DepthwallError::validation(
                "render.tick_interval_ms must be non-zero",
            ));
        }
        if self.render.decomposition_timeout_ms == 0 {
            return Err(DepthwallError::validation(
                "render.decomposition_timeout_ms must be non-zero",
            ));
        }
        if let Some(c) = self.render.canvas {
            c.validate()?;
        }
        if self.output.file_name.is_empty()
            || self.output.file_name.contains(['/', '\\'])
        {
            return Err(DepthwallError::validation(
                "output.file_name must be a plain file name",
            ));
        }
        if self.output.command.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(DepthwallError::validation(
                "output.command must name a program",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(DepthwallError::validation("cache_capacity must be at least 1"));
        }
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| {
                DepthwallError::validation(format!("unknown log_level '{}'", self.log_level))
            })?;
        Ok(())
    }

    /// Output size for a `source`-sized image: the configured canvas, else the source size.
    pub fn output_canvas(&self, source: Canvas) -> Canvas {
        self.render.canvas.unwrap_or(source)
    }

    /// Decomposition options for a `source`-sized image. Without a pinned margin, the margin
    /// covers the parallax reach at the output canvas size.
    pub fn decompose_opts(&self, source: Canvas) -> DecomposeOpts {
        DecomposeOpts {
            banding: self.layers.banding,
            extension: self.layers.extension,
            shift_bias: self.layers.shift_bias,
            margin_px: self
                .layers
                .margin_px
                .unwrap_or_else(|| {
                    self.parallax
                        .margin_px_for(source, self.output_canvas(source))
                }),
            threads: self.layers.threads,
        }
    }

    /// Depth ingest options for this configuration.
    pub fn ingest_opts(&self) -> IngestOpts {
        IngestOpts {
            convention: self.source.convention,
            resample: self.source.resample,
        }
    }

    /// Tick cadence.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.render.tick_interval_ms)
    }

    /// Decomposition time limit.
    pub fn decomposition_timeout(&self) -> Duration {
        Duration::from_millis(self.render.decomposition_timeout_ms)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/config.rs"]
mod tests;
