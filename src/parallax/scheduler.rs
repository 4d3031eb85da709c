use std::f64::consts::TAU;

use crate::foundation::core::{Canvas, Vec2};
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::decompose::LayerStack;

/// What drives the parallax phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallaxMode {
    /// Autonomous periodic motion from elapsed time.
    #[default]
    Breathing,
    /// Pointer displacement from the screen center.
    Pointer,
}

/// Motion parameters.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParallaxConfig {
    /// Phase source.
    pub mode: ParallaxMode,
    /// Peak horizontal displacement of the nearest possible depth, in pixels.
    pub amplitude_px: f64,
    /// Period of the breathing motion, in seconds.
    pub period_secs: f64,
    /// Vertical amplitude as a fraction of the horizontal one.
    pub vertical_ratio: f64,
    /// Peak extra zoom of the nearest possible depth (0 disables scaling).
    pub zoom: f64,
}

impl Default for ParallaxConfig {
    fn default() -> Self {
        Self {
            mode: ParallaxMode::Breathing,
            amplitude_px: 24.0,
            period_secs: 12.0,
            vertical_ratio: 0.5,
            zoom: 0.02,
        }
    }
}

impl ParallaxConfig {
    /// Check ranges.
    pub fn validate(&self) -> DepthwallResult<()> {
        if !self.amplitude_px.is_finite() || self.amplitude_px < 0.0 {
            return Err(DepthwallError::validation(
                "parallax amplitude_px must be finite and >= 0",
            ));
        }
        if !self.period_secs.is_finite() || self.period_secs <= 0.0 {
            return Err(DepthwallError::validation(
                "parallax period_secs must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.vertical_ratio) {
            return Err(DepthwallError::validation(
                "parallax vertical_ratio must be in [0, 1]",
            ));
        }
        if !(0.0..=0.5).contains(&self.zoom) {
            return Err(DepthwallError::validation("parallax zoom must be in [0, 0.5]"));
        }
        Ok(())
    }

    /// Extension margin, in source pixels, covering the largest shift between any two layers when
    /// a `source`-sized stack is cover-fitted to `canvas`, plus a small safety border.
    ///
    /// Translations differ by at most the amplitude and zoom factors by at most `zoom`, applied
    /// at up to half the canvas (plus the amplitude) from the center. Both are divided by the
    /// cover-fit scale to convert canvas pixels to source pixels.
    pub fn margin_px_for(&self, source: Canvas, canvas: Canvas) -> u32 {
        let fit = source.cover_scale(canvas);
        let half = f64::from(canvas.width.max(canvas.height)) / 2.0;
        let reach = (self.amplitude_px + self.zoom * (half + self.amplitude_px)) / fit;
        // Saturating cast: a degenerate fit yields an unbounded margin.
        (reach.ceil() as u32).saturating_add(2)
    }
}

/// Current phase input, written by the render loop each tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParallaxState {
    /// Seconds since the loop started.
    Time {
        /// Elapsed seconds.
        elapsed_secs: f64,
    },
    /// Pointer position normalized to `[-1, 1]` per axis, `(0, 0)` at the screen center.
    Pointer {
        /// Horizontal position.
        x: f64,
        /// Vertical position.
        y: f64,
    },
}

impl ParallaxState {
    /// Rest phase: every offset is zero.
    pub fn rest() -> Self {
        Self::Time { elapsed_secs: 0.0 }
    }

    /// Normalize a pointer position in canvas pixels.
    pub fn from_pointer_px(px: f64, py: f64, canvas: Canvas) -> Self {
        let c = canvas.center();
        Self::Pointer {
            x: (px - c.x) / c.x.max(1.0),
            y: (py - c.y) / c.y.max(1.0),
        }
    }
}

/// Displacement of one layer for one tick.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerOffset {
    /// Layer rank.
    pub rank: usize,
    /// Horizontal offset in pixels.
    pub dx: f64,
    /// Vertical offset in pixels.
    pub dy: f64,
    /// Scale about the canvas center.
    pub scale: f64,
}

impl LayerOffset {
    /// Offset as a vector.
    pub fn translation(&self) -> Vec2 {
        Vec2::new(self.dx, self.dy)
    }
}

/// Offsets for every layer of `stack`, nearest first.
///
/// Magnitude is `amplitude × parallax_factor × f(phase)` with `f` bounded by 1, so nearer layers
/// always move at least as far as farther ones.
pub fn compute_offsets(
    state: &ParallaxState,
    stack: &LayerStack,
    config: &ParallaxConfig,
) -> Vec<LayerOffset> {
    stack
        .layers()
        .iter()
        .map(|l| offset_for_factor(state, l.rank(), f64::from(l.parallax_factor()), config))
        .collect()
}

/// Offset of the band that contains `depth`, e.g. for the clock overlay.
pub fn offset_for_depth(
    state: &ParallaxState,
    depth: f32,
    stack: &LayerStack,
    config: &ParallaxConfig,
) -> LayerOffset {
    let k = stack.band_index_for_depth(depth);
    let factor = stack.bands().band(k).parallax_factor();
    offset_for_factor(state, k, f64::from(factor), config)
}

fn offset_for_factor(
    state: &ParallaxState,
    rank: usize,
    factor: f64,
    config: &ParallaxConfig,
) -> LayerOffset {
    let a = config.amplitude_px * factor;
    match *state {
        ParallaxState::Time { elapsed_secs } => {
            let phase = TAU * (elapsed_secs / config.period_secs);
            LayerOffset {
                rank,
                dx: a * phase.sin(),
                dy: a * config.vertical_ratio * (2.0 * phase).sin(),
                scale: 1.0 + config.zoom * factor * (1.0 - phase.cos()) / 2.0,
            }
        }
        ParallaxState::Pointer { x, y } => {
            let clamp = |v: f64| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
            LayerOffset {
                rank,
                dx: -a * clamp(x),
                dy: -a * clamp(y),
                scale: 1.0,
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/parallax/scheduler.rs"]
mod tests;
