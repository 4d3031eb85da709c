use crate::depth::ingest::DepthMap;
use crate::foundation::error::{DepthwallError, DepthwallResult};

/// Largest supported layer count (ranks are stored as `u8`).
pub const MAX_LAYERS: usize = 64;

/// How band boundaries are placed over `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandingPolicy {
    /// Every band is `1/N` wide.
    #[default]
    EqualWidth,
    /// Boundaries at depth quantiles so each band holds about `total/N` pixels.
    EqualPopulation,
}

/// Half-open depth interval `[lo, hi)`; the farthest band is closed at 1.0.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DepthBand {
    /// Inclusive lower bound.
    pub lo: f32,
    /// Exclusive upper bound (inclusive for the farthest band).
    pub hi: f32,
}

impl DepthBand {
    /// Midpoint of the band.
    pub fn representative_depth(self) -> f32 {
        (self.lo + self.hi) / 2.0
    }

    /// Parallax weight: 1 at the camera, 0 at infinity.
    pub fn parallax_factor(self) -> f32 {
        (1.0 - self.representative_depth()).max(0.0)
    }
}

/// Ordered partition of `[0, 1]` into `N` contiguous bands, nearest first.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bands {
    bounds: Vec<f32>,
}

impl Bands {
    /// Build bands with `policy`.
    pub fn build(policy: BandingPolicy, depth: &DepthMap, n: usize) -> DepthwallResult<Self> {
        match policy {
            BandingPolicy::EqualWidth => Self::equal_width(n),
            BandingPolicy::EqualPopulation => Self::equal_population(depth, n),
        }
    }

    /// `n` bands of width `1/n`.
    pub fn equal_width(n: usize) -> DepthwallResult<Self> {
        validate_count(n)?;
        let mut bounds: Vec<f32> = (0..=n).map(|k| k as f32 / n as f32).collect();
        bounds[n] = 1.0;
        Ok(Self { bounds })
    }

    /// `n` bands whose interior boundaries sit on the depth quantiles `k/n`.
    pub fn equal_population(depth: &DepthMap, n: usize) -> DepthwallResult<Self> {
        validate_count(n)?;
        let mut sorted = depth.values().to_vec();
        sorted.sort_by(f32::total_cmp);
        let total = sorted.len();

        let mut bounds = Vec::with_capacity(n + 1);
        bounds.push(0.0f32);
        for k in 1..n {
            let idx = (k * total / n).min(total - 1);
            let prev = bounds[k - 1];
            bounds.push(sorted[idx].clamp(prev, 1.0));
        }
        bounds.push(1.0);
        Ok(Self { bounds })
    }

    /// Rebuild from stored boundaries (`N + 1` non-decreasing values from 0 to 1).
    pub fn from_bounds(bounds: Vec<f32>) -> DepthwallResult<Self> {
        if bounds.len() < 2 || bounds.len() > MAX_LAYERS + 1 {
            return Err(DepthwallError::validation(format!(
                "band boundaries must hold 2..={} values, got {}",
                MAX_LAYERS + 1,
                bounds.len()
            )));
        }
        let last = bounds.len() - 1;
        if bounds[0] != 0.0 || bounds[last] != 1.0 {
            return Err(DepthwallError::validation(
                "band boundaries must start at 0 and end at 1",
            ));
        }
        if bounds.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(DepthwallError::validation(
                "band boundaries must be non-decreasing",
            ));
        }
        Ok(Self { bounds })
    }

    /// Number of bands.
    pub fn count(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Boundaries, `count() + 1` values.
    pub fn bounds(&self) -> &[f32] {
        &self.bounds
    }

    /// Band `k` (0 nearest).
    pub fn band(&self, k: usize) -> DepthBand {
        DepthBand {
            lo: self.bounds[k],
            hi: self.bounds[k + 1],
        }
    }

    /// Iterate bands nearest first.
    pub fn iter(&self) -> impl Iterator<Item = DepthBand> + '_ {
        self.bounds.windows(2).map(|w| DepthBand { lo: w[0], hi: w[1] })
    }

    /// Index of the band containing depth `d` (clamped to `[0, 1]`).
    pub fn rank_of(&self, d: f32) -> usize {
        let d = crate::foundation::math::clamp01(d);
        let interior = &self.bounds[1..self.count()];
        interior.partition_point(|&b| b <= d)
    }
}

fn validate_count(n: usize) -> DepthwallResult<()> {
    if n == 0 || n > MAX_LAYERS {
        return Err(DepthwallError::validation(format!(
            "layer count must be in 1..={MAX_LAYERS}, got {n}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/layers/band.rs"]
mod tests;
