use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::error::{DepthwallError, DepthwallResult};

pub use kurbo::{Affine, Point, Vec2};

/// Pixel dimensions of a buffer or output surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Build a canvas, rejecting zero-sized dimensions.
    pub fn new(width: u32, height: u32) -> DepthwallResult<Self> {
        let c = Self { width, height };
        c.validate()?;
        Ok(c)
    }

    /// Check both dimensions are non-zero and the RGBA8 byte length fits in memory.
    pub fn validate(self) -> DepthwallResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DepthwallError::validation(format!(
                "canvas must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        self.rgba_len().map(|_| ())
    }

    /// Number of pixels.
    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Byte length of a tightly packed RGBA8 buffer of this size.
    pub fn rgba_len(self) -> DepthwallResult<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| DepthwallError::validation("canvas byte size overflow"))
    }

    /// Canvas center in pixel coordinates.
    pub fn center(self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// Uniform scale that makes a buffer of this size cover `target` ("cover" fit).
    pub fn cover_scale(self, target: Canvas) -> f64 {
        (f64::from(target.width) / f64::from(self.width))
            .max(f64::from(target.height) / f64::from(self.height))
    }
}

/// Cooperative cancellation flag shared between a requester and a worker.
///
/// Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// `true` once [`CancelToken::cancel`] was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Return [`DepthwallError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> DepthwallResult<()> {
        if self.is_cancelled() {
            return Err(DepthwallError::Cancelled);
        }
        Ok(())
    }
}

/// Lock `m`, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
