use std::time::Duration;

/// Convenience result type used across depthwall.
pub type DepthwallResult<T> = Result<T, DepthwallError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum DepthwallError {
    /// Depth data that cannot be normalized (zero size, wrong sample count, no finite value).
    #[error("invalid depth map: {0}")]
    InvalidDepthMap(String),

    /// Layer decomposition did not produce a layer stack.
    #[error("decomposition failed: {0}")]
    DecompositionFailed(String),

    /// The depth collaborator failed.
    #[error("depth estimation failed: {0}")]
    DepthEstimationFailed(String),

    /// The segmentation collaborator failed.
    #[error("segmentation failed: {0}")]
    SegmentationFailed(String),

    /// The wallpaper sink could not apply a frame.
    #[error("wallpaper apply failed: {0}")]
    WallpaperApplyFailed(String),

    /// A decomposition ran past its deadline.
    #[error("render timed out after {0:?}")]
    RenderTimeout(Duration),

    /// Invalid user-provided configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Work was superseded by a newer request.
    #[error("cancelled")]
    Cancelled,

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DepthwallError {
    /// Build a [`DepthwallError::InvalidDepthMap`] value.
    pub fn invalid_depth(msg: impl Into<String>) -> Self {
        Self::InvalidDepthMap(msg.into())
    }

    /// Build a [`DepthwallError::DecompositionFailed`] value.
    pub fn decomposition(msg: impl Into<String>) -> Self {
        Self::DecompositionFailed(msg.into())
    }

    /// Build a [`DepthwallError::DepthEstimationFailed`] value.
    pub fn depth_estimation(msg: impl Into<String>) -> Self {
        Self::DepthEstimationFailed(msg.into())
    }

    /// Build a [`DepthwallError::SegmentationFailed`] value.
    pub fn segmentation(msg: impl Into<String>) -> Self {
        Self::SegmentationFailed(msg.into())
    }

    /// Build a [`DepthwallError::WallpaperApplyFailed`] value.
    pub fn apply(msg: impl Into<String>) -> Self {
        Self::WallpaperApplyFailed(msg.into())
    }

    /// Build a [`DepthwallError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`DepthwallError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Fold an error raised while building a project into the decomposition taxonomy.
    ///
    /// Cancellation and timeouts keep their identity; everything else becomes
    /// [`DepthwallError::DecompositionFailed`] carrying the original message.
    pub fn into_decomposition_failure(self) -> Self {
        match self {
            Self::Cancelled | Self::RenderTimeout(_) | Self::DecompositionFailed(_) => self,
            other => Self::DecompositionFailed(other.to_string()),
        }
    }

    /// `true` when the error only reports that work was superseded.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
