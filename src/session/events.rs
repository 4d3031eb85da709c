use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::Duration;

use chrono::NaiveDateTime;

/// Render loop lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No project, or stopped.
    Idle,
    /// A decomposition is running; ticks are not rendered.
    Decomposing,
    /// A project is published and ticks render.
    Ready,
}

/// Things the engine reports to its owner.
///
/// Every event is also written to `tracing`.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// Lifecycle transition.
    StateChanged(EngineState),
    /// A decomposition run began.
    DecompositionStarted {
        /// Run generation.
        generation: u64,
        /// Requested layer count.
        layers: usize,
    },
    /// A run finished and its project was published.
    DecompositionFinished {
        /// Run generation.
        generation: u64,
        /// `true` when the layers came from a cache.
        cached: bool,
        /// Wall time of the run.
        elapsed: Duration,
    },
    /// A run failed; the previous project, if any, stays in use.
    DecompositionFailed {
        /// Run generation.
        generation: u64,
        /// Rendered error.
        error: String,
    },
    /// A run was discarded because a newer one was requested.
    DecompositionSuperseded {
        /// Generation of the discarded run.
        generation: u64,
    },
    /// The depth input was unusable and a flat map was used instead.
    DepthFallback {
        /// Why the depth input was rejected.
        reason: String,
    },
    /// A frame reached the wallpaper sink.
    FrameApplied {
        /// Project generation of the frame.
        generation: u64,
        /// Clock time shown.
        timestamp: NaiveDateTime,
    },
    /// The sink rejected a frame; the next tick retries.
    ApplyFailed {
        /// Rendered error.
        error: String,
    },
    /// Frame production failed for one tick.
    TickFailed {
        /// Rendered error.
        error: String,
    },
    /// A tick was dropped because the previous one was still running.
    TickSkipped,
    /// The cadence thread woke up late and dropped ticks.
    TicksMissed {
        /// Number of dropped ticks.
        count: u64,
    },
}

/// Events buffered for the owner before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Logs events and forwards them to the owner's receiver, if still alive.
///
/// The queue is bounded by [`EVENT_QUEUE_CAPACITY`]; an owner that never drains it loses new
/// events instead of growing memory.
#[derive(Clone, Debug)]
pub(crate) struct EventSender {
    tx: SyncSender<EngineEvent>,
}

impl EventSender {
    pub(crate) fn new(tx: SyncSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::DecompositionFailed { generation, error } => {
                tracing::error!(generation, %error, "decomposition failed");
            }
            EngineEvent::DepthFallback { reason } => {
                tracing::warn!(%reason, "depth map rejected, using flat depth");
            }
            EngineEvent::ApplyFailed { error } => {
                tracing::warn!(%error, "wallpaper apply failed");
            }
            EngineEvent::TickFailed { error } => tracing::warn!(%error, "tick failed"),
            EngineEvent::TicksMissed { count } => tracing::warn!(count, "ticks missed"),
            EngineEvent::DecompositionFinished {
                generation,
                cached,
                elapsed,
            } => tracing::info!(generation, cached, ?elapsed, "layers ready"),
            EngineEvent::StateChanged(state) => tracing::debug!(?state, "engine state"),
            other => tracing::debug!(event = ?other, "engine event"),
        }
        // Already logged; a full or dropped receiver only loses the copy.
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            tracing::trace!(?event, "event queue full, dropping event");
        }
    }
}
