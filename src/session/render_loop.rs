use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};

use crate::foundation::core::{CancelToken, lock};
use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::layers::cache::{DiskLayerCache, LayerCache};
use crate::overlay::clock::ClockRenderer;
use crate::parallax::scheduler::{ParallaxMode, ParallaxState};
use crate::session::config::EngineConfig;
use crate::session::events::{EVENT_QUEUE_CAPACITY, EngineEvent, EngineState, EventSender};
use crate::session::project::{GenerateCtx, Providers, WallpaperProject};
use crate::session::sink::WallpaperSink;

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame reached the sink.
    Applied {
        /// Project generation of the frame.
        generation: u64,
    },
    /// The frame was rendered but the sink rejected it.
    ApplyFailed,
    /// Rendering failed.
    Failed,
    /// The previous tick was still running.
    Skipped,
    /// No project is published, or the engine is not `Ready`.
    NotReady,
}

struct Slot {
    state: EngineState,
    project: Option<Arc<WallpaperProject>>,
    generation: u64,
    cancel: Option<CancelToken>,
    config: Arc<EngineConfig>,
}

struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
    providers: Providers,
    memory: Mutex<LayerCache>,
    disk: Option<DiskLayerCache>,
    sink: Mutex<Box<dyn WallpaperSink>>,
    clock: Mutex<ClockRenderer>,
    pointer: Mutex<Option<(f64, f64)>>,
    tick_busy: AtomicBool,
    stopping: Mutex<bool>,
    stop_cv: Condvar,
    missed: AtomicU64,
    started: Instant,
    events: EventSender,
}

/// Drives decomposition and the per-tick render path for one wallpaper.
///
/// `Idle → Decomposing → Ready → Decomposing → … → Idle`. Decomposition runs on its own thread
/// and is superseded by newer requests; only `Ready` renders ticks. Published projects are
/// immutable and swapped atomically, so a frame never mixes layer sets.
pub struct Engine {
    shared: Arc<Shared>,
    events: Mutex<Option<Receiver<EngineEvent>>>,
    cadence: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validate `config` and set up an idle engine writing to `sink`.
    pub fn new(
        config: EngineConfig,
        providers: Providers,
        sink: impl WallpaperSink + 'static,
    ) -> DepthwallResult<Self> {
        config.validate()?;
        let clock = ClockRenderer::new(config.clock.clone())?;
        let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_CAPACITY);
        let shared = Shared {
            memory: Mutex::new(LayerCache::new(config.cache_capacity)),
            disk: config.cache_dir.as_ref().map(DiskLayerCache::new),
            slot: Mutex::new(Slot {
                state: EngineState::Idle,
                project: None,
                generation: 0,
                cancel: None,
                config: Arc::new(config),
            }),
            changed: Condvar::new(),
            providers,
            sink: Mutex::new(Box::new(sink)),
            clock: Mutex::new(clock),
            pointer: Mutex::new(None),
            tick_busy: AtomicBool::new(false),
            stopping: Mutex::new(false),
            stop_cv: Condvar::new(),
            missed: AtomicU64::new(0),
            started: Instant::now(),
            events: EventSender::new(tx),
        };
        Ok(Self {
            shared: Arc::new(shared),
            events: Mutex::new(Some(rx)),
            cadence: Mutex::new(None),
        })
    }

    /// Event receiver; `None` after the first call.
    ///
    /// At most [`EVENT_QUEUE_CAPACITY`] undrained events are kept; later ones are only logged.
    pub fn take_events(&self) -> Option<Receiver<EngineEvent>> {
        lock(&self.events).take()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<EngineConfig> {
        lock(&self.shared.slot).config.clone()
    }

    /// Lifecycle state.
    pub fn state(&self) -> EngineState {
        lock(&self.shared.slot).state
    }

    /// Published project, if any.
    pub fn project(&self) -> Option<Arc<WallpaperProject>> {
        lock(&self.shared.slot).project.clone()
    }

    /// Ticks dropped because the cadence thread woke up late.
    pub fn missed_ticks(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// Start a decomposition with the current configuration, superseding any run in progress.
    /// Returns the run's generation.
    pub fn request_decomposition(&self) -> u64 {
        request_decomposition(&self.shared)
    }

    /// Replace the configuration and decompose again.
    pub fn reconfigure(&self, config: EngineConfig) -> DepthwallResult<u64> {
        config.validate()?;
        {
            let mut clock = lock(&self.shared.clock);
            if clock.style() != &config.clock {
                *clock = ClockRenderer::new(config.clock.clone())?;
            }
        }
        lock(&self.shared.slot).config = Arc::new(config);
        Ok(self.request_decomposition())
    }

    /// Change the layer count and decompose again.
    pub fn set_layer_count(&self, n: usize) -> DepthwallResult<u64> {
        let mut config = (*self.config()).clone();
        config.layers.count = n;
        self.reconfigure(config)
    }

    /// Block until no decomposition is running or `timeout` passes; returns the published
    /// project when the engine is `Ready`.
    pub fn wait_ready(&self, timeout: Duration) -> Option<Arc<WallpaperProject>> {
        let slot = lock(&self.shared.slot);
        let (slot, _) = self
            .shared
            .changed
            .wait_timeout_while(slot, timeout, |s| s.state == EngineState::Decomposing)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slot.state {
            EngineState::Ready => slot.project.clone(),
            _ => None,
        }
    }

    /// Move the pointer used by [`ParallaxMode::Pointer`], in output pixels.
    pub fn set_pointer(&self, x: f64, y: f64) {
        *lock(&self.shared.pointer) = Some((x, y));
    }

    /// Forget the pointer; pointer mode rests at the center.
    pub fn clear_pointer(&self) {
        *lock(&self.shared.pointer) = None;
    }

    /// Render and apply a frame for the current wall-clock time right away.
    pub fn tick_now(&self) -> TickOutcome {
        self.shared.tick_now()
    }

    /// Render and apply a frame for `at`, with `elapsed` driving the breathing phase.
    pub fn tick_at(&self, at: NaiveDateTime, elapsed: Duration) -> TickOutcome {
        self.shared.tick_at(at, elapsed)
    }

    /// Start the cadence thread. Calling it again while running does nothing.
    pub fn start(&self) -> DepthwallResult<()> {
        let mut cadence = lock(&self.cadence);
        if cadence.is_some() {
            return Ok(());
        }
        *lock(&self.shared.stopping) = false;
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("depthwall-cadence".to_owned())
            .spawn(move || cadence_loop(&shared))
            .map_err(|e| anyhow::anyhow!("spawn cadence thread: {e}"))?;
        *cadence = Some(handle);
        Ok(())
    }

    /// Stop ticking, cancel any decomposition, and return to `Idle`.
    pub fn stop(&self) {
        *lock(&self.shared.stopping) = true;
        self.shared.stop_cv.notify_all();
        if let Some(handle) = lock(&self.cadence).take()
            && handle.join().is_err()
        {
            tracing::error!("cadence thread panicked");
        }

        let prev = {
            let mut slot = lock(&self.shared.slot);
            if let Some(c) = slot.cancel.take() {
                c.cancel();
            }
            slot.generation += 1;
            std::mem::replace(&mut slot.state, EngineState::Idle)
        };
        self.shared.changed.notify_all();
        if prev != EngineState::Idle {
            self.shared
                .events
                .emit(EngineEvent::StateChanged(EngineState::Idle));
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn request_decomposition(shared: &Arc<Shared>) -> u64 {
    let (generation, cancel, config, prev) = {
        let mut slot = lock(&shared.slot);
        if let Some(c) = slot.cancel.take() {
            c.cancel();
        }
        slot.generation += 1;
        let cancel = CancelToken::new();
        slot.cancel = Some(cancel.clone());
        let prev = std::mem::replace(&mut slot.state, EngineState::Decomposing);
        (slot.generation, cancel, slot.config.clone(), prev)
    };
    if prev != EngineState::Decomposing {
        shared
            .events
            .emit(EngineEvent::StateChanged(EngineState::Decomposing));
    }
    shared.events.emit(EngineEvent::DecompositionStarted {
        generation,
        layers: config.layers.count,
    });

    let supervisor_shared = shared.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("depthwall-decompose-{generation}"))
        .spawn(move || supervise(&supervisor_shared, generation, cancel, config));
    if let Err(e) = spawned {
        shared.finish(
            generation,
            Err(DepthwallError::decomposition(format!(
                "spawn decomposition thread: {e}"
            ))),
            Duration::ZERO,
        );
    }
    generation
}

/// Run one decomposition on a worker thread and enforce the time limit.
fn supervise(shared: &Arc<Shared>, generation: u64, cancel: CancelToken, config: Arc<EngineConfig>) {
    let started = Instant::now();
    let timeout = config.decomposition_timeout();
    let (tx, rx) = mpsc::sync_channel(1);
    let worker_shared = shared.clone();
    let worker_cancel = cancel.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("depthwall-worker-{generation}"))
        .spawn(move || {
            let ctx = GenerateCtx {
                memory: Some(&worker_shared.memory),
                disk: worker_shared.disk.as_ref(),
                cancel: &worker_cancel,
                events: Some(&worker_shared.events),
                generation,
            };
            let result = WallpaperProject::generate_with(config, &worker_shared.providers, &ctx);
            // The supervisor is gone after a timeout; the result is stale then.
            let _ = tx.send(result);
        });

    let result = match spawned {
        Err(e) => Err(DepthwallError::decomposition(format!(
            "spawn decomposition worker: {e}"
        ))),
        Ok(_) => match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                Err(DepthwallError::RenderTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DepthwallError::decomposition(
                "decomposition worker exited without a result",
            )),
        },
    };
    shared.finish(generation, result, started.elapsed());
}

impl Shared {
    /// Publish or report a finished run; stale generations are discarded.
    fn finish(
        &self,
        generation: u64,
        result: DepthwallResult<WallpaperProject>,
        elapsed: Duration,
    ) {
        let mut slot = lock(&self.slot);
        if slot.generation != generation {
            drop(slot);
            self.events
                .emit(EngineEvent::DecompositionSuperseded { generation });
            return;
        }
        slot.cancel = None;
        // Emitted under the lock so events precede wakeups.
        match result {
            Ok(project) => {
                let cached = project.from_cache();
                slot.project = Some(Arc::new(project));
                slot.state = EngineState::Ready;
                self.events.emit(EngineEvent::DecompositionFinished {
                    generation,
                    cached,
                    elapsed,
                });
                self.events
                    .emit(EngineEvent::StateChanged(EngineState::Ready));
            }
            Err(e) => {
                let state = if slot.project.is_some() {
                    EngineState::Ready
                } else {
                    EngineState::Idle
                };
                slot.state = state;
                self.events.emit(EngineEvent::DecompositionFailed {
                    generation,
                    error: e.into_decomposition_failure().to_string(),
                });
                self.events.emit(EngineEvent::StateChanged(state));
            }
        }
        drop(slot);
        self.changed.notify_all();
    }

    fn tick_now(&self) -> TickOutcome {
        self.tick_at(Local::now().naive_local(), self.started.elapsed())
    }

    fn tick_at(&self, at: NaiveDateTime, elapsed: Duration) -> TickOutcome {
        if self
            .tick_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.events.emit(EngineEvent::TickSkipped);
            return TickOutcome::Skipped;
        }
        let outcome = self.render_tick(at, elapsed);
        self.tick_busy.store(false, Ordering::Release);
        outcome
    }

    fn render_tick(&self, at: NaiveDateTime, elapsed: Duration) -> TickOutcome {
        let project = {
            let slot = lock(&self.slot);
            match (&slot.state, &slot.project) {
                (EngineState::Ready, Some(p)) => p.clone(),
                _ => return TickOutcome::NotReady,
            }
        };

        let state = match project.config().parallax.mode {
            ParallaxMode::Breathing => ParallaxState::Time {
                elapsed_secs: elapsed.as_secs_f64(),
            },
            ParallaxMode::Pointer => match *lock(&self.pointer) {
                Some((x, y)) => ParallaxState::from_pointer_px(x, y, project.canvas()),
                None => ParallaxState::Pointer { x: 0.0, y: 0.0 },
            },
        };

        let frame = {
            let mut clock = lock(&self.clock);
            project.render_frame(&state, Some(at), &mut clock)
        };
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                self.events.emit(EngineEvent::TickFailed {
                    error: e.to_string(),
                });
                return TickOutcome::Failed;
            }
        };

        match lock(&self.sink).apply(&frame) {
            Ok(()) => {
                self.events.emit(EngineEvent::FrameApplied {
                    generation: frame.generation,
                    timestamp: at,
                });
                TickOutcome::Applied {
                    generation: frame.generation,
                }
            }
            Err(e) => {
                self.events.emit(EngineEvent::ApplyFailed {
                    error: e.to_string(),
                });
                TickOutcome::ApplyFailed
            }
        }
    }

    /// Sleep until `deadline`; `true` if stopped meanwhile.
    fn sleep_until(&self, deadline: Instant) -> bool {
        let mut stopping = lock(&self.stopping);
        loop {
            if *stopping {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopping = match self.stop_cv.wait_timeout(stopping, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn config(&self) -> Arc<EngineConfig> {
        lock(&self.slot).config.clone()
    }
}

fn cadence_loop(shared: &Shared) {
    tracing::debug!("cadence thread started");
    loop {
        let config = shared.config();
        let interval = config.tick_interval();
        let wait = if config.render.align_ticks {
            until_next_tick(Local::now().time(), interval)
        } else {
            interval
        };
        let deadline = Instant::now() + wait;
        if shared.sleep_until(deadline) {
            break;
        }
        let late = Instant::now().saturating_duration_since(deadline);
        let missed = (late.as_nanos() / interval.as_nanos().max(1)) as u64;
        if missed > 0 {
            shared.missed.fetch_add(missed, Ordering::Relaxed);
            shared.events.emit(EngineEvent::TicksMissed { count: missed });
        }
        shared.tick_now();
    }
    tracing::debug!("cadence thread stopped");
}

/// Time from `now` to the next multiple of `interval` since local midnight.
pub(crate) fn until_next_tick(now: NaiveTime, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1) as u64;
    let ms_of_day = u64::from(now.num_seconds_from_midnight()) * 1000
        + u64::from((now.nanosecond() / 1_000_000).min(999));
    Duration::from_millis(interval_ms - ms_of_day % interval_ms)
}

#[cfg(test)]
#[path = "../../tests/unit/session/render_loop.rs"]
mod tests;
