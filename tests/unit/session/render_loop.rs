use super::*;
use crate::assets::decode::SourceImage;
use crate::depth::ingest::RawDepth;
use crate::depth::provider::StaticDepth;
use crate::session::sink::InMemorySink;

fn engine(sink: InMemorySink) -> Engine {
    let mut rgba = Vec::new();
    for i in 0..(32 * 16) {
        rgba.extend_from_slice(&[(i % 251) as u8, 30, 60, 255]);
    }
    let image = SourceImage::from_rgba8(32, 16, rgba).unwrap();
    let depth: Vec<f32> = (0..32 * 16).map(|i| (i % 32) as f32).collect();
    let providers = Providers::default()
        .with_image(image)
        .with_depth(StaticDepth(RawDepth::from_f32(32, 16, depth)));
    let mut config = EngineConfig::default();
    config.layers.count = 2;
    Engine::new(config, providers, sink).unwrap()
}

fn noon() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[test]
fn next_tick_aligns_to_interval() {
    let t = NaiveTime::from_hms_milli_opt(10, 0, 0, 250).unwrap();
    assert_eq!(until_next_tick(t, Duration::from_secs(1)), Duration::from_millis(750));
    let t = NaiveTime::from_hms_milli_opt(10, 0, 59, 0).unwrap();
    assert_eq!(until_next_tick(t, Duration::from_secs(60)), Duration::from_secs(1));
    let t = NaiveTime::from_hms_opt(10, 1, 0).unwrap();
    assert_eq!(until_next_tick(t, Duration::from_secs(60)), Duration::from_secs(60));
}

#[test]
fn ticks_wait_for_ready() {
    let sink = InMemorySink::new();
    let engine = engine(sink.clone());
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.tick_at(noon(), Duration::ZERO), TickOutcome::NotReady);

    let generation = engine.request_decomposition();
    let project = engine.wait_ready(Duration::from_secs(30)).unwrap();
    assert_eq!(project.generation(), generation);
    assert_eq!(engine.state(), EngineState::Ready);

    assert_eq!(
        engine.tick_at(noon(), Duration::from_millis(1500)),
        TickOutcome::Applied { generation }
    );
    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].timestamp, Some(noon()));
    assert!(frames[0].is_opaque());
}

#[test]
fn busy_tick_is_skipped() {
    let engine = engine(InMemorySink::new());
    engine.request_decomposition();
    engine.wait_ready(Duration::from_secs(30)).unwrap();
    engine.shared.tick_busy.store(true, Ordering::SeqCst);
    assert_eq!(engine.tick_now(), TickOutcome::Skipped);
    engine.shared.tick_busy.store(false, Ordering::SeqCst);
    assert!(matches!(engine.tick_now(), TickOutcome::Applied { .. }));
}

#[test]
fn stop_returns_to_idle() {
    let engine = engine(InMemorySink::new());
    let events = engine.take_events().unwrap();
    assert!(engine.take_events().is_none());
    engine.request_decomposition();
    engine.wait_ready(Duration::from_secs(30)).unwrap();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.tick_now(), TickOutcome::NotReady);
    let seen: Vec<EngineEvent> = events.try_iter().collect();
    assert!(seen.contains(&EngineEvent::StateChanged(EngineState::Ready)));
    assert_eq!(
        seen.last(),
        Some(&EngineEvent::StateChanged(EngineState::Idle))
    );
}

#[test]
fn invalid_reconfigure_keeps_previous_config() {
    let engine = engine(InMemorySink::new());
    let mut bad = (*engine.config()).clone();
    bad.layers.count = 0;
    assert!(engine.reconfigure(bad).is_err());
    assert_eq!(engine.config().layers.count, 2);
    assert_eq!(engine.state(), EngineState::Idle);
}

struct DiscardSink;

impl WallpaperSink for DiscardSink {
    fn apply(&mut self, _frame: &crate::render::frame::RenderFrame) -> DepthwallResult<()> {
        Ok(())
    }
}

#[test]
fn undrained_events_stay_bounded() {
    let engine = engine(InMemorySink::new());
    let discard: Box<dyn WallpaperSink> = Box::new(DiscardSink);
    *lock(&engine.shared.sink) = discard;
    engine.request_decomposition();
    engine.wait_ready(Duration::from_secs(30)).unwrap();

    let ticks = EVENT_QUEUE_CAPACITY * 4;
    for _ in 0..ticks {
        assert!(matches!(engine.tick_now(), TickOutcome::Applied { .. }));
    }
    let events = engine.take_events().unwrap();
    let queued: Vec<EngineEvent> = events.try_iter().collect();
    assert_eq!(queued.len(), EVENT_QUEUE_CAPACITY);
    assert!(matches!(queued[0], EngineEvent::StateChanged(EngineState::Decomposing)));

    // Draining makes room again.
    assert!(matches!(engine.tick_now(), TickOutcome::Applied { .. }));
    assert!(matches!(
        events.try_recv(),
        Ok(EngineEvent::FrameApplied { .. })
    ));
}
