use super::*;
use crate::depth::ingest::RawDepth;
use crate::depth::provider::StaticDepth;
use crate::parallax::scheduler::ParallaxState;
use chrono::NaiveDate;
use std::sync::mpsc;

fn image(w: u32, h: u32) -> SourceImage {
    let mut rgba = Vec::new();
    for y in 0..h {
        for x in 0..w {
            rgba.extend_from_slice(&[(x * 9 % 256) as u8, (y * 13 % 256) as u8, 90, 255]);
        }
    }
    SourceImage::from_rgba8(w, h, rgba).unwrap()
}

fn ramp_depth(w: u32, h: u32) -> StaticDepth {
    let mut v = Vec::new();
    for _ in 0..h {
        for x in 0..w {
            v.push(x as f32);
        }
    }
    StaticDepth(RawDepth::from_f32(w, h, v))
}

fn config(n: usize) -> Arc<EngineConfig> {
    let mut cfg = EngineConfig::default();
    cfg.layers.count = n;
    cfg.source.convention = crate::depth::ingest::DepthConvention::NearIsLow;
    cfg.clock.enabled = false;
    Arc::new(cfg)
}

struct FailingDepth;

impl DepthProvider for FailingDepth {
    fn estimate(&self, _image: &SourceImage) -> DepthwallResult<RawDepth> {
        Err(DepthwallError::depth_estimation("model offline"))
    }
}

#[test]
fn generate_builds_requested_layers() {
    let providers = Providers::default()
        .with_image(image(24, 8))
        .with_depth(ramp_depth(24, 8));
    let project = WallpaperProject::generate(config(3), &providers).unwrap();
    assert_eq!(project.stack().count(), 3);
    assert_eq!(project.canvas(), Canvas { width: 24, height: 8 });
    assert!(!project.from_cache());

    let mut clock = project.clock_renderer().unwrap();
    let frame = project
        .render_frame(&ParallaxState::rest(), None, &mut clock)
        .unwrap();
    assert_eq!(frame.data, project.source().rgba8());
}

#[test]
fn provider_failure_becomes_decomposition_failure() {
    let providers = Providers::default()
        .with_image(image(8, 8))
        .with_depth(FailingDepth);
    let err = WallpaperProject::generate(config(2), &providers).err().unwrap();
    match err {
        DepthwallError::DecompositionFailed(msg) => assert!(msg.contains("model offline")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unusable_depth_falls_back_to_flat_map() {
    let (tx, rx) = mpsc::sync_channel(16);
    let events = EventSender::new(tx);
    let cancel = CancelToken::new();
    let ctx = GenerateCtx {
        memory: None,
        disk: None,
        cancel: &cancel,
        events: Some(&events),
        generation: 7,
    };
    let providers = Providers::default()
        .with_image(image(6, 4))
        .with_depth(StaticDepth(RawDepth::from_f32(6, 4, vec![f32::NAN; 24])));
    let project = WallpaperProject::generate_with(config(2), &providers, &ctx).unwrap();
    assert!(project.depth().values().iter().all(|&v| v == 0.5));
    assert_eq!(project.generation(), 7);
    assert!(matches!(
        rx.try_recv().unwrap(),
        EngineEvent::DepthFallback { .. }
    ));
}

#[test]
fn memory_cache_reuses_layer_stack() {
    let memory = Mutex::new(LayerCache::new(2));
    let cancel = CancelToken::new();
    let ctx = GenerateCtx {
        memory: Some(&memory),
        disk: None,
        cancel: &cancel,
        events: None,
        generation: 1,
    };
    let providers = Providers::default()
        .with_image(image(16, 6))
        .with_depth(ramp_depth(16, 6));
    let a = WallpaperProject::generate_with(config(2), &providers, &ctx).unwrap();
    let b = WallpaperProject::generate_with(config(2), &providers, &ctx).unwrap();
    assert!(!a.from_cache());
    assert!(b.from_cache());
    assert!(Arc::ptr_eq(a.stack(), b.stack()));

    let c = WallpaperProject::generate_with(config(3), &providers, &ctx).unwrap();
    assert!(!c.from_cache());
}

#[test]
fn cancelled_run_reports_cancelled() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let ctx = GenerateCtx {
        memory: None,
        disk: None,
        cancel: &cancel,
        events: None,
        generation: 1,
    };
    let providers = Providers::default().with_image(image(4, 4));
    let err = WallpaperProject::generate_with(config(2), &providers, &ctx)
        .err()
        .unwrap();
    assert!(err.is_cancelled());
}

#[test]
fn frame_carries_clock_time_and_generation() {
    let mut cfg = (*config(2)).clone();
    cfg.clock.enabled = true;
    let providers = Providers::default()
        .with_image(image(64, 48))
        .with_depth(ramp_depth(64, 48));
    let project = WallpaperProject::generate(Arc::new(cfg), &providers).unwrap();
    let at = NaiveDate::from_ymd_opt(2026, 1, 27)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    let mut clock = project.clock_renderer().unwrap();
    let frame = project
        .render_frame(&ParallaxState::rest(), Some(at), &mut clock)
        .unwrap();
    assert_eq!(frame.timestamp, Some(at));
    assert!(frame.is_opaque());
    assert_ne!(frame.data, project.source().rgba8());
}
