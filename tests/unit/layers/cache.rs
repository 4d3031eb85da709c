use super::*;
use crate::assets::decode::SourceImage;
use crate::depth::ingest::DepthMap;
use crate::layers::decompose::{DecomposeOpts, decompose};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "depthwall_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn stack(n: usize, seed: u8) -> LayerStack {
    let (w, h) = (12u32, 4u32);
    let mut rgba = Vec::new();
    let mut depth = Vec::new();
    for y in 0..h {
        for x in 0..w {
            rgba.extend_from_slice(&[seed, (x * 10) as u8, (y * 30) as u8, 255]);
            depth.push(x as f32 / (w - 1) as f32);
        }
    }
    let img = SourceImage::from_rgba8(w, h, rgba).unwrap();
    let depth = DepthMap::new(w, h, depth).unwrap();
    decompose(&img, &depth, n, &DecomposeOpts::default()).unwrap()
}

#[test]
fn lru_evicts_least_recently_used() {
    let mut cache = LayerCache::new(2);
    let a = Arc::new(stack(2, 1));
    let b = Arc::new(stack(2, 2));
    let c = Arc::new(stack(2, 3));
    cache.insert(a.clone());
    cache.insert(b.clone());
    assert!(cache.get(a.key()).is_some());
    cache.insert(c.clone());
    assert_eq!(cache.len(), 2);
    assert!(cache.get(b.key()).is_none());
    assert!(cache.get(a.key()).is_some());
    assert!(cache.get(c.key()).is_some());
}

#[test]
fn key_distinguishes_layer_count() {
    let mut cache = LayerCache::default();
    cache.insert(Arc::new(stack(2, 1)));
    let three = stack(3, 1);
    assert!(cache.get(three.key()).is_none());
}

#[test]
fn zero_capacity_caches_nothing() {
    let mut cache = LayerCache::new(0);
    cache.insert(Arc::new(stack(2, 1)));
    assert!(cache.is_empty());
}

#[test]
fn disk_cache_round_trips_layers() {
    let root = temp_dir("disk_cache");
    let disk = DiskLayerCache::new(&root);
    let s = stack(3, 9);
    assert!(disk.load(s.key()).is_none());

    let dir = disk.store(&s).unwrap();
    assert!(dir.join("layers.json").is_file());
    assert!(dir.join("ranks.png").is_file());

    let loaded = disk.load(s.key()).unwrap();
    assert_eq!(loaded.count(), 3);
    assert_eq!(loaded.rank_map(), s.rank_map());
    assert_eq!(loaded.bands(), s.bands());
    for (a, b) in loaded.layers().iter().zip(s.layers()) {
        assert_eq!(a.rgba8_premul(), b.rgba8_premul());
    }
}

#[test]
fn disk_cache_ignores_mismatched_manifest() {
    let root = temp_dir("disk_cache_stale");
    let disk = DiskLayerCache::new(&root);
    let s = stack(2, 4);
    let dir = disk.store(&s).unwrap();

    let manifest = std::fs::read_to_string(dir.join("layers.json")).unwrap();
    std::fs::write(
        dir.join("layers.json"),
        manifest.replace("\"format\": 1", "\"format\": 99"),
    )
    .unwrap();
    assert!(disk.load(s.key()).is_none());
}
