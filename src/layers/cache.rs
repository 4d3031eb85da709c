use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::foundation::math::Fingerprint;
use crate::layers::band::Bands;
use crate::layers::decompose::{DecomposeKey, LayerStack, RankMap};

/// Small most-recently-used cache of decomposed stacks, keyed by [`DecomposeKey`].
#[derive(Debug)]
pub struct LayerCache {
    capacity: usize,
    entries: VecDeque<Arc<LayerStack>>,
}

impl Default for LayerCache {
    fn default() -> Self {
        Self::new(4)
    }
}

impl LayerCache {
    /// Cache holding at most `capacity` stacks (0 disables caching).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Look up a stack and mark it most recently used.
    pub fn get(&mut self, key: &DecomposeKey) -> Option<Arc<LayerStack>> {
        let pos = self.entries.iter().position(|s| s.key() == key)?;
        let hit = self.entries.remove(pos)?;
        self.entries.push_front(hit.clone());
        Some(hit)
    }

    /// Insert a stack, evicting the least recently used one when full.
    pub fn insert(&mut self, stack: Arc<LayerStack>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|s| s.key() != stack.key());
        self.entries.push_front(stack);
        self.entries.truncate(self.capacity);
    }

    /// Number of cached stacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const MANIFEST: &str = "layers.json";
const RANKS: &str = "ranks.png";
const FORMAT: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct Manifest {
    format: u32,
    key: DecomposeKey,
    width: u32,
    height: u32,
    bounds: Vec<f32>,
    layers: Vec<String>,
}

/// On-disk stack cache: one directory per key holding `layers.json`, a PNG per layer and the
/// rank map as an 8-bit grayscale PNG.
#[derive(Clone, Debug)]
pub struct DiskLayerCache {
    root: PathBuf,
}

impl DiskLayerCache {
    /// Cache rooted at `root` (created on first store).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory used for `key`.
    pub fn dir_for(&self, key: &DecomposeKey) -> PathBuf {
        let mut fp = Fingerprint::new("depthwall.cache");
        // Key fields are plain data; serialization cannot fail.
        fp.write_bytes(serde_json::to_string(key).unwrap_or_default().as_bytes());
        self.root.join(format!("{:016x}", fp.finish()))
    }

    /// Load the stack for `key`, or `None` when absent, stale or unreadable.
    pub fn load(&self, key: &DecomposeKey) -> Option<LayerStack> {
        let dir = self.dir_for(key);
        if !dir.join(MANIFEST).is_file() {
            return None;
        }
        match read_stack(&dir, key) {
            Ok(stack) => {
                tracing::debug!(dir = %dir.display(), "layer cache hit");
                Some(stack)
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "ignoring unusable layer cache");
                None
            }
        }
    }

    /// Persist `stack`; the manifest is written last so partial writes are never loaded.
    pub fn store(&self, stack: &LayerStack) -> DepthwallResult<PathBuf> {
        let dir = self.dir_for(stack.key());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create cache dir '{}'", dir.display()))?;
        let canvas = stack.canvas();

        let mut names = Vec::with_capacity(stack.count());
        for layer in stack.layers() {
            let name = format!("layer_{:02}.png", layer.rank());
            write_rgba_png(
                &dir.join(&name),
                canvas.width,
                canvas.height,
                layer.rgba8_premul().to_vec(),
            )?;
            names.push(name);
        }
        let ranks = image::GrayImage::from_raw(
            canvas.width,
            canvas.height,
            stack.rank_map().ranks().to_vec(),
        )
        .ok_or_else(|| DepthwallError::validation("rank map size mismatch"))?;
        ranks
            .save_with_format(dir.join(RANKS), image::ImageFormat::Png)
            .context("write rank map png")?;

        let manifest = Manifest {
            format: FORMAT,
            key: stack.key().clone(),
            width: canvas.width,
            height: canvas.height,
            bounds: stack.bands().bounds().to_vec(),
            layers: names,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| DepthwallError::serde(e.to_string()))?;
        std::fs::write(dir.join(MANIFEST), json).context("write cache manifest")?;
        Ok(dir)
    }
}

/// Write premultiplied layer pixels as PNG. Layer alpha is binary, so premultiplied and straight
/// bytes coincide.
fn write_rgba_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> DepthwallResult<()> {
    let img = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| DepthwallError::validation("rgba buffer size mismatch"))?;
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

fn read_stack(dir: &Path, key: &DecomposeKey) -> DepthwallResult<LayerStack> {
    let bytes = std::fs::read(dir.join(MANIFEST)).context("read cache manifest")?;
    let manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|e| DepthwallError::serde(e.to_string()))?;
    if manifest.format != FORMAT || &manifest.key != key {
        return Err(DepthwallError::validation("cache manifest does not match request"));
    }

    let ranks = image::open(dir.join(RANKS)).context("read rank map png")?.to_luma8();
    if ranks.dimensions() != (manifest.width, manifest.height) {
        return Err(DepthwallError::validation("rank map size mismatch"));
    }
    let rank_map = RankMap::new(manifest.width, manifest.height, ranks.into_raw())?;

    let mut pixels = Vec::with_capacity(manifest.layers.len());
    for name in &manifest.layers {
        let img = image::open(dir.join(name))
            .with_context(|| format!("read layer png '{name}'"))?
            .to_rgba8();
        if img.dimensions() != (manifest.width, manifest.height) {
            return Err(DepthwallError::validation(format!(
                "layer '{name}' size mismatch"
            )));
        }
        pixels.push(img.into_raw());
    }

    let bands = Bands::from_bounds(manifest.bounds)?;
    LayerStack::from_parts(bands, rank_map, pixels, manifest.key)
}

#[cfg(test)]
#[path = "../../tests/unit/layers/cache.rs"]
mod tests;
