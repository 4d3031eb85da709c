use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;

use crate::foundation::error::{DepthwallError, DepthwallResult};
use crate::render::frame::RenderFrame;

/// Consumer of finished frames, typically something that sets the desktop background.
///
/// Failures are reported and the next tick tries again with a fresh frame.
pub trait WallpaperSink: Send {
    /// Present `frame`.
    fn apply(&mut self, frame: &RenderFrame) -> DepthwallResult<()>;
}

/// Writes each frame as a PNG, replacing the previous file atomically.
#[derive(Clone, Debug)]
pub struct PngFileSink {
    path: PathBuf,
}

impl PngFileSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WallpaperSink for PngFileSink {
    fn apply(&mut self, frame: &RenderFrame) -> DepthwallResult<()> {
        write_png_atomic(&self.path, frame).map_err(|e| DepthwallError::apply(e.to_string()))
    }
}

/// Writes the frame as a PNG and then runs a user command on it.
///
/// Every `{path}` in the arguments is replaced by the PNG path. No shell is involved.
#[derive(Clone, Debug)]
pub struct CommandSink {
    png: PngFileSink,
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Sink writing to `path` and then running `argv`.
    pub fn new(path: impl Into<PathBuf>, argv: &[String]) -> DepthwallResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DepthwallError::validation("apply command must name a program"))?;
        Ok(Self {
            png: PngFileSink::new(path),
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn command(&self) -> Command {
        let path = self.png.path().to_string_lossy();
        let mut cmd = Command::new(self.program.replace("{path}", &path));
        cmd.args(self.args.iter().map(|a| a.replace("{path}", &path)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl WallpaperSink for CommandSink {
    fn apply(&mut self, frame: &RenderFrame) -> DepthwallResult<()> {
        self.png.apply(frame)?;
        let out = self.command().output().map_err(|e| {
            DepthwallError::apply(format!("failed to spawn '{}': {e}", self.program))
        })?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(DepthwallError::apply(format!(
                "'{}' exited with {}: {}",
                self.program,
                out.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Collects frames in memory; clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemorySink {
    frames: Arc<Mutex<Vec<RenderFrame>>>,
}

impl InMemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<RenderFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of frames received.
    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` before the first frame.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WallpaperSink for InMemorySink {
    fn apply(&mut self, frame: &RenderFrame) -> DepthwallResult<()> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        Ok(())
    }
}

/// Encode `frame` next to `path` and rename it into place.
pub(crate) fn write_png_atomic(path: &Path, frame: &RenderFrame) -> DepthwallResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory '{}'", parent.display()))?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    frame.write_png(&tmp)?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replace '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/session/sink.rs"]
mod tests;
