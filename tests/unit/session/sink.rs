use super::*;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "depthwall_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn frame() -> RenderFrame {
    let mut data = Vec::new();
    for i in 0..12u8 {
        data.extend_from_slice(&[i * 20, 255 - i * 20, 7, 255]);
    }
    RenderFrame {
        width: 4,
        height: 3,
        data,
        timestamp: None,
        offsets: Vec::new(),
        overlay_offset: None,
        generation: 1,
    }
}

#[test]
fn png_sink_writes_lossless_file() {
    let dir = temp_dir("png_sink");
    let path = dir.join("nested").join("wall.png");
    let mut sink = PngFileSink::new(&path);
    sink.apply(&frame()).unwrap();
    let back = image::open(&path).unwrap().to_rgba8();
    assert_eq!(back.dimensions(), (4, 3));
    assert_eq!(back.into_raw(), frame().data);
    assert!(!dir.join("nested").join("wall.png.tmp").exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn in_memory_sink_clones_share_frames() {
    let sink = InMemorySink::new();
    let mut handle = sink.clone();
    handle.apply(&frame()).unwrap();
    handle.apply(&frame()).unwrap();
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.frames()[1].generation, 1);
}

#[test]
fn command_sink_requires_program() {
    assert!(CommandSink::new("x.png", &[]).is_err());
}

#[cfg(unix)]
#[test]
fn command_sink_runs_program_with_path() {
    let dir = temp_dir("cmd_sink");
    let path = dir.join("wall.png");
    let argv: Vec<String> = ["sh", "-c", "test -s \"$1\"", "sh", "{path}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut sink = CommandSink::new(&path, &argv).unwrap();
    sink.apply(&frame()).unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[cfg(unix)]
#[test]
fn command_failure_is_apply_error() {
    let dir = temp_dir("cmd_fail");
    let argv: Vec<String> = ["sh", "-c", "echo nope >&2; exit 3"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut sink = CommandSink::new(dir.join("wall.png"), &argv).unwrap();
    let err = sink.apply(&frame()).unwrap_err();
    match err {
        DepthwallError::WallpaperApplyFailed(msg) => assert!(msg.contains("nope")),
        other => panic!("unexpected error: {other:?}"),
    }
    std::fs::remove_dir_all(&dir).ok();
}
