use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use depthwall::{
    CommandSink, Engine, EngineConfig, ParallaxState, PngFileSink, Providers, TickOutcome,
    WallpaperProject,
};

#[derive(Parser, Debug)]
#[command(name = "depthwall", version, about = "Parallax wallpaper with a live clock")]
struct Cli {
    /// Log at debug level regardless of the config.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Export the decomposed layers, rank map, and depth map as PNGs.
    Layers(LayersArgs),
    /// Decompose once and keep the wallpaper updated.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Engine configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Clock time, e.g. `2026-01-27T09:30:00`; now when omitted.
    #[arg(long, value_parser = parse_timestamp)]
    at: Option<NaiveDateTime>,

    /// Seconds into the breathing cycle.
    #[arg(long, default_value_t = 0.0)]
    elapsed: f64,
}

#[derive(Parser, Debug)]
struct LayersArgs {
    /// Engine configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Engine configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Stop after this many ticks instead of running until killed.
    #[arg(long)]
    ticks: Option<u64>,
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {e}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args, cli.verbose),
        Command::Layers(args) => cmd_layers(args, cli.verbose),
        Command::Run(args) => cmd_run(args, cli.verbose),
    }
}

fn load_config(path: &Path, verbose: bool) -> anyhow::Result<Arc<EngineConfig>> {
    let config = EngineConfig::from_path(path)?;
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    config.validate()?;
    Ok(Arc::new(config))
}

fn cmd_frame(args: FrameArgs, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(&args.config, verbose)?;
    let providers = Providers::from_config(&config);
    let project = WallpaperProject::generate(config, &providers)?;

    let at = args
        .at
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let state = ParallaxState::Time {
        elapsed_secs: args.elapsed,
    };
    let mut clock = project.clock_renderer()?;
    let frame = project.render_frame(&state, Some(at), &mut clock)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    frame.write_png(&args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_layers(args: LayersArgs, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(&args.config, verbose)?;
    let providers = Providers::from_config(&config);
    let project = WallpaperProject::generate(config, &providers)?;
    let stack = project.stack();
    let c = stack.canvas();

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;

    for layer in stack.layers() {
        let path = args.out.join(format!("layer_{:02}.png", layer.rank()));
        save_png(&path, c.width, c.height, layer.rgba8_premul(), image::ColorType::Rgba8)?;
    }

    let n = stack.count();
    let step = if n > 1 { 255 / (n - 1) } else { 0 };
    let ranks: Vec<u8> = stack
        .rank_map()
        .ranks()
        .iter()
        .map(|&r| (usize::from(r) * step) as u8)
        .collect();
    save_png(&args.out.join("ranks.png"), c.width, c.height, &ranks, image::ColorType::L8)?;

    let depth: Vec<u8> = project
        .depth()
        .values()
        .iter()
        .map(|&d| (d * 255.0).round() as u8)
        .collect();
    save_png(&args.out.join("depth.png"), c.width, c.height, &depth, image::ColorType::L8)?;

    eprintln!("wrote {n} layers to {}", args.out.display());
    Ok(())
}

fn save_png(
    path: &Path,
    width: u32,
    height: u32,
    data: &[u8],
    color: image::ColorType,
) -> anyhow::Result<()> {
    image::save_buffer_with_format(path, data, width, height, color, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))
}

fn cmd_run(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(&args.config, verbose)?;
    let providers = Providers::from_config(&config);
    let path = config.output.frame_path();
    let interval = config.tick_interval();
    let timeout = config.decomposition_timeout();

    let engine = match &config.output.command {
        Some(argv) => Engine::new((*config).clone(), providers, CommandSink::new(&path, argv)?)?,
        None => Engine::new((*config).clone(), providers, PngFileSink::new(&path))?,
    };
    let events = engine
        .take_events()
        .context("engine events already taken")?;

    engine.request_decomposition();
    if engine.wait_ready(timeout + Duration::from_secs(1)).is_none() {
        let reason = events
            .try_iter()
            .find_map(|ev| match ev {
                depthwall::EngineEvent::DecompositionFailed { error, .. } => Some(error),
                _ => None,
            })
            .unwrap_or_else(|| "no layers were produced".to_owned());
        anyhow::bail!("decomposition failed: {reason}");
    }

    match args.ticks {
        Some(n) => {
            let mut applied = 0u64;
            for i in 0..n {
                if let TickOutcome::Applied { .. } = engine.tick_now() {
                    applied += 1;
                }
                if i + 1 < n {
                    std::thread::sleep(interval);
                }
            }
            engine.stop();
            eprintln!("applied {applied}/{n} frames to {}", path.display());
        }
        None => {
            engine.start()?;
            // Events are already logged; draining keeps the channel bounded.
            for _ in events.iter() {}
        }
    }
    Ok(())
}
