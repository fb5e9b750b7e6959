//! # Reel Player
//!
//! Headless host for reel-core: drives `update` at a fixed tick rate,
//! stands in for the audio mixer and the texture, and reports what
//! happened.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use reel_core::{PlaybackConfig, RgbaFrame, StreamLoader, VideoStreamPlayback};

struct PlayerOptions {
    input: PathBuf,
    config: Option<PathBuf>,
    fps: f64,
    seconds: Option<f64>,
    snapshot: Option<PathBuf>,
    audio_track: Option<usize>,
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reel=info,reel_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    tracing::info!("Reel v{}", reel_core::VERSION);
    run(options)
}

fn parse_args(args: &[String]) -> Result<PlayerOptions> {
    let mut input: Option<PathBuf> = None;
    let mut config = None;
    let mut fps = 60.0;
    let mut seconds = None;
    let mut snapshot = None;
    let mut audio_track = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
        };
        match flag {
            "--config" | "-c" => {
                config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--fps" => {
                let v = value()?;
                fps = v
                    .parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("Invalid fps {}: {}", v, e))?;
                if !(fps > 0.0) {
                    anyhow::bail!("fps must be positive, got {}", fps);
                }
                i += 2;
            }
            "--seconds" | "-s" => {
                let v = value()?;
                seconds = Some(
                    v.parse::<f64>()
                        .map_err(|e| anyhow::anyhow!("Invalid duration {}: {}", v, e))?,
                );
                i += 2;
            }
            "--snapshot" => {
                snapshot = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--audio-track" => {
                let v = value()?;
                audio_track = Some(
                    v.parse::<usize>()
                        .map_err(|e| anyhow::anyhow!("Invalid audio track {}: {}", v, e))?,
                );
                i += 2;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if !other.starts_with('-') && input.is_none() => {
                input = Some(PathBuf::from(other));
                i += 1;
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    let input = input.ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("Missing input file")
    })?;

    Ok(PlayerOptions {
        input,
        config,
        fps,
        seconds,
        snapshot,
        audio_track,
    })
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  reel <file.webm|file.mkv> [--config FILE] [--fps N] [--seconds N] [--snapshot OUT.png] [--audio-track N]\n"
    );
}

// ============================================================================
// Host loop
// ============================================================================

fn run(options: PlayerOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => PlaybackConfig::from_json_file(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => PlaybackConfig::default(),
    };
    if let Some(track) = options.audio_track {
        config.audio_track = track;
    }

    let stream = StreamLoader
        .load(&options.input)
        .with_context(|| format!("Loading {}", options.input.display()))?;

    let mut playback = VideoStreamPlayback::new();
    playback.set_config(config.clone());
    playback
        .try_open(stream.file())
        .with_context(|| format!("Opening {}", stream.file().display()))?;

    // Simulated mixer: takes one tick's worth of audio per call
    let per_tick = (playback.get_mix_rate() as f64 / options.fps).ceil() as usize;
    let mixed = Rc::new(RefCell::new(0u64));
    let mixed_in = Rc::clone(&mixed);
    playback.set_mix_callback(Box::new(move |_pcm: &[f32], frames: usize| {
        let take = frames.min(per_tick);
        *mixed_in.borrow_mut() += take as u64;
        take
    }));

    let textures = Rc::new(RefCell::new(0u64));
    let textures_in = Rc::clone(&textures);
    playback.set_texture_sink(Box::new(move |_frame: &RgbaFrame| {
        *textures_in.borrow_mut() += 1;
    }));

    let seconds = options.seconds.unwrap_or_else(|| playback.get_length());
    let ticks = (seconds * options.fps).ceil().max(0.0) as u64;
    let delta = 1.0 / options.fps;

    tracing::info!(
        "Playing {} for {:.2}s at {} ticks/s ({} ch @ {} Hz)",
        stream.file().display(),
        seconds,
        options.fps,
        playback.get_channels(),
        playback.get_mix_rate()
    );

    playback.play_with(&config);
    let mut ran = 0;
    let mut last_position = 0.0;
    while ran < ticks && playback.is_playing() {
        playback.update(delta);
        if playback.is_playing() {
            last_position = playback.get_playback_position();
        }
        ran += 1;
    }

    let stats = playback.stats();
    tracing::info!(
        "Done after {} ticks: position {:.3}s / {:.3}s, {} texture updates, {} skipped, {} unsupported, {} failed, {} samples mixed, queue capacity {}",
        ran,
        last_position,
        playback.get_length(),
        textures.borrow(),
        stats.frames_skipped,
        stats.frames_unsupported,
        stats.frames_failed,
        mixed.borrow(),
        stats.queue_capacity
    );

    if let Some(path) = &options.snapshot {
        write_snapshot(playback.texture(), path)?;
    }

    Ok(())
}

fn write_snapshot(frame: &RgbaFrame, path: &Path) -> Result<()> {
    if frame.generation == 0 {
        tracing::warn!("No frame was presented, snapshot is blank");
    }
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| anyhow::anyhow!("Framebuffer size does not match {}x{}", frame.width, frame.height))?;
    image
        .save(path)
        .with_context(|| format!("Writing snapshot {}", path.display()))?;
    tracing::info!("Snapshot written to {}", path.display());
    Ok(())
}
