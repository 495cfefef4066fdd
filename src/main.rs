//! Inspectcam CLI: takes inspection photos from a webcam or a simulated camera.

mod config_utils;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config_utils::{load_options, OptionsWatcher};
use inspectcam::capture::simulated::{SimulatedCamera, SimulatedPlatform};
use inspectcam::capture::MediaPlatform;
use inspectcam::{
    DeviceManager, Dimension, DirectoryUploader, FacingMode, FlashMode, SessionOptions, SessionState, StreamSession,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

/// Host refresh interval used to drive the session.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Facing {
    /// Rear camera (last device on desktops)
    Environment,
    /// Front camera (first device on desktops)
    User,
}

impl From<Facing> for FacingMode {
    fn from(facing: Facing) -> Self {
        match facing {
            Facing::Environment => FacingMode::Environment,
            Facing::User => FacingMode::User,
        }
    }
}

/// Capture tamper-evident inspection photos.
#[derive(Parser, Debug)]
#[command(name = "inspectcam")]
#[command(about = "Capture stabilized, watermarked inspection photos from a camera")]
struct Args {
    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,

    /// Use a simulated camera of the given size (e.g. 1920x1440) instead of hardware
    #[arg(long, value_parser = parse_dimension)]
    simulate: Option<Dimension>,

    /// Preferred camera direction
    #[arg(long, value_enum)]
    facing: Option<Facing>,

    /// Pin a specific device (see --list-devices)
    #[arg(long)]
    device_id: Option<String>,

    /// YAML file with session options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the photos and their metadata
    #[arg(short, long, default_value = "captures")]
    output: PathBuf,

    /// Number of photos to take
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    /// Delay between photos in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Turn the torch on once the camera is ready
    #[arg(long)]
    torch: bool,

    /// Manual focus position from 0 (near) to 1 (far)
    #[arg(long)]
    focus: Option<f64>,

    /// Keep capturing until Ctrl-C, reopening the camera when the config file changes
    #[arg(long)]
    watch: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn parse_dimension(value: &str) -> std::result::Result<Dimension, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", value))?;
    let width = width.trim().parse::<u32>().map_err(|e| format!("bad width: {}", e))?;
    let height = height.trim().parse::<u32>().map_err(|e| format!("bad height: {}", e))?;
    let size = Dimension::new(width, height);
    if !size.is_valid() {
        return Err(format!("{} has a zero side", size));
    }
    Ok(size)
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let options = match &args.config {
        Some(path) => load_options(path)?,
        None => SessionOptions::default(),
    };
    let options = apply_overrides(options, &args);
    debug!("Session options: {:?}", options);

    match args.simulate {
        Some(size) => {
            info!("Using simulated {} camera", size);
            let camera = SimulatedCamera {
                label: format!("Simulated {} camera", size),
                native: size,
                warmup: vec![Dimension::new(640, 480), Dimension::new(640, 480)],
                ..Default::default()
            };
            run(SimulatedPlatform::new(camera), &args, options)
        }
        None => run_native(&args, options),
    }
}

#[cfg(all(
    feature = "native",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
fn run_native(args: &Args, options: SessionOptions) -> Result<()> {
    run(inspectcam::capture::NokhwaPlatform::new(), args, options)
}

#[cfg(not(all(
    feature = "native",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
)))]
fn run_native(_args: &Args, _options: SessionOptions) -> Result<()> {
    anyhow::bail!("built without native camera support, use --simulate WIDTHxHEIGHT")
}

/// Command-line flags win over the config file.
fn apply_overrides(mut options: SessionOptions, args: &Args) -> SessionOptions {
    if let Some(facing) = args.facing {
        options.facing_mode = facing.into();
    }
    if let Some(device_id) = &args.device_id {
        options.device_id = Some(device_id.clone());
    }
    if args.torch {
        options.initial_flash_mode = FlashMode::On;
    }
    if args.debug {
        options.debug = true;
    }
    options
}

fn run<P: MediaPlatform>(platform: P, args: &Args, mut options: SessionOptions) -> Result<()> {
    let mut manager = DeviceManager::new(platform);

    if args.list_devices {
        println!("Available cameras:");
        for device in manager.list_devices()? {
            println!("  [{}] {}", device.device_id, device.label);
        }
        return Ok(());
    }

    let mut uploader = DirectoryUploader::new(&args.output)?.with_metadata(true);

    let running = Arc::new(AtomicBool::new(true));
    if args.watch {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("Received interrupt signal, shutting down...");
            r.store(false, Ordering::SeqCst);
        })?;
    }
    let mut watcher = if args.watch {
        OptionsWatcher::new(args.config.clone())
    } else {
        None
    };

    let interval = Duration::from_millis(args.interval_ms);
    let mut taken = 0u32;

    while running.load(Ordering::SeqCst) {
        let mut session = open_session(&mut manager, &options, args)?;

        while running.load(Ordering::SeqCst) {
            if let Some(changed) = watcher.as_mut().and_then(OptionsWatcher::check_for_changes) {
                info!("Options changed, reopening the camera");
                options = apply_overrides(changed, args);
                break;
            }

            let capture = session.capture().context("Capture failed")?;
            let receipt = uploader.upload_capture(&capture)?;
            taken += 1;
            println!(
                "{} {} rotation={} stable_frames={}",
                receipt.file_url,
                capture.meta.output,
                capture.meta.rotation.degrees(),
                capture.meta.stable_frames
            );

            if !args.watch && taken >= args.count {
                return Ok(());
            }
            idle(&mut session, interval, &running)?;
        }
    }

    info!("Captured {} photo(s)", taken);
    Ok(())
}

fn open_session<P: MediaPlatform>(
    manager: &mut DeviceManager<P>,
    options: &SessionOptions,
    args: &Args,
) -> Result<StreamSession> {
    let mut session = manager
        .create_session(options.clone())
        .context("Failed to open a camera")?;
    session.on_state_change(|state| debug!("Camera session is {}", state));

    let size = session
        .wait_until_settled(FRAME_INTERVAL)
        .context("Camera did not become ready")?;
    info!("Camera ready at {}", size);

    if let Some(ratio) = args.focus {
        match session.track_controls() {
            Some(controls) if controls.set_manual_focus(ratio) => info!("Manual focus set to {:.2}", ratio),
            _ => warn!("Manual focus is not available on this camera"),
        }
    }
    Ok(session)
}

/// Keeps the session ticking for `interval`.
fn idle(session: &mut StreamSession, interval: Duration, running: &AtomicBool) -> Result<()> {
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline && running.load(Ordering::SeqCst) {
        if let SessionState::Error { code, message } = session.tick(Instant::now()) {
            anyhow::bail!("Camera session failed ({}): {}", code, message);
        }
        thread::sleep(FRAME_INTERVAL);
    }
    Ok(())
}
