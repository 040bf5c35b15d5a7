//! Film transport CLI.
//!
//! Drives the scan rig through one of three modes: `scan` (capture every
//! frame), `click` (same motion, no camera - for verifying circuit timing),
//! and `wind` (bulk transport with no sensor alignment). Ctrl+C stops any
//! mode at the next frame boundary; the motors are released on every exit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use hardware::breakbeam::Breakbeam;
use hardware::ipwebcam::IpWebcam;
use hardware::motorkit::MotorKit;
use shared::rig_config::{ConfigStorage, RigConfig};
use shared::rig_interface::{FocusMode, FrameCamera, StepperMotor};
use telecine::{rotate, FilmTransport, Session, SessionOutcome, SessionSummary, TransportConfig};

#[derive(Parser, Debug)]
#[command(
    name = "scan_film",
    about = "Frame-by-frame film scanner transport",
    version
)]
struct Cli {
    /// Rig configuration file (defaults to ~/.scan_rig/rig.json).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan film: capture a photo of every frame while advancing.
    Scan {
        /// Frames to process (default: run until interrupted).
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Dry-run the transport with no camera; clicks through the cycle.
    Click {
        /// Frames to process (default: run until interrupted).
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Wind film in whole-frame circuits, no sensor alignment.
    Wind {
        #[arg(value_enum)]
        direction: WindDirection,
        /// Frame circuits to wind (default: until interrupted).
        #[arg(short, long)]
        frames: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WindDirection {
    /// Fast-forward in the advance direction.
    Forward,
    /// Back toward the feed reel.
    Rewind,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let rig = match &cli.config {
        Some(path) => RigConfig::load_from_file(path)
            .with_context(|| format!("loading rig config from {}", path.display()))?,
        None => ConfigStorage::new()?.load_or_default()?,
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupt.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing interrupt handler")?;
    }

    let kit = MotorKit::from_config(&rig).context("opening motor HAT")?;
    let gate = kit.stepper1();
    let takeup = kit.stepper2();

    match cli.command {
        Command::Scan { frames } => {
            info!(
                "scanning {} frames",
                frames.map_or("unlimited".to_string(), |n| n.to_string())
            );
            let sensor = Breakbeam::from_config(&rig).context("opening breakbeam sensor")?;
            let mut camera = IpWebcam::from_config(&rig);
            prime_camera(&mut camera, &rig).context("priming camera")?;

            let transport = FilmTransport::new(
                gate,
                takeup,
                sensor,
                Some(camera),
                TransportConfig::from_rig(&rig),
            );
            let summary = Session::new(transport, interrupt).run(frames)?;
            report(&summary);
        }
        Command::Click { frames } => {
            let sensor = Breakbeam::from_config(&rig).context("opening breakbeam sensor")?;
            let transport = FilmTransport::new(
                gate,
                takeup,
                sensor,
                None::<IpWebcam>,
                TransportConfig::from_rig(&rig),
            );
            let summary = Session::new(transport, interrupt).run(frames)?;
            report(&summary);
        }
        Command::Wind { direction, frames } => {
            wind(gate, &rig, direction, frames, &interrupt)?;
        }
    }

    Ok(())
}

/// Point the camera at a known state before the first frame. The same calls
/// re-prime it after a capture timeout mid-session.
fn prime_camera(camera: &mut IpWebcam, rig: &RigConfig) -> Result<()> {
    camera.set_zoom(rig.camera_zoom_percent)?;
    camera.set_focus_mode(FocusMode::Off)?;
    Ok(())
}

fn report(summary: &SessionSummary) {
    match summary.outcome {
        SessionOutcome::Completed => info!("done: {} frames", summary.frames_processed),
        SessionOutcome::Interrupted => {
            info!("stopped: {} frames processed", summary.frames_processed)
        }
    }
}

/// Sensorless bulk transport in whole grabber circuits.
fn wind<M: StepperMotor>(
    mut gate: M,
    rig: &RigConfig,
    direction: WindDirection,
    frames: Option<u64>,
    interrupt: &AtomicBool,
) -> Result<()> {
    let dir = match direction {
        WindDirection::Forward => rig.advance_direction,
        WindDirection::Rewind => rig.advance_direction.opposite(),
    };
    let config = TransportConfig::from_rig(rig);
    let mut circuits: u64 = 0;

    let result = loop {
        if let Some(target) = frames {
            if circuits >= target {
                break Ok(());
            }
        }
        if interrupt.load(Ordering::Relaxed) {
            info!("interrupt received; stopping wind");
            break Ok(());
        }
        if let Err(e) = rotate(
            &mut gate,
            dir,
            config.advance_style,
            config.frame_circuit_steps,
            config.seek.step_interval,
        ) {
            break Err(e);
        }
        circuits += 1;
    };

    if let Err(e) = gate.release() {
        warn!("motor release failed: {}", e);
    }
    result?;
    info!("wound {} frame circuits", circuits);
    Ok(())
}
