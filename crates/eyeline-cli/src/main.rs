use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use eyeline_core::{
    evaluate_transcript, EngagementInputs, EngagementWeights, EyeTracker, FaceMeshExtractor,
    FrameAnalysis, ManualClock, MonotonicClock, TrackerConfig,
};
use eyeline_hw::{Camera, Frame};

#[derive(Parser)]
#[command(name = "eyeline", about = "Eyeline eye-contact and engagement CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Face-mesh ONNX model (default: model dir / face_landmarks_478.onnx)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Model expects NCHW input instead of NHWC
    #[arg(long)]
    nchw: bool,
}

impl ModelArgs {
    fn load(&self) -> Result<FaceMeshExtractor> {
        let path = self.model.clone().unwrap_or_else(|| {
            eyeline_core::default_model_dir().join(eyeline_core::FACE_MESH_MODEL)
        });
        let path = path.to_string_lossy().into_owned();
        FaceMeshExtractor::load(&path, !self.nchw).with_context(|| format!("loading {path}"))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Track eye contact live from a webcam
    Monitor {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Stop after this many frames (default: until Ctrl-C)
        #[arg(long)]
        frames: Option<u64>,
        /// Drop the baseline every N frames so it follows a drifting posture
        #[arg(long)]
        recalibrate_every: Option<u64>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Run a sequence of still images through one session
    Analyze {
        /// Image files in capture order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Frame rate the images were captured at
        #[arg(long, default_value_t = 10.0)]
        fps: f64,
        /// Threshold preset: "web" or "monitor"
        #[arg(long, default_value = "web")]
        preset: String,
        /// Print every frame record as a JSON line
        #[arg(short, long)]
        verbose: bool,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Compute an engagement score from its four inputs
    Score {
        /// Eye-contact ratio, 0–1
        #[arg(long)]
        eye: f64,
        /// Speech accuracy, 0–100
        #[arg(long, default_value_t = 0.0)]
        speech: f64,
        /// Speaking rate in words per minute
        #[arg(long, default_value_t = 0.0)]
        wpm: f64,
        /// Voice stability factor, 0–1
        #[arg(long, default_value_t = 0.0)]
        voice: f64,
    },
    /// Evaluate a transcript for speaking rate and language errors
    Speech {
        /// Transcript text (reads --file if omitted)
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// File containing the transcript
        #[arg(long)]
        file: Option<PathBuf>,
        /// Seconds of speech the transcript covers
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },
    /// Show daemon status
    Status {
        /// Talk to the daemon on the system bus
        #[arg(long)]
        system: bool,
    },
    /// List video capture devices
    Devices,
}

// D-Bus proxy for the daemon; only `status` is used here.
#[zbus::proxy(
    interface = "org.eyeline.Eyeline1",
    default_service = "org.eyeline.Eyeline1",
    default_path = "/org/eyeline/Eyeline1"
)]
trait Eyeline {
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            device,
            frames,
            recalibrate_every,
            model,
        } => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, Ordering::Relaxed);
                }
            });
            let summary = tokio::task::spawn_blocking(move || {
                run_monitor(&device, frames, recalibrate_every, &model, &stop)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Analyze {
            images,
            fps,
            preset,
            verbose,
            model,
        } => {
            run_analyze(&images, fps, &preset, verbose, &model)?;
        }
        Commands::Score {
            eye,
            speech,
            wpm,
            voice,
        } => {
            let weights = EngagementWeights::default();
            let inputs = EngagementInputs {
                eye_contact_ratio: eye,
                speech_accuracy: speech,
                speaking_rate_wpm: wpm,
                voice_factor: voice,
            };
            println!("rate score:       {:.1}", weights.rate_score(wpm));
            println!("engagement score: {:.1}", weights.score(&inputs));
        }
        Commands::Speech {
            text,
            file,
            duration,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("pass --text or --file"),
            };
            let metrics = evaluate_transcript(&text, duration);
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Commands::Status { system } => {
            let conn = if system {
                zbus::Connection::system().await?
            } else {
                zbus::Connection::session().await?
            };
            let proxy = EyelineProxy::new(&conn).await?;
            match proxy.status().await {
                Ok(status) => {
                    let value: serde_json::Value = serde_json::from_str(&status)?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Err(e) => println!("eyelined: not connected ({e})"),
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}\t{} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

/// Live loop: camera → tracker with the monitor preset, logging contact
/// and blink events as they happen.
fn run_monitor(
    device: &str,
    frames: Option<u64>,
    recalibrate_every: Option<u64>,
    model: &ModelArgs,
    stop: &AtomicBool,
) -> Result<eyeline_core::SessionSummary> {
    let mut extractor = model.load()?;
    let camera = Camera::open(device)?;
    let mut stream = camera.stream()?;
    let mut tracker = EyeTracker::new(TrackerConfig::monitor(), Arc::new(MonotonicClock::new()))?;
    tracing::info!(device, "monitoring; press Ctrl-C to stop");

    let mut previous: Option<FrameAnalysis> = None;
    let mut count = 0u64;
    let mut dark = 0u64;
    while !stop.load(Ordering::Relaxed) && frames.map_or(true, |limit| count < limit) {
        let frame = stream.next_frame()?;
        if !is_usable(&frame) {
            dark += 1;
            continue;
        }
        let image = frame.to_image()?;
        let analysis = tracker.process_rgb(&mut extractor, &image)?;
        count += 1;

        log_events(previous.as_ref(), &analysis);
        previous = Some(analysis);

        if recalibrate_every.is_some_and(|n| n > 0 && count % n == 0) {
            tracing::info!(frame = count, "periodic recalibration");
            tracker.recalibrate();
        }
    }

    if dark > 0 {
        tracing::info!(dark, "skipped dark frames");
    }
    Ok(tracker.stop())
}

/// Dark frames (lens covered, lights off) never reach the tracker.
fn is_usable(frame: &Frame) -> bool {
    if frame.is_dark {
        tracing::debug!(
            seq = frame.sequence,
            brightness = frame.avg_brightness(),
            "skipping dark frame"
        );
        return false;
    }
    true
}

fn log_events(previous: Option<&FrameAnalysis>, current: &FrameAnalysis) {
    let was_contact = previous.is_some_and(|p| p.eye_contact);
    if current.eye_contact && !was_contact {
        tracing::info!(
            yaw = current.head_pose.yaw,
            pitch = current.head_pose.pitch,
            "eye contact started"
        );
    } else if !current.eye_contact && was_contact {
        tracing::info!(
            total_secs = current.eye_contact_seconds,
            face = current.face_detected,
            "eye contact ended"
        );
    }
    if current.calibrated && !previous.is_some_and(|p| p.calibrated) {
        tracing::info!("calibrated");
    }
    let blinks_before = previous.map_or(0, |p| p.blink_count);
    if current.blink_count > blinks_before {
        tracing::info!(total = current.blink_count, "blink");
    }
}

/// Feed still images through one tracker on a synthetic clock.
fn run_analyze(
    images: &[PathBuf],
    fps: f64,
    preset: &str,
    verbose: bool,
    model: &ModelArgs,
) -> Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("--fps must be positive");
    }
    let config = TrackerConfig::preset(preset)
        .with_context(|| format!("unknown preset {preset:?} (use \"web\" or \"monitor\")"))?;
    let mut extractor = model.load()?;
    let clock = Arc::new(ManualClock::new(0.0));
    let mut tracker = EyeTracker::new(config, clock.clone())?;

    for path in images {
        clock.advance(1.0 / fps);
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        match tracker.process_image(&mut extractor, &bytes) {
            Ok(analysis) if verbose => println!("{}", serde_json::to_string(&analysis)?),
            Ok(_) => {}
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "skipping frame"),
        }
    }

    let summary = tracker.stop();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
