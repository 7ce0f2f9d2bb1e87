use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use repcast::session::{spawn_signal_listener, spawn_stdin_listener};
use repcast::{
    FeedbackDispatcher, FrameSource, PoseTrack, RawVideoSource, SessionController, Settings,
    StopOutcome, StopSignal, StreamSupervisor, SyntheticSource,
};

#[derive(Args)]
pub struct RunArgs {
    /// Exercise to count (see `repcast profiles`)
    #[arg(short, long, default_value = "curl")]
    pub exercise: String,

    /// Pose track to replay (JSON lines, one per frame)
    #[arg(short, long)]
    pub poses: Option<PathBuf>,

    /// Raw RGB24 frames at the stream resolution ("-" for stdin)
    #[arg(short, long)]
    pub frames: Option<PathBuf>,

    /// Stop after this many frames when no frame input is given
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Stream destination (default: config, else ingest URL + $REPCAST_STREAM_KEY or $YOUTUBE_STREAM_KEY)
    #[arg(short, long)]
    pub url: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// Do not capture an audio device into the stream
    #[arg(long)]
    pub no_audio: bool,

    /// Log feedback instead of speaking it
    #[arg(long)]
    pub no_speech: bool,

    /// Report file (default: from config, else results.txt)
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Seed for coaching message selection
    #[arg(long)]
    pub seed: Option<u64>,
}

pub async fn cmd_run(args: RunArgs, settings: Settings) -> Result<()> {
    let catalog = settings.catalog()?;
    let profile = Arc::new(catalog.get(&args.exercise)?.clone());
    eprintln!("🏋️  Exercise: {}", profile.name);

    let mut encoder = settings.encoder.clone();
    if let Some(width) = args.width {
        encoder.width = width;
    }
    if let Some(height) = args.height {
        encoder.height = height;
    }
    if let Some(fps) = args.fps {
        encoder.fps = fps;
    }
    if args.no_audio {
        encoder = encoder.without_audio();
    }
    if encoder.args.is_none() {
        encoder.destination = settings.destination(args.url.as_deref()).context(
            "No stream destination: pass --url, set encoder.destination, or export REPCAST_STREAM_KEY",
        )?;
    }
    eprintln!(
        "📡 Encoder: {} {}x{} @ {} fps",
        encoder.program.display(),
        encoder.width,
        encoder.height,
        encoder.fps
    );

    let poses = match &args.poses {
        Some(path) => PoseTrack::load(path, profile.joints.clone())
            .await
            .with_context(|| format!("failed to load pose track {}", path.display()))?,
        None => {
            warn!("No pose track given, nobody will be detected");
            PoseTrack::empty()
        }
    };

    let frames_from_stdin = args.frames.as_deref() == Some(Path::new("-"));
    let source: Box<dyn FrameSource> = match &args.frames {
        Some(_) if frames_from_stdin => {
            Box::new(RawVideoSource::stdin(encoder.width, encoder.height))
        }
        Some(path) => Box::new(
            RawVideoSource::open(path, encoder.width, encoder.height)
                .await
                .with_context(|| format!("failed to open frames {}", path.display()))?,
        ),
        None => {
            let mut synthetic = SyntheticSource::new(encoder.width, encoder.height, encoder.fps);
            let limit = args
                .max_frames
                .or_else(|| args.poses.is_some().then(|| poses.remaining() as u64));
            if let Some(limit) = limit {
                synthetic = synthetic.with_limit(limit);
            }
            Box::new(synthetic)
        }
    };

    let mut feedback = settings.feedback.clone();
    if args.no_speech {
        feedback.enabled = false;
    }
    let engine = feedback.speech_engine();
    eprintln!("🔊 Speech: {}", engine.name());
    let dispatcher = FeedbackDispatcher::spawn(engine, feedback.dispatcher_config());

    let report_path = args.report.unwrap_or_else(|| settings.report.path.clone());

    let stop = StopSignal::new();
    let signals = spawn_signal_listener(stop.clone());
    if !frames_from_stdin {
        spawn_stdin_listener(stop.clone()).context("failed to start command listener")?;
        eprintln!("⏹  Type q + Enter to stop");
    }

    let session = SessionController::new(
        profile,
        source,
        Box::new(poses),
        StreamSupervisor::new(encoder),
        dispatcher,
        report_path,
    )
    .with_stop_signal(stop)
    .with_seed(args.seed);

    let result = session.run().await;
    signals.abort();
    let summary = result?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    eprintln!(
        "✅ {} reps / {} attempts ({:.2}%), report: {}",
        summary.stats.reps,
        summary.stats.attempts,
        summary.success_rate,
        summary.report_path.display()
    );

    if summary.speech == StopOutcome::Abandoned {
        eprintln!("⚠️  Speech did not stop, forcing exit");
        std::process::exit(1);
    }

    Ok(())
}
