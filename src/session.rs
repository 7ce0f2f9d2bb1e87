//! Per-frame session loop
//!
//! ```text
//!            ┌──────────── once per frame ────────────┐
//! FrameSource ─▶ AngleSource ─▶ RepStateMachine ─▶ Coach ─▶ FeedbackDispatcher
//!      │                              │
//!      │                              ▼
//!      └──────────────────────▶ Renderer ─▶ StreamSupervisor
//! ```
//!
//! The loop owns the machine and its stats outright. Other tasks only reach
//! it through the [`StopSignal`] and the dispatcher's queue. Shutdown runs
//! exactly once, whatever ended the loop.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{Frame, FrameSource};
use crate::error::Result;
use crate::exercise::{ExerciseProfile, RepStateMachine, SessionStats};
use crate::feedback::{Coach, FeedbackDispatcher, FeedbackEvent, StopOutcome};
use crate::overlay::{OverlayState, PanelRenderer, Renderer};
use crate::pose::AngleSource;
use crate::report::SessionReport;
use crate::stream::{StreamStats, StreamSupervisor};

pub const STREAM_STARTED: &str = "The video stream has started successfully.";

/// Cooperative stop flag shared between the loop and its listeners.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            debug!("Stop requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Trigger `signal` when a line reading `q` arrives on stdin.
///
/// Runs on a plain thread: a pending stdin read must not hold up runtime
/// shutdown once the session is over.
pub fn spawn_stdin_listener(signal: StopSignal) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("repcast-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if is_quit_command(&line) {
                    info!("Received quit command");
                    signal.trigger();
                    return;
                }
            }
            debug!("stdin closed, command listener exiting");
        })
}

/// Trigger `signal` on Ctrl-C, or SIGTERM on unix.
pub fn spawn_signal_listener(signal: StopSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal as unix_signal, SignalKind};
            match unix_signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                        _ = term.recv() => info!("Terminated"),
                    }
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Interrupted");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Interrupted");
        }
        signal.trigger();
    })
}

fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

/// Why the frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    Exhausted,
    Failed,
}

/// Everything known about a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub exercise: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub frames: u64,
    pub frames_with_pose: u64,
    pub stats: SessionStats,
    pub success_rate: f64,
    pub average_rep_secs: f64,
    pub stream: StreamStats,
    pub feedback_messages: u64,
    pub speech: StopOutcome,
    pub report_path: PathBuf,
    pub report_written: bool,
}

/// Drives one exercise session from first frame to persisted report.
pub struct SessionController {
    source: Box<dyn FrameSource>,
    angles: Box<dyn AngleSource>,
    machine: RepStateMachine,
    coach: Coach,
    dispatcher: FeedbackDispatcher,
    supervisor: StreamSupervisor,
    renderer: Box<dyn Renderer>,
    overlay: OverlayState,
    stop: StopSignal,
    report_path: PathBuf,
    frames: u64,
    frames_with_pose: u64,
    feedback_messages: u64,
}

impl SessionController {
    pub fn new(
        profile: Arc<ExerciseProfile>,
        source: Box<dyn FrameSource>,
        angles: Box<dyn AngleSource>,
        supervisor: StreamSupervisor,
        dispatcher: FeedbackDispatcher,
        report_path: PathBuf,
    ) -> Self {
        let coach = Coach::new(profile.coaching.clone(), None);
        Self {
            source,
            angles,
            machine: RepStateMachine::new(profile),
            coach,
            dispatcher,
            supervisor,
            renderer: Box::new(PanelRenderer::default()),
            overlay: OverlayState::default(),
            stop: StopSignal::new(),
            report_path,
            frames: 0,
            frames_with_pose: 0,
            feedback_messages: 0,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Seed coaching message selection.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.coach = Coach::new(self.machine.profile().coaching.clone(), seed);
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run until stopped, the source runs dry, or a fatal error.
    ///
    /// The shutdown sequence and report write happen in every case. A fatal
    /// error is returned after shutdown has completed.
    pub async fn run(mut self) -> Result<SessionSummary> {
        let started_at = Utc::now();
        info!("Session started: {}", self.machine.profile().name);

        let outcome = self.run_loop().await;
        let end_reason = match &outcome {
            Ok(reason) => *reason,
            Err(e) => {
                error!("Session failed: {e}");
                EndReason::Failed
            }
        };

        let summary = self.shutdown(started_at, end_reason).await;
        outcome.map(|_| summary)
    }

    async fn run_loop(&mut self) -> Result<EndReason> {
        self.supervisor.start()?;
        self.notify(FeedbackEvent::status(STREAM_STARTED));

        loop {
            if self.stop.is_triggered() {
                return Ok(EndReason::Stopped);
            }
            let stop = self.stop.clone();
            let frame = tokio::select! {
                biased;
                () = stop.wait() => return Ok(EndReason::Stopped),
                frame = self.source.next_frame() => frame?,
            };
            let Some(frame) = frame else {
                info!("Capture exhausted");
                return Ok(EndReason::Exhausted);
            };
            self.process(frame).await?;
        }
    }

    async fn process(&mut self, mut frame: Frame) -> Result<()> {
        self.frames += 1;

        let sample = self.angles.measure(&frame);
        if !sample.is_empty() {
            self.frames_with_pose += 1;
            let event = self.machine.advance(&sample, Instant::now());
            if let Some(event) = &event {
                if let Some(feedback) = self.coach.respond(event) {
                    self.notify(feedback);
                }
            }
            self.overlay.observe(&self.machine, event.as_ref());
        }

        self.renderer.render(&mut frame, &self.overlay);
        match self.supervisor.push_frame(&frame).await {
            Err(e) if e.is_fatal() => Err(e.into()),
            // Already logged by the supervisor; the frame is gone, the session goes on.
            Ok(()) | Err(_) => Ok(()),
        }
    }

    fn notify(&mut self, event: FeedbackEvent) {
        if self.dispatcher.notify(event) {
            self.feedback_messages += 1;
        }
    }

    /// Release capture, stop the stream, stop speech, write the report.
    /// Each step runs even if an earlier one failed.
    async fn shutdown(
        mut self,
        started_at: DateTime<Utc>,
        end_reason: EndReason,
    ) -> SessionSummary {
        debug!("Shutting down session ({end_reason:?})");
        self.source.release();
        let stream = self.supervisor.stop().await;
        let speech = self.dispatcher.stop().await;
        if speech != StopOutcome::Drained {
            warn!("Speech shutdown: {speech:?}");
        }

        let exercise = self.machine.profile().name.clone();
        let stats = self.machine.into_stats();
        let report = SessionReport::from_stats(&stats);
        let report_written = match report.write_to(&self.report_path).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write report to {}: {e}", self.report_path.display());
                false
            }
        };

        info!(
            "Session ended: {} reps of {} attempts ({:.2}%)",
            stats.reps, stats.attempts, report.success_rate
        );

        SessionSummary {
            exercise,
            started_at,
            ended_at: Utc::now(),
            end_reason,
            frames: self.frames,
            frames_with_pose: self.frames_with_pose,
            success_rate: report.success_rate,
            average_rep_secs: stats.average_rep_secs(),
            stats,
            stream,
            feedback_messages: self.feedback_messages,
            speech,
            report_path: self.report_path,
            report_written,
        }
    }
}
