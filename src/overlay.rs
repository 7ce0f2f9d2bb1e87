//! On-frame overlay
//!
//! [`OverlayState`] is the text and numbers a viewer should see; a
//! [`Renderer`] draws them into the outgoing frame.

use serde::Serialize;

use crate::capture::{Frame, Rgb};
use crate::exercise::{RepEvent, RepState, RepStateMachine};

pub const START_STATUS: &str = "Start Workout";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayState {
    pub status: String,
    /// 0-100
    pub progress: f64,
    pub reps: u32,
    pub attempts: u32,
    pub average_rep_secs: f64,
    pub symmetry: Option<f64>,
    pub form_ok: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            status: START_STATUS.to_string(),
            progress: 0.0,
            reps: 0,
            attempts: 0,
            average_rep_secs: 0.0,
            symmetry: None,
            form_ok: true,
        }
    }
}

impl OverlayState {
    /// Refresh from the machine after it evaluated a frame that produced `event`.
    pub fn observe(&mut self, machine: &RepStateMachine, event: Option<&RepEvent>) {
        let stats = machine.stats();
        self.reps = stats.reps;
        self.attempts = stats.attempts;
        self.average_rep_secs = stats.average_rep_secs();
        self.symmetry = stats.symmetry;
        self.progress = machine.progress();
        self.form_ok = machine.state() != RepState::FormInvalid;

        match event {
            Some(RepEvent::AttemptStarted { .. }) => "Attempt Started".clone_into(&mut self.status),
            Some(RepEvent::RepCounted { .. }) => "Rep Counted".clone_into(&mut self.status),
            Some(RepEvent::RepInvalidated { .. }) => "Incomplete Rep".clone_into(&mut self.status),
            Some(RepEvent::FormFeedback(text)) => text.clone_into(&mut self.status),
            None if machine.state() == RepState::AttemptValidDepthReached => {
                machine.profile().depth_status.clone_into(&mut self.status);
            }
            None => {}
        }
    }
}

/// Draws overlay state into a frame.
pub trait Renderer: Send {
    fn render(&self, frame: &mut Frame, overlay: &OverlayState);
}

/// Stats panel with rep ticks, a form status strip and a vertical progress bar.
/// Text is left to downstream consumers of [`OverlayState`].
#[derive(Debug, Clone)]
pub struct PanelRenderer {
    pub panel: Rgb,
    pub tick: Rgb,
    pub good: Rgb,
    pub bad: Rgb,
    pub bar_track: Rgb,
    pub bar_fill: Rgb,
}

impl Default for PanelRenderer {
    fn default() -> Self {
        Self {
            panel: [32, 32, 32],
            tick: [240, 240, 240],
            good: [0, 200, 0],
            bad: [220, 0, 0],
            bar_track: [64, 64, 64],
            bar_fill: [255, 200, 0],
        }
    }
}

impl Renderer for PanelRenderer {
    fn render(&self, frame: &mut Frame, overlay: &OverlayState) {
        let (width, height) = (frame.width(), frame.height());
        if width < 8 || height < 8 {
            return;
        }
        let margin = (width / 64).max(1);

        // Stats panel, top left
        let panel_w = width / 4;
        let panel_h = height / 5;
        frame.fill_rect(margin, margin, panel_w, panel_h, self.panel);

        // One tick per rep, wrapping within the panel
        let tick_w = (panel_w / 24).max(1);
        let tick_h = (panel_h / 4).max(1);
        let per_row = ((panel_w - margin) / (tick_w * 2)).max(1);
        for i in 0..overlay.reps {
            let row = i / per_row;
            let col = i % per_row;
            let y = margin * 2 + row * (tick_h + margin);
            if y + tick_h > margin + panel_h {
                break;
            }
            frame.fill_rect(margin * 2 + col * tick_w * 2, y, tick_w, tick_h, self.tick);
        }

        // Status strip under the panel
        let strip = if overlay.form_ok { self.good } else { self.bad };
        frame.fill_rect(margin, margin * 2 + panel_h, panel_w, (height / 40).max(1), strip);

        // Progress bar, right edge, filled from the bottom
        let bar_w = (width / 40).max(1);
        let bar_h = height / 2;
        let bar_x = width - bar_w - margin;
        let bar_y = (height - bar_h) / 2;
        frame.fill_rect(bar_x, bar_y, bar_w, bar_h, self.bar_track);
        let filled = (f64::from(bar_h) * overlay.progress.clamp(0.0, 100.0) / 100.0).round() as u32;
        frame.fill_rect(bar_x, bar_y + bar_h - filled, bar_w, filled, self.bar_fill);
    }
}
