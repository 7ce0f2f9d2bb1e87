//! Exercise definitions and the rep counting state machine.

pub mod angles;
pub mod machine;
pub mod profile;

pub use angles::AngleSample;
pub use machine::{RepEvent, RepState, RepStateMachine, SessionStats};
pub use profile::{
    parse_profiles, Cadence, Comparison, ExerciseProfile, FormCue, InvalidAttemptPolicy, Metric,
    Phase, ProfileCatalog, ProgressRange, Threshold,
};
