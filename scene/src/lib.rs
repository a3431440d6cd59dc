//! Scene resolution: turning a stream of per-utterance verification
//! decisions into a context label and a pass/block gate.
//!
//! Each device has a trailing [`SceneWindow`] of recent
//! [`VerificationDecision`]s. The [`SceneResolver`] folds every new decision
//! into the window, buckets the retained speech into target / other-speaker /
//! unidentified durations, and classifies the ambient context:
//!
//! - `solo_activity` when the assigned user dominates (audio may proceed),
//! - `background_noise_tv` when unidentified speech dominates,
//! - `social_interaction` otherwise.
//!
//! Only `solo_activity` passes the gate; every decision is recorded
//! regardless, so the audit trail stays complete.

mod decision;
mod resolver;
mod window;

#[cfg(test)]
mod tests;

pub use decision::{ContextLabel, Gate, SceneDecision, VerificationDecision};
pub use resolver::{SceneConfig, SceneResolver};
pub use window::{SceneWindow, WindowStats};
