//! Speaker verification for the ingestion gateway.
//!
//! An utterance becomes a fixed-length vector through an [`Embedder`], is
//! scored against the enrolled [`ProfileTable`] with cosine similarity, and
//! the best match decides whether the audio belongs to the device's assigned
//! user. The built-in [`SpectralEmbedder`] is a deterministic DSP pipeline;
//! model-backed extractors plug in behind the same trait.
//!
//! Matching is pure and lock-free: callers grab an immutable table snapshot
//! and scan it. Enrollment itself happens out of band; this crate only loads
//! the vectors it produces.

mod embedder;
mod embedding;
mod error;
mod matcher;
mod profile;

pub use embedder::{Embedder, SpectralConfig, SpectralEmbedder};
pub use embedding::{cosine_sim, l2_normalize, l2_norm};
pub use error::SpeakerError;
pub use matcher::{best_match, Match};
pub use profile::{EnrolledProfile, ProfileCell, ProfileTable};
