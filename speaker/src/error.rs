use thiserror::Error;

/// Errors from embedding extraction and profile loading.
#[derive(Debug, Error)]
pub enum SpeakerError {
    /// The utterance is too short to frame.
    #[error("utterance too short for embedding: {0} samples")]
    TooShort(usize),

    /// The utterance carries no usable signal energy.
    #[error("utterance is silent")]
    Silent,

    /// Profile vectors do not share one dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// An enrolled profile has a zero reference vector.
    #[error("profile {0} has a zero embedding")]
    ZeroEmbedding(String),

    /// Profile file could not be read.
    #[error("profile io: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file could not be parsed.
    #[error("profile parse: {0}")]
    Parse(#[from] serde_yaml::Error),
}
