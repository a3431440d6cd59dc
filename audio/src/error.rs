use thiserror::Error;

/// Errors produced when decoding raw PCM byte streams.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The byte slice does not split into whole 16-bit samples.
    #[error("odd pcm byte length: {0}")]
    OddPcmLength(usize),
}
