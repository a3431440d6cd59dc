//! Utterance assembly from the gapless byte stream.
//!
//! Boards gate transmission with on-device voice activity detection: bytes
//! arrive while someone speaks and stop when they pause. The wire carries no
//! framing, so a receive gap is the only utterance boundary. The builder
//! collects chunks while bytes flow and the session seals it when the gap
//! timer fires, the duration cap is hit, or the connection ends.

use std::time::Duration;

use auris_audio::{AudioChunk, Format};
use chrono::{DateTime, Utc};

/// A contiguous run of speech samples from one board.
#[derive(Debug, Clone)]
pub struct Utterance {
    format: Format,
    started_at: DateTime<Utc>,
    samples: Vec<i16>,
    chunk_count: usize,
}

impl Utterance {
    fn open(format: Format, started_at: DateTime<Utc>) -> Self {
        Self {
            format,
            started_at,
            samples: Vec::new(),
            chunk_count: 0,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Arrival time of the first byte.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// End timestamp derived from the sample count.
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::milliseconds(self.duration().as_millis() as i64)
    }

    /// Audio duration covered by the collected samples.
    pub fn duration(&self) -> Duration {
        self.format.duration_of_samples(self.samples.len())
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Whole chunks folded in, not counting a sealed tail.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Assembles utterances from arriving chunks and seal events.
///
/// The duration cap is checked at chunk granularity, so a capped utterance
/// may run up to one chunk past the configured maximum.
#[derive(Debug)]
pub struct UtteranceBuilder {
    format: Format,
    max_samples: usize,
    open: Option<Utterance>,
}

impl UtteranceBuilder {
    pub fn new(format: Format, max_duration: Duration) -> Self {
        Self {
            format,
            max_samples: format.samples_in_duration(max_duration).max(1),
            open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Marks speech activity, opening an utterance if none is open.
    ///
    /// Called on every byte arrival so an utterance starts at its first
    /// byte, not at its first whole chunk.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.open.is_none() {
            self.open = Some(Utterance::open(self.format, now));
        }
    }

    /// Appends a chunk, returning a sealed utterance if the cap is hit.
    pub fn push_chunk(&mut self, chunk: &AudioChunk) -> Option<Utterance> {
        let open = self
            .open
            .get_or_insert_with(|| Utterance::open(self.format, chunk.received_at()));
        open.samples.extend_from_slice(chunk.samples());
        open.chunk_count += 1;
        if open.samples.len() >= self.max_samples {
            return self.open.take();
        }
        None
    }

    /// Seals the open utterance, folding in any buffered partial chunk.
    ///
    /// Returns `None` when nothing was open and no tail samples arrived.
    pub fn seal(&mut self, tail: &[i16], now: DateTime<Utc>) -> Option<Utterance> {
        if !tail.is_empty() {
            self.touch(now);
        }
        let mut utterance = self.open.take()?;
        utterance.samples.extend_from_slice(tail);
        Some(utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn chunk(seq: u64, samples: usize, received: DateTime<Utc>) -> AudioChunk {
        AudioChunk::new(Format::MONO_16K, seq, received, vec![100i16; samples])
    }

    #[test]
    fn builder_starts_closed() {
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_secs(20));
        assert!(!builder.is_open());
        assert!(builder.seal(&[], at(0)).is_none());
    }

    #[test]
    fn touch_keeps_the_first_start_time() {
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_secs(20));
        builder.touch(at(1000));
        builder.touch(at(5000));
        let sealed = builder.seal(&[1, 2], at(6000)).unwrap();
        assert_eq!(sealed.started_at(), at(1000));
    }

    #[test]
    fn one_second_of_chunks_reports_one_second() {
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_secs(20));
        for seq in 0..8 {
            assert!(builder.push_chunk(&chunk(seq, 2000, at(0))).is_none());
        }
        let sealed = builder.seal(&[], at(1000)).unwrap();
        assert_eq!(sealed.len(), 16_000);
        assert_eq!(sealed.duration(), Duration::from_secs(1));
        assert_eq!(sealed.chunk_count(), 8);
        assert_eq!(sealed.ended_at() - sealed.started_at(), chrono::Duration::seconds(1));
    }

    #[test]
    fn cap_splits_long_speech() {
        // Cap at half a second: 8000 samples.
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_millis(500));
        assert!(builder.push_chunk(&chunk(0, 2048, at(0))).is_none());
        assert!(builder.push_chunk(&chunk(1, 2048, at(128))).is_none());
        assert!(builder.push_chunk(&chunk(2, 2048, at(256))).is_none());
        let sealed = builder.push_chunk(&chunk(3, 2048, at(384))).unwrap();
        assert_eq!(sealed.len(), 8192);
        assert!(!builder.is_open());

        // The next chunk opens a fresh utterance stamped with its own arrival.
        assert!(builder.push_chunk(&chunk(4, 2048, at(512))).is_none());
        let next = builder.seal(&[], at(1000)).unwrap();
        assert_eq!(next.started_at(), at(512));
        assert_eq!(next.chunk_count(), 1);
    }

    #[test]
    fn seal_folds_in_the_tail() {
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_secs(20));
        builder.push_chunk(&chunk(0, 2048, at(0)));
        let sealed = builder.seal(&[7; 100], at(200)).unwrap();
        assert_eq!(sealed.len(), 2148);
        assert_eq!(sealed.chunk_count(), 1);
    }

    #[test]
    fn tail_alone_makes_a_sub_chunk_utterance() {
        let mut builder = UtteranceBuilder::new(Format::MONO_16K, Duration::from_secs(20));
        let sealed = builder.seal(&[1, 2, 3], at(750)).unwrap();
        assert_eq!(sealed.len(), 3);
        assert_eq!(sealed.chunk_count(), 0);
        assert_eq!(sealed.started_at(), at(750));
    }
}
