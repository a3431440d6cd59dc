//! Per-device trailing decision window.

use crate::decision::VerificationDecision;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// Bounded, time-ordered window of recent verification decisions for one
/// device.
///
/// Entries older than the span, relative to the newest decision, are evicted
/// lazily on each push; the window never grows beyond what the span and the
/// utterance rate allow.
#[derive(Debug)]
pub struct SceneWindow {
    entries: VecDeque<VerificationDecision>,
    span: Duration,
}

/// Speech-duration buckets aggregated over one window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowStats {
    /// Total utterance duration retained in the window.
    pub total: Duration,
    /// Duration verified as the assigned user.
    pub target: Duration,
    /// Duration confidently matched to some other enrolled user.
    pub other_speaker: Duration,
    /// Everything else: weak or ambiguous matches, dropped utterances.
    pub unidentified: Duration,
    /// Distinct non-target enrolled users heard.
    pub distinct_speakers: usize,
}

impl SceneWindow {
    /// Creates a window covering the trailing `span`.
    pub fn new(span: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            span,
        }
    }

    /// Returns the window span.
    pub fn span(&self) -> Duration {
        self.span
    }

    /// Inserts a decision and evicts everything older than the span
    /// relative to it.
    pub fn push(&mut self, decision: VerificationDecision) {
        let cutoff = decision.at - self.span;
        self.entries.push_back(decision);
        self.evict(cutoff);
    }

    fn evict(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.entries.front() {
            if front.at < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Buckets the retained decisions into duration categories.
    ///
    /// `high_threshold` decides when a non-target best match counts as a
    /// confident other speaker; anything weaker lands in `unidentified`,
    /// including the ambiguous band below the verification bar.
    pub fn stats(&self, high_threshold: f32) -> WindowStats {
        let mut stats = WindowStats::default();
        let mut speakers: BTreeSet<&str> = BTreeSet::new();
        for e in &self.entries {
            stats.total += e.duration;
            if e.verified {
                stats.target += e.duration;
                continue;
            }
            match &e.best_match {
                Some(user) if e.similarity >= high_threshold && *user != e.claimed_user => {
                    stats.other_speaker += e.duration;
                    speakers.insert(user);
                }
                _ => stats.unidentified += e.duration,
            }
        }
        stats.distinct_speakers = speakers.len();
        stats
    }

    /// Iterates retained decisions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &VerificationDecision> {
        self.entries.iter()
    }

    /// Returns the timestamp of the oldest retained decision.
    pub fn oldest_at(&self) -> Option<DateTime<Utc>> {
        self.entries.front().map(|e| e.at)
    }

    /// Returns the timestamp of the newest retained decision.
    pub fn newest_at(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|e| e.at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
