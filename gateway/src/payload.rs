//! Publish payloads and topic layout.
//!
//! Three topic families leave the gateway:
//!
//! - `voice/{user}/{board}/{environment}`: utterance audio that passed the
//!   scene gate, base64 PCM plus the decision that released it.
//! - `audit/scene/{board}`: every scene decision and rejection, whether or
//!   not audio was released. This is the trail reviewers replay.
//! - `telemetry/{board}`: per-chunk signal quality readings.

use auris_audio::{samples_to_le, QualityReading};
use auris_scene::SceneDecision;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::DeviceRecord;
use crate::utterance::Utterance;

fn topic_segment(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '+' | '#' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Topic carrying released utterance audio.
pub fn voice_topic(user_id: &str, board_id: &str, environment: &str) -> String {
    format!(
        "voice/{}/{}/{}",
        topic_segment(user_id),
        topic_segment(board_id),
        topic_segment(environment)
    )
}

/// Topic carrying scene decisions and rejection records.
pub fn audit_topic(board_id: &str) -> String {
    format!("audit/scene/{}", topic_segment(board_id))
}

/// Topic carrying per-chunk quality readings.
pub fn telemetry_topic(board_id: &str) -> String {
    format!("telemetry/{}", topic_segment(board_id))
}

/// An utterance released downstream by the scene gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePayload {
    pub board_id: String,
    pub user_id: String,
    pub user_name: String,
    pub environment_id: String,
    pub environment: String,
    #[serde(with = "ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sample_rate: u32,
    /// Base64 of the raw little-endian 16-bit PCM.
    pub audio: String,
    /// Scene decision that released this utterance.
    pub scene: SceneDecision,
}

impl VoicePayload {
    pub fn new(device: &DeviceRecord, utterance: &Utterance, scene: SceneDecision) -> Self {
        Self {
            board_id: device.board_id.clone(),
            user_id: device.user_id.clone(),
            user_name: device.user_name.clone(),
            environment_id: device.environment_id.clone(),
            environment: device.environment().to_string(),
            started_at: utterance.started_at(),
            ended_at: utterance.ended_at(),
            duration_ms: utterance.duration().as_millis() as u64,
            sample_rate: utterance.format().sample_rate,
            audio: STANDARD.encode(samples_to_le(utterance.samples())),
            scene,
        }
    }
}

/// Per-chunk signal quality report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub board_id: String,
    pub seq: u64,
    #[serde(with = "ts_milliseconds")]
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub quality: QualityReading,
}

/// One entry on a board's audit topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    /// A scene decision, published whether or not audio was released.
    Scene(SceneDecision),
    /// An utterance that was analyzed but not released as audio.
    DroppedUtterance {
        board_id: String,
        #[serde(with = "ts_milliseconds")]
        at: DateTime<Utc>,
        reason: String,
        duration_ms: u64,
    },
    /// A connection refused before any session existed.
    ProtocolRejected {
        #[serde(with = "ts_milliseconds")]
        at: DateTime<Utc>,
        peer: String,
        reason: String,
    },
}

impl AuditRecord {
    pub fn dropped(board_id: &str, at: DateTime<Utc>, reason: &str, duration_ms: u64) -> Self {
        AuditRecord::DroppedUtterance {
            board_id: board_id.to_string(),
            at,
            reason: reason.to_string(),
            duration_ms,
        }
    }

    pub fn rejected(peer: &str, at: DateTime<Utc>, reason: &str) -> Self {
        AuditRecord::ProtocolRejected {
            at,
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }
}
