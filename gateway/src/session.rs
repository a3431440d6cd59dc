//! Per-connection device session.
//!
//! A session owns one board's connection from handshake to close: it chunks
//! the byte stream, tracks signal quality, assembles utterances, verifies
//! the speaker, resolves the scene, and publishes whatever the gate allows.
//! Sessions share nothing with each other; a failure tears down exactly one
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use auris_audio::{samples_from_le, AudioChunk, Format, QualityMonitor, QualityReading};
use auris_scene::{SceneResolver, VerificationDecision};
use auris_speaker::{best_match, Embedder, ProfileCell};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::payload::{audit_topic, telemetry_topic, voice_topic, AuditRecord, TelemetryPayload, VoicePayload};
use crate::publish::Publisher;
use crate::registry::{normalize_mac, DeviceRecord, DeviceRegistry, MAC_LEN};
use crate::utterance::{Utterance, UtteranceBuilder};

/// Upper bound on handshake bytes before the connection is refused.
const MAX_IDENTITY_BYTES: usize = 64;

/// Lifecycle of one device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Connected, identity token not yet received.
    #[default]
    AwaitingHandshake,
    /// Identified and acknowledged, no audio yet.
    Ready,
    /// Audio bytes are flowing.
    Streaming,
    /// Connection torn down.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingHandshake => "awaiting_handshake",
            SessionState::Ready => "ready",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "awaiting_handshake" => SessionState::AwaitingHandshake,
            "ready" => SessionState::Ready,
            "streaming" => SessionState::Streaming,
            _ => SessionState::Closed,
        }
    }

    /// True while the connection can still carry audio.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SessionState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SessionState::from_str(&s))
    }
}

/// Counters accumulated over one session, reported at close.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub bytes: u64,
    pub chunks: u64,
    pub utterances: u64,
    pub dropped_utterances: u64,
    pub publish_failures: u64,
}

/// Reads the identity token that opens every connection.
///
/// Accepts either a newline-terminated line or a bare 17-byte MAC (older
/// firmware omits the newline). Returns the canonical MAC along with any
/// bytes the device sent past the token.
pub(crate) async fn read_identity(stream: &mut TcpStream) -> Result<(String, BytesMut)> {
    let mut buf = BytesMut::with_capacity(32);
    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line = std::str::from_utf8(&buf[..pos])
                .map_err(|_| Error::Protocol("identity token is not utf-8".to_string()))?;
            let mac = normalize_mac(line)
                .ok_or_else(|| Error::Protocol(format!("bad identity token {:?}", line)))?;
            let leftover = buf.split_off(pos + 1);
            return Ok((mac, leftover));
        }
        if buf.len() >= MAC_LEN {
            if let Some(mac) = std::str::from_utf8(&buf[..MAC_LEN])
                .ok()
                .and_then(normalize_mac)
            {
                let leftover = buf.split_off(MAC_LEN);
                return Ok((mac, leftover));
            }
        }
        if buf.len() > MAX_IDENTITY_BYTES {
            return Err(Error::Protocol("oversized identity token".to_string()));
        }
    }
}

/// Resolves the handshake against the registry and acknowledges the device.
pub(crate) async fn handshake(
    stream: &mut TcpStream,
    registry: &DeviceRegistry,
) -> Result<(DeviceRecord, BytesMut)> {
    let (mac, leftover) = read_identity(stream).await?;
    let device = registry
        .lookup(&mac)
        .cloned()
        .ok_or(Error::UnknownDevice(mac))?;
    stream.write_all(b"READY\n").await?;
    Ok((device, leftover))
}

/// One board's connection and its whole analysis pipeline.
pub(crate) struct DeviceSession {
    cfg: GatewayConfig,
    device: DeviceRecord,
    peer: SocketAddr,
    state: SessionState,
    format: Format,
    monitor: QualityMonitor,
    builder: UtteranceBuilder,
    resolver: SceneResolver,
    profiles: Arc<ProfileCell>,
    embedder: Arc<dyn Embedder>,
    publisher: Arc<dyn Publisher>,
    stats: SessionStats,
    seq: u64,
}

impl DeviceSession {
    pub(crate) fn new(
        cfg: GatewayConfig,
        device: DeviceRecord,
        peer: SocketAddr,
        profiles: Arc<ProfileCell>,
        embedder: Arc<dyn Embedder>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let format = cfg.format();
        Self {
            monitor: QualityMonitor::with_config(cfg.noise_config()),
            builder: UtteranceBuilder::new(format, cfg.max_utterance()),
            resolver: SceneResolver::with_config(cfg.scene_config()),
            cfg,
            device,
            peer,
            state: SessionState::Ready,
            format,
            profiles,
            embedder,
            publisher,
            stats: SessionStats::default(),
            seq: 0,
        }
    }

    /// Runs the session until the device disconnects or the gateway stops.
    ///
    /// `leftover` carries audio bytes the device packed behind its identity
    /// token. Cancellation (shutdown or a takeover by a newer connection)
    /// ends the session without error.
    pub(crate) async fn run(
        mut self,
        mut stream: TcpStream,
        leftover: BytesMut,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(
            "device {} ({}) connected from {} for {}",
            self.device.board_id, self.device.mac_address, self.peer, self.device.user_id
        );
        let outcome = self.stream_loop(&mut stream, leftover, &cancel).await;
        self.state = SessionState::Closed;
        info!(
            "session {} closed: {} bytes, {} chunks, {} utterances ({} dropped), {} publish failures",
            self.device.board_id,
            self.stats.bytes,
            self.stats.chunks,
            self.stats.utterances,
            self.stats.dropped_utterances,
            self.stats.publish_failures
        );
        match outcome {
            Err(Error::ShuttingDown) => Ok(()),
            other => other,
        }
    }

    async fn stream_loop(
        &mut self,
        stream: &mut TcpStream,
        leftover: BytesMut,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut buf = leftover;
        buf.reserve(self.cfg.chunk_bytes() * 2);
        let mut last_activity = Instant::now();
        if !buf.is_empty() {
            let n = buf.len();
            self.on_bytes(&mut buf, n)?;
        }
        loop {
            // While an utterance is open, a receive gap seals it; otherwise
            // we wake on a coarser slice to check the idle ceiling.
            let wait = if self.builder.is_open() {
                self.cfg.utterance_gap()
            } else {
                self.cfg.read_timeout()
            };
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::ShuttingDown),
                read = timeout(wait, stream.read_buf(&mut buf)) => read,
            };
            match read {
                Ok(Ok(0)) => {
                    self.seal_and_flush(&mut buf);
                    return Ok(());
                }
                Ok(Ok(n)) => {
                    last_activity = Instant::now();
                    self.on_bytes(&mut buf, n)?;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    if self.builder.is_open() {
                        self.seal_and_flush(&mut buf);
                    } else if last_activity.elapsed() >= self.cfg.idle_ceiling() {
                        self.probe(stream, &mut buf).await?;
                        last_activity = Instant::now();
                    }
                }
            }
        }
    }

    fn on_bytes(&mut self, buf: &mut BytesMut, n: usize) -> Result<()> {
        self.stats.bytes += n as u64;
        if self.state == SessionState::Ready {
            self.state = SessionState::Streaming;
            debug!("device {} started streaming", self.device.board_id);
        }
        self.builder.touch(Utc::now());
        self.drain_chunks(buf)
    }

    fn drain_chunks(&mut self, buf: &mut BytesMut) -> Result<()> {
        let chunk_bytes = self.cfg.chunk_bytes();
        while buf.len() >= chunk_bytes {
            let bytes = buf.split_to(chunk_bytes);
            let samples = samples_from_le(&bytes)?;
            let chunk = AudioChunk::new(self.format, self.seq, Utc::now(), samples);
            self.seq += 1;
            self.stats.chunks += 1;
            let reading = self.monitor.measure(chunk.samples());
            self.publish_telemetry(&chunk, &reading);
            if let Some(full) = self.builder.push_chunk(&chunk) {
                debug!("utterance from {} hit the duration cap", self.device.board_id);
                self.process_utterance(full);
            }
        }
        Ok(())
    }

    /// Writes a keep-alive probe and waits briefly for any traffic.
    async fn probe(&mut self, stream: &mut TcpStream, buf: &mut BytesMut) -> Result<()> {
        debug!("probing idle device {}", self.device.board_id);
        stream.write_all(b"PING\n").await?;
        match timeout(self.cfg.probe_timeout(), stream.read_buf(buf)).await {
            Ok(Ok(0)) => Err(Error::ConnectionClosed),
            Ok(Ok(n)) => self.on_bytes(buf, n),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::KeepAliveTimeout),
        }
    }

    /// Seals the open utterance, folding in buffered sub-chunk samples.
    ///
    /// A dangling odd byte means sample framing was lost somewhere, so the
    /// utterance is dropped; the scene window still gets a record for it.
    fn seal_and_flush(&mut self, buf: &mut BytesMut) {
        let tail = buf.split();
        let whole = tail.len() - tail.len() % auris_audio::SAMPLE_BYTES;
        let samples: Vec<i16> = tail[..whole]
            .chunks_exact(auris_audio::SAMPLE_BYTES)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let sealed = self.builder.seal(&samples, Utc::now());
        if tail.len() != whole {
            warn!(
                "discarding utterance from {}: dangling pcm byte",
                self.device.board_id
            );
            let (at, duration) = sealed
                .map(|u| (u.started_at(), u.duration()))
                .unwrap_or_else(|| (Utc::now(), std::time::Duration::ZERO));
            self.drop_utterance(at, duration, "dangling pcm byte");
            return;
        }
        if let Some(utterance) = sealed {
            self.process_utterance(utterance);
        }
    }

    /// Verifies the speaker, resolves the scene, and publishes accordingly.
    fn process_utterance(&mut self, utterance: Utterance) {
        let profiles = self.profiles.snapshot();
        let embedding = match self.embedder.embed(utterance.samples()) {
            Ok(embedding) => embedding,
            Err(e) => {
                debug!(
                    "utterance from {} not usable: {}",
                    self.device.board_id, e
                );
                self.drop_utterance(utterance.started_at(), utterance.duration(), &e.to_string());
                return;
            }
        };
        self.stats.utterances += 1;
        let (best, similarity) = match best_match(&embedding, &profiles) {
            Some(m) => (Some(m.user_id), m.similarity),
            None => (None, 0.0),
        };
        let verified = similarity >= self.cfg.similarity_threshold_high
            && best.as_deref() == Some(self.device.user_id.as_str());
        if verified {
            debug!(
                "verified {} on {} at {:.2}",
                self.device.user_id, self.device.board_id, similarity
            );
        } else if similarity >= self.cfg.similarity_threshold_low {
            debug!(
                "ambiguous speaker on {}: {:?} at {:.2}",
                self.device.board_id, best, similarity
            );
        }
        let decision = VerificationDecision {
            at: utterance.started_at(),
            device_id: self.device.board_id.clone(),
            claimed_user: self.device.user_id.clone(),
            best_match: best,
            similarity,
            verified,
            duration: utterance.duration(),
        };
        let scene = self.resolver.resolve(decision);
        if scene.gate.is_pass() {
            let topic = voice_topic(
                &self.device.user_id,
                &self.device.board_id,
                self.device.environment(),
            );
            let payload = VoicePayload::new(&self.device, &utterance, scene.clone());
            self.publish_json(&topic, &payload);
        } else {
            debug!(
                "holding audio from {} ({})",
                self.device.board_id, scene.context
            );
        }
        self.publish_json(&audit_topic(&self.device.board_id), &AuditRecord::Scene(scene));
    }

    /// Records an utterance that cannot be released, so the scene window
    /// still accounts for its time.
    fn drop_utterance(&mut self, at: DateTime<Utc>, duration: std::time::Duration, reason: &str) {
        self.stats.utterances += 1;
        self.stats.dropped_utterances += 1;
        let decision = VerificationDecision {
            at,
            device_id: self.device.board_id.clone(),
            claimed_user: self.device.user_id.clone(),
            best_match: None,
            similarity: 0.0,
            verified: false,
            duration,
        };
        let scene = self.resolver.resolve(decision);
        let topic = audit_topic(&self.device.board_id);
        self.publish_json(
            &topic,
            &AuditRecord::dropped(&self.device.board_id, at, reason, duration.as_millis() as u64),
        );
        self.publish_json(&topic, &AuditRecord::Scene(scene));
    }

    fn publish_telemetry(&mut self, chunk: &AudioChunk, reading: &QualityReading) {
        let payload = TelemetryPayload {
            board_id: self.device.board_id.clone(),
            seq: chunk.seq(),
            at: chunk.received_at(),
            quality: reading.clone(),
        };
        self.publish_json(&telemetry_topic(&self.device.board_id), &payload);
    }

    fn publish_json<T: Serialize>(&mut self, topic: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!("encode for {} failed: {}", topic, e);
                return;
            }
        };
        if let Err(e) = self.publisher.publish(topic, bytes) {
            self.stats.publish_failures += 1;
            warn!("publish to {} failed: {}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_strings_round_trip() {
        for state in [
            SessionState::AwaitingHandshake,
            SessionState::Ready,
            SessionState::Streaming,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_str(state.as_str()), state);
        }
        assert_eq!(SessionState::from_str("nonsense"), SessionState::Closed);
    }

    #[test]
    fn only_open_states_are_live() {
        assert!(!SessionState::AwaitingHandshake.is_live());
        assert!(SessionState::Ready.is_live());
        assert!(SessionState::Streaming.is_live());
        assert!(!SessionState::Closed.is_live());
    }

    #[test]
    fn state_serializes_as_string() {
        let json = serde_json::to_string(&SessionState::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionState::Streaming);
    }
}
