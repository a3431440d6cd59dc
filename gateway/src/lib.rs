//! TCP ingestion gateway for wearable voice monitors.
//!
//! Boards open a plain TCP connection, identify themselves with their MAC
//! address, and stream raw 16-bit PCM gated by on-device voice activity
//! detection. The gateway runs the whole analysis pipeline per connection:
//!
//! - **Chunking**: the unframed byte stream is sliced into fixed-size
//!   chunks; every chunk gets a signal-quality reading.
//! - **Utterances**: receive gaps bound utterances, which are verified
//!   against enrolled speaker profiles.
//! - **Scene gate**: a rolling per-device window of verification outcomes
//!   classifies the ambient context; only solo activity releases audio.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use auris_gateway::{DeviceRegistry, Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> auris_gateway::Result<()> {
//!     let registry = DeviceRegistry::load("devices.yaml")?;
//!     let gateway = Arc::new(
//!         Gateway::builder()
//!             .with_config(GatewayConfig::default())
//!             .with_registry(registry)
//!             .build(),
//!     );
//!     gateway.serve().await
//! }
//! ```

mod config;
mod error;
mod gateway;
mod payload;
mod publish;
mod registry;
mod session;
mod utterance;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use payload::{audit_topic, telemetry_topic, voice_topic, AuditRecord, TelemetryPayload, VoicePayload};
pub use publish::{MqttPublisher, NullPublisher, Publisher};
pub use registry::{normalize_mac, DeviceRecord, DeviceRegistry, RegistryCell};
pub use session::{SessionState, SessionStats};
pub use utterance::{Utterance, UtteranceBuilder};
