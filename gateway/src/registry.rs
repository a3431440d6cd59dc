//! Device registry: maps board MAC addresses to assigned wearers.
//!
//! Boards identify themselves by MAC address only, so everything else about a
//! session (who wears the board, where it lives) comes from this table. The
//! registry is loaded from YAML and swapped atomically, so a reload never
//! disturbs sessions already running.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Length of a colon-separated MAC address string.
pub const MAC_LEN: usize = 17;

/// Validates and canonicalizes a MAC address token.
///
/// Accepts `AA:BB:CC:DD:EE:FF` in any letter case with surrounding
/// whitespace. Returns the uppercase form, or `None` if the token is not a
/// MAC address.
pub fn normalize_mac(token: &str) -> Option<String> {
    let token = token.trim();
    if token.len() != MAC_LEN {
        return None;
    }
    for (i, b) in token.bytes().enumerate() {
        let ok = if i % 3 == 2 {
            b == b':'
        } else {
            b.is_ascii_hexdigit()
        };
        if !ok {
            return None;
        }
    }
    Some(token.to_ascii_uppercase())
}

/// One registered board and its assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable board identifier used in topics and logs.
    pub board_id: String,
    /// MAC address the board identifies with.
    pub mac_address: String,
    /// User the board is assigned to.
    pub user_id: String,
    /// Display name of the user.
    #[serde(default)]
    pub user_name: String,
    /// Environment the board is installed in.
    pub environment_id: String,
    /// Display name of the environment.
    #[serde(default)]
    pub environment_name: String,
}

impl DeviceRecord {
    /// Environment segment used in publish topics.
    pub fn environment(&self) -> &str {
        if self.environment_name.is_empty() {
            &self.environment_id
        } else {
            &self.environment_name
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Lookup table of registered boards, keyed by canonical MAC address.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    by_mac: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    /// Builds a registry from records, canonicalizing MAC addresses.
    pub fn new(devices: Vec<DeviceRecord>) -> Result<Self> {
        let mut by_mac = HashMap::with_capacity(devices.len());
        for mut record in devices {
            let mac = normalize_mac(&record.mac_address).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "bad mac address {:?} for board {}",
                    record.mac_address, record.board_id
                ))
            })?;
            record.mac_address = mac.clone();
            if let Some(prev) = by_mac.insert(mac, record) {
                warn!("duplicate registry entry for {}", prev.mac_address);
            }
        }
        Ok(Self { by_mac })
    }

    /// Parses a registry from YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let doc: RegistryDoc = serde_yaml::from_str(text)?;
        Self::new(doc.devices)
    }

    /// Loads a registry from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let registry = Self::from_yaml(&text)?;
        info!("loaded {} devices from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Looks up a board by canonical MAC address.
    pub fn lookup(&self, mac: &str) -> Option<&DeviceRecord> {
        self.by_mac.get(mac)
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }
}

/// Shared registry handle with atomic replacement.
///
/// Sessions snapshot the registry once at handshake time; a concurrent swap
/// only affects connections accepted afterwards.
#[derive(Debug, Default)]
pub struct RegistryCell {
    inner: RwLock<Arc<DeviceRegistry>>,
}

impl RegistryCell {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            inner: RwLock::new(Arc::new(registry)),
        }
    }

    /// Current registry snapshot.
    pub fn snapshot(&self) -> Arc<DeviceRegistry> {
        self.inner.read().clone()
    }

    /// Replaces the registry.
    pub fn swap(&self, registry: DeviceRegistry) {
        *self.inner.write() = Arc::new(registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mac: &str, board: &str) -> DeviceRecord {
        DeviceRecord {
            board_id: board.to_string(),
            mac_address: mac.to_string(),
            user_id: "user-001".to_string(),
            user_name: "Mia".to_string(),
            environment_id: "env-01".to_string(),
            environment_name: "lab".to_string(),
        }
    }

    #[test]
    fn normalize_accepts_lowercase_and_whitespace() {
        assert_eq!(
            normalize_mac(" aa:bb:cc:dd:ee:ff "),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            normalize_mac("A0:B1:C2:D3:E4:F5"),
            Some("A0:B1:C2:D3:E4:F5".to_string())
        );
    }

    #[test]
    fn normalize_rejects_malformed_tokens() {
        assert_eq!(normalize_mac(""), None);
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE"), None);
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), None);
        assert_eq!(normalize_mac("GG:BB:CC:DD:EE:FF"), None);
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF:00"), None);
    }

    #[test]
    fn lookup_uses_canonical_mac() {
        let registry =
            DeviceRegistry::new(vec![record("aa:bb:cc:dd:ee:ff", "board-01")]).unwrap();
        let found = registry.lookup("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(found.board_id, "board-01");
        assert_eq!(found.mac_address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn bad_mac_in_file_is_a_config_error() {
        let err = DeviceRegistry::new(vec![record("not-a-mac-address", "board-01")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn yaml_round_trip() {
        let registry = DeviceRegistry::from_yaml(
            r#"
devices:
  - board_id: board-01
    mac_address: "aa:bb:cc:dd:ee:ff"
    user_id: user-001
    user_name: Mia
    environment_id: env-01
    environment_name: playroom
"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
        let device = registry.lookup("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(device.environment(), "playroom");
    }

    #[test]
    fn environment_falls_back_to_id() {
        let mut device = record("AA:BB:CC:DD:EE:FF", "board-01");
        device.environment_name.clear();
        assert_eq!(device.environment(), "env-01");
    }

    #[test]
    fn cell_swap_replaces_snapshot() {
        let cell = RegistryCell::new(
            DeviceRegistry::new(vec![record("AA:BB:CC:DD:EE:FF", "board-01")]).unwrap(),
        );
        let before = cell.snapshot();
        cell.swap(DeviceRegistry::default());
        assert_eq!(before.len(), 1);
        assert!(cell.snapshot().is_empty());
    }
}
