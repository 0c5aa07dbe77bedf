//! Per-group sync bookkeeping

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::DeviceId;

/// A device that has participated in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownDevice {
    pub display_name: String,
    /// Last time a snapshot from this device was observed (Unix ms)
    pub last_seen: i64,
}

/// Local sync state for one collaboration group (family/partner code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub last_sync_timestamp: i64,
    pub device_id: DeviceId,
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, KnownDevice>,
}

impl SyncState {
    /// Fresh state for a newly installed device; sync starts disabled.
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            enabled: false,
            group_id: None,
            endpoint: None,
            last_sync_timestamp: 0,
            device_id,
            devices: BTreeMap::new(),
        }
    }

    /// Whether sync can run: enabled and joined to a group.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.enabled && self.group_id.is_some()
    }

    /// Note that `device` was seen at `at`; keeps the newest sighting.
    pub fn observe_device(&mut self, device: &DeviceId, display_name: Option<&str>, at: i64) {
        if device.as_str().is_empty() {
            return;
        }
        let entry = self
            .devices
            .entry(device.clone())
            .or_insert_with(|| KnownDevice {
                display_name: default_display_name(device),
                last_seen: at,
            });
        entry.last_seen = entry.last_seen.max(at);
        if let Some(name) = display_name {
            entry.display_name = name.to_string();
        }
    }
}

fn default_display_name(device: &DeviceId) -> String {
    let short = device.as_str().chars().take(8).collect::<String>();
    format!("device-{short}")
}
