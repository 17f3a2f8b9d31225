//! JSON state snapshots published on the cpu, network and sketch channels
//!
//! Field names follow the keys the device dashboards already consume.

use serde::{Deserialize, Serialize};

/// Memory, chip and counter state, published every 10 seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuSnapshot {
    #[serde(rename = "Heap Size")]
    pub heap_size: u64,
    #[serde(rename = "FreeHeap")]
    pub free_heap: u64,
    #[serde(rename = "Minimum Free Heap")]
    pub min_free_heap: u64,
    #[serde(rename = "Max Free Heap")]
    pub max_free_heap: u64,
    #[serde(rename = "Chip Model")]
    pub chip_model: String,
    #[serde(rename = "Chip Revision")]
    pub chip_revision: u32,
    #[serde(rename = "Millis")]
    pub millis: u64,
    #[serde(rename = "Cycle Count")]
    pub cycle_count: u64,
}

/// Addressing state, published every 30 seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSnapshot {
    #[serde(rename = "IP-Address")]
    pub ip_address: String,
    #[serde(rename = "MQTT-ClientID")]
    pub client_id: String,
    #[serde(rename = "Session Reconnects")]
    pub session_reconnects: u32,
}

/// Build and runtime metadata, published every 60 seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SketchSnapshot {
    #[serde(rename = "Project version")]
    pub version: String,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Build timestamp")]
    pub build_timestamp: String,
    #[serde(rename = "Started")]
    pub started: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "Os")]
    pub os: String,
    #[serde(rename = "Arch")]
    pub arch: String,
    #[serde(rename = "CpuFreq")]
    pub cpu_freq_mhz: u32,
    #[serde(rename = "SketchSize")]
    pub sketch_size: u64,
}
