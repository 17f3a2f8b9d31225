//! Device state snapshots
//!
//! [`StatePublisher`] turns raw probe readings into the cpu, network and
//! sketch snapshots. Readings come from a [`SystemProbe`]; on a host that is
//! `/proc`, and any missing source reads as zero or `"unknown"`.

use crate::protocol::{CpuSnapshot, NetworkSnapshot, SketchSnapshot};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: u64,
    pub free: u64,
    /// Largest amount that could be handed out right now
    pub max_free: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    pub model: String,
    pub revision: u32,
    /// Clock of the first core in MHz, 0 when not reported
    pub freq_mhz: u32,
}

impl Default for ChipInfo {
    fn default() -> Self {
        Self {
            model: "unknown".to_string(),
            revision: 0,
            freq_mhz: 0,
        }
    }
}

/// Source of hardware readings
pub trait SystemProbe: Send {
    fn memory(&self) -> MemoryStats;
    fn chip(&self) -> ChipInfo;
    /// Free-running cycle/tick counter
    fn cycle_count(&self) -> u64;
    /// Size of the running program image in bytes
    fn image_size(&self) -> u64;
}

/// Reads `/proc` on the local host
#[derive(Debug, Clone)]
pub struct HostProbe {
    proc_root: PathBuf,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    fn read(&self, name: &str) -> Option<String> {
        read_optional(&self.proc_root.join(name))
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for HostProbe {
    fn memory(&self) -> MemoryStats {
        self.read("meminfo")
            .map(|text| parse_meminfo(&text))
            .unwrap_or_default()
    }

    fn chip(&self) -> ChipInfo {
        self.read("cpuinfo")
            .map(|text| parse_cpuinfo(&text))
            .unwrap_or_default()
    }

    fn cycle_count(&self) -> u64 {
        self.read("stat")
            .and_then(|text| parse_stat_ticks(&text))
            .unwrap_or(0)
    }

    fn image_size(&self) -> u64 {
        std::env::current_exe()
            .and_then(std::fs::metadata)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Probe source unavailable");
            None
        }
    }
}

/// `MemTotal`, `MemFree` and `MemAvailable` from /proc/meminfo, in bytes
pub fn parse_meminfo(text: &str) -> MemoryStats {
    let mut stats = MemoryStats::default();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kib) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kib.saturating_mul(1024);
        match key {
            "MemTotal:" => stats.total = bytes,
            "MemFree:" => stats.free = bytes,
            "MemAvailable:" => stats.max_free = bytes,
            _ => {}
        }
    }
    stats
}

/// First `model name` (or `Hardware`), `stepping` and `cpu MHz` from /proc/cpuinfo
pub fn parse_cpuinfo(text: &str) -> ChipInfo {
    let mut info = ChipInfo::default();
    let mut have_model = false;
    let mut have_revision = false;
    let mut have_freq = false;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "model name" | "Hardware" if !have_model && !value.is_empty() => {
                info.model = value.to_string();
                have_model = true;
            }
            "stepping" | "CPU revision" if !have_revision => {
                if let Ok(revision) = value.parse() {
                    info.revision = revision;
                    have_revision = true;
                }
            }
            "cpu MHz" if !have_freq => {
                if let Ok(mhz) = value.parse::<f64>() {
                    info.freq_mhz = mhz.round() as u32;
                    have_freq = true;
                }
            }
            _ => {}
        }
    }
    info
}

/// Sum of the aggregate `cpu` line of /proc/stat
pub fn parse_stat_ticks(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    Some(
        line.split_whitespace()
            .skip(1)
            .filter_map(|v| v.parse::<u64>().ok())
            .fold(0u64, |acc, v| acc.wrapping_add(v)),
    )
}

/// Build-time stamp injected by the packaging pipeline, if any
pub fn build_timestamp() -> &'static str {
    option_env!("NODEAGENT_BUILD_TIMESTAMP").unwrap_or("unknown")
}

/// Builds snapshots, remembering the lowest free memory seen
pub struct StatePublisher<P: SystemProbe> {
    probe: P,
    target: String,
    started: DateTime<Utc>,
    min_free_heap: Option<u64>,
}

impl<P: SystemProbe> StatePublisher<P> {
    pub fn new(probe: P, target: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            probe,
            target: target.into(),
            started,
            min_free_heap: None,
        }
    }

    pub fn min_free_heap(&self) -> Option<u64> {
        self.min_free_heap
    }

    /// `uptime` is the monotonic time since the agent started
    pub fn cpu_snapshot(&mut self, uptime: Duration) -> CpuSnapshot {
        let memory = self.probe.memory();
        let chip = self.probe.chip();
        let min_free = self
            .min_free_heap
            .map_or(memory.free, |seen| seen.min(memory.free));
        self.min_free_heap = Some(min_free);

        CpuSnapshot {
            heap_size: memory.total,
            free_heap: memory.free,
            min_free_heap: min_free,
            max_free_heap: memory.max_free,
            chip_model: chip.model,
            chip_revision: chip.revision,
            millis: u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
            cycle_count: self.probe.cycle_count(),
        }
    }

    pub fn network_snapshot(
        &self,
        address: Option<IpAddr>,
        client_id: &str,
        session_reconnects: u32,
    ) -> NetworkSnapshot {
        NetworkSnapshot {
            ip_address: address.map_or_else(|| "0.0.0.0".to_string(), |a| a.to_string()),
            client_id: client_id.to_string(),
            session_reconnects,
        }
    }

    pub fn sketch_snapshot(&self) -> SketchSnapshot {
        SketchSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            target: self.target.clone(),
            build_timestamp: build_timestamp().to_string(),
            started: self.started,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_freq_mhz: self.probe.chip().freq_mhz,
            sketch_size: self.probe.image_size(),
        }
    }
}
