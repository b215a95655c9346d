// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The subset of Pathfinder configuration that affects core behavior
/// (spec §6). CLI parsing, templated configuration, and CSV schemas live
/// outside the core and are not modeled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Maximum number of checker/daemon tests running concurrently.
    pub max_nproc: usize,
    /// PM grouping relation: false groups by "covers", true by induced subgraph.
    pub use_induced_subgraph: bool,
    /// Whether the POSIX extractor derives micro-events and decomposed dependencies.
    pub decompose_syscall: bool,
    /// Ceiling used by the POSIX extractor's InUM state machine.
    pub max_um_size: usize,
    /// Per-checker-invocation wall clock timeout.
    #[serde(with = "duration_secs")]
    pub test_timeout: Duration,
    /// Total baseline-mode cap, in minutes.
    pub baseline_timeout_minutes: u64,
    /// Whether to snapshot mapped PM regions into the test result for debugging.
    pub save_pm_images: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_nproc: 1,
            use_induced_subgraph: false,
            decompose_syscall: true,
            max_um_size: 40,
            test_timeout: Duration::from_secs(10),
            baseline_timeout_minutes: 60,
            save_pm_images: false,
        }
    }
}

impl PathfinderConfig {
    pub fn new() -> anyhow::Result<Self> {
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_nproc >= 1, "max_nproc must be >= 1");
        anyhow::ensure!(self.max_um_size >= 1, "max_um_size must be >= 1");
        Ok(())
    }

    pub fn baseline_timeout(&self) -> Duration {
        Duration::from_secs(self.baseline_timeout_minutes * 60)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// The anti-OOM guard on order enumeration (spec §9 Open Questions): crossing
/// it changes results, so it is part of the behavioral contract, not a mere
/// tuning knob, and is therefore a constant rather than a config field.
pub const MAX_PERMS: usize = 512;

/// Margin (in events) used to extend a POSIX representative to a continuous
/// range before enumeration (spec §4.5).
pub const POSIX_REPRESENTATIVE_MARGIN: u64 = 3;

/// Chunked-enumeration fallback window and stride used when a POSIX
/// representative's enumeration is cancelled (spec §7).
pub const UM_CHUNK_SIZE: usize = 20;
pub const UM_CHUNK_GAP: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = PathfinderConfig::default();
        assert_eq!(cfg.max_nproc, 1);
        assert!(!cfg.use_induced_subgraph);
        assert!(cfg.decompose_syscall);
        assert_eq!(cfg.max_um_size, 40);
        assert!(!cfg.save_pm_images);
    }

    #[test]
    fn rejects_zero_nproc() {
        let mut cfg = PathfinderConfig::default();
        cfg.max_nproc = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = PathfinderConfig::default();
        let s = toml::to_string(&cfg).unwrap();
        let parsed = PathfinderConfig::from_toml_str(&s).unwrap();
        assert_eq!(cfg, parsed);
    }
}
