use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::Result;

/// Sensor device families deployed on the upgrade strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Degg,
    Mdom,
}

/// Single-module coincidence parameters.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SmlcParams {
    /// Sliding window length in ticks.
    pub window_length: i64,
    /// Minimum hits inside the window to mark it.
    pub multiplicity: usize,
}

/// Multi-module coincidence parameters.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MmlcParams {
    /// Window reach behind the hit, in ticks.
    pub t_back: i64,
    /// Window reach ahead of the hit, in ticks.
    pub t_fwd: i64,
    /// Axial neighborhood reach towards lower module numbers.
    pub span_up: u32,
    /// Axial neighborhood reach towards higher module numbers.
    pub span_down: u32,
    /// Minimum neighboring hits inside the window to mark it.
    pub multiplicity: usize,
}

static DEFAULT_SMLC: Lazy<BTreeMap<DeviceType, SmlcParams>> = Lazy::new(|| {
    BTreeMap::from([
        (
            DeviceType::Degg,
            SmlcParams {
                window_length: 250,
                multiplicity: 4,
            },
        ),
        (
            DeviceType::Mdom,
            SmlcParams {
                window_length: 100,
                multiplicity: 2,
            },
        ),
    ])
});

static DEFAULT_MMLC: Lazy<BTreeMap<DeviceType, MmlcParams>> = Lazy::new(|| {
    BTreeMap::from([
        (
            DeviceType::Degg,
            MmlcParams {
                t_back: 250,
                t_fwd: 250,
                span_up: 8,
                span_down: 8,
                multiplicity: 2,
            },
        ),
        (
            DeviceType::Mdom,
            MmlcParams {
                t_back: 100,
                t_fwd: 100,
                span_up: 8,
                span_down: 8,
                multiplicity: 2,
            },
        ),
    ])
});

/// Classifies a single module as a device type, overriding the default.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DeviceOverride {
    pub string: u32,
    pub module: u32,
    pub device: DeviceType,
}

/// Stand-in for the geometry database: a default device type plus
/// per-module overrides.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub default_device: DeviceType,
    pub devices: Vec<DeviceOverride>,
}

impl Default for GeometryConfig {
    fn default() -> GeometryConfig {
        GeometryConfig {
            default_device: DeviceType::Degg,
            devices: Vec::new(),
        }
    }
}

/// Full pipeline configuration: per-device coincidence parameters, the
/// join-mode frame gap, and the geometry table.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UglcConfig {
    pub smlc: BTreeMap<DeviceType, SmlcParams>,
    pub mmlc: BTreeMap<DeviceType, MmlcParams>,
    /// Minimum tick gap between consecutive joined frames.
    pub join_gap: i64,
    pub geometry: GeometryConfig,
}

impl Default for UglcConfig {
    fn default() -> UglcConfig {
        UglcConfig {
            smlc: DEFAULT_SMLC.clone(),
            mmlc: DEFAULT_MMLC.clone(),
            join_gap: 100,
            geometry: GeometryConfig::default(),
        }
    }
}

impl UglcConfig {
    pub fn load(path: &Path) -> Result<UglcConfig> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn smlc_for(&self, device: DeviceType) -> Option<SmlcParams> {
        self.smlc.get(&device).copied()
    }

    pub fn mmlc_for(&self, device: DeviceType) -> Option<MmlcParams> {
        self.mmlc.get(&device).copied()
    }

    /// The release horizon shared by every MMLC engine. Must cover the
    /// largest window reach of any configured device type.
    pub fn max_window(&self) -> i64 {
        self.mmlc
            .values()
            .map(|p| p.t_back.max(p.t_fwd))
            .max()
            .unwrap_or(0)
    }
}
