//! Stand-in for the geometry database.

use std::collections::BTreeMap;

use crate::config::{DeviceType, GeometryConfig};
use crate::hit::ModuleId;

/// Classifies modules as device types. Built once from configuration and
/// stable for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct Geometry {
    default_device: DeviceType,
    overrides: BTreeMap<ModuleId, DeviceType>,
}

impl Geometry {
    pub fn from_config(config: &GeometryConfig) -> Geometry {
        let overrides = config
            .devices
            .iter()
            .map(|entry| {
                (
                    ModuleId {
                        string: entry.string,
                        module: entry.module,
                    },
                    entry.device,
                )
            })
            .collect();
        Geometry {
            default_device: config.default_device,
            overrides,
        }
    }

    pub fn lookup(&self, module: ModuleId) -> DeviceType {
        self.overrides
            .get(&module)
            .copied()
            .unwrap_or(self.default_device)
    }
}
