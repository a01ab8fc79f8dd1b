use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies a single photodetector readout by (string, module, pmt).
/// Ordering is lexicographic, which makes population iteration and
/// sorter tie-breaks reproducible across runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub string: u32,
    pub module: u32,
    pub pmt: u32,
}

impl ChannelId {
    /// The module hosting this channel.
    pub fn module_id(&self) -> ModuleId {
        ModuleId {
            string: self.string,
            module: self.module,
        }
    }

    /// The string hosting this channel.
    pub fn string_id(&self) -> StringId {
        self.string
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.string, self.module, self.pmt)
    }
}

/// Identifies a physical sensor module by (string, module).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId {
    pub string: u32,
    pub module: u32,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.string, self.module)
    }
}

/// Identifies a string of modules.
pub type StringId = u32;

/// A single detected event on one channel. `time` is in raw detector
/// ticks; `charge` is carried through the pipeline untouched.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub time: i64,
    #[serde(default)]
    pub charge: f64,
}

/// Grouping for hits, traces back to file/frame to manage time offsetting.
#[derive(Clone, Debug)]
pub struct Group {
    /// Frame identity, "file:frame".
    pub id: String,
    /// Offset applied to raw pulse times to coerce multi-frame input
    /// into one monotonic stream.
    pub t_offset: i64,
}

/// Pipeline-internal wrapper around a pulse: channel identity, frame
/// group, and the two coincidence flags.
#[derive(Clone, Debug)]
pub struct Hit {
    group: Arc<Group>,
    channel: ChannelId,
    pulse: Pulse,
    smlc: bool,
    mmlc: bool,
}

impl Hit {
    pub fn new(group: Arc<Group>, channel: ChannelId, pulse: Pulse) -> Hit {
        Hit {
            group,
            channel,
            pulse,
            smlc: false,
            mmlc: false,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    pub fn pulse(&self) -> Pulse {
        self.pulse
    }

    /// The canonical ordering key: raw pulse time plus the frame group offset.
    pub fn resolved_time(&self) -> i64 {
        self.pulse.time + self.group.t_offset
    }

    /// Raw pulse timestamp; used only for bucketing hits back into frames.
    pub fn raw_time(&self) -> i64 {
        self.pulse.time
    }

    pub fn smlc(&self) -> bool {
        self.smlc
    }

    pub fn mmlc(&self) -> bool {
        self.mmlc
    }

    /// Flags are monotonic: once set, never cleared.
    pub fn mark_smlc(&mut self) {
        self.smlc = true;
    }

    pub fn mark_mmlc(&mut self) {
        self.mmlc = true;
    }
}
