//! Ingesting frame files into pipeline domain objects: frames, the
//! channel population, and hit streams bound to a frame group.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use crate::error::{Result, UglcError};
use crate::hit::{ChannelId, Group, Hit, ModuleId, Pulse, StringId};

/// One acquisition frame: a map from channel to its time-ordered pulse
/// series. Per-channel ordering is the reader's contract; cross-channel
/// ordering is the pipeline's job.
#[derive(Clone, Debug)]
pub struct Frame {
    /// "file:frame"
    pub id: String,
    pub channels: BTreeMap<ChannelId, Vec<Pulse>>,
}

impl Frame {
    /// Iterate the frame channel-by-channel, binding each pulse to `group`.
    /// Depth-first is fine: the per-module sorter re-orders downstream.
    pub fn hits<'a>(&'a self, group: &Arc<Group>) -> impl Iterator<Item = Hit> + 'a {
        let group = Arc::clone(group);
        self.channels.iter().flat_map(move |(channel, pulses)| {
            let group = Arc::clone(&group);
            pulses
                .iter()
                .map(move |pulse| Hit::new(Arc::clone(&group), *channel, *pulse))
        })
    }

    /// Raw (t_min, t_max) over every pulse in the frame.
    pub fn time_interval(&self) -> Result<(i64, i64)> {
        let mut t_min = None;
        let mut t_max = None;
        for pulses in self.channels.values() {
            if let Some(first) = pulses.first() {
                t_min = Some(t_min.map_or(first.time, |t: i64| t.min(first.time)));
            }
            if let Some(last) = pulses.last() {
                t_max = Some(t_max.map_or(last.time, |t: i64| t.max(last.time)));
            }
        }
        match (t_min, t_max) {
            (Some(t_min), Some(t_max)) => Ok((t_min, t_max)),
            _ => Err(UglcError::DeficientFrame {
                frame_id: self.id.clone(),
            }),
        }
    }
}

/// The channel population used to plumb a pipeline. Must be a superset of
/// every channel that will ever be enqueued. Sorted containers keep the
/// plumbing order, and with it every merge tie-break, deterministic.
#[derive(Clone, Debug)]
pub struct Population {
    channels: BTreeSet<ChannelId>,
}

impl Population {
    /// Learn the population across a group of frames. Multiple frames are
    /// needed for joined pipelines: the first frame is not representative.
    pub fn from_frames(frames: &[Frame]) -> Population {
        let channels = frames
            .iter()
            .flat_map(|frame| frame.channels.keys().copied())
            .collect();
        Population { channels }
    }

    pub fn channels(&self) -> &BTreeSet<ChannelId> {
        &self.channels
    }

    /// Index channels by module.
    pub fn by_module(&self) -> BTreeMap<ModuleId, BTreeSet<ChannelId>> {
        let mut by_module: BTreeMap<ModuleId, BTreeSet<ChannelId>> = BTreeMap::new();
        for &channel in &self.channels {
            by_module
                .entry(channel.module_id())
                .or_default()
                .insert(channel);
        }
        by_module
    }

    /// Index channels by string.
    pub fn by_string(&self) -> BTreeMap<StringId, BTreeSet<ChannelId>> {
        let mut by_string: BTreeMap<StringId, BTreeSet<ChannelId>> = BTreeMap::new();
        for &channel in &self.channels {
            by_string
                .entry(channel.string_id())
                .or_default()
                .insert(channel);
        }
        by_string
    }
}

#[derive(Debug, Deserialize)]
struct FrameFile {
    frames: Vec<FrameRecord>,
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    channels: Vec<ChannelSeries>,
}

#[derive(Debug, Deserialize)]
struct ChannelSeries {
    channel: ChannelId,
    pulses: Vec<Pulse>,
}

/// Read every frame in the given files, in file order. Frame ids are
/// `"<file>:<index>"` with the index counting frames within one file.
pub fn read_frames(files: &[String]) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    for file in files {
        let text = fs::read_to_string(file)?;
        let parsed: FrameFile = serde_yaml::from_str(&text)?;
        debug!("{}: {} frames", file, parsed.frames.len());
        for (index, record) in parsed.frames.into_iter().enumerate() {
            let mut channels: BTreeMap<ChannelId, Vec<Pulse>> = BTreeMap::new();
            for series in record.channels {
                channels
                    .entry(series.channel)
                    .or_default()
                    .extend(series.pulses);
            }
            frames.push(Frame {
                id: format!("{}:{}", file, index),
                channels,
            });
        }
    }
    Ok(frames)
}
