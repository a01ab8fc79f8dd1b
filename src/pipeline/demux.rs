use std::collections::BTreeMap;

use crate::error::{Result, UglcError};
use crate::hit::{ChannelId, Hit, StringId};
use crate::pipeline::Sink;

/// Routes hits from a unified stream to a sink per key. The sink map is
/// fixed at construction; a hit for an unplumbed key is fatal.
pub struct Demux<K: Ord + Copy> {
    stage: String,
    key: fn(&Hit) -> K,
    sinks: BTreeMap<K, Box<dyn Sink>>,
    closed: bool,
}

impl<K: Ord + Copy> Demux<K> {
    fn new(stage: impl Into<String>, key: fn(&Hit) -> K, sinks: BTreeMap<K, Box<dyn Sink>>) -> Demux<K> {
        Demux {
            stage: stage.into(),
            key,
            sinks,
            closed: false,
        }
    }
}

impl Demux<ChannelId> {
    pub fn by_channel(sinks: BTreeMap<ChannelId, Box<dyn Sink>>) -> Demux<ChannelId> {
        Demux::new("channel-demux", |hit| hit.channel(), sinks)
    }
}

impl Demux<StringId> {
    pub fn by_string(sinks: BTreeMap<StringId, Box<dyn Sink>>) -> Demux<StringId> {
        Demux::new("string-demux", |hit| hit.channel().string_id(), sinks)
    }
}

impl<K: Ord + Copy> Sink for Demux<K> {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        if self.closed {
            return Err(UglcError::EnqueueAfterEos {
                stage: self.stage.clone(),
            });
        }
        let key = (self.key)(&hit);
        match self.sinks.get_mut(&key) {
            Some(sink) => sink.enqueue(hit),
            None => Err(UglcError::UnknownChannel {
                stage: self.stage.clone(),
                channel: hit.channel(),
            }),
        }
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if self.closed {
            return Err(UglcError::DuplicateEos {
                stage: self.stage.clone(),
            });
        }
        self.closed = true;
        for sink in self.sinks.values_mut() {
            sink.end_of_stream()?;
        }
        Ok(())
    }
}
