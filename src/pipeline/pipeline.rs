use std::collections::BTreeMap;

use log::debug;

use crate::config::UglcConfig;
use crate::error::{Result, UglcError};
use crate::geometry::Geometry;
use crate::hit::{ChannelId, Hit, StringId};
use crate::ingest::Population;
use crate::pipeline::demux::Demux;
use crate::pipeline::mmlc::Mmlc;
use crate::pipeline::smlc::Smlc;
use crate::pipeline::sorter::PairHeapSorter;
use crate::pipeline::Sink;

/// The statically wired UGLC dataflow graph:
///
/// channel demux -> per-module sort -> SMLC -> global sort
///   -> string demux -> MMLC -> terminal sort -> sink
///
/// Hits enter at the head in per-channel time order and leave towards
/// `sink` in global time order, each passing through exactly once.
pub struct Pipeline {
    head: Demux<ChannelId>,
}

impl Pipeline {
    /// Build the graph bottom-up over `population`, which must cover
    /// every channel that will ever be enqueued.
    pub fn new(
        population: &Population,
        geometry: &Geometry,
        config: &UglcConfig,
        sink: Box<dyn Sink>,
    ) -> Result<Pipeline> {
        let by_module = population.by_module();
        let by_string = population.by_string();
        let max_window = config.max_window();

        // terminal sorter joining the per-string MMLC outputs
        let string_sorter = PairHeapSorter::new("string-sorter", by_string.keys().copied(), sink);
        let mut string_sinks: BTreeMap<StringId, Box<dyn Sink>> = BTreeMap::new();
        for (&string, channels) in &by_string {
            let mut params = BTreeMap::new();
            for channel in channels {
                let module = channel.module_id();
                let device = geometry.lookup(module);
                let mmlc = config
                    .mmlc_for(device)
                    .ok_or(UglcError::UnsupportedDevice { module, device })?;
                params.insert(module.module, mmlc);
            }
            let mmlc = Mmlc::new(
                string,
                params,
                max_window,
                Box::new(string_sorter.input_for(string)?),
            );
            string_sinks.insert(string, Box::new(mmlc));
        }
        let string_demux = Demux::by_string(string_sinks);

        // global sorter joining the per-module SMLC outputs
        let module_sorter = PairHeapSorter::new(
            "module-sorter",
            by_module.keys().copied(),
            Box::new(string_demux),
        );

        // per module: a channel sorter feeding an SMLC engine
        let mut channel_sinks: BTreeMap<ChannelId, Box<dyn Sink>> = BTreeMap::new();
        for (&module, channels) in &by_module {
            let device = geometry.lookup(module);
            let smlc_params = config
                .smlc_for(device)
                .ok_or(UglcError::UnsupportedDevice { module, device })?;
            let smlc = Smlc::new(
                module,
                smlc_params,
                Box::new(module_sorter.input_for(module)?),
            );
            let channel_sorter = PairHeapSorter::new(
                format!("channel-sorter[{module}]"),
                channels.iter().copied(),
                Box::new(smlc),
            );
            for &channel in channels {
                channel_sinks.insert(channel, Box::new(channel_sorter.input_for(channel)?));
            }
        }

        debug!(
            "plumbed pipeline: {} channels, {} modules, {} strings",
            population.channels().len(),
            by_module.len(),
            by_string.len()
        );
        Ok(Pipeline {
            head: Demux::by_channel(channel_sinks),
        })
    }
}

impl Sink for Pipeline {
    /// Input a hit into the pipeline.
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        self.head.enqueue(hit)
    }

    /// Signal the end of input, flushing every stage.
    fn end_of_stream(&mut self) -> Result<()> {
        self.head.end_of_stream()
    }
}
