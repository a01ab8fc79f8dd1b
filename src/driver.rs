//! Sets up UGLC processing over ingested frames and promotes completed
//! frames to the consumer.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::accumulator::{Accumulator, AccumulatorSink, Consumer, FrameResult};
use crate::config::UglcConfig;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::hit::{Group, Hit};
use crate::ingest::{Frame, Population};
use crate::pipeline::pipeline::Pipeline;
use crate::pipeline::{Counter, Sink};

/// Frame processing discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverMode {
    /// Each frame is an independent unit of data with its own pipeline.
    Isolated,
    /// The whole frame set is one unit; pulse times are offset into a
    /// single well-ordered stream through one pipeline.
    Joined,
}

/// Tracks the cumulative resolved-time high-water mark across joined
/// frames and assigns each frame the offset that keeps the stream
/// monotonic with at least `gap` ticks between frames.
struct JoinClock {
    last_pit: i64,
}

impl JoinClock {
    fn new() -> JoinClock {
        JoinClock { last_pit: 0 }
    }

    fn offset_for(&mut self, t_min: i64, t_max: i64, gap: i64) -> i64 {
        let offset = self.last_pit - t_min + gap;
        self.last_pit += t_max + offset;
        offset
    }
}

pub struct Driver {
    consumer: Rc<RefCell<dyn Consumer>>,
    mode: DriverMode,
    gap: i64,
}

impl Driver {
    pub fn new(consumer: Rc<RefCell<dyn Consumer>>, mode: DriverMode, gap: i64) -> Driver {
        Driver {
            consumer,
            mode,
            gap,
        }
    }

    pub fn process_frames(
        &self,
        frames: Vec<Frame>,
        config: &UglcConfig,
        geometry: &Geometry,
    ) -> Result<()> {
        match self.mode {
            DriverMode::Isolated => self.process_isolated(frames, config, geometry),
            DriverMode::Joined => self.process_joined(frames, config, geometry),
        }
    }

    fn process_isolated(
        &self,
        frames: Vec<Frame>,
        config: &UglcConfig,
        geometry: &Geometry,
    ) -> Result<()> {
        let started = Instant::now();
        let mut cum_in = 0u64;
        let mut cum_out = 0u64;

        for frame in frames {
            let split = Instant::now();
            info!("processing frame {}...", frame.id);

            let population = Population::from_frames(std::slice::from_ref(&frame));
            let accumulator = Rc::new(RefCell::new(Accumulator::new(Rc::clone(&self.consumer))));
            let tail = Counter::new(Box::new(AccumulatorSink(Rc::clone(&accumulator))));
            let out_count = tail.handle();
            let mut pipeline = Pipeline::new(&population, geometry, config, Box::new(tail))?;

            let group = Arc::new(Group {
                id: frame.id.clone(),
                t_offset: 0,
            });
            let hits: Vec<Hit> = frame.hits(&group).collect();
            accumulator.borrow_mut().expect_frame(frame)?;

            let mut in_count = 0u64;
            for hit in hits {
                in_count += 1;
                pipeline.enqueue(hit)?;
            }
            pipeline.end_of_stream()?;

            debug!(
                "frame completed: in {} out {} held {} ({:.3}s)",
                in_count,
                out_count.get(),
                in_count - out_count.get(),
                split.elapsed().as_secs_f64()
            );
            cum_in += in_count;
            cum_out += out_count.get();
        }

        info!(
            "processing completed: in {} out {} held {} ({:.3}s)",
            cum_in,
            cum_out,
            cum_in - cum_out,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn process_joined(
        &self,
        frames: Vec<Frame>,
        config: &UglcConfig,
        geometry: &Geometry,
    ) -> Result<()> {
        let started = Instant::now();

        // the pipeline must know every channel that will ever appear, so
        // the population is learned across the whole frame set up front
        let population = Population::from_frames(&frames);
        let accumulator = Rc::new(RefCell::new(Accumulator::new(Rc::clone(&self.consumer))));
        let tail = Counter::new(Box::new(AccumulatorSink(Rc::clone(&accumulator))));
        let out_count = tail.handle();
        let mut pipeline = Pipeline::new(&population, geometry, config, Box::new(tail))?;

        let mut clock = JoinClock::new();
        let mut in_count = 0u64;
        for frame in frames {
            info!("processing frame {}...", frame.id);
            let (t_min, t_max) = frame.time_interval()?;
            let offset = clock.offset_for(t_min, t_max, self.gap);
            debug!(
                "frame {} interval [{}-{}] offset {} -> [{}-{}]",
                frame.id,
                t_min,
                t_max,
                offset,
                t_min + offset,
                t_max + offset
            );

            let group = Arc::new(Group {
                id: frame.id.clone(),
                t_offset: offset,
            });
            let hits: Vec<Hit> = frame.hits(&group).collect();
            accumulator.borrow_mut().expect_frame(frame)?;
            for hit in hits {
                in_count += 1;
                pipeline.enqueue(hit)?;
            }
        }

        pipeline.end_of_stream()?;
        info!(
            "processing completed: in {} out {} held {} ({:.3}s)",
            in_count,
            out_count.get(),
            in_count - out_count.get(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Logs a digest of each completed frame.
pub struct SummaryConsumer;

impl Consumer for SummaryConsumer {
    fn consume(&mut self, frame: FrameResult) {
        info!(
            "completed frame {}: interval [{}-{}] hits {} smlc {} mmlc {}",
            frame.frame_id,
            frame.t_start,
            frame.t_end,
            frame.hits.len(),
            frame.smlc_cnt,
            frame.mmlc_cnt
        );
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn join_offsets_keep_frames_separated_by_the_gap() {
        let mut clock = JoinClock::new();
        // first frame lands with its minimum shifted to the gap
        assert_eq!(clock.offset_for(100, 200, 100), 0);
        assert_eq!(clock.last_pit, 200);
        // second frame starts at least one gap past the high-water mark
        assert_eq!(clock.offset_for(150, 300, 100), 150);
        assert_eq!(clock.last_pit, 650);
    }
}
