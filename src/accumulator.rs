//! Gathers processed hits back into frames at the pipeline tail.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::error::{Result, UglcError};
use crate::hit::{ChannelId, Hit, Pulse};
use crate::ingest::Frame;
use crate::pipeline::Sink;

/// Receives completed frames.
pub trait Consumer {
    fn consume(&mut self, frame: FrameResult);
}

/// Processing output for one frame: the original pulse map, the raw time
/// interval, the accumulated hits in emission order, and flag tallies.
pub struct FrameResult {
    pub frame_id: String,
    pub channels: BTreeMap<ChannelId, Vec<Pulse>>,
    pub t_start: i64,
    pub t_end: i64,
    pub hits: Vec<Hit>,
    pub smlc_cnt: usize,
    pub mmlc_cnt: usize,
}

impl FrameResult {
    fn new(frame: Frame) -> Result<FrameResult> {
        let (t_start, t_end) = frame.time_interval()?;
        Ok(FrameResult {
            frame_id: frame.id,
            channels: frame.channels,
            t_start,
            t_end,
            hits: Vec::new(),
            smlc_cnt: 0,
            mmlc_cnt: 0,
        })
    }

    fn add(&mut self, hit: Hit) {
        if hit.smlc() {
            self.smlc_cnt += 1;
        }
        if hit.mmlc() {
            self.mmlc_cnt += 1;
        }
        self.hits.push(hit);
    }
}

/// Slices the pipeline's time-ordered output back into frames and hands
/// completed frames to the consumer in input order. Bucketing is on raw
/// time: in joined mode the pipeline runs on offset times, but frame
/// bounds were captured in raw coordinates.
pub struct Accumulator {
    consumer: Rc<RefCell<dyn Consumer>>,
    pending: VecDeque<FrameResult>,
}

impl Accumulator {
    pub fn new(consumer: Rc<RefCell<dyn Consumer>>) -> Accumulator {
        Accumulator {
            consumer,
            pending: VecDeque::new(),
        }
    }

    /// Called by the driver at the moment a frame is pushed into the
    /// pipeline head.
    pub fn expect_frame(&mut self, frame: Frame) -> Result<()> {
        self.pending.push_back(FrameResult::new(frame)?);
        Ok(())
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Collect one processed hit, releasing completed frames when the
    /// stream has moved past their raw interval.
    pub fn consume_hit(&mut self, hit: Hit) -> Result<()> {
        let raw_time = hit.raw_time();
        loop {
            let Some(front) = self.pending.front_mut() else {
                return Err(UglcError::OrphanHit {
                    channel: hit.channel(),
                    raw_time,
                });
            };
            if raw_time < front.t_start {
                return Err(UglcError::HitPredatesFrame {
                    frame_id: front.frame_id.clone(),
                    channel: hit.channel(),
                    raw_time,
                    t_start: front.t_start,
                });
            }
            if raw_time > front.t_end {
                if let Some(done) = self.pending.pop_front() {
                    self.consumer.borrow_mut().consume(done);
                }
                continue;
            }
            front.add(hit);
            return Ok(());
        }
    }

    /// End of the processed stream; exactly one in-flight frame must
    /// remain, and it is handed off.
    pub fn end_of_stream(&mut self) -> Result<()> {
        if self.pending.len() != 1 {
            return Err(UglcError::EosPendingMismatch {
                pending: self.pending.len(),
            });
        }
        if let Some(done) = self.pending.pop_front() {
            self.consumer.borrow_mut().consume(done);
        }
        Ok(())
    }
}

/// Adapts a shared accumulator to the stage contract so it can terminate
/// the pipeline.
pub struct AccumulatorSink(pub Rc<RefCell<Accumulator>>);

impl Sink for AccumulatorSink {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        self.0.borrow_mut().consume_hit(hit)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.0.borrow_mut().end_of_stream()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::hit::Group;
    use crate::pipeline::support::chan;

    use super::*;

    struct Collect(Rc<RefCell<Vec<FrameResult>>>);

    impl Consumer for Collect {
        fn consume(&mut self, frame: FrameResult) {
            self.0.borrow_mut().push(frame);
        }
    }

    fn collector() -> (Rc<RefCell<dyn Consumer>>, Rc<RefCell<Vec<FrameResult>>>) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let consumer: Rc<RefCell<dyn Consumer>> =
            Rc::new(RefCell::new(Collect(Rc::clone(&frames))));
        (consumer, frames)
    }

    fn frame(id: &str, times: &[i64]) -> Frame {
        let channels = BTreeMap::from([(
            chan(87, 10, 0),
            times
                .iter()
                .map(|&time| Pulse { time, charge: 1.0 })
                .collect::<Vec<_>>(),
        )]);
        Frame {
            id: id.into(),
            channels,
        }
    }

    fn raw_hit(time: i64) -> Hit {
        let group = Arc::new(Group {
            id: "test:0".into(),
            t_offset: 0,
        });
        Hit::new(group, chan(87, 10, 0), Pulse { time, charge: 1.0 })
    }

    #[test]
    fn buckets_hits_and_releases_completed_frames() {
        let (consumer, frames) = collector();
        let mut acc = Accumulator::new(consumer);
        acc.expect_frame(frame("f:0", &[0, 100])).unwrap();
        acc.expect_frame(frame("f:1", &[200, 300])).unwrap();

        acc.consume_hit(raw_hit(50)).unwrap();
        assert_eq!(frames.borrow().len(), 0);

        // a hit past the first interval releases the first frame
        acc.consume_hit(raw_hit(250)).unwrap();
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(frames.borrow()[0].frame_id, "f:0");
        assert_eq!(frames.borrow()[0].hits.len(), 1);

        acc.end_of_stream().unwrap();
        let frames = frames.borrow();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].frame_id, "f:1");
        assert_eq!(frames[1].hits.len(), 1);
    }

    #[test]
    fn tallies_flags_per_frame() {
        let (consumer, frames) = collector();
        let mut acc = Accumulator::new(consumer);
        acc.expect_frame(frame("f:0", &[0, 100])).unwrap();

        let mut marked = raw_hit(10);
        marked.mark_smlc();
        marked.mark_mmlc();
        acc.consume_hit(marked).unwrap();
        acc.consume_hit(raw_hit(20)).unwrap();
        acc.end_of_stream().unwrap();

        let frames = frames.borrow();
        assert_eq!(frames[0].smlc_cnt, 1);
        assert_eq!(frames[0].mmlc_cnt, 1);
        assert_eq!(frames[0].hits.len(), 2);
    }

    #[test]
    fn orphan_hit_is_fatal() {
        let (consumer, _frames) = collector();
        let mut acc = Accumulator::new(consumer);
        assert!(matches!(
            acc.consume_hit(raw_hit(10)),
            Err(UglcError::OrphanHit { .. })
        ));
    }

    #[test]
    fn hit_predating_the_earliest_frame_is_fatal() {
        let (consumer, _frames) = collector();
        let mut acc = Accumulator::new(consumer);
        acc.expect_frame(frame("f:0", &[100, 200])).unwrap();
        assert!(matches!(
            acc.consume_hit(raw_hit(50)),
            Err(UglcError::HitPredatesFrame { .. })
        ));
    }

    #[test]
    fn eos_with_more_than_one_pending_frame_is_fatal() {
        let (consumer, _frames) = collector();
        let mut acc = Accumulator::new(consumer);
        acc.expect_frame(frame("f:0", &[0, 100])).unwrap();
        acc.expect_frame(frame("f:1", &[200, 300])).unwrap();
        assert!(matches!(
            acc.end_of_stream(),
            Err(UglcError::EosPendingMismatch { pending: 2 })
        ));
    }

    #[test]
    fn pulseless_frame_is_fatal() {
        let (consumer, _frames) = collector();
        let mut acc = Accumulator::new(consumer);
        assert!(matches!(
            acc.expect_frame(frame("f:0", &[])),
            Err(UglcError::DeficientFrame { .. })
        ));
    }
}
