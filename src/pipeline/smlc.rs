use crate::config::SmlcParams;
use crate::error::Result;
use crate::hit::{Hit, ModuleId};
use crate::pipeline::window::SlidingWindow;
use crate::pipeline::Sink;

/// Single-module local coincidence: marks every hit inside the sliding
/// window whenever the window holds at least `multiplicity` hits. Marks
/// are monotonic; marked hits leave through normal window eviction.
pub struct Smlc {
    multiplicity: usize,
    window: SlidingWindow,
}

impl Smlc {
    pub fn new(module: ModuleId, params: SmlcParams, sink: Box<dyn Sink>) -> Smlc {
        Smlc {
            multiplicity: params.multiplicity,
            window: SlidingWindow::new(format!("smlc[{module}]"), params.window_length, sink),
        }
    }
}

impl Sink for Smlc {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        // trim first, so the multiplicity test sees only hits within the
        // last window_length ticks of the new hit
        self.window.enqueue(hit)?;
        if self.window.len() >= self.multiplicity {
            // a late hit completing the coincidence promotes the earlier
            // in-window hits as well
            for buffered in self.window.buffered_mut() {
                buffered.mark_smlc();
            }
        }
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.window.end_of_stream()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::support::{chan, hit, Recorder};

    use super::*;

    fn smlc(window_length: i64, multiplicity: usize) -> (Smlc, std::rc::Rc<std::cell::RefCell<crate::pipeline::support::Tape>>) {
        let (sink, tape) = Recorder::new();
        let module = ModuleId {
            string: 87,
            module: 10,
        };
        let params = SmlcParams {
            window_length,
            multiplicity,
        };
        (Smlc::new(module, params, sink), tape)
    }

    #[test]
    fn sparse_hits_stay_unmarked() {
        // every arrival empties the window first, so no coincidence forms
        let (mut engine, tape) = smlc(100, 2);
        for t in [10, 150, 300] {
            engine.enqueue(hit(chan(87, 10, 0), t)).unwrap();
        }
        engine.end_of_stream().unwrap();

        let tape = tape.borrow();
        assert_eq!(tape.times(), vec![10, 150, 300]);
        assert!(tape.hits.iter().all(|h| !h.smlc()));
        assert_eq!(tape.eos, 1);
    }

    #[test]
    fn coincident_hits_are_all_marked() {
        let (mut engine, tape) = smlc(100, 2);
        for t in [10, 50, 80] {
            engine.enqueue(hit(chan(87, 10, 0), t)).unwrap();
        }
        engine.end_of_stream().unwrap();

        let tape = tape.borrow();
        assert_eq!(tape.times(), vec![10, 50, 80]);
        assert!(tape.hits.iter().all(|h| h.smlc()));
    }

    #[test]
    fn late_hit_promotes_earlier_window_hits() {
        let (mut engine, tape) = smlc(100, 3);
        engine.enqueue(hit(chan(87, 10, 0), 0)).unwrap();
        engine.enqueue(hit(chan(87, 10, 1), 40)).unwrap();
        // the third hit completes the multiplicity and promotes all three
        engine.enqueue(hit(chan(87, 10, 2), 80)).unwrap();
        engine.end_of_stream().unwrap();

        assert!(tape.borrow().hits.iter().all(|h| h.smlc()));
    }

    #[test]
    fn marks_survive_eviction_and_never_clear() {
        let (mut engine, tape) = smlc(100, 2);
        engine.enqueue(hit(chan(87, 10, 0), 0)).unwrap();
        engine.enqueue(hit(chan(87, 10, 1), 50)).unwrap();
        // far in the future: both marked hits are evicted, the new lone
        // hit stays unmarked
        engine.enqueue(hit(chan(87, 10, 0), 500)).unwrap();
        engine.end_of_stream().unwrap();

        let tape = tape.borrow();
        assert_eq!(tape.times(), vec![0, 50, 500]);
        assert!(tape.hits[0].smlc());
        assert!(tape.hits[1].smlc());
        assert!(!tape.hits[2].smlc());
    }

    #[test]
    fn multiplicity_one_marks_every_hit() {
        let (mut engine, tape) = smlc(100, 1);
        for t in [10, 500, 1000] {
            engine.enqueue(hit(chan(87, 10, 0), t)).unwrap();
        }
        engine.end_of_stream().unwrap();
        assert!(tape.borrow().hits.iter().all(|h| h.smlc()));
    }
}
