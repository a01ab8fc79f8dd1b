use std::cell::Cell;
use std::rc::Rc;

use crate::error::{Result, UglcError};
use crate::hit::{ChannelId, Hit};

pub mod demux;
pub mod mmlc;
pub mod pipeline;
pub mod smlc;
pub mod sorter;
pub mod window;

/// The stage contract. Every pipeline node accepts hits and exactly one
/// end-of-stream signal.
pub trait Sink {
    /// Accept one hit; may buffer or forward zero or more hits downstream.
    fn enqueue(&mut self, hit: Hit) -> Result<()>;

    /// Signal that no further hits follow. The stage flushes its buffers
    /// in time order and propagates the signal downstream exactly once.
    fn end_of_stream(&mut self) -> Result<()>;
}

/// Counts hits passing through on their way to `sink`.
pub struct Counter {
    count: Rc<Cell<u64>>,
    sink: Box<dyn Sink>,
}

impl Counter {
    pub fn new(sink: Box<dyn Sink>) -> Counter {
        Counter {
            count: Rc::new(Cell::new(0)),
            sink,
        }
    }

    /// A handle to the count that stays readable after the counter has
    /// been wired into the pipeline.
    pub fn handle(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.count)
    }
}

impl Sink for Counter {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        self.count.set(self.count.get() + 1);
        self.sink.enqueue(hit)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.sink.end_of_stream()
    }
}

/// Sanity stage: fails the pipeline if resolved times regress.
pub struct OrderingCheck {
    name: String,
    last: Option<(ChannelId, i64)>,
    sink: Box<dyn Sink>,
}

impl OrderingCheck {
    pub fn new(name: impl Into<String>, sink: Box<dyn Sink>) -> OrderingCheck {
        OrderingCheck {
            name: name.into(),
            last: None,
            sink,
        }
    }
}

impl Sink for OrderingCheck {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        let time = hit.resolved_time();
        if let Some((last_channel, last_time)) = self.last {
            if last_time > time {
                return Err(UglcError::OutOfOrder {
                    stage: self.name.clone(),
                    last_channel,
                    last_time,
                    channel: hit.channel(),
                    time,
                });
            }
        }
        self.last = Some((hit.channel(), time));
        self.sink.enqueue(hit)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.sink.end_of_stream()
    }
}


#[cfg(test)]
mod tests {
    use super::support::{chan, hit, Recorder};
    use super::*;

    #[test]
    fn counter_counts_and_forwards() {
        let (sink, tape) = Recorder::new();
        let mut counter = Counter::new(sink);
        let count = counter.handle();
        counter.enqueue(hit(chan(87, 10, 0), 10)).unwrap();
        counter.enqueue(hit(chan(87, 10, 0), 20)).unwrap();
        counter.end_of_stream().unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(tape.borrow().hits.len(), 2);
        assert_eq!(tape.borrow().eos, 1);
    }

    #[test]
    fn ordering_check_rejects_regression() {
        let (sink, _tape) = Recorder::new();
        let mut check = OrderingCheck::new("order-check", sink);
        check.enqueue(hit(chan(87, 10, 0), 100)).unwrap();
        let err = check.enqueue(hit(chan(87, 11, 0), 50)).unwrap_err();
        assert!(matches!(err, UglcError::OutOfOrder { .. }));
    }

    #[test]
    fn ordering_check_accepts_equal_times() {
        let (sink, tape) = Recorder::new();
        let mut check = OrderingCheck::new("order-check", sink);
        check.enqueue(hit(chan(87, 10, 0), 100)).unwrap();
        check.enqueue(hit(chan(87, 11, 0), 100)).unwrap();
        assert_eq!(tape.borrow().hits.len(), 2);
    }
}
