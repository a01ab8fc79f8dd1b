use std::collections::VecDeque;

use crate::error::{Result, UglcError};
use crate::hit::{ChannelId, Hit};
use crate::pipeline::Sink;

/// A time-sliding window over a monotonic hit stream. Hits stay buffered
/// until the stream moves more than `window_length` ticks past them, then
/// leave to the sink in insertion order.
pub struct SlidingWindow {
    stage: String,
    window_length: i64,
    hits: VecDeque<Hit>,
    curr_time: Option<i64>,
    prev: Option<(ChannelId, i64)>,
    closed: bool,
    sink: Box<dyn Sink>,
}

impl SlidingWindow {
    pub fn new(stage: impl Into<String>, window_length: i64, sink: Box<dyn Sink>) -> SlidingWindow {
        SlidingWindow {
            stage: stage.into(),
            window_length,
            hits: VecDeque::new(),
            curr_time: None,
            prev: None,
            closed: false,
            sink,
        }
    }

    /// Number of hits currently inside the window.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Mutable view of the buffered hits, oldest first.
    pub fn buffered_mut(&mut self) -> impl Iterator<Item = &mut Hit> + '_ {
        self.hits.iter_mut()
    }
}

impl Sink for SlidingWindow {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        if self.closed {
            return Err(UglcError::EnqueueAfterEos {
                stage: self.stage.clone(),
            });
        }

        let time = hit.resolved_time();
        if let Some(curr) = self.curr_time {
            if curr > time {
                let (last_channel, last_time) = self.prev.unwrap_or((hit.channel(), curr));
                return Err(UglcError::OutOfOrder {
                    stage: self.stage.clone(),
                    last_channel,
                    last_time,
                    channel: hit.channel(),
                    time,
                });
            }
        }
        self.curr_time = Some(time);

        // evict hits that have aged out; a hit aged exactly window_length stays
        while self
            .hits
            .front()
            .is_some_and(|old| time - old.resolved_time() > self.window_length)
        {
            if let Some(old) = self.hits.pop_front() {
                self.sink.enqueue(old)?;
            }
        }

        self.prev = Some((hit.channel(), time));
        self.hits.push_back(hit);
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if self.closed {
            return Err(UglcError::DuplicateEos {
                stage: self.stage.clone(),
            });
        }
        self.closed = true;
        while let Some(old) = self.hits.pop_front() {
            self.sink.enqueue(old)?;
        }
        self.sink.end_of_stream()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::support::{chan, hit, Recorder};

    use super::*;

    fn window(length: i64) -> (SlidingWindow, std::rc::Rc<std::cell::RefCell<crate::pipeline::support::Tape>>) {
        let (sink, tape) = Recorder::new();
        (SlidingWindow::new("test-window", length, sink), tape)
    }

    #[test]
    fn evicts_hits_older_than_window() {
        let (mut sw, tape) = window(100);
        sw.enqueue(hit(chan(87, 10, 0), 0)).unwrap();
        sw.enqueue(hit(chan(87, 10, 0), 50)).unwrap();
        sw.enqueue(hit(chan(87, 10, 0), 140)).unwrap();
        // only the hit at t=0 has aged out (140 - 0 > 100)
        assert_eq!(tape.borrow().times(), vec![0]);
        assert_eq!(sw.len(), 2);
    }

    #[test]
    fn hit_aged_exactly_window_stays() {
        let (mut sw, tape) = window(100);
        sw.enqueue(hit(chan(87, 10, 0), 0)).unwrap();
        sw.enqueue(hit(chan(87, 10, 0), 100)).unwrap();
        assert_eq!(tape.borrow().times(), Vec::<i64>::new());
        assert_eq!(sw.len(), 2);

        sw.enqueue(hit(chan(87, 10, 0), 101)).unwrap();
        assert_eq!(tape.borrow().times(), vec![0]);
    }

    #[test]
    fn eos_flushes_in_order_then_propagates() {
        let (mut sw, tape) = window(100);
        sw.enqueue(hit(chan(87, 10, 0), 10)).unwrap();
        sw.enqueue(hit(chan(87, 10, 1), 20)).unwrap();
        sw.end_of_stream().unwrap();
        assert_eq!(tape.borrow().times(), vec![10, 20]);
        assert_eq!(tape.borrow().eos, 1);
    }

    #[test]
    fn rejects_time_regression() {
        let (mut sw, _tape) = window(100);
        sw.enqueue(hit(chan(87, 10, 0), 100)).unwrap();
        let err = sw.enqueue(hit(chan(87, 10, 1), 50)).unwrap_err();
        assert!(matches!(err, UglcError::OutOfOrder { .. }));
    }

    #[test]
    fn accepts_equal_times() {
        let (mut sw, _tape) = window(100);
        sw.enqueue(hit(chan(87, 10, 0), 100)).unwrap();
        sw.enqueue(hit(chan(87, 10, 1), 100)).unwrap();
        assert_eq!(sw.len(), 2);
    }

    #[test]
    fn second_eos_is_fatal() {
        let (mut sw, _tape) = window(100);
        sw.end_of_stream().unwrap();
        assert!(matches!(
            sw.end_of_stream(),
            Err(UglcError::DuplicateEos { .. })
        ));
    }

    #[test]
    fn enqueue_after_eos_is_fatal() {
        let (mut sw, _tape) = window(100);
        sw.end_of_stream().unwrap();
        assert!(matches!(
            sw.enqueue(hit(chan(87, 10, 0), 10)),
            Err(UglcError::EnqueueAfterEos { .. })
        ));
    }
}
