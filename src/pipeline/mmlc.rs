use std::collections::{BTreeMap, VecDeque};

use crate::config::MmlcParams;
use crate::error::{Result, UglcError};
use crate::hit::{Hit, StringId};
use crate::pipeline::Sink;

/// One hit's examination window. Parameters are snapshotted from the
/// device type of the hit's module, since a string may mix device types.
struct HitWindow {
    hit: Hit,
    t_hit: i64,
    t_start: i64,
    t_end: i64,
    span_up: u32,
    span_down: u32,
    multiplicity: usize,
    count: usize,
}

impl HitWindow {
    fn new(hit: Hit, params: MmlcParams) -> HitWindow {
        let t_hit = hit.resolved_time();
        HitWindow {
            hit,
            t_hit,
            t_start: t_hit - params.t_back,
            t_end: t_hit + params.t_fwd,
            span_up: params.span_up,
            span_down: params.span_down,
            multiplicity: params.multiplicity,
            count: 0,
        }
    }

    /// Count `other` if it lies inside this window's time reach and
    /// axial neighborhood. Hits on the window's own module never count.
    fn observe(&mut self, other: &HitWindow) {
        if other.hit.channel().module_id() == self.hit.channel().module_id() {
            return;
        }
        if other.t_hit < self.t_start || other.t_hit > self.t_end {
            return;
        }
        let module = i64::from(self.hit.channel().module);
        let neighbor = i64::from(other.hit.channel().module);
        if neighbor < module - i64::from(self.span_up)
            || neighbor > module + i64::from(self.span_down)
        {
            return;
        }
        self.count += 1;
    }
}

/// Multi-module local coincidence over one string's time-ordered stream.
///
/// A window is examined only once the stream has moved past its forward
/// reach, so every hit that could fall inside it has arrived. Examined
/// windows wait out the `max_window` horizon in `held` before their hit
/// is released, so no already-forwarded hit can still be needed by a
/// later window.
pub struct Mmlc {
    stage: String,
    params: BTreeMap<u32, MmlcParams>,
    max_window: i64,
    pending: VecDeque<HitWindow>,
    held: VecDeque<HitWindow>,
    closed: bool,
    sink: Box<dyn Sink>,
}

impl Mmlc {
    /// `params` maps every module number on this string to its device's
    /// coincidence parameters.
    pub fn new(
        string: StringId,
        params: BTreeMap<u32, MmlcParams>,
        max_window: i64,
        sink: Box<dyn Sink>,
    ) -> Mmlc {
        Mmlc {
            stage: format!("mmlc[{string}]"),
            params,
            max_window,
            pending: VecDeque::new(),
            held: VecDeque::new(),
            closed: false,
            sink,
        }
    }

    /// Finalize every pending window whose forward reach lies behind `pit`:
    /// count it against all other buffered windows, mark its hit if the
    /// multiplicity is met, and move it to `held`.
    fn examine(&mut self, pit: i64) {
        while self.pending.front().is_some_and(|w| w.t_end < pit) {
            if let Some(mut window) = self.pending.pop_front() {
                for other in self.held.iter().chain(self.pending.iter()) {
                    window.observe(other);
                }
                if window.count >= window.multiplicity {
                    window.hit.mark_mmlc();
                }
                self.held.push_back(window);
            }
        }
    }

    /// Forward held hits older than `pit` downstream, oldest first.
    fn release(&mut self, pit: i64) -> Result<()> {
        while self.held.front().is_some_and(|w| w.t_hit < pit) {
            if let Some(window) = self.held.pop_front() {
                self.sink.enqueue(window.hit)?;
            }
        }
        Ok(())
    }
}

impl Sink for Mmlc {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        if self.closed {
            return Err(UglcError::EnqueueAfterEos {
                stage: self.stage.clone(),
            });
        }
        let params = match self.params.get(&hit.channel().module) {
            Some(params) => *params,
            None => {
                return Err(UglcError::UnknownChannel {
                    stage: self.stage.clone(),
                    channel: hit.channel(),
                })
            }
        };

        let window = HitWindow::new(hit, params);
        let pit = window.t_hit;
        self.pending.push_back(window);

        self.examine(pit);
        // the newly appended window keeps pending non-empty
        if let Some(front) = self.pending.front() {
            let horizon = front.t_hit - self.max_window;
            self.release(horizon)?;
        }
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if self.closed {
            return Err(UglcError::DuplicateEos {
                stage: self.stage.clone(),
            });
        }
        self.closed = true;
        self.examine(i64::MAX);
        self.release(i64::MAX)?;
        self.sink.end_of_stream()
    }
}
