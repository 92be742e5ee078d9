/// # engine
///
/// Walks the stored script one record per tick:
///
///  * paused (and not single-stepping)  -- nothing happens
///  * no-op                             -- cursor holds, retried next tick
///  * delay n                           -- one tick to latch, n ticks to count down, then advance
///  * keyboard / mouse                  -- send the HID report, then advance
///  * end or anything unknown           -- back to record 0, nothing sent
///
/// A single step runs until the next report is sent, then pauses again.
///
/// The tick never allocates. Sending retries while the sink reports busy, up
/// to `emit_retry_limit` attempts; past that the tick gives up with the
/// cursor untouched and the same record is tried on the next tick.
use crate::flash::FlashMedium;
use crate::report::{self, Report};
use crate::sink::ReportSink;
use crate::store::ScriptStore;
use tracing::{debug, trace, warn};

/// where the engine is in the script and whether it is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub index: u32,
    pub paused: bool,
    pub single_step: bool,
    pub delaying: bool,
    pub delay_remaining: u8,
}

/// what a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Paused,
    /// parked on a no-op
    Held,
    /// delay latched or counting down; ticks still to go
    Delaying(u8),
    /// delay finished and the cursor moved on
    DelayDone,
    Emitted(Report),
    /// end of script (or unknown record), cursor back at 0
    Wrapped,
    /// sink stayed busy for the whole retry budget
    Stalled,
}

pub struct Engine {
    cursor: Cursor,
    emit_retry_limit: u32,
}

impl Engine {
    pub fn new(paused: bool, emit_retry_limit: u32) -> Self {
        Engine {
            cursor: Cursor {
                paused,
                ..Cursor::default()
            },
            emit_retry_limit: emit_retry_limit.max(1),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn index(&self) -> u32 {
        self.cursor.index
    }

    pub fn is_paused(&self) -> bool {
        self.cursor.paused
    }

    /// flip the pause flag; returns the new state
    pub fn toggle_pause(&mut self) -> bool {
        self.cursor.paused = !self.cursor.paused;
        debug!(paused = self.cursor.paused, "pause toggled");
        self.cursor.paused
    }

    /// run until the next report is sent, then pause
    pub fn single_step(&mut self) {
        self.cursor.single_step = true;
    }

    /// back to the first record; an unfinished delay is dropped
    pub fn reset(&mut self) {
        self.cursor.index = 0;
        self.cursor.delaying = false;
        self.cursor.delay_remaining = 0;
    }

    /// advance the script by one tick
    pub fn tick<M: FlashMedium>(
        &mut self,
        store: &ScriptStore<M>,
        sink: &mut dyn ReportSink,
    ) -> TickOutcome {
        if self.cursor.paused && !self.cursor.single_step {
            return TickOutcome::Paused;
        }

        // past the region counts as the end of the script
        let record = match store.read_record(self.cursor.index as usize) {
            Some(bytes) => report::decode(&bytes),
            None => Report::End,
        };

        match record {
            Report::Nop => TickOutcome::Held,
            Report::Delay(ticks) => self.delay(ticks),
            Report::Keyboard(_) | Report::Mouse(_) => self.emit(&record, sink),
            Report::End | Report::Unknown(_) => {
                trace!(from = self.cursor.index, "wrapping to start of script");
                self.cursor.index = 0;
                TickOutcome::Wrapped
            }
        }
    }

    fn delay(&mut self, ticks: u8) -> TickOutcome {
        if !self.cursor.delaying {
            self.cursor.delay_remaining = ticks;
            self.cursor.delaying = true;
            return TickOutcome::Delaying(ticks);
        }
        self.cursor.delay_remaining = self.cursor.delay_remaining.saturating_sub(1);
        if self.cursor.delay_remaining == 0 {
            self.cursor.delaying = false;
            self.cursor.index += 1;
            return TickOutcome::DelayDone;
        }
        TickOutcome::Delaying(self.cursor.delay_remaining)
    }

    fn emit(&mut self, record: &Report, sink: &mut dyn ReportSink) -> TickOutcome {
        let bytes = report::encode(record);
        let len = match record.hid_len() {
            Some(len) => len,
            None => return TickOutcome::Held,
        };

        let mut accepted = false;
        for _ in 0..self.emit_retry_limit {
            if sink.write_report(&bytes[..len]) != 0 {
                accepted = true;
                break;
            }
        }
        if !accepted {
            warn!(
                index = self.cursor.index,
                attempts = self.emit_retry_limit,
                "report sink stayed busy"
            );
            return TickOutcome::Stalled;
        }

        if self.cursor.single_step {
            self.cursor.single_step = false;
            self.cursor.paused = true;
        }
        self.cursor.index += 1;
        TickOutcome::Emitted(*record)
    }
}
