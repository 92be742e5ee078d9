use crate::config::Config;
use crate::engine::{Engine, TickOutcome};
use crate::error::FlashError;
use crate::flash::{FlashMedium, WORD_SIZE};
use crate::report::{self, Report, REPORT_ID_END};
use crate::sink::ReportSink;
use crate::store::ScriptStore;
use tracing::info;

/// Everything the tick and the console share: the stored script and the
/// engine's cursor. Both entry points take it by `&mut`, so they can never
/// interleave; a store program always finishes before the next tick reads.
pub struct Device<M: FlashMedium> {
    store: ScriptStore<M>,
    engine: Engine,
    jiggler_width: usize,
}

impl<M: FlashMedium> Device<M> {
    /// Starts running straight away if a script is already stored, i.e. the
    /// first record is anything but end (an erased medium reads as end).
    pub fn new(store: ScriptStore<M>, config: &Config) -> Self {
        let first = store.read_record(0).map(|r| r[0]).unwrap_or(REPORT_ID_END);
        let paused = first == REPORT_ID_END;
        info!(paused, "device starting");
        Device {
            store,
            engine: Engine::new(paused, config.engine.emit_retry_limit),
            jiggler_width: config.jiggler.width,
        }
    }

    pub fn store(&self) -> &ScriptStore<M> {
        &self.store
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn jiggler_width(&self) -> usize {
        self.jiggler_width
    }

    /// periodic tick entry point
    pub fn on_tick(&mut self, sink: &mut dyn ReportSink) -> TickOutcome {
        self.engine.tick(&self.store, sink)
    }

    /// store raw bytes as the new script, zero-padded to the program granularity
    pub fn program_bytes(&mut self, data: &[u8]) -> Result<(), FlashError> {
        let padded_len = (data.len() + WORD_SIZE - 1) / WORD_SIZE * WORD_SIZE;
        if padded_len == data.len() {
            return self.store.program(data);
        }
        let mut padded = data.to_vec();
        padded.resize(padded_len, 0);
        self.store.program(&padded)
    }

    /// store a run of records as the new script
    pub fn program_reports(&mut self, reports: &[Report]) -> Result<(), FlashError> {
        self.store.program(&report::encode_all(reports))
    }
}
