use crate::console::Console;
use crate::device::Device;
use crate::display::{Monitor, MonitorView};
use crate::engine::TickOutcome;
use crate::flash::FlashMedium;
use crate::input::Input;
use crate::sink::HostSink;
use std::io;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// don't redraw more often than this, however fast the ticks are
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Stands in for the transport and timer around the device: feeds console
/// input in, runs the tick at a fixed interval and shows what comes out.
pub struct Host<'a, M: FlashMedium> {
    device: Device<M>,
    console: Console,
    sink: HostSink,
    input: &'a mut dyn Input,
    monitor: &'a mut dyn Monitor,
    tick_interval: Duration,
    ticks: u64,
}

impl<'a, M: FlashMedium> Host<'a, M> {
    pub fn new(
        device: Device<M>,
        console: Console,
        input: &'a mut dyn Input,
        monitor: &'a mut dyn Monitor,
        tick_interval: Duration,
    ) -> Self {
        Host {
            device,
            console,
            sink: HostSink::new(),
            input,
            monitor,
            tick_interval,
            ticks: 0,
        }
    }

    pub fn device(&self) -> &Device<M> {
        &self.device
    }

    pub fn sink(&self) -> &HostSink {
        &self.sink
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn redraw(&mut self) -> Result<(), io::Error> {
        let view = MonitorView {
            cursor: self.device.engine().cursor(),
            host: &self.sink,
            ticks: self.ticks,
        };
        self.monitor.draw(&view)
    }

    /// feed any pending console input to the device; true if there was some
    fn service_input(&mut self) -> Result<bool, io::Error> {
        let data = self.input.peek_bytes()?.to_vec();
        self.input.flush_bytes()?;
        if data.is_empty() {
            return Ok(false);
        }
        if let Err(e) = self
            .console
            .on_receive(&data, &mut self.device, self.monitor.transport())
        {
            warn!(error = %e, "console reply dropped");
        }
        Ok(true)
    }

    /// main loop: runs until the input asks to quit, or `max_ticks` ticks
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<u64, io::Error> {
        info!(interval = ?self.tick_interval, ?max_ticks, "host running");
        if let Err(e) = self.console.greet(self.monitor.transport()) {
            warn!(error = %e, "greeting dropped");
        }
        self.redraw()?;

        let mut next_tick = Instant::now();
        let mut last_draw = Instant::now();
        let mut dirty = false;
        loop {
            if max_ticks.map_or(false, |max| self.ticks >= max) {
                break;
            }
            dirty |= self.service_input()?;
            if self.input.quit_requested() {
                info!(ticks = self.ticks, "quit requested");
                break;
            }

            let outcome = self.device.on_tick(&mut self.sink);
            self.ticks += 1;
            dirty |= outcome != TickOutcome::Paused;

            if dirty && last_draw.elapsed() >= REDRAW_INTERVAL {
                self.redraw()?;
                last_draw = Instant::now();
                dirty = false;
            }

            next_tick += self.tick_interval;
            let now = Instant::now();
            if next_tick > now {
                spin_sleep::sleep(next_tick - now);
            } else {
                // fell behind; don't try to catch up with a burst of ticks
                next_tick = now;
            }
        }
        self.redraw()?;
        Ok(self.ticks)
    }
}
