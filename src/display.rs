use crate::console::Transport;
use crate::engine::Cursor;
use crate::report::Report;
use crate::sink::HostSink;
use std::collections::VecDeque;
use std::io;
use std::io::Write;
use tui::backend::CrosstermBackend;
use tui::layout::{Constraint, Direction, Layout};
use tui::style::{Color, Style};
use tui::text::Spans;
use tui::widgets::{Block, Borders, Paragraph};
use tui::Terminal;

/// everything a monitor may want to show about one moment of the session
pub struct MonitorView<'a> {
    pub cursor: &'a Cursor,
    pub host: &'a HostSink,
    pub ticks: u64,
}

/// Monitor shows the device state and carries console replies back to the
/// user. It should abstract the implementation details, so a terminal UI and
/// a plain pipe both work.
pub trait Monitor {
    /// redraw from the current state
    fn draw(&mut self, view: &MonitorView) -> Result<(), io::Error>;

    /// where console replies are written
    fn transport(&mut self) -> &mut dyn Transport;
}

/// scrollback of console output, split into lines
pub struct Transcript {
    lines: VecDeque<String>,
    current: String,
    max_lines: usize,
}

impl Transcript {
    pub fn new(max_lines: usize) -> Self {
        Transcript {
            lines: VecDeque::new(),
            current: String::new(),
            max_lines: max_lines.max(1),
        }
    }

    /// finished lines plus the one in progress, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.current.as_str()))
    }

    fn push_byte(&mut self, b: u8) {
        match b {
            b'\n' => {
                let line = std::mem::take(&mut self.current);
                if self.lines.len() == self.max_lines {
                    self.lines.pop_front();
                }
                self.lines.push_back(line);
            }
            b'\r' => {}
            b if b.is_ascii_graphic() || b == b' ' => self.current.push(b as char),
            _ => self.current.push('.'),
        }
    }
}

impl Transport for Transcript {
    fn write_packet(&mut self, data: &[u8]) -> usize {
        for b in data {
            self.push_byte(*b);
        }
        data.len()
    }
}

pub fn state_label(cursor: &Cursor) -> &'static str {
    match (cursor.paused, cursor.single_step, cursor.delaying) {
        (_, _, true) => "delaying",
        (true, true, _) => "stepping",
        (true, false, _) => "paused",
        (false, _, _) => "running",
    }
}

pub fn describe_report(report: &Report) -> String {
    match report {
        Report::Nop => "nop".to_string(),
        Report::Keyboard(kb) => format!(
            "key  mod {:02x} keys {:02x?} leds {:02x}",
            kb.modifiers, kb.keys_down, kb.leds
        ),
        Report::Mouse(m) => format!(
            "ptr  btn {:02x} x {:+} y {:+} wheel {:+}",
            m.buttons, m.x, m.y, m.wheel
        ),
        Report::Delay(t) => format!("delay {}", t),
        Report::End => "end".to_string(),
        Report::Unknown(tag) => format!("unknown tag {:02x}", tag),
    }
}

/// the device pane, one string per line
pub fn device_lines(view: &MonitorView) -> Vec<String> {
    let c = view.cursor;
    let h = view.host;
    let mut lines = vec![
        format!("state:    {}", state_label(c)),
        format!("index:    {}", c.index),
        format!("delay:    {}", if c.delaying { c.delay_remaining } else { 0 }),
        format!("ticks:    {}", view.ticks),
        format!("sent:     {}", h.emitted),
        format!("pointer:  ({}, {}) wheel {}", h.pointer.0, h.pointer.1, h.wheel),
        format!("buttons:  {:08b}", h.buttons),
        format!("keys:     mod {:02x} {:02x?}", h.modifiers, h.keys_down),
        String::new(),
        "recent:".to_string(),
    ];
    lines.extend(h.history().map(describe_report));
    lines
}

const TRANSCRIPT_LINES: usize = 200;

/// console and device state side by side in a terminal, rendered using TUI
pub struct TermMonitor {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    transcript: Transcript,
}

impl TermMonitor {
    pub fn new() -> Result<TermMonitor, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        Ok(TermMonitor {
            terminal,
            transcript: Transcript::new(TRANSCRIPT_LINES),
        })
    }
}

impl Drop for TermMonitor {
    fn drop(&mut self) {
        let _ = self.terminal.show_cursor();
    }
}

impl Monitor for TermMonitor {
    fn draw(&mut self, view: &MonitorView) -> Result<(), io::Error> {
        let transcript = &self.transcript;
        let device = device_lines(view);
        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
                .split(f.size());

            // keep the newest console lines in view
            let rows = chunks[0].height.saturating_sub(2) as usize;
            let all: Vec<&str> = transcript.lines().collect();
            let console: Vec<Spans> = all[all.len().saturating_sub(rows)..]
                .iter()
                .map(|l| Spans::from(l.to_string()))
                .collect();
            let console = Paragraph::new(console).block(
                Block::default()
                    .title("console")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::White)),
            );
            f.render_widget(console, chunks[0]);

            let state: Vec<Spans> = device.iter().map(|l| Spans::from(l.clone())).collect();
            let state = Paragraph::new(state).block(
                Block::default()
                    .title("device")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Green)),
            );
            f.render_widget(state, chunks[1]);
        })?;
        Ok(())
    }

    fn transport(&mut self) -> &mut dyn Transport {
        &mut self.transcript
    }
}

/// replies straight to stdout, no drawing; for pipes and scripts
pub struct PlainMonitor {
    out: io::Stdout,
}

impl PlainMonitor {
    pub fn new() -> Self {
        PlainMonitor { out: io::stdout() }
    }
}

impl Default for PlainMonitor {
    fn default() -> Self {
        PlainMonitor::new()
    }
}

impl Transport for PlainMonitor {
    fn write_packet(&mut self, data: &[u8]) -> usize {
        match self.out.write(data).and_then(|n| self.out.flush().map(|_| n)) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }
}

impl Monitor for PlainMonitor {
    fn draw(&mut self, _view: &MonitorView) -> Result<(), io::Error> {
        Ok(())
    }

    fn transport(&mut self) -> &mut dyn Transport {
        self
    }
}

/// useful for testing; keeps the transcript and counts redraws
pub struct DummyMonitor {
    pub transcript: Transcript,
    pub draws: usize,
}

impl DummyMonitor {
    pub fn new() -> Self {
        DummyMonitor {
            transcript: Transcript::new(TRANSCRIPT_LINES),
            draws: 0,
        }
    }
}

impl Default for DummyMonitor {
    fn default() -> Self {
        DummyMonitor::new()
    }
}

impl Monitor for DummyMonitor {
    fn draw(&mut self, _view: &MonitorView) -> Result<(), io::Error> {
        self.draws += 1;
        Ok(())
    }

    fn transport(&mut self) -> &mut dyn Transport {
        &mut self.transcript
    }
}
