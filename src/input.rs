use crossterm::event::{poll, read, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use std::io;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// reads bytes arriving on the console channel
pub trait Input {
    /// get everything received since the last flush, without consuming it
    fn peek_bytes(&mut self) -> Result<&[u8], io::Error>;

    /// drop everything received so far
    fn flush_bytes(&mut self) -> Result<(), io::Error>;

    /// the other end wants the session over
    fn quit_requested(&self) -> bool;
}

/// keystrokes from the controlling terminal, in raw mode; Enter sends CR,
/// Esc or Ctrl-C ends the session
pub struct TermInput {
    buffer: Vec<u8>,
    quit: bool,
}

impl TermInput {
    pub fn new() -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(TermInput {
            buffer: Vec::new(),
            quit: false,
        })
    }

    fn read_terminal(&mut self) -> Result<(), io::Error> {
        while poll(Duration::from_millis(0))? {
            match read()? {
                Event::Key(evt) => match evt.code {
                    KeyCode::Char('c') if evt.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.quit = true
                    }
                    KeyCode::Char(key) if key.is_ascii() => self.buffer.push(key as u8),
                    KeyCode::Enter => self.buffer.push(b'\r'),
                    KeyCode::Esc => self.quit = true,
                    other => debug!(?other, "ignoring key"),
                },
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for TermInput {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "could not restore terminal mode");
        }
    }
}

impl Input for TermInput {
    fn peek_bytes(&mut self) -> Result<&[u8], io::Error> {
        self.read_terminal()?;
        Ok(self.buffer.as_slice())
    }

    fn flush_bytes(&mut self) -> Result<(), io::Error> {
        self.buffer.clear();
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        self.quit
    }
}

/// bytes from any reader (stdin, a pipe), pulled on a helper thread so the
/// tick loop never blocks on it
pub struct PipeInput {
    buffer: Vec<u8>,
    rx: Receiver<Vec<u8>>,
    closed: bool,
    quit_on_eof: bool,
}

const PIPE_CHUNK: usize = 256;

impl PipeInput {
    pub fn spawn<R: Read + Send + 'static>(mut reader: R, quit_on_eof: bool) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut chunk = [0u8; PIPE_CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "console input failed");
                        break;
                    }
                }
            }
        });
        PipeInput {
            buffer: Vec::new(),
            rx,
            closed: false,
            quit_on_eof,
        }
    }

    pub fn stdin(quit_on_eof: bool) -> Self {
        PipeInput::spawn(io::stdin(), quit_on_eof)
    }

    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.buffer.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("console input closed");
                    }
                    self.closed = true;
                    break;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Input for PipeInput {
    fn peek_bytes(&mut self) -> Result<&[u8], io::Error> {
        self.drain();
        Ok(self.buffer.as_slice())
    }

    fn flush_bytes(&mut self) -> Result<(), io::Error> {
        self.buffer.clear();
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        self.quit_on_eof && self.closed
    }
}

/// dummy Input implementation for testing; hands over its bytes once
pub struct DummyInput {
    bytes: Vec<u8>,
    quit_when_empty: bool,
}

impl DummyInput {
    pub fn new(bytes: &[u8]) -> Self {
        DummyInput {
            bytes: Vec::from(bytes),
            quit_when_empty: false,
        }
    }

    /// request quit once the bytes have been consumed
    pub fn then_quit(mut self) -> Self {
        self.quit_when_empty = true;
        self
    }
}

impl Input for DummyInput {
    fn peek_bytes(&mut self) -> Result<&[u8], io::Error> {
        Ok(self.bytes.as_slice())
    }

    fn flush_bytes(&mut self) -> Result<(), io::Error> {
        self.bytes.clear();
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        self.quit_when_empty && self.bytes.is_empty()
    }
}
