/// # console
///
/// Line-oriented command protocol over a byte channel. Characters are echoed
/// and collected until CR or LF; the first character of the line picks the
/// command, anything after it is a hex payload.
///
///   v        version
///   ?        help
///   w<hex>   store raw records
///   d<hex>   store bytecode, expanded to records
///   j        store the mouse jiggler
///   r        first record, as hex
///   @        cursor index, as hex of its little-endian bytes
///   p        toggle pause
///   s        single step
///   z        cursor back to 0
///
/// Every line gets its response followed by CRLF and the prompt.
use crate::bytecode::decode_bytecode;
use crate::device::Device;
use crate::error::{ConsoleError, FlashError};
use crate::flash::FlashMedium;
use crate::jiggler::mouse_jiggler;
use crate::report::REPORT_SIZE;
use std::borrow::Cow;
use tracing::{debug, info, warn};

pub const VERSION_REPLY: &str = concat!("hidscript version ", env!("CARGO_PKG_VERSION"));
pub const HELP_REPLY: &str = "v ? w<hex> d<hex> j r @ p s z";
pub const WROTE_REPLY: &str = "wrote flash";
pub const VERIFY_FAILED_REPLY: &str = "wrong data written";
pub const WRITE_ERROR_REPLY: &str = "error writing flash";
pub const BAD_HEX_REPLY: &str = "invalid hex data";
pub const INVALID_REPLY: &str = "invalid command, try ? for help";
pub const LINE_TOO_LONG_REPLY: &str = "line too long";

/// Byte channel back to the host. Takes at most one packet per call and
/// returns how much it accepted; 0 means try again.
pub trait Transport {
    fn write_packet(&mut self, data: &[u8]) -> usize;
}

/// push `data` out in packets of at most `packet_size`, resuming partial
/// writes; gives up after `retry_limit` refusals in a row
pub fn send_chunked(
    transport: &mut dyn Transport,
    data: &[u8],
    packet_size: usize,
    retry_limit: u32,
) -> Result<(), ConsoleError> {
    let mut sent = 0;
    let mut refusals = 0;
    while sent < data.len() {
        let end = data.len().min(sent + packet_size.max(1));
        let n = transport.write_packet(&data[sent..end]).min(end - sent);
        if n == 0 {
            refusals += 1;
            if refusals >= retry_limit {
                return Err(ConsoleError::TransportStalled {
                    sent,
                    total: data.len(),
                });
            }
            continue;
        }
        refusals = 0;
        sent += n;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Version,
    Help,
    RawWrite(&'a [u8]),
    BytecodeWrite(&'a [u8]),
    Jiggler,
    Read,
    Index,
    TogglePause,
    Step,
    Reset,
    /// nothing before the terminator
    Empty,
    Invalid(u8),
}

impl<'a> Command<'a> {
    /// parse one line, terminator already stripped
    pub fn parse(line: &'a [u8]) -> Self {
        let (first, payload) = match line.split_first() {
            Some((first, payload)) => (*first, payload),
            None => return Command::Empty,
        };
        match first {
            b'v' => Command::Version,
            b'?' => Command::Help,
            b'w' => Command::RawWrite(payload),
            b'd' => Command::BytecodeWrite(payload),
            b'j' => Command::Jiggler,
            b'r' => Command::Read,
            b'@' => Command::Index,
            b'p' => Command::TogglePause,
            b's' => Command::Step,
            b'z' => Command::Reset,
            other => Command::Invalid(other),
        }
    }
}

/// hex payload of either case; an odd trailing digit is dropped
fn decode_payload(payload: &[u8]) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(&payload[..payload.len() & !1])
}

fn write_reply(result: Result<(), FlashError>) -> Cow<'static, str> {
    match result {
        Ok(()) => WROTE_REPLY.into(),
        Err(FlashError::VerifyFailed { .. }) => VERIFY_FAILED_REPLY.into(),
        Err(e) => {
            warn!(error = %e, "script write failed");
            WRITE_ERROR_REPLY.into()
        }
    }
}

/// run one command against the device and produce its response text
pub fn execute<M: FlashMedium>(command: Command, device: &mut Device<M>) -> Cow<'static, str> {
    debug!(?command, "dispatching");
    match command {
        Command::Version => VERSION_REPLY.into(),
        Command::Help => HELP_REPLY.into(),
        Command::RawWrite(payload) => match decode_payload(payload) {
            Ok(bytes) => write_reply(device.program_bytes(&bytes)),
            Err(e) => {
                warn!(error = %e, "bad raw payload");
                BAD_HEX_REPLY.into()
            }
        },
        Command::BytecodeWrite(payload) => match decode_payload(payload) {
            Ok(bytes) => write_reply(device.program_reports(&decode_bytecode(&bytes))),
            Err(e) => {
                warn!(error = %e, "bad bytecode payload");
                BAD_HEX_REPLY.into()
            }
        },
        Command::Jiggler => {
            let width = device.jiggler_width();
            write_reply(device.program_reports(&mouse_jiggler(width)))
        }
        Command::Read => hex::encode(device.store().read(REPORT_SIZE)).into(),
        Command::Index => hex::encode(device.engine().index().to_le_bytes()).into(),
        Command::TogglePause => {
            if device.engine_mut().toggle_pause() {
                "paused".into()
            } else {
                "resumed".into()
            }
        }
        Command::Step => {
            device.engine_mut().single_step();
            "step".into()
        }
        Command::Reset => {
            device.engine_mut().reset();
            "".into()
        }
        Command::Empty => "".into(),
        Command::Invalid(_) => INVALID_REPLY.into(),
    }
}

/// the typing buffer plus echo/prompt handling for one console session
pub struct Console {
    line: Vec<u8>,
    capacity: usize,
    overflowed: bool,
    prompt: String,
    packet_size: usize,
    send_retry_limit: u32,
}

impl Console {
    pub fn new(prompt: &str, capacity: usize, packet_size: usize, send_retry_limit: u32) -> Self {
        Console {
            line: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
            prompt: prompt.to_string(),
            packet_size,
            send_retry_limit,
        }
    }

    pub fn from_config(config: &crate::config::ConsoleConfig) -> Self {
        Console::new(
            &config.prompt,
            config.line_capacity,
            config.packet_size,
            config.send_retry_limit,
        )
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// characters typed so far on the current line
    pub fn pending(&self) -> &[u8] {
        &self.line
    }

    /// Take a chunk of received bytes and build the reply: the echo of every
    /// byte, plus response and prompt for each completed line.
    pub fn receive<M: FlashMedium>(&mut self, data: &[u8], device: &mut Device<M>) -> Vec<u8> {
        let mut reply = Vec::with_capacity(data.len() * 2);
        for &c in data {
            if c == b'\r' {
                reply.push(b'\n');
            }
            reply.push(c);

            if c != b'\r' && c != b'\n' {
                if self.line.len() < self.capacity {
                    self.line.push(c);
                } else {
                    self.overflowed = true;
                }
                continue;
            }

            let response = if self.overflowed {
                warn!(capacity = self.capacity, "discarding overlong line");
                Cow::Borrowed(LINE_TOO_LONG_REPLY)
            } else {
                let command = Command::parse(&self.line);
                if let Command::Invalid(c) = command {
                    info!(command = %(c as char), "invalid command");
                }
                execute(command, device)
            };
            self.line.clear();
            self.overflowed = false;

            reply.extend_from_slice(response.as_bytes());
            reply.extend_from_slice(b"\r\n");
            reply.extend_from_slice(self.prompt.as_bytes());
        }
        reply
    }

    /// send a bare prompt, as when the port is first opened
    pub fn greet(&self, transport: &mut dyn Transport) -> Result<(), ConsoleError> {
        send_chunked(
            transport,
            self.prompt.as_bytes(),
            self.packet_size,
            self.send_retry_limit,
        )
    }

    /// data-arrival entry point: process the bytes and send the reply
    pub fn on_receive<M: FlashMedium>(
        &mut self,
        data: &[u8],
        device: &mut Device<M>,
        transport: &mut dyn Transport,
    ) -> Result<(), ConsoleError> {
        let reply = self.receive(data, device);
        send_chunked(transport, &reply, self.packet_size, self.send_retry_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flash::SimulatedFlash;
    use crate::report::{self, Report};
    use crate::store::ScriptStore;

    const BASE: u32 = 0x0801_fc00;

    fn device() -> Device<SimulatedFlash> {
        let store = ScriptStore::new(SimulatedFlash::new(BASE, 1024, 1).unwrap(), BASE, 1024);
        Device::new(store, &Config::default())
    }

    fn console() -> Console {
        Console::new("> ", 128, 8, 10)
    }

    fn run(console: &mut Console, device: &mut Device<SimulatedFlash>, line: &str) -> String {
        String::from_utf8(console.receive(line.as_bytes(), device)).unwrap()
    }

    /// accepts at most `per_call` bytes, refusing every other call
    struct SlowTransport {
        per_call: usize,
        refuse_next: bool,
        received: Vec<u8>,
    }

    impl Transport for SlowTransport {
        fn write_packet(&mut self, data: &[u8]) -> usize {
            self.refuse_next = !self.refuse_next;
            if !self.refuse_next {
                return 0;
            }
            let n = data.len().min(self.per_call);
            self.received.extend_from_slice(&data[..n]);
            n
        }
    }

    struct DeadTransport;

    impl Transport for DeadTransport {
        fn write_packet(&mut self, _data: &[u8]) -> usize {
            0
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse(b"v"), Command::Version);
        assert_eq!(Command::parse(b"w0102"), Command::RawWrite(b"0102"));
        assert_eq!(Command::parse(b"d"), Command::BytecodeWrite(b""));
        assert_eq!(Command::parse(b""), Command::Empty);
        assert_eq!(Command::parse(b"x"), Command::Invalid(b'x'));
    }

    #[test]
    fn test_echo_and_prompt() {
        let mut c = console();
        let mut d = device();
        assert_eq!(run(&mut c, &mut d, "p\r"), "p\n\rresumed\r\n> ");
        assert_eq!(run(&mut c, &mut d, "p\n"), "p\npaused\r\n> ");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut c = console();
        let mut d = device();
        assert_eq!(run(&mut c, &mut d, "?"), "?");
        assert_eq!(c.pending(), b"?");
        assert_eq!(run(&mut c, &mut d, "\n"), format!("\n{}\r\n> ", HELP_REPLY));
        assert!(c.pending().is_empty());
    }

    #[test]
    fn test_crlf_gives_one_response() {
        let mut c = console();
        let mut d = device();
        // the LF ends an empty line, answered with an empty reply
        assert_eq!(
            run(&mut c, &mut d, "v\r\n"),
            format!("v\n\r{}\r\n> \n\r\n> ", VERSION_REPLY)
        );
    }

    #[test]
    fn test_bare_terminator_is_not_an_invalid_command() {
        // unlike any other unrecognised line, an empty one gets an empty
        // reply rather than INVALID_REPLY
        let mut c = console();
        let mut d = device();
        assert_eq!(run(&mut c, &mut d, "\r"), "\n\r\r\n> ");
        assert_eq!(run(&mut c, &mut d, "\n"), "\n\r\n> ");
        assert!(!run(&mut c, &mut d, "\r\n").contains(INVALID_REPLY));
    }

    #[test]
    fn test_greet_survives_short_writes() {
        let c = Console::new("hid> ", 16, 2, 10);
        let mut t = SlowTransport {
            per_call: 1,
            refuse_next: false,
            received: Vec::new(),
        };
        c.greet(&mut t).unwrap();
        assert_eq!(t.received, b"hid> ");
        assert_eq!(
            c.greet(&mut DeadTransport),
            Err(ConsoleError::TransportStalled { sent: 0, total: 5 })
        );
    }

    #[test]
    fn test_invalid_command_leaves_state() {
        let mut c = console();
        let mut d = device();
        run(&mut c, &mut d, "w0100000000000000000000000000000000\r");
        let before = d.store().read(16);
        let cursor = *d.engine().cursor();
        assert_eq!(run(&mut c, &mut d, "x\r"), format!("x\n\r{}\r\n> ", INVALID_REPLY));
        assert_eq!(d.store().read(16), before);
        assert_eq!(*d.engine().cursor(), cursor);
    }

    #[test]
    fn test_raw_write_and_read() {
        let mut c = console();
        let mut d = device();
        let hex = "02000100000000000000000000000000";
        assert_eq!(run(&mut c, &mut d, &format!("w{}\r", hex)), format!("w{}\n\r{}\r\n> ", hex, WROTE_REPLY));
        assert_eq!(run(&mut c, &mut d, "r\r"), format!("r\n\r{}\r\n> ", hex));
    }

    #[test]
    fn test_bytecode_write() {
        let mut c = Console::new("> ", 64, 8, 10);
        let mut d = device();
        // key 0x07 + modifier 0x02, then a 5 tick delay
        assert!(run(&mut c, &mut d, "d07020005\r").contains(WROTE_REPLY));
        let stored = d.store().read(4 * REPORT_SIZE);
        let records: Vec<Report> = stored
            .chunks_exact(REPORT_SIZE)
            .map(|c| {
                let mut b = [0u8; REPORT_SIZE];
                b.copy_from_slice(c);
                report::decode(&b)
            })
            .collect();
        assert_eq!(
            records,
            vec![
                Report::key_press(0x02, 0x07),
                Report::key_release(),
                Report::Delay(5),
                Report::End,
            ]
        );
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload(b"0aFf7C").unwrap(), vec![0x0a, 0xff, 0x7c]);
        assert_eq!(decode_payload(b"abc").unwrap(), vec![0xab]);
        assert_eq!(decode_payload(b"").unwrap(), Vec::<u8>::new());
        assert_eq!(
            decode_payload(b"01zz"),
            Err(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 2 })
        );
    }

    #[test]
    fn test_odd_digit_dropped_on_write() {
        let mut c = console();
        let mut d = device();
        assert!(run(&mut c, &mut d, "w0102030\r").contains(WROTE_REPLY));
        assert_eq!(d.store().read(4), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_bad_hex_payload() {
        let mut c = console();
        let mut d = device();
        assert!(run(&mut c, &mut d, "w0g\r").contains(BAD_HEX_REPLY));
        assert_eq!(d.store().read(4), vec![0xff; 4]);
    }

    #[test]
    fn test_jiggler_write() {
        let mut c = console();
        let mut d = device();
        assert!(run(&mut c, &mut d, "j\r").contains(WROTE_REPLY));
        assert_eq!(d.store().read(REPORT_SIZE)[..3], [2, 0, 1]);
        let end = d.store().read_record(60).unwrap();
        assert_eq!(end[0], 0xff);
        assert_eq!(d.store().read_record(59).unwrap()[2], 0xff);
    }

    #[test]
    fn test_oversized_write_is_error() {
        let mut c = Console::new("> ", 4096, 8, 10);
        let mut d = device();
        let line = format!("w{}\r", "00".repeat(1025));
        assert!(run(&mut c, &mut d, &line).contains(WRITE_ERROR_REPLY));
    }

    #[test]
    fn test_index_step_reset() {
        let mut c = console();
        let mut d = device();
        run(&mut c, &mut d, "w0200010000000000000000000000000002000100000000000000000000000000ff\r");
        assert_eq!(run(&mut c, &mut d, "s\r"), "s\n\rstep\r\n> ");
        let mut sink = crate::sink::DummySink::new();
        d.on_tick(&mut sink);
        assert_eq!(run(&mut c, &mut d, "@\r"), "@\n\r01000000\r\n> ");
        assert!(d.engine().is_paused());
        assert_eq!(run(&mut c, &mut d, "z\r"), "z\n\r\r\n> ");
        assert_eq!(d.engine().index(), 0);
    }

    #[test]
    fn test_line_too_long() {
        let mut c = Console::new("> ", 4, 8, 10);
        let mut d = device();
        assert_eq!(
            run(&mut c, &mut d, "w0000\r"),
            format!("w0000\n\r{}\r\n> ", LINE_TOO_LONG_REPLY)
        );
        assert_eq!(d.store().read(4), vec![0xff; 4]);
        // next line is handled normally
        assert!(run(&mut c, &mut d, "w00\r").contains(WROTE_REPLY));
    }

    #[test]
    fn test_send_chunked_resumes_partial_writes() {
        let mut t = SlowTransport {
            per_call: 3,
            refuse_next: false,
            received: Vec::new(),
        };
        let data: Vec<u8> = (0..50).collect();
        send_chunked(&mut t, &data, 8, 10).unwrap();
        assert_eq!(t.received, data);
    }

    #[test]
    fn test_send_chunked_gives_up() {
        assert_eq!(
            send_chunked(&mut DeadTransport, b"hello", 8, 5),
            Err(ConsoleError::TransportStalled { sent: 0, total: 5 })
        );
    }

    #[test]
    fn test_on_receive_sends_reply() {
        let mut c = console();
        let mut d = device();
        let mut t = SlowTransport {
            per_call: 64,
            refuse_next: false,
            received: Vec::new(),
        };
        c.on_receive(b"s\r", &mut d, &mut t).unwrap();
        assert_eq!(t.received, b"s\n\rstep\r\n> ");
    }
}
