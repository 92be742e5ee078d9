use crate::report::{self, Report, REPORT_SIZE};
use std::collections::VecDeque;
use tracing::debug;

/// Where emitted HID reports go. Takes 5 or 9 bytes, returns how many were
/// accepted; 0 means the endpoint is busy and the caller should try again.
pub trait ReportSink {
    fn write_report(&mut self, data: &[u8]) -> usize;
}

/// how many recent reports `HostSink` remembers
pub const HOST_HISTORY_LEN: usize = 16;

/// What the host would see: accepts everything and keeps track of the keys
/// held and where the pointer has got to.
#[derive(Debug, Default)]
pub struct HostSink {
    pub modifiers: u8,
    pub keys_down: [u8; 6],
    pub buttons: u8,
    pub pointer: (i64, i64),
    pub wheel: i64,
    pub emitted: u64,
    history: VecDeque<Report>,
}

impl HostSink {
    pub fn new() -> Self {
        HostSink::default()
    }

    /// most recent first
    pub fn history(&self) -> impl Iterator<Item = &Report> {
        self.history.iter().rev()
    }
}

impl ReportSink for HostSink {
    fn write_report(&mut self, data: &[u8]) -> usize {
        let mut bytes = [0u8; REPORT_SIZE];
        let len = data.len().min(REPORT_SIZE);
        bytes[..len].copy_from_slice(&data[..len]);
        let r = report::decode(&bytes);
        match &r {
            Report::Keyboard(kb) => {
                self.modifiers = kb.modifiers;
                self.keys_down = kb.keys_down;
            }
            Report::Mouse(m) => {
                self.buttons = m.buttons;
                self.pointer.0 += m.x as i64;
                self.pointer.1 += m.y as i64;
                self.wheel += m.wheel as i64;
            }
            _ => {}
        }
        debug!(report = ?r, "host received report");
        self.emitted += 1;
        if self.history.len() == HOST_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(r);
        data.len()
    }
}

/// dummy ReportSink for testing; refuses the first `busy` writes
pub struct DummySink {
    pub busy: usize,
    pub attempts: usize,
    pub reports: Vec<Vec<u8>>,
}

impl DummySink {
    pub fn new() -> Self {
        DummySink::busy_for(0)
    }

    pub fn busy_for(busy: usize) -> Self {
        DummySink {
            busy,
            attempts: 0,
            reports: Vec::new(),
        }
    }
}

impl Default for DummySink {
    fn default() -> Self {
        DummySink::new()
    }
}

impl ReportSink for DummySink {
    fn write_report(&mut self, data: &[u8]) -> usize {
        self.attempts += 1;
        if self.busy > 0 {
            self.busy -= 1;
            return 0;
        }
        self.reports.push(data.to_vec());
        data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{encode, KEYBOARD_REPORT_LEN, MOUSE_REPORT_LEN};

    #[test]
    fn test_host_tracks_pointer() {
        let mut h = HostSink::new();
        let right = encode(&Report::mouse_move(3, -1));
        let left = encode(&Report::mouse_move(-1, 0));
        assert_eq!(h.write_report(&right[..MOUSE_REPORT_LEN]), 5);
        h.write_report(&left[..MOUSE_REPORT_LEN]);
        assert_eq!(h.pointer, (2, -1));
        assert_eq!(h.emitted, 2);
        assert_eq!(h.history().next(), Some(&Report::mouse_move(-1, 0)));
    }

    #[test]
    fn test_host_tracks_keys() {
        let mut h = HostSink::new();
        let press = encode(&Report::key_press(0x02, 0x04));
        h.write_report(&press[..KEYBOARD_REPORT_LEN]);
        assert_eq!(h.modifiers, 0x02);
        assert_eq!(h.keys_down[0], 0x04);
        let release = encode(&Report::key_release());
        h.write_report(&release[..KEYBOARD_REPORT_LEN]);
        assert_eq!(h.keys_down, [0; 6]);
    }

    #[test]
    fn test_host_history_bounded() {
        let mut h = HostSink::new();
        let r = encode(&Report::mouse_move(1, 0));
        for _ in 0..(HOST_HISTORY_LEN + 5) {
            h.write_report(&r[..MOUSE_REPORT_LEN]);
        }
        assert_eq!(h.history().count(), HOST_HISTORY_LEN);
    }

    #[test]
    fn test_dummy_busy_then_accepts() {
        let mut d = DummySink::busy_for(2);
        assert_eq!(d.write_report(&[1, 2, 3, 4, 5]), 0);
        assert_eq!(d.write_report(&[1, 2, 3, 4, 5]), 0);
        assert_eq!(d.write_report(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(d.attempts, 3);
        assert_eq!(d.reports, vec![vec![1, 2, 3, 4, 5]]);
    }
}
