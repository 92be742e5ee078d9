/// # report
///
/// Every script entry is a fixed 16-byte record. Byte 0 is the tag, the rest
/// is the payload for that tag:
///
///   tag 0x00  no-op        -- engine holds the cursor on it
///   tag 0x01  keyboard     -- modifiers, reserved, keys_down[6], leds
///   tag 0x02  mouse        -- buttons, x, y, wheel (signed deltas)
///   tag 0xfe  delay        -- byte 1 is the tick count
///   tag 0xff  end          -- logical end of the script
///
/// The keyboard and mouse forms are also the HID reports sent to the host:
/// the first 9 (keyboard) or 5 (mouse) bytes of the record, tag included as
/// the report ID.

/// size of one record, in storage and on the wire
pub const REPORT_SIZE: usize = 16;

pub const REPORT_ID_NOP: u8 = 0;
pub const REPORT_ID_KEYBOARD: u8 = 1;
pub const REPORT_ID_MOUSE: u8 = 2;
pub const REPORT_ID_DELAY: u8 = 254;
pub const REPORT_ID_END: u8 = 255;

/// HID report lengths, report ID included
pub const KEYBOARD_REPORT_LEN: usize = 9;
pub const MOUSE_REPORT_LEN: usize = 5;

/// set in `reserved` on keyboard reports generated from bytecode
pub const RESERVED_SYNTHESIZED: u8 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub reserved: u8,
    pub keys_down: [u8; 6],
    pub leds: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Nop,
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    Delay(u8),
    End,
    /// any tag we don't know; treated as terminal by the engine
    Unknown(u8),
}

impl Report {
    pub fn tag(&self) -> u8 {
        match self {
            Report::Nop => REPORT_ID_NOP,
            Report::Keyboard(_) => REPORT_ID_KEYBOARD,
            Report::Mouse(_) => REPORT_ID_MOUSE,
            Report::Delay(_) => REPORT_ID_DELAY,
            Report::End => REPORT_ID_END,
            Report::Unknown(tag) => *tag,
        }
    }

    /// how many leading bytes of the encoded record make up the HID report;
    /// `None` for records that are never sent to the host
    pub fn hid_len(&self) -> Option<usize> {
        match self {
            Report::Keyboard(_) => Some(KEYBOARD_REPORT_LEN),
            Report::Mouse(_) => Some(MOUSE_REPORT_LEN),
            _ => None,
        }
    }

    /// a key press as generated by the bytecode decoder
    pub fn key_press(modifiers: u8, key: u8) -> Self {
        Report::Keyboard(KeyboardReport {
            modifiers,
            reserved: RESERVED_SYNTHESIZED,
            keys_down: [key, 0, 0, 0, 0, 0],
            leds: 0,
        })
    }

    /// all keys up, as generated by the bytecode decoder
    pub fn key_release() -> Self {
        Report::Keyboard(KeyboardReport {
            reserved: RESERVED_SYNTHESIZED,
            ..KeyboardReport::default()
        })
    }

    pub fn mouse_move(x: i8, y: i8) -> Self {
        Report::Mouse(MouseReport {
            x,
            y,
            ..MouseReport::default()
        })
    }
}

/// unpack a stored record
pub fn decode(bytes: &[u8; REPORT_SIZE]) -> Report {
    match bytes[0] {
        REPORT_ID_NOP => Report::Nop,
        REPORT_ID_KEYBOARD => {
            let mut keys_down = [0u8; 6];
            keys_down.copy_from_slice(&bytes[3..9]);
            Report::Keyboard(KeyboardReport {
                modifiers: bytes[1],
                reserved: bytes[2],
                keys_down,
                leds: bytes[9],
            })
        }
        REPORT_ID_MOUSE => Report::Mouse(MouseReport {
            buttons: bytes[1],
            x: bytes[2] as i8,
            y: bytes[3] as i8,
            wheel: bytes[4] as i8,
        }),
        REPORT_ID_DELAY => Report::Delay(bytes[1]),
        REPORT_ID_END => Report::End,
        tag => Report::Unknown(tag),
    }
}

/// pack a record; unused payload bytes are zero and an unknown tag packs as
/// an all-zero record
pub fn encode(report: &Report) -> [u8; REPORT_SIZE] {
    let mut bytes = [0u8; REPORT_SIZE];
    match report {
        Report::Nop => {}
        Report::Keyboard(kb) => {
            bytes[0] = REPORT_ID_KEYBOARD;
            bytes[1] = kb.modifiers;
            bytes[2] = kb.reserved;
            bytes[3..9].copy_from_slice(&kb.keys_down);
            bytes[9] = kb.leds;
        }
        Report::Mouse(m) => {
            bytes[0] = REPORT_ID_MOUSE;
            bytes[1] = m.buttons;
            bytes[2] = m.x as u8;
            bytes[3] = m.y as u8;
            bytes[4] = m.wheel as u8;
        }
        Report::Delay(ticks) => {
            bytes[0] = REPORT_ID_DELAY;
            bytes[1] = *ticks;
        }
        Report::End => bytes[0] = REPORT_ID_END,
        Report::Unknown(_) => {}
    }
    bytes
}

/// pack a run of records back to back, ready to be programmed
pub fn encode_all(reports: &[Report]) -> Vec<u8> {
    reports.iter().flat_map(|r| encode(r)).collect()
}
