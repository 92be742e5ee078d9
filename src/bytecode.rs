/// # bytecode
///
/// Compact keystroke scripts: a run of little-endian 16-bit words.
///
///   0xNN00  delay for NN ticks
///   0xMMKK  press key KK with modifiers MM, then release everything
///
/// A trailing odd byte is dropped. The decoded script always ends with an
/// end record.
use crate::report::Report;

/// expand bytecode into records, ready to be encoded and stored
pub fn decode_bytecode(bytes: &[u8]) -> Vec<Report> {
    let words = bytes.chunks_exact(2);
    let mut out = Vec::with_capacity(words.len() * 2 + 1);
    for word in words {
        let (key, modifiers) = (word[0], word[1]);
        if key == 0 {
            out.push(Report::Delay(modifiers));
            continue;
        }
        out.push(Report::key_press(modifiers, key));
        out.push(Report::key_release());
    }
    out.push(Report::End);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{KeyboardReport, RESERVED_SYNTHESIZED};
    use proptest::prelude::*;

    #[test]
    fn test_keystroke_expands_to_press_and_release() {
        // word 0x0207: key 0x07 with modifier 0x02
        let out = decode_bytecode(&[0x07, 0x02]);
        assert_eq!(
            out,
            vec![
                Report::Keyboard(KeyboardReport {
                    modifiers: 0x02,
                    reserved: RESERVED_SYNTHESIZED,
                    keys_down: [0x07, 0, 0, 0, 0, 0],
                    leds: 0,
                }),
                Report::Keyboard(KeyboardReport {
                    modifiers: 0,
                    reserved: RESERVED_SYNTHESIZED,
                    keys_down: [0; 6],
                    leds: 0,
                }),
                Report::End,
            ]
        );
    }

    #[test]
    fn test_zero_low_byte_is_delay() {
        assert_eq!(
            decode_bytecode(&[0x00, 0x2a]),
            vec![Report::Delay(0x2a), Report::End]
        );
    }

    #[test]
    fn test_odd_trailing_byte_dropped() {
        assert_eq!(
            decode_bytecode(&[0x00, 0x05, 0x04]),
            vec![Report::Delay(5), Report::End]
        );
    }

    #[test]
    fn test_empty_input_is_just_end() {
        assert_eq!(decode_bytecode(&[]), vec![Report::End]);
    }

    proptest! {
        #[test]
        fn test_record_count_matches_words(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let out = decode_bytecode(&bytes);
            let words = bytes.len() / 2;
            let delays = bytes.chunks_exact(2).filter(|w| w[0] == 0).count();
            prop_assert_eq!(out.len(), delays + 2 * (words - delays) + 1);
            prop_assert_eq!(out.last(), Some(&Report::End));
            prop_assert_eq!(out.iter().filter(|r| **r == Report::End).count(), 1);
        }
    }
}
