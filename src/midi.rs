// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! MIDI stream nodes and the byte-level helpers they share.

pub mod events;
pub mod handler;
pub mod parser;
mod ring;

pub use events::MidiEvents;
pub use handler::MidiHandler;
pub use parser::MidiParser;

/// Separates framed commands in a MIDI_MULTI block. 0xF5 is an unassigned
/// status byte, so it never occurs inside a framed command.
pub const DELIMITER: u8 = 0xF5;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const RESET: u8 = 0xFF;

/// Total command lengths indexed by the high nibble of the status byte, from
/// 0x8 to 0xF. Zero marks the variable-length system class.
const COMMAND_LENGTHS: [usize; 8] = [3, 3, 3, 3, 2, 2, 3, 0];

/// Returns true for status bytes.
pub fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// Returns true for system real-time bytes, which may appear anywhere in a stream.
pub fn is_realtime(byte: u8) -> bool {
    byte >= 0xF8
}

/// Returns true for channel voice status bytes (0x80 to 0xEF).
pub fn is_channel_status(byte: u8) -> bool {
    (0x80..0xF0).contains(&byte)
}

/// Looks up the total command length for a status byte from its high nibble.
/// Returns None for data bytes and zero for the variable-length system class.
pub fn command_length(status: u8) -> Option<usize> {
    if !is_status(status) {
        return None;
    }
    Some(COMMAND_LENGTHS[usize::from(status >> 4) - 8])
}

/// Returns the length of a complete message starting with the given status
/// byte, resolving the system class byte by byte. Returns None for data bytes
/// and for Sysex, which is terminated rather than fixed length.
pub fn message_length(status: u8) -> Option<usize> {
    match command_length(status)? {
        0 => match status {
            SYSEX_START => None,
            0xF1 | 0xF3 => Some(2),
            0xF2 => Some(3),
            _ => Some(1),
        },
        length => Some(length),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_lengths() {
        assert_eq!(None, command_length(0x40));
        assert_eq!(Some(3), command_length(0x80));
        assert_eq!(Some(3), command_length(0x9F));
        assert_eq!(Some(3), command_length(0xA0));
        assert_eq!(Some(3), command_length(0xB0));
        assert_eq!(Some(2), command_length(0xC0));
        assert_eq!(Some(2), command_length(0xD0));
        assert_eq!(Some(3), command_length(0xE0));
        assert_eq!(Some(0), command_length(0xF0));
        assert_eq!(Some(0), command_length(0xFF));
    }

    #[test]
    fn test_message_lengths() {
        assert_eq!(None, message_length(SYSEX_START));
        assert_eq!(Some(2), message_length(0xF1));
        assert_eq!(Some(3), message_length(0xF2));
        assert_eq!(Some(1), message_length(RESET));
        assert_eq!(Some(2), message_length(0xC5));
    }

    #[test]
    fn test_byte_classes() {
        assert!(is_status(DELIMITER));
        assert!(!is_realtime(DELIMITER));
        assert!(is_realtime(RESET));
        assert!(is_channel_status(0xEF));
        assert!(!is_channel_status(SYSEX_START));
    }
}
