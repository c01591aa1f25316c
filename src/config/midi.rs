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
use serde::Deserialize;

use crate::block::PAYLOAD_SIZE;

use super::error::ConfigError;

const DEFAULT_RING_CAPACITY: usize = 1024;
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 256;
const DEFAULT_MAX_SYSEX_LENGTH: usize = 256;

/// The shortest useful Sysex: start byte, one data byte, end byte.
const MIN_SYSEX_LENGTH: usize = 3;

/// The longest Sysex the handler reassembles. Its buffer is allocated up front.
pub const MAX_SYSEX_LENGTH: usize = 64 * 1024;

/// The MIDI parser configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Parser {
    /// Size of the byte ring buffer. Must be a power of two large enough for a
    /// whole raw block.
    ring_capacity: Option<usize>,

    /// The longest Sysex message, including its framing bytes, that is passed on.
    max_message_length: Option<usize>,

    /// Whether data bytes in the idle state reuse the last channel status.
    running_status: Option<bool>,
}

impl Parser {
    pub fn new(ring_capacity: usize, max_message_length: usize, running_status: bool) -> Parser {
        Parser {
            ring_capacity: Some(ring_capacity),
            max_message_length: Some(max_message_length),
            running_status: Some(running_status),
        }
    }

    /// Returns the ring buffer capacity (default: 1024).
    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity.unwrap_or(DEFAULT_RING_CAPACITY)
    }

    /// Returns the maximum framed message length (default: 256).
    pub fn max_message_length(&self) -> usize {
        self.max_message_length.unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH)
    }

    /// Returns whether running status is honored (default: false).
    pub fn running_status(&self) -> bool {
        self.running_status.unwrap_or(false)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let ring_capacity = self.ring_capacity();
        if !ring_capacity.is_power_of_two() || ring_capacity < PAYLOAD_SIZE {
            return Err(ConfigError::Invalid(format!(
                "parser.ring_capacity must be a power of two of at least {}, got {}",
                PAYLOAD_SIZE, ring_capacity
            )));
        }

        // A framed message and its delimiter must fit into one block.
        let max_message_length = self.max_message_length();
        if !(MIN_SYSEX_LENGTH..PAYLOAD_SIZE).contains(&max_message_length) {
            return Err(ConfigError::Invalid(format!(
                "parser.max_message_length must be between {} and {}, got {}",
                MIN_SYSEX_LENGTH,
                PAYLOAD_SIZE - 1,
                max_message_length
            )));
        }
        Ok(())
    }
}

/// The MIDI handler configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Handler {
    /// The longest Sysex message, including its framing bytes, that is dispatched.
    max_sysex_length: Option<usize>,

    /// Whether events are dispatched at startup.
    enabled: Option<bool>,
}

impl Handler {
    pub fn new(max_sysex_length: usize, enabled: bool) -> Handler {
        Handler {
            max_sysex_length: Some(max_sysex_length),
            enabled: Some(enabled),
        }
    }

    /// Returns the maximum Sysex length (default: 256).
    pub fn max_sysex_length(&self) -> usize {
        self.max_sysex_length.unwrap_or(DEFAULT_MAX_SYSEX_LENGTH)
    }

    /// Returns whether dispatch starts enabled (default: true).
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SYSEX_LENGTH..=MAX_SYSEX_LENGTH).contains(&self.max_sysex_length()) {
            return Err(ConfigError::Invalid(format!(
                "handler.max_sysex_length must be between {} and {}, got {}",
                MIN_SYSEX_LENGTH,
                MAX_SYSEX_LENGTH,
                self.max_sysex_length()
            )));
        }
        Ok(())
    }
}

/// A MIDI input device to forward into the pipeline.
#[derive(Deserialize, Clone, Debug)]
pub struct Input {
    /// A substring of the input port name.
    device: String,
}

impl Input {
    pub fn new(device: &str) -> Input {
        Input {
            device: device.to_string(),
        }
    }

    /// Returns the device name to match.
    pub fn device(&self) -> &str {
        &self.device
    }
}
