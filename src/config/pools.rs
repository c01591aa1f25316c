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

use crate::block::{MASK_BITS, MAX_CAPACITY};

use super::error::ConfigError;

const DEFAULT_CONTROL_CAPACITY: usize = 64;
const DEFAULT_RAW_CAPACITY: usize = 64;

/// Block pool sizes.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pools {
    /// Blocks shared by the nodes of the graph.
    control_capacity: Option<usize>,

    /// Blocks used by input producers for raw bytes.
    raw_capacity: Option<usize>,
}

impl Pools {
    pub fn new(control_capacity: usize, raw_capacity: usize) -> Pools {
        Pools {
            control_capacity: Some(control_capacity),
            raw_capacity: Some(raw_capacity),
        }
    }

    /// Returns the control pool capacity (default: 64).
    pub fn control_capacity(&self) -> usize {
        self.control_capacity.unwrap_or(DEFAULT_CONTROL_CAPACITY)
    }

    /// Returns the raw pool capacity (default: 64).
    pub fn raw_capacity(&self) -> usize {
        self.raw_capacity.unwrap_or(DEFAULT_RAW_CAPACITY)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        for (name, capacity) in [
            ("control_capacity", self.control_capacity()),
            ("raw_capacity", self.raw_capacity()),
        ] {
            if capacity == 0 || capacity % MASK_BITS != 0 || capacity > MAX_CAPACITY {
                return Err(ConfigError::Invalid(format!(
                    "pools.{} must be a non-zero multiple of {} no larger than {}, got {}",
                    name, MASK_BITS, MAX_CAPACITY, capacity
                )));
            }
        }
        Ok(())
    }
}
