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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use crate::graph::MAX_STAGES;

use super::error::ConfigError;

const DEFAULT_STAGES: usize = 8;
const DEFAULT_TICK: Duration = Duration::from_millis(1);
const DEFAULT_THREAD_PRIORITY: u8 = 70;

/// The longest tick period accepted.
const MAX_TICK: Duration = Duration::from_secs(1);

/// A YAML representation of the scheduler configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Scheduler {
    /// Number of graph stages (default: 8).
    stages: Option<usize>,

    /// The tick period as a duration string, e.g. "1ms" (default: 1ms).
    tick: Option<String>,

    /// Priority of the scheduler thread, 0-99 (default: 70).
    thread_priority: Option<u8>,

    /// Whether to request the real-time scheduling class (default: true).
    realtime: Option<bool>,
}

impl Scheduler {
    pub fn new(stages: usize, tick: &str, thread_priority: u8, realtime: bool) -> Scheduler {
        Scheduler {
            stages: Some(stages),
            tick: Some(tick.to_string()),
            thread_priority: Some(thread_priority),
            realtime: Some(realtime),
        }
    }

    /// Returns the number of graph stages.
    pub fn stages(&self) -> usize {
        self.stages.unwrap_or(DEFAULT_STAGES)
    }

    /// Returns the tick period.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        match &self.tick {
            Some(tick) => {
                let tick = DurationString::from_string(tick.clone()).map_err(|e| {
                    ConfigError::Invalid(format!("scheduler.tick {:?} is invalid: {}", tick, e))
                })?;
                Ok(tick.into())
            }
            None => Ok(DEFAULT_TICK),
        }
    }

    /// Returns the configured scheduler thread priority.
    pub fn thread_priority(&self) -> u8 {
        self.thread_priority.unwrap_or(DEFAULT_THREAD_PRIORITY)
    }

    /// Returns whether the real-time scheduling class should be requested.
    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let stages = self.stages();
        if stages == 0 || stages > MAX_STAGES {
            return Err(ConfigError::Invalid(format!(
                "scheduler.stages must be between 1 and {}, got {}",
                MAX_STAGES, stages
            )));
        }

        let tick = self.tick()?;
        if tick.is_zero() || tick > MAX_TICK {
            return Err(ConfigError::Invalid(format!(
                "scheduler.tick must be above zero and at most {:?}, got {:?}",
                MAX_TICK, tick
            )));
        }

        if self.thread_priority() > 99 {
            return Err(ConfigError::Invalid(format!(
                "scheduler.thread_priority must be between 0 and 99, got {}",
                self.thread_priority()
            )));
        }
        Ok(())
    }
}
