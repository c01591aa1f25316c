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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Overrides the configured scheduler thread priority (0-99).
const PRIORITY_ENV: &str = "PISYNTH_THREAD_PRIORITY";

/// Disables the real-time scheduling class when set to a true value.
const DISABLE_RT_ENV: &str = "PISYNTH_DISABLE_RT";

/// Resolves the scheduler thread priority. PISYNTH_THREAD_PRIORITY wins over
/// the configured value when it holds a valid priority. Read once, before the
/// thread starts.
pub fn scheduler_thread_priority(configured: u8) -> u8 {
    std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(configured)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether to attempt round-robin real-time scheduling for the
/// scheduler thread. PISYNTH_DISABLE_RT=1 opts out regardless of configuration.
pub fn realtime_enabled(configured: bool) -> bool {
    configured && !env_flag(DISABLE_RT_ENV)
}

/// Applies the priority to the calling thread. Failures are logged and
/// otherwise ignored: the pipeline still runs at normal priority.
pub fn configure_scheduler_thread(priority: u8, realtime: bool) {
    let priority = match ThreadPriorityValue::try_from(priority) {
        Ok(priority) => ThreadPriority::Crossplatform(priority),
        Err(e) => {
            warn!(priority, error = ?e, "Invalid scheduler thread priority.");
            return;
        }
    };
    if let Err(e) = set_current_thread_priority(priority) {
        warn!(error = %e, "Failed to set scheduler thread priority");
    }

    #[cfg(unix)]
    if realtime {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::RoundRobin),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_RR for scheduler thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_RR for scheduler thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = realtime;
}
