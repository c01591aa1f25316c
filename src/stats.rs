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
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Faults detected while a node runs. None of these stop the pipeline; the node
/// that sees one handles it locally and counts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A pool had no free block; the unit of work was dropped or deferred.
    ResourceExhausted,
    /// A truncated or out-of-sequence command was discarded.
    MalformedFraming,
    /// A message or byte stream exceeded a fixed maximum length.
    Overflow,
    /// A block was dropped because the destination input slot was occupied.
    Backpressure,
    /// A well-formed command was consumed while dispatch was disabled.
    Muted,
}

impl Fault {
    const ALL: [Fault; 5] = [
        Fault::ResourceExhausted,
        Fault::MalformedFraming,
        Fault::Overflow,
        Fault::Backpressure,
        Fault::Muted,
    ];

    fn index(self) -> usize {
        match self {
            Fault::ResourceExhausted => 0,
            Fault::MalformedFraming => 1,
            Fault::Overflow => 2,
            Fault::Backpressure => 3,
            Fault::Muted => 4,
        }
    }
}

/// Lock-free fault counters, shared between a node and whoever observes it.
#[derive(Default)]
pub struct FaultCounters {
    counts: [AtomicU64; 5],
}

impl FaultCounters {
    pub fn new() -> FaultCounters {
        FaultCounters::default()
    }

    /// Counts one occurrence of the fault.
    pub fn record(&self, fault: Fault) {
        self.counts[fault.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns how often the fault has occurred.
    pub fn count(&self, fault: Fault) -> u64 {
        self.counts[fault.index()].load(Ordering::Relaxed)
    }

    /// The sum of all counted faults, excluding muted commands.
    pub fn errors(&self) -> u64 {
        Fault::ALL
            .iter()
            .filter(|fault| **fault != Fault::Muted)
            .map(|fault| self.count(*fault))
            .sum()
    }
}

impl fmt::Debug for FaultCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_map();
        for fault in Fault::ALL {
            debug.entry(&fault, &self.count(fault));
        }
        debug.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counts() {
        let counters = FaultCounters::new();
        counters.record(Fault::Overflow);
        counters.record(Fault::Overflow);
        counters.record(Fault::Muted);
        counters.record(Fault::Backpressure);

        assert_eq!(2, counters.count(Fault::Overflow));
        assert_eq!(1, counters.count(Fault::Muted));
        assert_eq!(0, counters.count(Fault::ResourceExhausted));
        assert_eq!(3, counters.errors());
    }
}
