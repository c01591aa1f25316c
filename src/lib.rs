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

//! A real-time MIDI stream pipeline.
//!
//! Raw bytes from input devices flow through a staged graph of stream nodes in
//! fixed-size pooled blocks: the parser frames them into commands, the handler
//! decodes the commands and dispatches typed events to subscribers. One
//! scheduler thread runs the whole graph once per tick.

pub mod block;
pub mod config;
pub mod graph;
pub mod input;
pub mod midi;
pub mod monitor;
pub mod runtime;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
mod testutil;
