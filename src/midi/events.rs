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

//! Typed MIDI events and the subscriber lists they are dispatched to.
//!
//! Callbacks run synchronously on the scheduler thread, so they must be short
//! and must not block.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Returned by `subscribe`, used to remove the callback again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type CallbackList<T> = Arc<Vec<(SubscriptionId, Callback<T>)>>;

/// An ordered list of callbacks for one event type.
///
/// The list is replaced rather than mutated, so dispatch works on a snapshot
/// and callbacks may subscribe or unsubscribe on the list that invoked them.
pub struct Subscribers<T: ?Sized> {
    callbacks: RwLock<CallbackList<T>>,
}

impl<T: ?Sized> Default for Subscribers<T> {
    fn default() -> Self {
        Subscribers {
            callbacks: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: ?Sized> Subscribers<T> {
    pub fn new() -> Subscribers<T> {
        Subscribers::default()
    }

    /// Adds a callback. Callbacks run in subscription order.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = self.callbacks.write();
        let mut updated = (**callbacks).clone();
        updated.push((id, Arc::new(callback)));
        *callbacks = Arc::new(updated);
        id
    }

    /// Removes a callback. Returns false if it was not subscribed here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        if !callbacks.iter().any(|(subscribed, _)| *subscribed == id) {
            return false;
        }
        let updated = callbacks
            .iter()
            .filter(|(subscribed, _)| *subscribed != id)
            .cloned()
            .collect();
        *callbacks = Arc::new(updated);
        true
    }

    /// Invokes every callback with the event. Changes made by a callback take
    /// effect from the next event on.
    pub fn emit(&self, event: &T) {
        let callbacks = self.callbacks.read().clone();
        for (_, callback) in callbacks.iter() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteOff {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// A note-on. A velocity of zero is delivered as-is, not as a note-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteOn {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// Polyphonic key pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyPressure {
    pub channel: u8,
    pub note: u8,
    pub pressure: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChange {
    pub channel: u8,
    pub controller: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramChange {
    pub channel: u8,
    pub program: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPressure {
    pub channel: u8,
    pub pressure: u8,
}

/// A pitch bend with its raw 14 bit value, 0x2000 being centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchBend {
    pub channel: u8,
    pub value: u16,
}

impl PitchBend {
    pub const CENTER: u16 = 0x2000;

    /// The bend relative to center, from -8192 to 8191.
    pub fn offset(&self) -> i16 {
        self.value as i16 - Self::CENTER as i16
    }
}

/// The dispatch target of the MIDI handler: one subscriber list per event type
/// and a global enable flag.
pub struct MidiEvents {
    enabled: AtomicBool,
    note_off: Subscribers<NoteOff>,
    note_on: Subscribers<NoteOn>,
    poly_pressure: Subscribers<PolyPressure>,
    control_change: Subscribers<ControlChange>,
    program_change: Subscribers<ProgramChange>,
    channel_pressure: Subscribers<ChannelPressure>,
    pitch_bend: Subscribers<PitchBend>,
    sysex: Subscribers<[u8]>,
    reset: Subscribers<()>,
}

impl MidiEvents {
    pub fn new(enabled: bool) -> MidiEvents {
        MidiEvents {
            enabled: AtomicBool::new(enabled),
            note_off: Subscribers::new(),
            note_on: Subscribers::new(),
            poly_pressure: Subscribers::new(),
            control_change: Subscribers::new(),
            program_change: Subscribers::new(),
            channel_pressure: Subscribers::new(),
            pitch_bend: Subscribers::new(),
            sysex: Subscribers::new(),
            reset: Subscribers::new(),
        }
    }

    /// Enables or disables dispatch. While disabled, incoming commands are
    /// still consumed but no callback fires.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn note_off(&self) -> &Subscribers<NoteOff> {
        &self.note_off
    }

    pub fn note_on(&self) -> &Subscribers<NoteOn> {
        &self.note_on
    }

    pub fn poly_pressure(&self) -> &Subscribers<PolyPressure> {
        &self.poly_pressure
    }

    pub fn control_change(&self) -> &Subscribers<ControlChange> {
        &self.control_change
    }

    pub fn program_change(&self) -> &Subscribers<ProgramChange> {
        &self.program_change
    }

    pub fn channel_pressure(&self) -> &Subscribers<ChannelPressure> {
        &self.channel_pressure
    }

    pub fn pitch_bend(&self) -> &Subscribers<PitchBend> {
        &self.pitch_bend
    }

    /// Complete Sysex messages, including the framing 0xF0 and 0xF7 bytes.
    pub fn sysex(&self) -> &Subscribers<[u8]> {
        &self.sysex
    }

    /// System reset (0xFF).
    pub fn reset(&self) -> &Subscribers<()> {
        &self.reset
    }
}

impl Default for MidiEvents {
    fn default() -> Self {
        MidiEvents::new(true)
    }
}

impl fmt::Debug for MidiEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiEvents")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_callbacks_run_in_order() {
        let subscribers: Subscribers<NoteOn> = Subscribers::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let calls = calls.clone();
            subscribers.subscribe(move |event: &NoteOn| calls.lock().push((name, event.note)));
        }

        subscribers.emit(&NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
        assert_eq!(vec![("first", 60), ("second", 60)], *calls.lock());
    }

    #[test]
    fn test_unsubscribe() {
        let subscribers: Subscribers<[u8]> = Subscribers::new();
        let total = Arc::new(Mutex::new(0usize));
        let keep = {
            let total = total.clone();
            subscribers.subscribe(move |bytes: &[u8]| *total.lock() += bytes.len())
        };
        let remove = {
            let total = total.clone();
            subscribers.subscribe(move |bytes: &[u8]| *total.lock() += 100 * bytes.len())
        };
        assert_ne!(keep, remove);

        assert!(subscribers.unsubscribe(remove));
        assert!(!subscribers.unsubscribe(remove));
        assert_eq!(1, subscribers.len());

        subscribers.emit(&[0xF0, 0xF7]);
        assert_eq!(2, *total.lock());
    }

    #[test]
    fn test_callback_changes_its_own_list() {
        let subscribers: Arc<Subscribers<NoteOn>> = Arc::new(Subscribers::new());
        let calls = Arc::new(Mutex::new(0));
        let own_id = Arc::new(Mutex::new(None));

        // A one-shot callback that removes itself and leaves a replacement.
        let id = {
            let list = subscribers.clone();
            let calls = calls.clone();
            let own_id = own_id.clone();
            subscribers.subscribe(move |_: &NoteOn| {
                *calls.lock() += 1;
                if let Some(id) = own_id.lock().take() {
                    assert!(list.unsubscribe(id));
                    let calls = calls.clone();
                    list.subscribe(move |_: &NoteOn| *calls.lock() += 10);
                }
            })
        };
        *own_id.lock() = Some(id);

        let note = NoteOn {
            channel: 0,
            note: 64,
            velocity: 127,
        };
        subscribers.emit(&note);
        assert_eq!(1, *calls.lock());
        assert_eq!(1, subscribers.len());

        subscribers.emit(&note);
        assert_eq!(11, *calls.lock());
    }

    #[test]
    fn test_ids_are_unique_across_lists() {
        let events = MidiEvents::default();
        let a = events.note_on().subscribe(|_| {});
        let b = events.note_off().subscribe(|_| {});
        assert_ne!(a, b);

        // An id only removes the callback from the list that issued it.
        assert!(!events.note_on().unsubscribe(b));
        assert!(events.note_off().unsubscribe(b));
    }

    #[test]
    fn test_pitch_bend_offset() {
        let bend = |value| PitchBend { channel: 0, value };
        assert_eq!(0, bend(PitchBend::CENTER).offset());
        assert_eq!(-8192, bend(0).offset());
        assert_eq!(8191, bend(0x3FFF).offset());
    }

    #[test]
    fn test_enable_flag() {
        let events = MidiEvents::new(false);
        assert!(!events.is_enabled());
        events.set_enabled(true);
        assert!(events.is_enabled());
    }
}
