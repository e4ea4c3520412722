//! MIDI-like events delivered to nodes.

use serde::{Deserialize, Serialize};

/// Type of a [`HiseEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    /// Empty event.
    #[default]
    Empty,
    /// Note on.
    NoteOn,
    /// Note off.
    NoteOff,
    /// Controller change.
    Controller,
    /// Pitch wheel.
    PitchBend,
    /// All notes off.
    AllNotesOff,
}

/// A 16 byte event.
///
/// `number` is the note number or controller number, `value` the velocity
/// or controller value. Pitch bend uses `number` and `value` as the low and
/// high 7 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HiseEvent {
    /// Event type.
    pub kind: EventType,
    /// MIDI channel, 1-based.
    pub channel: u8,
    /// Note or controller number.
    pub number: u8,
    /// Velocity or controller value.
    pub value: u8,
    /// Transposition in semitones.
    pub transpose: i8,
    /// Gain in decibels.
    pub gain: i8,
    /// Sample offset into the voice's start position.
    pub start_offset: u16,
    /// Id pairing note-on and note-off.
    pub event_id: u16,
    /// Sample offset inside the current block.
    pub timestamp: u32,
}

impl HiseEvent {
    /// A note-on.
    pub const fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: EventType::NoteOn,
            channel,
            number: note,
            value: velocity,
            transpose: 0,
            gain: 0,
            start_offset: 0,
            event_id: 0,
            timestamp: 0,
        }
    }

    /// A note-off.
    pub const fn note_off(channel: u8, note: u8) -> Self {
        Self {
            kind: EventType::NoteOff,
            ..Self::note_on(channel, note, 0)
        }
    }

    /// A controller change.
    pub const fn controller(channel: u8, number: u8, value: u8) -> Self {
        Self {
            kind: EventType::Controller,
            ..Self::note_on(channel, number, value)
        }
    }

    /// A pitch wheel message with a 14 bit value.
    pub const fn pitch_bend(channel: u8, value: u16) -> Self {
        Self {
            kind: EventType::PitchBend,
            ..Self::note_on(channel, (value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8)
        }
    }

    /// Sets the event id.
    pub const fn with_event_id(mut self, event_id: u16) -> Self {
        self.event_id = event_id;
        self
    }

    /// Sets the timestamp.
    pub const fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this is a note-on.
    pub const fn is_note_on(&self) -> bool {
        matches!(self.kind, EventType::NoteOn)
    }

    /// Whether this is a note-off.
    pub const fn is_note_off(&self) -> bool {
        matches!(self.kind, EventType::NoteOff)
    }

    /// Whether this is a controller change.
    pub const fn is_controller(&self) -> bool {
        matches!(self.kind, EventType::Controller)
    }

    /// Note number including transposition.
    pub fn note_number(&self) -> i32 {
        i32::from(self.number) + i32::from(self.transpose)
    }

    /// Frequency of the transposed note in Hz (A4 = 440 Hz).
    pub fn frequency(&self) -> f64 {
        440.0 * libm::exp2((f64::from(self.note_number()) - 69.0) / 12.0)
    }

    /// Velocity scaled to 0..1.
    pub fn float_velocity(&self) -> f32 {
        f32::from(self.value) / 127.0
    }

    /// 14 bit pitch wheel value.
    pub fn pitch_wheel_value(&self) -> u16 {
        u16::from(self.number) | (u16::from(self.value) << 7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_fits_native_slot() {
        assert_eq!(
            std::mem::size_of::<HiseEvent>(),
            crate::value::NativeType::Event.size()
        );
    }

    #[test]
    fn note_frequency() {
        let e = HiseEvent::note_on(1, 69, 100);
        assert!((e.frequency() - 440.0).abs() < 1e-9);

        let mut octave = HiseEvent::note_on(1, 57, 100);
        octave.transpose = 12;
        assert!((octave.frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn constructors_set_kind() {
        assert!(HiseEvent::note_on(1, 60, 127).is_note_on());
        assert!(HiseEvent::note_off(1, 60).is_note_off());
        assert!(HiseEvent::controller(1, 74, 64).is_controller());
        assert_eq!(HiseEvent::note_on(1, 60, 127).float_velocity(), 1.0);
    }

    #[test]
    fn pitch_bend_round_trip() {
        let e = HiseEvent::pitch_bend(1, 8192);
        assert_eq!(e.kind, EventType::PitchBend);
        assert_eq!(e.pitch_wheel_value(), 8192);
    }
}
