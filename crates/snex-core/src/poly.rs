//! Per-voice state for polyphonic networks.
//!
//! A [`PolyHandler`] holds the index of the voice that is currently being
//! rendered. Nodes keep their per-voice state in [`PolyData`], which picks the
//! slot of the current voice. Voice index `-1` means "all voices": parameter
//! changes made outside a voice context apply to every slot.
//!
//! ```rust
//! use std::sync::Arc;
//! use snex_core::{PolyData, PolyHandler, PrepareSpecs, VoiceSetter};
//!
//! let handler = Arc::new(PolyHandler::new(4));
//! let mut gain = PolyData::new(1.0f32);
//! gain.prepare(&PrepareSpecs::new(44100.0, 512, 2).with_poly_handler(Arc::clone(&handler)));
//!
//! for g in gain.voices_mut() {
//!     *g = 0.5;
//! }
//!
//! let _voice = VoiceSetter::new(&handler, 2);
//! *gain.get_mut() = 0.25;
//! assert_eq!(*gain.get(), 0.25);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::event::HiseEvent;
use crate::specs::PrepareSpecs;

/// Default voice count of a polyphonic network.
pub const DEFAULT_NUM_VOICES: usize = 16;

/// Voice context shared by the nodes of one network.
#[derive(Debug)]
pub struct PolyHandler {
    voice_index: AtomicI32,
    num_voices: usize,
}

impl PolyHandler {
    /// A handler for `num_voices` voices. `1` is monophonic.
    pub fn new(num_voices: usize) -> Self {
        Self {
            voice_index: AtomicI32::new(-1),
            num_voices: num_voices.max(1),
        }
    }

    /// Number of voices.
    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    /// Whether more than one voice is available.
    pub fn is_polyphonic(&self) -> bool {
        self.num_voices > 1
    }

    /// Current voice, `-1` for all voices.
    pub fn voice_index(&self) -> i32 {
        self.voice_index.load(Ordering::Relaxed)
    }

    /// Current voice as a slot index, `None` for all voices.
    pub fn current_voice(&self) -> Option<usize> {
        usize::try_from(self.voice_index())
            .ok()
            .filter(|&v| v < self.num_voices)
    }

    fn set_voice_index(&self, index: i32) -> i32 {
        self.voice_index.swap(index, Ordering::Relaxed)
    }
}

impl Default for PolyHandler {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Sets the current voice for its lifetime and restores the previous one.
#[must_use = "the voice is reset when the setter is dropped"]
pub struct VoiceSetter<'a> {
    handler: &'a PolyHandler,
    previous: i32,
}

impl<'a> VoiceSetter<'a> {
    /// Makes `voice` the current voice.
    pub fn new(handler: &'a PolyHandler, voice: usize) -> Self {
        let previous = handler.set_voice_index(voice as i32);
        Self { handler, previous }
    }

    /// Makes every voice current.
    pub fn all(handler: &'a PolyHandler) -> Self {
        let previous = handler.set_voice_index(-1);
        Self { handler, previous }
    }
}

impl Drop for VoiceSetter<'_> {
    fn drop(&mut self) {
        self.handler.set_voice_index(self.previous);
    }
}

/// One value per voice.
///
/// Before [`prepare`](Self::prepare) (and in monophonic networks) there is a
/// single slot. Storage is allocated in `prepare`, never while processing.
#[derive(Debug, Clone)]
pub struct PolyData<T> {
    voices: Vec<T>,
    initial: T,
    handler: Option<Arc<PolyHandler>>,
}

impl<T: Clone> PolyData<T> {
    /// A single slot holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            voices: vec![initial.clone()],
            initial,
            handler: None,
        }
    }

    /// Allocates one slot per voice of the handler in `specs`.
    ///
    /// Existing slots keep their values.
    pub fn prepare(&mut self, specs: &PrepareSpecs) {
        self.handler = specs.voice_index.clone();
        let n = self.handler.as_ref().map_or(1, |h| h.num_voices());
        self.voices.resize(n, self.initial.clone());
    }

    /// Number of slots.
    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    /// Whether there is only one slot.
    pub fn is_monophonic(&self) -> bool {
        self.voices.len() == 1
    }

    fn current_slot(&self) -> usize {
        self.handler
            .as_ref()
            .and_then(|h| h.current_voice())
            .filter(|&v| v < self.voices.len())
            .unwrap_or(0)
    }

    /// Slot of the current voice, or the first slot outside a voice context.
    pub fn get(&self) -> &T {
        &self.voices[self.current_slot()]
    }

    /// Mutable slot of the current voice, or the first slot outside a voice
    /// context.
    pub fn get_mut(&mut self) -> &mut T {
        let slot = self.current_slot();
        &mut self.voices[slot]
    }

    /// The slots affected by a change right now: the current voice, or every
    /// voice outside a voice context.
    pub fn voices_mut(&mut self) -> &mut [T] {
        match self.handler.as_ref().and_then(|h| h.current_voice()) {
            Some(v) if v < self.voices.len() => &mut self.voices[v..=v],
            _ => &mut self.voices,
        }
    }

    /// Every slot, regardless of the voice context.
    pub fn all(&self) -> &[T] {
        &self.voices
    }

    /// Every slot, mutably, regardless of the voice context.
    pub fn all_mut(&mut self) -> &mut [T] {
        &mut self.voices
    }
}

impl<T: Clone + Default> Default for PolyData<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    channel: u8,
    number: u8,
    event_id: u16,
    order: u64,
}

impl ActiveNote {
    fn stopped_by(&self, event: &HiseEvent) -> bool {
        if self.event_id != 0 && event.event_id != 0 {
            return self.event_id == event.event_id;
        }
        self.channel == event.channel && self.number == event.number
    }
}

/// Maps notes to voice slots.
///
/// A note-on takes the first free slot, or steals the oldest voice when all
/// are busy. A note-off frees the oldest voice it matches: the same event id
/// when both events carry one, the same channel and note number otherwise.
/// Slots are allocated up front; `start` and `stop` don't allocate.
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    slots: Vec<Option<ActiveNote>>,
    started: u64,
}

impl VoiceAllocator {
    /// An allocator with `num_voices` free slots.
    pub fn new(num_voices: usize) -> Self {
        Self {
            slots: vec![None; num_voices.max(1)],
            started: 0,
        }
    }

    /// Number of slots.
    pub fn num_voices(&self) -> usize {
        self.slots.len()
    }

    /// Changes the number of slots. Voices beyond the new count are dropped.
    pub fn resize(&mut self, num_voices: usize) {
        self.slots.resize(num_voices.max(1), None);
    }

    /// Assigns a voice to the note-on `event`.
    pub fn start(&mut self, event: &HiseEvent) -> usize {
        let order = self.started;
        self.started = self.started.wrapping_add(1);
        let voice = self.slots.iter().position(Option::is_none).unwrap_or_else(|| {
            self.slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.map_or(0, |n| n.order))
                .map_or(0, |(i, _)| i)
        });
        self.slots[voice] = Some(ActiveNote {
            channel: event.channel,
            number: event.number,
            event_id: event.event_id,
            order,
        });
        voice
    }

    /// Voice the note-off `event` ends, without freeing it.
    pub fn voice_of(&self, event: &HiseEvent) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.filter(|n| n.stopped_by(event)).map(|n| (i, n.order)))
            .min_by_key(|(_, order)| *order)
            .map(|(i, _)| i)
    }

    /// Frees the voice the note-off `event` ends.
    pub fn stop(&mut self, event: &HiseEvent) -> Option<usize> {
        let voice = self.voice_of(event)?;
        self.slots[voice] = None;
        Some(voice)
    }

    /// Slots with a sounding note, in slot order.
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().enumerate().filter(|(_, s)| s.is_some()).map(|(i, _)| i)
    }

    /// Frees every voice.
    pub fn clear(&mut self) {
        self.slots.fill(None);
    }
}

impl Default for VoiceAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(num_voices: usize) -> (Arc<PolyHandler>, PolyData<f32>) {
        let handler = Arc::new(PolyHandler::new(num_voices));
        let mut data = PolyData::new(0.0);
        data.prepare(&PrepareSpecs::new(44100.0, 64, 1).with_poly_handler(Arc::clone(&handler)));
        (handler, data)
    }

    #[test]
    fn unprepared_data_has_one_slot() {
        let data = PolyData::new(3.0f32);
        assert!(data.is_monophonic());
        assert_eq!(*data.get(), 3.0);
    }

    #[test]
    fn voice_setter_selects_slot() {
        let (handler, mut data) = prepared(4);
        assert_eq!(data.num_voices(), 4);

        {
            let _v = VoiceSetter::new(&handler, 2);
            *data.get_mut() = 1.0;
            assert_eq!(data.voices_mut().len(), 1);
        }

        assert_eq!(handler.voice_index(), -1);
        assert_eq!(data.all(), &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn all_voices_context_changes_every_slot() {
        let (_handler, mut data) = prepared(3);
        for v in data.voices_mut() {
            *v = 0.5;
        }
        assert!(data.all().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn nested_setters_restore_previous_voice() {
        let handler = PolyHandler::new(8);
        let _outer = VoiceSetter::new(&handler, 1);
        {
            let _inner = VoiceSetter::all(&handler);
            assert_eq!(handler.current_voice(), None);
        }
        assert_eq!(handler.current_voice(), Some(1));
    }

    #[test]
    fn out_of_range_voice_falls_back_to_first_slot() {
        let (handler, data) = prepared(2);
        let _v = VoiceSetter::new(&handler, 5);
        assert_eq!(handler.current_voice(), None);
        assert_eq!(*data.get(), 0.0);
    }

    #[test]
    fn allocator_fills_free_slots_then_steals_oldest() {
        let mut voices = VoiceAllocator::new(2);
        assert_eq!(voices.start(&HiseEvent::note_on(1, 60, 100)), 0);
        assert_eq!(voices.start(&HiseEvent::note_on(1, 64, 100)), 1);
        assert_eq!(voices.active().collect::<Vec<_>>(), vec![0, 1]);

        assert_eq!(voices.stop(&HiseEvent::note_off(1, 60)), Some(0));
        assert_eq!(voices.start(&HiseEvent::note_on(1, 67, 100)), 0);
        // 64 is now the oldest
        assert_eq!(voices.start(&HiseEvent::note_on(1, 72, 100)), 1);
        assert_eq!(voices.stop(&HiseEvent::note_off(1, 64)), None);
    }

    #[test]
    fn allocator_matches_event_ids_before_notes() {
        let mut voices = VoiceAllocator::new(4);
        voices.start(&HiseEvent::note_on(1, 60, 100).with_event_id(7));
        voices.start(&HiseEvent::note_on(1, 60, 100).with_event_id(8));

        assert_eq!(voices.stop(&HiseEvent::note_off(1, 60).with_event_id(8)), Some(1));
        assert_eq!(voices.stop(&HiseEvent::note_off(1, 60)), Some(0));
        assert_eq!(voices.active().count(), 0);

        voices.start(&HiseEvent::note_on(2, 50, 100));
        voices.clear();
        assert_eq!(voices.voice_of(&HiseEvent::note_off(2, 50)), None);
    }
}
