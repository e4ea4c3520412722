//! Data objects shared between nodes and the host.
//!
//! Tables, slider packs, audio files and display buffers live outside the
//! node that uses them. Each object carries its own lock; the audio thread
//! only ever calls `try_read`/`try_write` and skips the work when the control
//! thread holds the lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::exception::{ErrorCode, NodeError};

/// Kind of an external data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    /// A lookup table.
    Table,
    /// An array of sliders.
    SliderPack,
    /// A multi-channel sample buffer.
    AudioFile,
    /// A ring buffer for display purposes.
    DisplayBuffer,
}

impl DataType {
    /// Every data type, in slot order.
    pub const ALL: [DataType; 4] = [
        DataType::Table,
        DataType::SliderPack,
        DataType::AudioFile,
        DataType::DisplayBuffer,
    ];

    /// Position in [`ALL`](Self::ALL).
    pub const fn index(self) -> usize {
        match self {
            DataType::Table => 0,
            DataType::SliderPack => 1,
            DataType::AudioFile => 2,
            DataType::DisplayBuffer => 3,
        }
    }

    /// Name used in descriptions.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Table => "Table",
            DataType::SliderPack => "SliderPack",
            DataType::AudioFile => "AudioFile",
            DataType::DisplayBuffer => "DisplayBuffer",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of points of a new table.
pub const DEFAULT_TABLE_SIZE: usize = 512;

/// A lookup table sampled at equidistant points over 0..1.
#[derive(Debug)]
pub struct Table {
    values: RwLock<Vec<f32>>,
}

impl Table {
    /// An identity ramp with `size` points.
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f32;
        Self::from_values((0..size).map(|i| i as f32 * step).collect())
    }

    /// A table with the given points.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Replaces the points.
    pub fn set_values(&self, values: Vec<f32>) {
        *self.values.write() = values;
    }

    /// Copy of the points.
    pub fn values(&self) -> Vec<f32> {
        self.values.read().clone()
    }

    /// Linearly interpolated value at `x` (clamped to 0..1).
    ///
    /// Returns `None` if the table is being written or empty.
    pub fn interpolate(&self, x: f32) -> Option<f32> {
        let values = self.values.try_read()?;
        let last = values.len().checked_sub(1)?;
        let pos = x.clamp(0.0, 1.0) * last as f32;
        let i = (pos as usize).min(last);
        let frac = pos - i as f32;
        let a = values[i];
        let b = values[(i + 1).min(last)];
        Some(a + (b - a) * frac)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

/// Number of sliders of a new slider pack.
pub const DEFAULT_NUM_SLIDERS: usize = 16;

/// An array of values edited as sliders.
#[derive(Debug)]
pub struct SliderPack {
    values: RwLock<Vec<f32>>,
}

impl SliderPack {
    /// `num_sliders` sliders at 1.0.
    pub fn new(num_sliders: usize) -> Self {
        Self {
            values: RwLock::new(vec![1.0; num_sliders]),
        }
    }

    /// Number of sliders.
    pub fn num_sliders(&self) -> usize {
        self.values.read().len()
    }

    /// Sets one slider. Out-of-range indices are ignored.
    pub fn set_value(&self, index: usize, value: f32) {
        if let Some(v) = self.values.write().get_mut(index) {
            *v = value;
        }
    }

    /// Value of one slider, `None` while written or out of range.
    pub fn value(&self, index: usize) -> Option<f32> {
        self.values.try_read()?.get(index).copied()
    }
}

impl Default for SliderPack {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_SLIDERS)
    }
}

/// Sample content loaded from a file.
#[derive(Debug, Default)]
pub struct AudioFile {
    channels: RwLock<Vec<Vec<f32>>>,
    sample_rate: RwLock<f64>,
}

impl AudioFile {
    /// Replaces the content.
    pub fn load(&self, channels: Vec<Vec<f32>>, sample_rate: f64) {
        *self.channels.write() = channels;
        *self.sample_rate.write() = sample_rate;
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.read().len()
    }

    /// Samples per channel.
    pub fn num_samples(&self) -> usize {
        self.channels.read().first().map_or(0, Vec::len)
    }

    /// Sample rate of the content.
    pub fn sample_rate(&self) -> f64 {
        *self.sample_rate.read()
    }

    /// One sample, `None` while written or out of range.
    pub fn sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.channels.try_read()?.get(channel)?.get(index).copied()
    }
}

/// Capacity of a new display buffer.
pub const DEFAULT_DISPLAY_BUFFER_SIZE: usize = 8192;

/// A ring buffer filled by one node and read by a display.
///
/// Only one writer may be attached at a time; see
/// [`claim_writer`](Self::claim_writer).
#[derive(Debug)]
pub struct DisplayBuffer {
    samples: RwLock<Vec<f32>>,
    write_position: AtomicUsize,
    has_writer: AtomicBool,
}

impl DisplayBuffer {
    /// A silent buffer with `size` samples.
    pub fn new(size: usize) -> Self {
        Self {
            samples: RwLock::new(vec![0.0; size.max(1)]),
            write_position: AtomicUsize::new(0),
            has_writer: AtomicBool::new(false),
        }
    }

    /// Attaches the single writer.
    ///
    /// Fails with [`ErrorCode::RingBufferMultipleWriters`] while another
    /// writer is attached. The claim is released when the writer is dropped.
    pub fn claim_writer(self: &Arc<Self>) -> Result<DisplayBufferWriter, NodeError> {
        if self.has_writer.swap(true, Ordering::AcqRel) {
            return Err(NodeError::simple(ErrorCode::RingBufferMultipleWriters));
        }
        Ok(DisplayBufferWriter {
            buffer: Arc::clone(self),
        })
    }

    /// Whether a writer is attached.
    pub fn has_writer(&self) -> bool {
        self.has_writer.load(Ordering::Acquire)
    }

    /// Capacity in samples.
    pub fn size(&self) -> usize {
        self.samples.read().len()
    }

    /// Samples in ring order, oldest first.
    pub fn read(&self) -> Vec<f32> {
        let samples = self.samples.read();
        let pos = self.write_position.load(Ordering::Acquire) % samples.len();
        samples[pos..].iter().chain(&samples[..pos]).copied().collect()
    }

    /// Most recently written sample.
    pub fn last_value(&self) -> f32 {
        let samples = self.samples.read();
        let pos = self.write_position.load(Ordering::Acquire);
        samples[(pos + samples.len() - 1) % samples.len()]
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_BUFFER_SIZE)
    }
}

/// Write access to a [`DisplayBuffer`].
#[derive(Debug)]
pub struct DisplayBufferWriter {
    buffer: Arc<DisplayBuffer>,
}

impl DisplayBufferWriter {
    /// Appends samples. Dropped if a reader holds the lock.
    pub fn write(&self, input: &[f32]) {
        let Some(mut samples) = self.buffer.samples.try_write() else {
            return;
        };

        let len = samples.len();
        let mut pos = self.buffer.write_position.load(Ordering::Relaxed);
        for s in input {
            samples[pos % len] = *s;
            pos = (pos + 1) % len;
        }
        self.buffer.write_position.store(pos, Ordering::Release);
    }

    /// The buffer written to.
    pub fn buffer(&self) -> &Arc<DisplayBuffer> {
        &self.buffer
    }
}

impl Drop for DisplayBufferWriter {
    fn drop(&mut self) {
        self.buffer.has_writer.store(false, Ordering::Release);
    }
}

/// A bound external data object.
#[derive(Debug, Clone, Default)]
pub enum ExternalData {
    /// No data bound.
    #[default]
    Empty,
    /// A table.
    Table(Arc<Table>),
    /// A slider pack.
    SliderPack(Arc<SliderPack>),
    /// An audio file.
    AudioFile(Arc<AudioFile>),
    /// A display buffer.
    DisplayBuffer(Arc<DisplayBuffer>),
}

impl ExternalData {
    /// A new object of the given type with default content.
    pub fn create(data_type: DataType) -> Self {
        match data_type {
            DataType::Table => ExternalData::Table(Arc::default()),
            DataType::SliderPack => ExternalData::SliderPack(Arc::default()),
            DataType::AudioFile => ExternalData::AudioFile(Arc::default()),
            DataType::DisplayBuffer => ExternalData::DisplayBuffer(Arc::default()),
        }
    }

    /// Type of the bound object.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ExternalData::Empty => None,
            ExternalData::Table(_) => Some(DataType::Table),
            ExternalData::SliderPack(_) => Some(DataType::SliderPack),
            ExternalData::AudioFile(_) => Some(DataType::AudioFile),
            ExternalData::DisplayBuffer(_) => Some(DataType::DisplayBuffer),
        }
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        matches!(self, ExternalData::Empty)
    }

    /// The table, if this is one.
    pub fn as_table(&self) -> Option<&Arc<Table>> {
        match self {
            ExternalData::Table(t) => Some(t),
            _ => None,
        }
    }

    /// The slider pack, if this is one.
    pub fn as_slider_pack(&self) -> Option<&Arc<SliderPack>> {
        match self {
            ExternalData::SliderPack(s) => Some(s),
            _ => None,
        }
    }

    /// The audio file, if this is one.
    pub fn as_audio_file(&self) -> Option<&Arc<AudioFile>> {
        match self {
            ExternalData::AudioFile(a) => Some(a),
            _ => None,
        }
    }

    /// The display buffer, if this is one.
    pub fn as_display_buffer(&self) -> Option<&Arc<DisplayBuffer>> {
        match self {
            ExternalData::DisplayBuffer(d) => Some(d),
            _ => None,
        }
    }

    /// Whether both refer to the same object.
    pub fn ptr_eq(&self, other: &ExternalData) -> bool {
        match (self, other) {
            (ExternalData::Empty, ExternalData::Empty) => true,
            (ExternalData::Table(a), ExternalData::Table(b)) => Arc::ptr_eq(a, b),
            (ExternalData::SliderPack(a), ExternalData::SliderPack(b)) => Arc::ptr_eq(a, b),
            (ExternalData::AudioFile(a), ExternalData::AudioFile(b)) => Arc::ptr_eq(a, b),
            (ExternalData::DisplayBuffer(a), ExternalData::DisplayBuffer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Source of external data objects, looked up by type and slot index.
pub trait ExternalDataHolder: Send + Sync {
    /// Object in slot `index`, `None` if there is none.
    fn get_data(&self, data_type: DataType, index: usize) -> Option<ExternalData>;

    /// Number of slots of the given type.
    fn num_data_objects(&self, data_type: DataType) -> usize;
}

/// An [`ExternalDataHolder`] that creates objects on first access.
#[derive(Debug, Default)]
pub struct DataHolder {
    slots: RwLock<[Vec<ExternalData>; 4]>,
}

impl DataHolder {
    /// An empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Object in slot `index`, created with default content if missing.
    pub fn get_or_create(&self, data_type: DataType, index: usize) -> ExternalData {
        if let Some(d) = self.slots.read()[data_type.index()].get(index) {
            return d.clone();
        }

        let mut slots = self.slots.write();
        let list = &mut slots[data_type.index()];
        while list.len() <= index {
            list.push(ExternalData::create(data_type));
        }
        list[index].clone()
    }

    /// Replaces the object in slot `index`.
    pub fn set_data(&self, index: usize, data: ExternalData) {
        let Some(data_type) = data.data_type() else {
            return;
        };
        let mut slots = self.slots.write();
        let list = &mut slots[data_type.index()];
        while list.len() <= index {
            list.push(ExternalData::create(data_type));
        }
        list[index] = data;
    }
}

impl ExternalDataHolder for DataHolder {
    fn get_data(&self, data_type: DataType, index: usize) -> Option<ExternalData> {
        Some(self.get_or_create(data_type, index))
    }

    fn num_data_objects(&self, data_type: DataType) -> usize {
        self.slots.read()[data_type.index()].len()
    }
}
