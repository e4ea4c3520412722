//! Audio buffers handed to `process` callbacks.
//!
//! Samples are stored channel after channel. A [`ProcessData`] borrows such a
//! block; sub-views for a range of channels or samples reuse the same memory,
//! so containers can split a block without copying.

/// Maximum number of channels of a frame.
pub const MAX_CHANNELS: usize = 16;

/// A mutable view on a multi-channel block.
///
/// Channel `i` starts at `i * stride`; a view on a sample range keeps the
/// stride of its parent.
#[derive(Debug)]
pub struct ProcessData<'a> {
    data: &'a mut [f32],
    num_channels: usize,
    num_samples: usize,
    stride: usize,
}

impl<'a> ProcessData<'a> {
    /// A view on `data` split into `num_channels` equally long channels.
    pub fn new(data: &'a mut [f32], num_channels: usize) -> Self {
        let num_samples = data.len().checked_div(num_channels).unwrap_or(0);
        debug_assert_eq!(num_samples * num_channels, data.len(), "ragged channel data");
        Self {
            data,
            num_channels,
            num_samples,
            stride: num_samples,
        }
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of samples per channel.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn range(&self, channel: usize) -> std::ops::Range<usize> {
        let start = channel * self.stride;
        start..start + self.num_samples
    }

    /// Samples of one channel. Empty if out of range.
    pub fn channel(&self, channel: usize) -> &[f32] {
        if channel >= self.num_channels {
            return &[];
        }
        &self.data[self.range(channel)]
    }

    /// Mutable samples of one channel. Empty if out of range.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        if channel >= self.num_channels {
            return &mut [];
        }
        let range = self.range(channel);
        &mut self.data[range]
    }

    /// Iterates over all channels.
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let n = self.num_samples;
        self.data
            .chunks_mut(self.stride.max(1))
            .take(self.num_channels)
            .map(move |c| &mut c[..n])
    }

    /// Reborrows the view with a shorter lifetime.
    pub fn reborrow(&mut self) -> ProcessData<'_> {
        ProcessData {
            data: &mut *self.data,
            num_channels: self.num_channels,
            num_samples: self.num_samples,
            stride: self.stride,
        }
    }

    /// View on `count` channels starting at `start`, clamped to the
    /// available channels.
    pub fn sub_channels(&mut self, start: usize, count: usize) -> ProcessData<'_> {
        let start = start.min(self.num_channels);
        let count = count.min(self.num_channels - start);
        let begin = (start * self.stride).min(self.data.len());
        let end = if count == 0 {
            begin
        } else {
            (start + count - 1) * self.stride + self.num_samples
        };

        ProcessData {
            data: &mut self.data[begin..end],
            num_channels: count,
            num_samples: if count == 0 { 0 } else { self.num_samples },
            stride: self.stride,
        }
    }

    /// View on `len` samples of every channel starting at `offset`, clamped
    /// to the block.
    pub fn sub_block(&mut self, offset: usize, len: usize) -> ProcessData<'_> {
        let offset = offset.min(self.num_samples);
        let len = len.min(self.num_samples - offset);
        let end = if self.num_channels == 0 || len == 0 {
            offset
        } else {
            (self.num_channels - 1) * self.stride + offset + len
        };

        ProcessData {
            data: &mut self.data[offset..end],
            num_channels: if len == 0 { 0 } else { self.num_channels },
            num_samples: len,
            stride: self.stride,
        }
    }

    /// Calls `f` for every frame (one sample of each channel).
    ///
    /// Channels beyond [`MAX_CHANNELS`] are not visited.
    pub fn for_each_frame(&mut self, mut f: impl FnMut(&mut [f32])) {
        let channels = self.num_channels.min(MAX_CHANNELS);
        let mut frame = [0.0f32; MAX_CHANNELS];

        for i in 0..self.num_samples {
            for c in 0..channels {
                frame[c] = self.data[c * self.stride + i];
            }
            f(&mut frame[..channels]);
            for c in 0..channels {
                self.data[c * self.stride + i] = frame[c];
            }
        }
    }

    /// Sets every sample to zero.
    pub fn clear(&mut self) {
        for c in self.channels_mut() {
            c.fill(0.0);
        }
    }

    /// Copies the overlapping region of `source` into this view.
    pub fn copy_from(&mut self, source: &ProcessData<'_>) {
        for c in 0..self.num_channels.min(source.num_channels) {
            let src = source.channel(c);
            let dst = self.channel_mut(c);
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }

    /// Adds the overlapping region of `source` to this view.
    pub fn add_from(&mut self, source: &ProcessData<'_>) {
        for c in 0..self.num_channels.min(source.num_channels) {
            let src = source.channel(c);
            for (d, s) in self.channel_mut(c).iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        (0..self.num_channels)
            .flat_map(|c| self.channel(c).iter())
            .fold(0.0f32, |p, s| p.max(s.abs()))
    }
}

/// An owned multi-channel block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    num_channels: usize,
    num_samples: usize,
}

impl AudioBuffer {
    /// A silent buffer.
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * num_samples],
            num_channels,
            num_samples,
        }
    }

    /// A buffer from per-channel vectors. Shorter channels are zero-padded.
    pub fn from_channels(channels: &[Vec<f32>]) -> Self {
        let num_samples = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), num_samples);
        for (i, c) in channels.iter().enumerate() {
            buffer.channel_mut(i)[..c.len()].copy_from_slice(c);
        }
        buffer
    }

    /// A buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Self {
        let num_channels = num_channels.max(1);
        let num_samples = samples.len() / num_channels;
        let mut buffer = Self::new(num_channels, num_samples);
        for (i, frame) in samples.chunks_exact(num_channels).enumerate() {
            for (c, s) in frame.iter().enumerate() {
                buffer.data[c * num_samples + i] = *s;
            }
        }
        buffer
    }

    /// Interleaved copy of the samples.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        for i in 0..self.num_samples {
            for c in 0..self.num_channels {
                out.push(self.data[c * self.num_samples + i]);
            }
        }
        out
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of samples per channel.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Samples of one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.num_samples;
        self.data.get(start..start + self.num_samples).unwrap_or(&[])
    }

    /// Mutable samples of one channel.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.num_samples;
        self.data
            .get_mut(start..start + self.num_samples)
            .unwrap_or(&mut [])
    }

    /// Resizes and clears the buffer. Allocates if it grows.
    pub fn set_size(&mut self, num_channels: usize, num_samples: usize) {
        self.num_channels = num_channels;
        self.num_samples = num_samples;
        self.data.clear();
        self.data.resize(num_channels * num_samples, 0.0);
    }

    /// Sets every sample to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// A view on the whole buffer.
    pub fn as_process_data(&mut self) -> ProcessData<'_> {
        ProcessData::new(&mut self.data, self.num_channels)
    }

    /// A view on the first `num_samples` samples of every channel.
    pub fn process_data(&mut self, num_samples: usize) -> ProcessData<'_> {
        let mut data = ProcessData::new(&mut self.data, self.num_channels);
        data.num_samples = num_samples.min(data.num_samples);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer() -> AudioBuffer {
        AudioBuffer::from_channels(&[vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]])
    }

    #[test]
    fn channels_are_contiguous() {
        let mut b = ramp_buffer();
        let d = b.as_process_data();
        assert_eq!(d.num_channels(), 2);
        assert_eq!(d.num_samples(), 4);
        assert_eq!(d.channel(1), &[5.0, 6.0, 7.0, 8.0]);
        assert!(d.channel(2).is_empty());
    }

    #[test]
    fn sub_block_keeps_stride() {
        let mut b = ramp_buffer();
        let mut d = b.as_process_data();
        let mut block = d.sub_block(1, 2);
        assert_eq!(block.channel(0), &[2.0, 3.0]);
        assert_eq!(block.channel(1), &[6.0, 7.0]);

        block.channel_mut(1)[0] = 0.0;
        assert_eq!(b.channel(1), &[5.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn sub_channels_view() {
        let mut b = ramp_buffer();
        let mut d = b.as_process_data();
        let right = d.sub_channels(1, 4);
        assert_eq!(right.num_channels(), 1);
        assert_eq!(right.channel(0), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn sub_channels_of_sub_block() {
        let mut b = ramp_buffer();
        let mut d = b.as_process_data();
        let mut block = d.sub_block(2, 2);
        let right = block.sub_channels(1, 1);
        assert_eq!(right.channel(0), &[7.0, 8.0]);
    }

    #[test]
    fn frames_visit_every_sample() {
        let mut b = ramp_buffer();
        let mut d = b.as_process_data();
        d.for_each_frame(|frame| {
            let sum: f32 = frame.iter().sum();
            frame[0] = sum;
        });
        assert_eq!(b.channel(0), &[6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn interleaved_round_trip() {
        let b = ramp_buffer();
        let interleaved = b.to_interleaved();
        assert_eq!(&interleaved[..4], &[1.0, 5.0, 2.0, 6.0]);
        assert_eq!(AudioBuffer::from_interleaved(&interleaved, 2), b);
    }

    #[test]
    fn add_and_peak() {
        let mut a = AudioBuffer::new(2, 4);
        let mut b = ramp_buffer();
        let src = b.as_process_data();
        let mut dst = a.as_process_data();
        dst.add_from(&src);
        dst.add_from(&src);
        assert_eq!(dst.peak(), 16.0);
        dst.clear();
        assert_eq!(dst.peak(), 0.0);
    }
}
