//! Processing context passed to `prepare`.

use std::sync::Arc;

use crate::poly::PolyHandler;

/// Sample rate, block size, channel count and voice context of a prepare
/// call.
///
/// Containers derive the specs of their children from their own (an
/// oversampler doubles the sample rate, a frame container sets the block size
/// to 1...).
#[derive(Debug, Clone, Default)]
pub struct PrepareSpecs {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum number of samples per process call.
    pub block_size: usize,
    /// Number of channels.
    pub num_channels: usize,
    /// Voice context, `None` in monophonic networks.
    pub voice_index: Option<Arc<PolyHandler>>,
}

impl PrepareSpecs {
    /// Monophonic specs.
    pub fn new(sample_rate: f64, block_size: usize, num_channels: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            num_channels,
            voice_index: None,
        }
    }

    /// Returns a copy with a voice context.
    pub fn with_poly_handler(mut self, handler: Arc<PolyHandler>) -> Self {
        self.voice_index = Some(handler);
        self
    }

    /// Returns a copy with another sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns a copy with another block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Returns a copy with another channel count.
    pub fn with_num_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = num_channels;
        self
    }

    /// Whether a sample rate and a block size were set.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0.0 && self.block_size > 0
    }

    /// Whether the voice context has more than one voice.
    pub fn is_polyphonic(&self) -> bool {
        self.voice_index.as_ref().is_some_and(|h| h.is_polyphonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_specs_keep_voice_context() {
        let specs = PrepareSpecs::new(44100.0, 512, 2).with_poly_handler(Arc::new(PolyHandler::new(4)));
        let child = specs.clone().with_sample_rate(88200.0).with_block_size(1024);

        assert!(child.is_polyphonic());
        assert_eq!(child.sample_rate, 88200.0);
        assert_eq!(child.num_channels, 2);
    }

    #[test]
    fn default_specs_are_invalid() {
        assert!(!PrepareSpecs::default().is_valid());
        assert!(PrepareSpecs::new(48000.0, 1, 1).is_valid());
    }
}
