//! Peak meter.

use snex_core::{
    DataType, DisplayBufferWriter, ExternalData, NodeError, NodeObject, PrepareSpecs, ProcessData,
};

/// Publishes the absolute peak of every callback as modulation value.
///
/// Audio is left untouched. With a display buffer bound, each peak is also
/// appended to it.
#[derive(Debug, Default)]
pub struct PeakNode {
    peak: f32,
    changed: bool,
    writer: Option<DisplayBufferWriter>,
}

impl PeakNode {
    /// A meter without display.
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak of the last callback.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    fn publish(&mut self, peak: f32) {
        self.peak = peak;
        self.changed = true;
        if let Some(w) = &self.writer {
            w.write(&[peak]);
        }
    }
}

impl NodeObject for PeakNode {
    fn prepare(&mut self, _specs: &PrepareSpecs) -> Result<(), NodeError> {
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        let peak = data.peak();
        self.publish(peak);
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let peak = frame.iter().fold(0.0f32, |p, s| p.max(s.abs()));
        self.publish(peak);
    }

    fn reset(&mut self) {
        self.peak = 0.0;
        self.changed = false;
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        if index != 0 {
            return Ok(());
        }
        let Some(buffer) = data.as_display_buffer() else {
            self.writer = None;
            return Ok(());
        };
        if self
            .writer
            .as_ref()
            .is_some_and(|w| std::sync::Arc::ptr_eq(w.buffer(), buffer))
        {
            return Ok(());
        }
        self.writer = None;
        self.writer = Some(buffer.claim_writer()?);
        Ok(())
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        usize::from(data_type == DataType::DisplayBuffer)
    }

    fn handle_modulation(&mut self) -> Option<f64> {
        if std::mem::take(&mut self.changed) {
            Some(f64::from(self.peak))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use snex_core::{AudioBuffer, ErrorCode};

    use super::*;

    #[test]
    fn reports_block_peak() {
        let mut node = PeakNode::new();
        let mut buffer = AudioBuffer::from_channels(&[vec![0.1, -0.7], vec![0.3, 0.2]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(node.handle_modulation(), Some(f64::from(0.7f32)));
        assert_eq!(buffer.channel(0), &[0.1, -0.7]);
    }

    #[test]
    fn writes_into_display_buffer() {
        let data = ExternalData::create(DataType::DisplayBuffer);
        let mut node = PeakNode::new();
        node.set_external_data(&data, 0).unwrap();
        node.process_frame(&mut [0.5, -0.25]);

        let buffer = data.as_display_buffer().unwrap();
        assert_eq!(buffer.last_value(), 0.5);
        assert!(buffer.has_writer());
    }

    #[test]
    fn second_writer_is_rejected() {
        let data = ExternalData::create(DataType::DisplayBuffer);
        let mut a = PeakNode::new();
        let mut b = PeakNode::new();
        a.set_external_data(&data, 0).unwrap();
        assert!(a.set_external_data(&data, 0).is_ok());

        let err = b.set_external_data(&data, 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::RingBufferMultipleWriters);

        drop(a);
        assert!(b.set_external_data(&data, 0).is_ok());
    }
}
