//! Table waveshaper.

use std::sync::Arc;

use snex_core::{DataType, ExternalData, NodeError, NodeObject, PrepareSpecs, ProcessData, Table};

/// Scales every sample by the table value at its magnitude:
/// `s *= table(|s|)`.
///
/// Passes audio through while no table is bound. The last looked-up value
/// is the node's modulation output.
#[derive(Debug, Default)]
pub struct TableNode {
    table: Option<Arc<Table>>,
    last: f32,
    changed: bool,
}

impl TableNode {
    /// A node without table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a table is bound.
    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    #[inline]
    fn shape(table: &Table, s: &mut f32, last: &mut f32) -> bool {
        match table.interpolate(s.abs()) {
            Some(v) => {
                *s *= v;
                *last = v;
                true
            }
            None => false,
        }
    }
}

impl NodeObject for TableNode {
    fn prepare(&mut self, _specs: &PrepareSpecs) -> Result<(), NodeError> {
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        let Some(table) = &self.table else {
            return;
        };
        for ch in data.channels_mut() {
            for s in ch.iter_mut() {
                self.changed |= Self::shape(table, s, &mut self.last);
            }
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let Some(table) = &self.table else {
            return;
        };
        for s in frame.iter_mut() {
            self.changed |= Self::shape(table, s, &mut self.last);
        }
    }

    fn reset(&mut self) {
        self.last = 0.0;
        self.changed = false;
    }

    fn set_external_data(&mut self, data: &ExternalData, index: usize) -> Result<(), NodeError> {
        if index == 0 {
            self.table = data.as_table().cloned();
        }
        Ok(())
    }

    fn data_slots(&self, data_type: DataType) -> usize {
        usize::from(data_type == DataType::Table)
    }

    fn handle_modulation(&mut self) -> Option<f64> {
        if std::mem::take(&mut self.changed) {
            Some(f64::from(self.last))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use snex_core::AudioBuffer;

    use super::*;

    #[test]
    fn passes_through_without_table() {
        let mut node = TableNode::new();
        let mut buffer = AudioBuffer::from_channels(&[vec![0.5, -0.5]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.5, -0.5]);
        assert_eq!(node.handle_modulation(), None);
    }

    #[test]
    fn scales_by_table_at_magnitude() {
        let mut node = TableNode::new();
        let data = ExternalData::Table(Arc::new(Table::from_values(vec![0.0, 1.0, 0.0])));
        node.set_external_data(&data, 0).unwrap();

        let mut buffer = AudioBuffer::from_channels(&[vec![0.5, -0.5, 1.0, 0.25]]);
        node.process(&mut buffer.as_process_data());
        assert_eq!(buffer.channel(0), &[0.5, -0.5, 0.0, 0.125]);
        assert_eq!(node.handle_modulation(), Some(0.5));
        assert_eq!(node.handle_modulation(), None);
    }

    #[test]
    fn other_data_unbinds() {
        let mut node = TableNode::new();
        node.set_external_data(&ExternalData::create(DataType::Table), 0).unwrap();
        assert!(node.has_table());
        node.set_external_data(&ExternalData::Empty, 0).unwrap();
        assert!(!node.has_table());
        assert_eq!(node.data_slots(DataType::Table), 1);
        assert_eq!(node.data_slots(DataType::SliderPack), 0);
    }
}
