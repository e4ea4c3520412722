//! Utility nodes without parameters.

use snex_core::{NodeError, NodeObject, PrepareSpecs, ProcessData};

/// Does nothing. Placeholder for removed or unknown nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNode;

impl NodeObject for EmptyNode {
    fn prepare(&mut self, _specs: &PrepareSpecs) -> Result<(), NodeError> {
        Ok(())
    }

    fn process(&mut self, _data: &mut ProcessData<'_>) {}

    fn process_frame(&mut self, _frame: &mut [f32]) {}

    fn reset(&mut self) {}
}

/// Copies the first channel into the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mono2StereoNode;

impl NodeObject for Mono2StereoNode {
    fn prepare(&mut self, _specs: &PrepareSpecs) -> Result<(), NodeError> {
        Ok(())
    }

    fn process(&mut self, data: &mut ProcessData<'_>) {
        if data.num_channels() < 2 {
            return;
        }
        let n = data.num_samples();
        for i in 0..n {
            let s = data.channel(0)[i];
            data.channel_mut(1)[i] = s;
        }
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        if let [left, right, ..] = frame {
            *right = *left;
        }
    }

    fn reset(&mut self) {}
}
