//! Property-based tests for containers and nodes.
//!
//! Verifies routing invariants that must hold for any signal: chains of
//! neutral nodes are transparent, split sums its branches, multi leaves no
//! channel unprocessed and oversampling keeps the output finite.

use proptest::prelude::*;
use scriptnode_nodes::{ContainerKind, MathNode, MathOp, NodeBase, PrepareContext};
use snex_core::{AudioBuffer, ExceptionHandler, PrepareSpecs};

fn math(id: &str, op: MathOp, value: f64) -> NodeBase {
    let mut node = NodeBase::leaf(id, format!("math.{op}"), Box::new(MathNode::new(op, false)));
    node.set_parameter(0, value);
    node
}

fn run(root: &mut NodeBase, input: &[f32], channels: usize) -> (ExceptionHandler, AudioBuffer) {
    let mut handler = ExceptionHandler::new();
    root.prepare(
        &PrepareSpecs::new(44100.0, input.len(), channels),
        &mut PrepareContext::new(&mut handler),
    );
    let data: Vec<Vec<f32>> = (0..channels).map(|_| input.to_vec()).collect();
    let mut buffer = AudioBuffer::from_channels(&data);
    root.process(&mut buffer.as_process_data());
    (handler, buffer)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A chain of `add 0` and `mul 1` leaves the signal unchanged.
    #[test]
    fn neutral_chain_is_transparent(
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..64),
        depth in 1usize..6,
    ) {
        let children = (0..depth)
            .map(|i| {
                if i % 2 == 0 {
                    math(&format!("add{i}"), MathOp::Add, 0.0)
                } else {
                    math(&format!("mul{i}"), MathOp::Mul, 1.0)
                }
            })
            .collect();
        let mut root = NodeBase::container("root", ContainerKind::Chain, children);
        let (handler, buffer) = run(&mut root, &input, 2);

        prop_assert!(handler.is_ok());
        prop_assert_eq!(buffer.channel(0), input.as_slice());
        prop_assert_eq!(buffer.channel(1), input.as_slice());
    }

    /// Split of N unity branches multiplies the signal by N.
    #[test]
    fn split_sums_branches(
        input in prop::collection::vec(-1.0f32..=1.0f32, 1..64),
        branches in 1usize..5,
    ) {
        let children = (0..branches)
            .map(|i| math(&format!("b{i}"), MathOp::Mul, 1.0))
            .collect();
        let mut root = NodeBase::container("split", ContainerKind::Split, children);
        let (_, buffer) = run(&mut root, &input, 1);

        for (out, x) in buffer.channel(0).iter().zip(&input) {
            prop_assert!((out - x * branches as f32).abs() < 1e-5);
        }
    }

    /// Every channel of a multi container is handed to exactly one child.
    #[test]
    fn multi_covers_every_channel(
        channels in 1usize..8,
        children in 1usize..8,
    ) {
        let nodes = (0..children)
            .map(|i| math(&format!("c{i}"), MathOp::Add, 1.0))
            .collect();
        let mut root = NodeBase::container("multi", ContainerKind::Multi, nodes);
        let (handler, buffer) = run(&mut root, &[0.0; 4], channels);

        if children > channels {
            prop_assert!(handler.error("multi").is_some());
            for c in 0..channels {
                prop_assert!(buffer.channel(c).iter().all(|s| *s == 0.0));
            }
        } else {
            prop_assert!(handler.is_ok());
            for c in 0..channels {
                prop_assert!(buffer.channel(c).iter().all(|s| *s == 1.0));
            }
        }
    }

    /// Oversampled processing of a bounded signal stays finite and bounded.
    #[test]
    fn oversampling_output_is_bounded(
        input in prop::collection::vec(-1.0f32..=1.0f32, 8..64),
        factor in prop::sample::select(vec![2usize, 4]),
    ) {
        let mut root = NodeBase::container(
            "os",
            ContainerKind::Oversample(factor),
            vec![math("abs", MathOp::Abs, 0.0)],
        );
        let (handler, buffer) = run(&mut root, &input, 1);

        prop_assert!(handler.is_ok());
        for s in buffer.channel(0) {
            prop_assert!(s.is_finite());
            prop_assert!(s.abs() <= 2.0);
        }
    }
}
