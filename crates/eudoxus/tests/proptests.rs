//! Property tests over randomly generated well-formed images.
//!
//! Generated automata never contain a cycle of non-advancing transitions:
//! a non-advancing edge or default always points to a node with a higher
//! index. Every execution therefore terminates.

use eudoxus::builder::{Edge, ImageBuilder, LowNodeSpec, NodeRef};
use eudoxus::format::Layout;
use eudoxus::{Automaton, Command, ExecutionState, Output, Status};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 64;

#[derive(Debug, Clone)]
struct EdgePlan {
    byte: u8,
    target: usize,
    advance: bool,
}

#[derive(Debug, Clone)]
struct NodePlan {
    outputs: Vec<Vec<u8>>,
    default: Option<(usize, bool)>,
    edges: Vec<EdgePlan>,
}

#[derive(Debug, Clone)]
struct ImagePlan {
    layout: (u8, bool),
    no_advance_no_output: bool,
    nodes: Vec<NodePlan>,
}

/// Keep non-advancing transitions pointing forward; fall back to advancing.
fn forward_only(from: usize, target: usize, advance: bool) -> bool {
    advance || target <= from
}

fn node_plan(node_count: usize) -> impl Strategy<Value = NodePlan> {
    let edge = (
        prop_oneof![any::<u8>(), b'a'..=b'd'],
        0..node_count,
        any::<bool>(),
    )
        .prop_map(|(byte, target, advance)| EdgePlan {
            byte,
            target,
            advance,
        });
    (
        proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..4), 0..3),
        proptest::option::of((0..node_count, any::<bool>())),
        proptest::collection::vec(edge, 0..12),
    )
        .prop_map(|(outputs, default, edges)| NodePlan {
            outputs,
            default,
            edges,
        })
}

fn image_plan() -> impl Strategy<Value = ImagePlan> {
    (1usize..10).prop_flat_map(|node_count| {
        (
            prop_oneof![Just((2u8, false)), Just((4u8, true)), Just((8u8, false))],
            any::<bool>(),
            proptest::collection::vec(node_plan(node_count), node_count),
        )
            .prop_map(|(layout, no_advance_no_output, nodes)| ImagePlan {
                layout,
                no_advance_no_output,
                nodes,
            })
    })
}

fn build(plan: &ImagePlan) -> Automaton {
    let layout = Layout::new(plan.layout.0, plan.layout.1).unwrap();
    let mut b = ImageBuilder::new()
        .with_layout(layout)
        .no_advance_no_output(plan.no_advance_no_output);
    let refs: Vec<NodeRef> = plan.nodes.iter().map(|_| b.reserve_node()).collect();

    for (i, node) in plan.nodes.iter().enumerate() {
        let mut spec = LowNodeSpec::new();
        if let Some(head) = b.add_output_chain(node.outputs.as_slice()) {
            spec = spec.with_output(head);
        }
        if let Some((target, advance)) = node.default {
            spec = spec.with_default(refs[target], forward_only(i, target, advance));
        }
        for e in &node.edges {
            let mut edge = Edge::new(e.byte, refs[e.target]);
            if !forward_only(i, e.target, e.advance) {
                edge = edge.non_advancing();
            }
            spec = spec.with_edge(edge);
        }
        b.define_node(refs[i], spec);
    }
    Automaton::from_bytes(b.build().unwrap().as_bytes()).unwrap()
}

type Trace = (Vec<(Vec<u8>, u64, usize)>, Status);

fn run(a: &Automaton, chunks: &[&[u8]]) -> Trace {
    let mut events = Vec::new();
    let mut state = ExecutionState::new(a, |o: &Output<'_>| {
        events.push((o.payload().to_vec(), o.position(), o.rest().len()));
        Command::Continue
    });
    let mut status = Status::Ok;
    for &chunk in chunks {
        status = state.execute(Some(chunk)).unwrap();
        if status != Status::Ok {
            break;
        }
    }
    drop(state);
    (events, status)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn valid_images_never_error(plan in image_plan(), input in proptest::collection::vec(any::<u8>(), 0..64)) {
        let a = build(&plan);
        let mut state = ExecutionState::new(&a, |o: &Output<'_>| {
            assert!(o.rest().len() <= input.len());
            Command::Continue
        });
        let status = state.execute(Some(input.as_slice()));
        prop_assert!(matches!(status, Ok(Status::Ok) | Ok(Status::End)));
        prop_assert!(state.position() <= input.len() as u64);
    }

    #[test]
    fn execution_is_deterministic(plan in image_plan(), input in proptest::collection::vec(b'a'..=b'e', 0..64)) {
        let a = build(&plan);
        let first = run(&a, &[input.as_slice()]);
        prop_assert_eq!(run(&a, &[input.as_slice()]), first);
    }

    #[test]
    fn chunking_does_not_change_results(
        plan in image_plan(),
        input in proptest::collection::vec(b'a'..=b'e', 0..64),
        split in any::<prop::sample::Index>(),
    ) {
        let a = build(&plan);
        let at = split.index(input.len() + 1);
        let (head, tail) = input.split_at(at);

        let (whole_events, whole_status) = run(&a, &[input.as_slice()]);
        let (split_events, split_status) = run(&a, &[head, tail]);
        prop_assert_eq!(whole_status, split_status);

        // Positions are stream offsets and must agree; the length of the
        // unconsumed chunk remainder legitimately differs.
        let strip = |events: Vec<(Vec<u8>, u64, usize)>| -> Vec<(Vec<u8>, u64)> {
            events.into_iter().map(|(p, pos, _)| (p, pos)).collect()
        };
        prop_assert_eq!(strip(whole_events), strip(split_events));
    }

    #[test]
    fn replay_does_not_move_cursor(plan in image_plan(), input in proptest::collection::vec(b'a'..=b'e', 1..32)) {
        let a = build(&plan);
        let mut events = Vec::new();
        let mut state = ExecutionState::new(&a, |o: &Output<'_>| {
            events.push(o.payload().to_vec());
            Command::Continue
        });
        let status = state.execute(Some(input.as_slice())).unwrap();
        let node = state.node();
        let position = state.position();
        let remaining = state.remaining();
        let replayed = state.execute(None).unwrap();
        prop_assert_eq!(state.node(), node);
        prop_assert_eq!(state.position(), position);
        prop_assert_eq!(state.remaining(), remaining);
        if status == Status::Ok || status == Status::End {
            prop_assert_eq!(replayed, status);
        }
    }
}
