//! Property tests for linearization and batch rebinding.

use layergraph::ops::gemm::Dense;
use layergraph::ops::map::BinaryOperation;
use layergraph::ops::nn::Activation;
use layergraph::{DataType, Graph, NodeId, TensorId};
use proptest::prelude::*;
use proptest::sample::Index;

#[derive(Debug, Clone)]
enum Step {
    Unary(Index),
    Dense(Index),
    Binary(Index, Index),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<Index>().prop_map(Step::Unary),
        any::<Index>().prop_map(Step::Dense),
        (any::<Index>(), any::<Index>()).prop_map(|(a, b)| Step::Binary(a, b)),
    ]
}

// Random DAG over [4, 8] tensors; every tensor descends from one of the inputs.
fn build(num_inputs: usize, steps: &[Step]) -> (Graph, Vec<NodeId>) {
    let mut g = Graph::new();
    let mut pool: Vec<TensorId> = (0..num_inputs)
        .map(|_| g.input([4, 8], DataType::Float).unwrap())
        .collect();
    let seeds = pool.iter().map(|t| g.tensor(*t).producer()).collect();

    for step in steps {
        let y = match step {
            Step::Unary(i) => g.apply(Activation::Relu, &[*i.get(&pool)]),
            Step::Dense(i) => g.apply(Dense::new(8), &[*i.get(&pool)]),
            Step::Binary(a, b) => {
                let (a, b) = (*a.get(&pool), *b.get(&pool));
                if a == b {
                    g.apply(Activation::Tanh, &[a])
                } else {
                    g.apply(BinaryOperation::Add, &[a, b])
                }
            }
        };
        pool.extend(y.unwrap());
    }
    (g, seeds)
}

proptest! {
    #[test]
    fn test_linearize_is_topological(
        num_inputs in 1usize..4,
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let (mut g, seeds) = build(num_inputs, &steps);
        let order = g.linearize(&seeds).unwrap();

        prop_assert_eq!(order.len(), steps.len());

        for (i, id) in order.iter().enumerate() {
            let node = g.node(*id);
            prop_assert_eq!(node.seq_id(), Some(i));

            for p in node.prev() {
                let prev = g.node(*p);
                if !prev.is_input() {
                    prop_assert!(prev.seq_id().unwrap() < i);
                }
            }
        }
    }

    #[test]
    fn test_relinearize_is_deterministic(
        num_inputs in 1usize..4,
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let (mut g, seeds) = build(num_inputs, &steps);
        let first = g.linearize(&seeds).unwrap();
        let second = g.linearize(&seeds).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_rebind_touches_only_batch(
        extents in prop::collection::vec(1usize..16, 1..4),
        from in 1usize..128,
        to in 1usize..128
    ) {
        let mut shape = vec![from];
        shape.extend(extents.iter().copied());

        let mut g = Graph::new();
        let x = g.input(&shape, DataType::Float).unwrap();
        let y = g.apply(Activation::Sigmoid, &[x]).unwrap();

        g.set_batch_size(to).unwrap();

        let node = g.node(g.tensor(y[0]).producer());
        prop_assert_eq!(node.input_shape().unwrap()[0], to);
        prop_assert_eq!(&node.input_shape().unwrap()[1..], extents.as_slice());
        prop_assert_eq!(&node.output_shape().unwrap()[1..], extents.as_slice());
        prop_assert_eq!(&g.tensor(x).shape()[1..], extents.as_slice());
    }
}
