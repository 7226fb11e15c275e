use crate::error::GraphError;
use crate::graph::{Graph, NodeId};
use itertools::Itertools;
use tracing::debug;

impl Graph {
    /// Orders every node reachable from `inputs` so that each node comes after
    /// all of its predecessors. Input nodes are not part of the result.
    ///
    /// The traversal is a depth-first walk over an explicit stack. A node is
    /// pushed when the last of its predecessors is popped; successors are
    /// scanned in reverse connection order so that the first-connected branch
    /// is emitted first. Sequence ids are rewritten on every call.
    pub fn linearize(&mut self, inputs: &[NodeId]) -> Result<Vec<NodeId>, GraphError> {
        if let Some(id) = inputs.iter().find(|id| id.0 >= self.nodes.len()) {
            return Err(GraphError::UnknownNode(id.0));
        }

        self.reset_traversal();
        for node in self.nodes.iter_mut() {
            node.seq_id = None;
        }

        // a repeated seed is walked once
        let mut stack = inputs.iter().copied().unique().collect_vec();
        stack.reverse();
        for id in stack.iter() {
            self.nodes[id.0].visited = true;
        }

        let mut order = Vec::new();

        while let Some(id) = stack.pop() {
            if !self.nodes[id.0].is_input() {
                self.nodes[id.0].seq_id = Some(order.len());
                order.push(id);
            }

            for k in (0..self.nodes[id.0].next.len()).rev() {
                let child_id = self.nodes[id.0].next[k];
                let child = &mut self.nodes[child_id.0];

                if child.visited_prev + 1 == child.prev.len() {
                    if !child.visited {
                        child.visited = true;
                        stack.push(child_id);
                    }
                } else {
                    child.visited_prev += 1;
                }
            }
        }

        let stranded = self
            .nodes
            .iter()
            .find(|n| n.visited_prev > 0 && !n.visited)
            .map(|n| n.name.clone());

        self.reset_traversal();

        if let Some(name) = stranded {
            for node in self.nodes.iter_mut() {
                node.seq_id = None;
            }
            return Err(GraphError::Unreachable(name));
        }

        debug!(
            "linearized {} nodes: {}",
            order.len(),
            order.iter().map(|id| self.nodes[id.0].name.as_str()).join(", ")
        );

        Ok(order)
    }

    fn reset_traversal(&mut self) {
        for node in self.nodes.iter_mut() {
            node.visited_prev = 0;
            node.visited = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::graph::Graph;
    use crate::ops::core::Concat;
    use crate::ops::gemm::Dense;
    use crate::ops::map::BinaryOperation;
    use crate::ops::nn::Activation;
    use crate::tensor::DataType;

    fn names(g: &Graph, order: &[crate::graph::NodeId]) -> Vec<String> {
        order.iter().map(|id| g.node(*id).name().to_string()).collect()
    }

    #[test]
    fn test_chain() {
        let mut g = Graph::new();
        let x = g.input([8, 16], DataType::Float).unwrap();
        let h = g.apply_named(Dense::new(32), "fc1", &[x]).unwrap();
        let h = g.apply_named(Activation::Relu, "relu", &h).unwrap();
        g.apply_named(Dense::new(4), "fc2", &h).unwrap();

        let input = g.tensor(x).producer();
        let order = g.linearize(&[input]).unwrap();

        assert_eq!(names(&g, &order), vec!["fc1", "relu", "fc2"]);
        for (i, id) in order.iter().enumerate() {
            assert_eq!(g.node(*id).seq_id(), Some(i));
        }
        assert_eq!(g.node(input).seq_id(), None);
    }

    #[test]
    fn test_branches_follow_connection_order() {
        let mut g = Graph::new();
        let x = g.input([8, 16], DataType::Float).unwrap();
        let a = g.apply_named(Dense::new(8), "a", &[x]).unwrap();
        let b = g.apply_named(Dense::new(8), "b", &[x]).unwrap();
        let a2 = g.apply_named(Activation::Tanh, "a2", &a).unwrap();
        g.apply_named(Concat::new(1), "cat", &[a2[0], b[0]]).unwrap();

        let input = g.tensor(x).producer();
        let order = g.linearize(&[input]).unwrap();

        // depth first along the first branch, merge waits for its last producer
        assert_eq!(names(&g, &order), vec!["a", "a2", "b", "cat"]);
    }

    #[test]
    fn test_two_inputs() {
        let mut g = Graph::new();
        let x = g.input_named([8, 16], DataType::Float, "x").unwrap();
        let y = g.input_named([8, 16], DataType::Float, "y").unwrap();
        let s = g.apply_named(BinaryOperation::Add, "sum", &[x, y]).unwrap();
        g.apply_named(Activation::Sigmoid, "out", &s).unwrap();

        let seeds = [g.tensor(x).producer(), g.tensor(y).producer()];
        let order = g.linearize(&seeds).unwrap();
        assert_eq!(names(&g, &order), vec!["sum", "out"]);
    }

    #[test]
    fn test_relinearize_is_stable() {
        let mut g = Graph::new();
        let x = g.input([8, 16], DataType::Float).unwrap();
        let a = g.apply(Dense::new(8), &[x]).unwrap();
        let b = g.apply(Dense::new(8), &[x]).unwrap();
        g.apply(BinaryOperation::Mul, &[a[0], b[0]]).unwrap();

        let input = g.tensor(x).producer();
        let first = g.linearize(&[input]).unwrap();
        let second = g.linearize(&[input]).unwrap();
        assert_eq!(first, second);

        // growing the graph keeps the prefix
        let last = g.node(first[2]).outputs().to_vec();
        assert_eq!(g.tensor(last[0]).shape(), &[8, 8]);
        g.apply(Activation::Relu, &last).unwrap();
        let third = g.linearize(&[input]).unwrap();
        assert_eq!(&third[..first.len()], first.as_slice());
        assert_eq!(third.len(), first.len() + 1);
    }

    #[test]
    fn test_unreachable() {
        let mut g = Graph::new();
        let x = g.input([8, 16], DataType::Float).unwrap();
        let y = g.input([8, 16], DataType::Float).unwrap();
        g.apply_named(BinaryOperation::Sub, "diff", &[x, y]).unwrap();

        // only one of the two producers is seeded
        let err = g.linearize(&[g.tensor(x).producer()]).expect_err("");
        assert_eq!(err, GraphError::Unreachable("diff".to_string()));

        // bookkeeping is clean afterwards
        let seeds = [g.tensor(x).producer(), g.tensor(y).producer()];
        assert_eq!(g.linearize(&seeds).unwrap().len(), 1);
    }

    #[test]
    fn test_unconnected_nodes_are_skipped() {
        let mut g = Graph::new();
        let x = g.input([8, 16], DataType::Float).unwrap();
        g.add_node(Dense::new(4), Some("dangling")).unwrap();
        g.apply(Dense::new(4), &[x]).unwrap();

        let order = g.linearize(&[g.tensor(x).producer()]).unwrap();
        assert_eq!(order.len(), 1);
    }
}
