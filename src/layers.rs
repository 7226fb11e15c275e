use crate::error::{Error, GraphError};
use crate::graph::{Graph, NodeId};
use crate::ops::core::Concat;
use crate::ops::map::BinaryOperation;
use crate::ops::Operator;
use crate::shape::Array;
use crate::tensor::TensorId;
use std::fmt::{Debug, Formatter};

/// A declared layer, bound to a graph node on its first call.
///
/// A layer connects exactly once. Calling it again, even on a different
/// tensor, fails with `GraphError::Reused`.
pub struct Layer {
    op: Operator,
    name: Option<String>,

    // full shape with a leading 0 for the batch
    input_shape: Option<Array>,

    node: Option<NodeId>,
}

impl Layer {
    pub fn new<O>(op: O) -> Self
    where
        O: Into<Operator>,
    {
        Layer {
            op: op.into(),
            name: None,
            input_shape: None,
            node: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Declares the per-sample input shape, without the batch extent.
    pub fn with_input_shape<E>(mut self, shape: E) -> Self
    where
        E: AsRef<[usize]>,
    {
        let shape = shape.as_ref();
        if let Operator::Dense(dense) = &mut self.op {
            dense.in_channels = shape.last().copied();
        }
        self.input_shape = Some(std::iter::once(0).chain(shape.iter().copied()).collect());
        self
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Creates the backing node if the layer has none yet.
    pub fn bind(&mut self, g: &mut Graph) -> Result<NodeId, Error> {
        if let Some(id) = self.node {
            return Ok(id);
        }
        let id = g.add_node(self.op.clone(), self.name.as_deref())?;
        self.node = Some(id);
        Ok(id)
    }

    pub fn call(&mut self, g: &mut Graph, x: TensorId) -> Result<TensorId, Error> {
        self.call_n(g, &[x])
    }

    /// Connects a single-output layer. Layers with several outputs are rejected
    /// before anything is added to the graph.
    pub fn call_n(&mut self, g: &mut Graph, x: &[TensorId]) -> Result<TensorId, Error> {
        let count = self.op.num_outputs();
        if count != 1 {
            let name = match self.node {
                Some(id) => g.node(id).name(),
                None => self.name().unwrap_or_else(|| self.op.kind().default_name()),
            };
            return Err(GraphError::MultipleOutputs {
                name: name.to_string(),
                count,
            }
            .into());
        }

        let y = self.call_multi(g, x)?;
        Ok(y[0])
    }

    pub fn call_multi(&mut self, g: &mut Graph, x: &[TensorId]) -> Result<Vec<TensorId>, Error> {
        let id = self.bind(g)?;
        g.connect(id, x)
    }
}

impl Debug for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or("?"),
            self.op.kind()
        )
    }
}

// **** Functional merges **** //

pub fn concatenate(g: &mut Graph, x: &[TensorId], axis: isize) -> Result<TensorId, Error> {
    Layer::new(Concat::new(axis)).call_n(g, x)
}

pub fn add(g: &mut Graph, x0: TensorId, x1: TensorId) -> Result<TensorId, Error> {
    Layer::new(BinaryOperation::Add).call_n(g, &[x0, x1])
}

pub fn subtract(g: &mut Graph, x0: TensorId, x1: TensorId) -> Result<TensorId, Error> {
    Layer::new(BinaryOperation::Sub).call_n(g, &[x0, x1])
}

pub fn multiply(g: &mut Graph, x0: TensorId, x1: TensorId) -> Result<TensorId, Error> {
    Layer::new(BinaryOperation::Mul).call_n(g, &[x0, x1])
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, GraphError};
    use crate::graph::Graph;
    use crate::layers::{add, concatenate, Layer};
    use crate::ops::conv::{Conv2d, Padding, Pool2d};
    use crate::ops::core::Split;
    use crate::ops::gemm::Dense;
    use crate::ops::nn::Embedding;
    use crate::ops::{OpKind, Operator};
    use crate::shape::ShapeError;
    use crate::tensor::DataType;

    #[test]
    fn test_call() {
        let mut g = Graph::new();
        let x = g.input([32, 3, 32, 32], DataType::Float).unwrap();

        let mut conv = Layer::new(Conv2d::new(16, 3).padding(Padding::Same)).named("conv1");
        let y = conv.call(&mut g, x).unwrap();
        let y = Layer::new(Pool2d::max(2)).call(&mut g, y).unwrap();

        assert_eq!(g.tensor(y).shape(), &[32, 16, 16, 16]);
        assert_eq!(g.node(conv.node().unwrap()).name(), "conv1");
    }

    #[test]
    fn test_reuse() {
        let mut g = Graph::new();
        let x = g.input([32, 784], DataType::Float).unwrap();
        let mut dense = Layer::new(Dense::new(784)).named("fc");

        let y = dense.call(&mut g, x).unwrap();
        assert!(matches!(
            dense.call(&mut g, y),
            Err(Error::Graph(GraphError::Reused(name))) if name == "fc"
        ));
    }

    #[test]
    fn test_retry_after_shape_error() {
        let mut g = Graph::new();
        let bad = g.input([32, 3, 8, 8], DataType::Float).unwrap();
        let good = g.input([32, 64], DataType::Float).unwrap();
        let mut dense = Layer::new(Dense::new(10));

        assert!(matches!(
            dense.call(&mut g, bad),
            Err(Error::Shape {
                source: ShapeError::RankMismatch { .. },
                ..
            })
        ));
        let y = dense.call(&mut g, good).unwrap();
        assert_eq!(g.tensor(y).shape(), &[32, 10]);
    }

    #[test]
    fn test_input_shape_sets_in_channels() {
        let layer = Layer::new(Dense::new(128)).with_input_shape([784]);
        assert_eq!(layer.input_shape(), Some(&[0, 784][..]));
        match layer.op() {
            Operator::Dense(dense) => assert_eq!(dense.in_channels, Some(784)),
            _ => unreachable!(),
        }

        let mut g = Graph::new();
        let x = g.input([8, 100], DataType::Float).unwrap();
        let mut layer = layer;
        assert!(layer.call(&mut g, x).is_err());
    }

    #[test]
    fn test_multi_output() {
        let mut g = Graph::new();
        let x = g.input([8, 12], DataType::Float).unwrap();

        let mut split = Layer::new(Split::even(2, 1)).named("halves");
        assert!(matches!(
            split.call(&mut g, x),
            Err(Error::Graph(GraphError::MultipleOutputs { name, count: 2 })) if name == "halves"
        ));
        assert_eq!(split.node(), None);
        assert_eq!(g.num_nodes(), 1);
        assert_eq!(g.num_tensors(), 1);

        let y = split.call_multi(&mut g, &[x]).unwrap();
        let z = add(&mut g, y[0], y[1]).unwrap();
        assert_eq!(g.tensor(z).shape(), &[8, 6]);
        assert_eq!(g.node(g.tensor(z).producer()).kind(), OpKind::Add);
    }

    #[test]
    fn test_embedding_outputs_float() {
        let mut g = Graph::new();
        let ids = g.input([16, 20], DataType::Int).unwrap();

        let y = Layer::new(Embedding::new(1000, 64, 20))
            .call(&mut g, ids)
            .unwrap();
        let y = Layer::new(Dense::new(8)).call(&mut g, y).unwrap();

        assert_eq!(g.tensor(y).shape(), &[16, 8]);
        assert_eq!(g.tensor(y).data_type(), DataType::Float);

        let emb = g.node(g.node(g.tensor(y).producer()).prev()[0]);
        assert_eq!(emb.kind(), OpKind::Embedding);
        assert_eq!(emb.output_shape(), Some(&[16, 64][..]));
    }

    #[test]
    fn test_concatenate() {
        let mut g = Graph::new();
        let a = g.input([4, 6, 8, 8], DataType::Float).unwrap();
        let b = g.input([4, 10, 8, 8], DataType::Float).unwrap();
        let c = g.input([4, 10, 7, 8], DataType::Float).unwrap();

        let y = concatenate(&mut g, &[a, b], 1).unwrap();
        assert_eq!(g.tensor(y).shape(), &[4, 16, 8, 8]);

        assert!(matches!(
            concatenate(&mut g, &[a, c], 1),
            Err(Error::Shape {
                kind: OpKind::Concat,
                ..
            })
        ));
    }
}
