use crate::config::Config;
use crate::error::{Error, GraphError};
use crate::graph::Graph;
use crate::layers::Layer;
use crate::model::Model;
use crate::tensor::{DataType, TensorId};

/// A linear stack of single-output layers.
#[derive(Default)]
pub struct Sequential {
    graph: Graph,
    inputs: Vec<TensorId>,
    output: Option<TensorId>,
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new() -> Self {
        Sequential::default()
    }

    pub fn with_config(config: Config) -> Result<Self, Error> {
        Ok(Sequential {
            graph: Graph::with_config(config)?,
            ..Sequential::default()
        })
    }

    pub fn add_input<E>(&mut self, shape: E, data_type: DataType) -> Result<TensorId, Error>
    where
        E: AsRef<[usize]>,
    {
        let x = self.graph.input(shape, data_type)?;
        self.inputs.push(x);
        self.output = Some(x);
        Ok(x)
    }

    /// Appends a layer fed by the previous output. The first layer of an empty
    /// stack must declare its input shape.
    pub fn add(&mut self, mut layer: Layer) -> Result<TensorId, Error> {
        let x = match self.output {
            Some(x) => x,
            None => {
                let shape = match layer.input_shape() {
                    Some(shape) => shape.to_vec(),
                    None => {
                        let name = layer
                            .name()
                            .unwrap_or_else(|| layer.op().kind().default_name());
                        return Err(GraphError::MissingInputShape(name.to_string()).into());
                    }
                };
                let data_type = self.graph.config().data_type;
                self.add_input(shape, data_type)?
            }
        };

        let y = layer.call(&mut self.graph, x)?;
        self.layers.push(layer);
        self.output = Some(y);
        Ok(y)
    }

    pub fn with(mut self, layer: Layer) -> Result<Self, Error> {
        self.add(layer)?;
        Ok(self)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn output(&self) -> Option<TensorId> {
        self.output
    }

    pub fn build(self) -> Result<Model, Error> {
        let output = self.output.ok_or(GraphError::NoOutputs)?;
        Model::new(self.graph, &self.inputs, &[output])
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::{Error, GraphError};
    use crate::layers::Layer;
    use crate::model::sequential::Sequential;
    use crate::ops::conv::{Conv2d, Pool2d};
    use crate::ops::core::Split;
    use crate::ops::gemm::Dense;
    use crate::ops::nn::Activation;
    use crate::ops::Operator;
    use crate::tensor::DataType;

    #[test]
    fn test_lenet() {
        let config = Config::new().with_batch_size(32);
        let model = Sequential::with_config(config)
            .and_then(|s| s.with(Layer::new(Conv2d::new(6, 5)).with_input_shape([1, 28, 28])))
            .and_then(|s| s.with(Layer::new(Activation::Relu)))
            .and_then(|s| s.with(Layer::new(Pool2d::max(2))))
            .and_then(|s| s.with(Layer::new(Conv2d::new(16, 5))))
            .and_then(|s| s.with(Layer::new(Pool2d::max(2))))
            .and_then(|s| s.with(Layer::new(Operator::Flatten)))
            .and_then(|s| s.with(Layer::new(Dense::new(120))))
            .and_then(|s| s.with(Layer::new(Dense::new(10))))
            .and_then(|s| s.build())
            .unwrap();

        let shapes = model
            .ops()
            .map(|n| n.output_shape().unwrap().to_vec())
            .collect::<Vec<_>>();

        assert_eq!(
            shapes,
            vec![
                vec![32, 6, 24, 24],
                vec![32, 6, 24, 24],
                vec![32, 6, 12, 12],
                vec![32, 16, 8, 8],
                vec![32, 16, 4, 4],
                vec![32, 256],
                vec![32, 120],
                vec![32, 10],
            ]
        );
        assert_eq!(model.tensor(model.inputs()[0]).shape(), &[32, 1, 28, 28]);
    }

    #[test]
    fn test_missing_input_shape() {
        let mut seq = Sequential::new();
        let err = seq.add(Layer::new(Dense::new(10)).named("head")).expect_err("");
        assert_eq!(
            err.graph(),
            Some(&GraphError::MissingInputShape("head".to_string()))
        );
    }

    #[test]
    fn test_explicit_input() {
        let mut seq = Sequential::new();
        seq.add_input([0, 784], DataType::Float).unwrap();
        seq.add(Layer::new(Dense::new(512))).unwrap();
        seq.add(Layer::new(Dense::new(10))).unwrap();

        let model = seq.build().unwrap();
        assert_eq!(model.order().len(), 2);
        assert_eq!(model.tensor(model.outputs()[0]).shape(), &[64, 10]);
    }

    #[test]
    fn test_multi_output_layer() {
        let mut seq = Sequential::new();
        seq.add_input([0, 12], DataType::Float).unwrap();
        let x = seq.add(Layer::new(Dense::new(8))).unwrap();

        let err = seq.add(Layer::new(Split::even(2, 1))).expect_err("");
        assert_eq!(
            err.graph(),
            Some(&GraphError::MultipleOutputs {
                name: "split".to_string(),
                count: 2
            })
        );
        assert_eq!(seq.output(), Some(x));
        assert_eq!(seq.layers().len(), 1);
        assert_eq!(seq.graph().num_nodes(), 2);

        let model = seq.build().unwrap();
        assert_eq!(model.order().len(), 1);
    }

    #[test]
    fn test_empty() {
        assert!(matches!(
            Sequential::new().build(),
            Err(Error::Graph(GraphError::NoOutputs))
        ));
    }
}
