use crate::ops::Operator;
use crate::shape::Array;
use crate::tensor::DataType;

/// Execution engine that receives a linearized model.
///
/// The graph core never computes anything; a backend allocates real tensors,
/// instantiates operators in the order they are handed over, and runs them.
pub trait Backend {
    type Tensor: Clone;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_tensor(&mut self, shape: &[usize], data_type: DataType) -> Result<Self::Tensor, Self::Error>;

    /// Instantiates one operator. Padding is always explicit at this point and
    /// `output_shapes` holds one shape per expected output tensor.
    fn add_operator(
        &mut self,
        op: &Operator,
        name: &str,
        inputs: &[Self::Tensor],
        output_shapes: &[Array],
    ) -> Result<Vec<Self::Tensor>, Self::Error>;

    fn init_layers(&mut self) -> Result<(), Self::Error>;

    fn forward(&mut self) -> Result<(), Self::Error>;

    fn backward(&mut self) -> Result<(), Self::Error>;

    fn update(&mut self) -> Result<(), Self::Error>;
}
