pub mod sequential;

use crate::backend::Backend;
use crate::error::{Error, GraphError};
use crate::graph::{Graph, Node, NodeId};
use crate::ops::Operator;
use crate::shape::{display_comma, Array};
use crate::tensor::{DataType, TensorHandle, TensorId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::{debug, info};

/// A graph with designated inputs and outputs, in execution order.
#[derive(Debug)]
pub struct Model {
    graph: Graph,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    order: Vec<NodeId>,
}

impl Model {
    pub fn new(graph: Graph, inputs: &[TensorId], outputs: &[TensorId]) -> Result<Self, Error> {
        if inputs.is_empty() {
            return Err(GraphError::NoInputs.into());
        }
        if outputs.is_empty() {
            return Err(GraphError::NoOutputs.into());
        }

        for &t in inputs.iter().chain(outputs.iter()) {
            if graph.get_tensor(t).is_none() {
                return Err(GraphError::UnknownTensor(t.0).into());
            }
        }

        for &t in inputs.iter() {
            if !graph.node(graph.tensor(t).producer()).is_input() {
                return Err(GraphError::NotAnInput(t.0).into());
            }
        }

        if let Some(t) = inputs.iter().duplicates().next() {
            return Err(GraphError::DuplicateInput {
                name: graph.tensor(*t).name().unwrap_or_default().to_string(),
                tensor: t.0,
            }
            .into());
        }

        let mut model = Model {
            graph,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            order: Vec::new(),
        };
        model.relinearize()?;

        info!(
            "assembled model: {} inputs, {} operators, {} outputs",
            model.inputs.len(),
            model.order.len(),
            model.outputs.len()
        );
        Ok(model)
    }

    /// Assembles a model whose inputs are every graph input the outputs depend on,
    /// in declaration order.
    pub fn from_outputs(graph: Graph, outputs: &[TensorId]) -> Result<Self, Error> {
        if let Some(t) = outputs.iter().find(|t| graph.get_tensor(**t).is_none()) {
            return Err(GraphError::UnknownTensor(t.0).into());
        }

        let mut seen = vec![false; graph.num_nodes()];
        let mut stack = outputs
            .iter()
            .map(|t| graph.tensor(*t).producer())
            .collect_vec();
        let mut sources = Vec::new();

        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;

            let node = graph.node(id);
            if node.is_input() {
                sources.push(id);
            }
            stack.extend(node.prev().iter().copied());
        }

        sources.sort();
        let inputs = sources
            .iter()
            .flat_map(|id| graph.node(*id).outputs().iter().copied())
            .collect_vec();

        Model::new(graph, &inputs, outputs)
    }

    // ******************************** Properties ******************************** //

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Operator nodes in execution order.
    pub fn ops(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(|id| self.graph.node(*id))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node(id)
    }

    pub fn tensor(&self, id: TensorId) -> &TensorHandle {
        self.graph.tensor(id)
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn batch_size(&self) -> usize {
        self.graph.config().batch_size
    }

    // ******************************** Assembly ******************************** //

    /// Recomputes the execution order and sequence ids.
    pub fn relinearize(&mut self) -> Result<&[NodeId], Error> {
        let seeds = self
            .inputs
            .iter()
            .map(|t| self.graph.tensor(*t).producer())
            .collect_vec();

        let order = self.graph.linearize(&seeds)?;

        for &t in self.outputs.iter() {
            let producer = self.graph.node(self.graph.tensor(t).producer());
            if producer.seq_id().is_none() && !self.inputs.contains(&t) {
                return Err(GraphError::DisconnectedOutput {
                    tensor: t.0,
                    producer: producer.name().to_string(),
                }
                .into());
            }
        }

        self.order = order;
        Ok(&self.order)
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), Error> {
        self.graph.set_batch_size(batch_size)?;
        Ok(())
    }

    pub fn plan(&self) -> Plan {
        let inputs = self
            .inputs
            .iter()
            .map(|&t| {
                let tensor = self.graph.tensor(t);
                PlanInput {
                    tensor: t,
                    name: tensor.name().unwrap_or_default().to_string(),
                    shape: tensor.shape().iter().copied().collect(),
                    data_type: tensor.data_type(),
                }
            })
            .collect();

        let steps = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let node = self.graph.node(*id);
                Step {
                    id: node.seq_id().unwrap_or(i),
                    name: node.name().to_string(),
                    op: node.op().clone(),
                    inputs: node.inputs().to_vec(),
                    outputs: node.outputs().to_vec(),
                    input_shapes: node.input_shapes().to_vec(),
                    output_shapes: node.output_shapes().to_vec(),
                }
            })
            .collect();

        Plan {
            inputs,
            steps,
            outputs: self.outputs.clone(),
        }
    }

    /// One row per input and operator: name (kind), output shape, input shape,
    /// and the names of the nodes it is connected to.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let rule = "_".repeat(96);

        let _ = writeln!(
            s,
            "{:<32}{:<24}{:<24}{}",
            "Layer (type)", "Output Shape", "Input Shape", "Connected to"
        );
        let _ = writeln!(s, "{rule}");

        let sources = self.inputs.iter().map(|t| self.graph.tensor(*t).producer());

        for id in sources.chain(self.order.iter().copied()) {
            let node = self.graph.node(id);
            let shape = |x: Option<&[usize]>| x.map(|x| format!("({})", display_comma(x))).unwrap_or_default();
            let connected = node.prev().iter().map(|p| self.graph.node(*p).name()).join(", ");

            let _ = writeln!(
                s,
                "{:<32}{:<24}{:<24}{}",
                format!("{} ({})", node.name(), node.kind()),
                shape(node.output_shape()),
                shape(node.input_shape()),
                connected
            );
        }

        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "Total operators: {}", self.order.len());
        s
    }

    /// Hands the model to a backend: input tensors first, then every operator
    /// in execution order, then layer initialization.
    pub fn compile<B>(&self, mut backend: B) -> Result<Compiled<B>, Error>
    where
        B: Backend,
    {
        let mut handles: Vec<Option<B::Tensor>> = vec![None; self.graph.num_tensors()];

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for &t in self.inputs.iter() {
            let tensor = self.graph.tensor(t);
            let h = backend
                .create_tensor(tensor.shape(), tensor.data_type())
                .map_err(backend_error)?;
            handles[t.0] = Some(h.clone());
            inputs.push(h);
        }

        for &id in self.order.iter() {
            let node = self.graph.node(id);

            let x = node
                .inputs()
                .iter()
                .map(|t| handles[t.0].clone().ok_or(GraphError::UnknownTensor(t.0)))
                .collect::<Result<Vec<_>, _>>()?;

            let y = backend
                .add_operator(node.op(), node.name(), &x, node.output_shapes())
                .map_err(backend_error)?;

            for (t, h) in node.outputs().iter().zip(y) {
                handles[t.0] = Some(h);
            }
            debug!("lowered {} `{}`", node.kind(), node.name());
        }

        backend.init_layers().map_err(backend_error)?;

        let outputs = self
            .outputs
            .iter()
            .map(|t| handles[t.0].clone().ok_or(GraphError::UnknownTensor(t.0)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Compiled {
            backend,
            inputs,
            outputs,
        })
    }
}

fn backend_error<E>(e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Backend(Box::new(e))
}

/// A model lowered onto a backend.
pub struct Compiled<B: Backend> {
    backend: B,
    inputs: Vec<B::Tensor>,
    outputs: Vec<B::Tensor>,
}

impl<B: Backend> Compiled<B> {
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn inputs(&self) -> &[B::Tensor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[B::Tensor] {
        &self.outputs
    }

    pub fn forward(&mut self) -> Result<(), Error> {
        self.backend.forward().map_err(backend_error)
    }

    /// One training iteration.
    pub fn step(&mut self) -> Result<(), Error> {
        self.backend.forward().map_err(backend_error)?;
        self.backend.backward().map_err(backend_error)?;
        self.backend.update().map_err(backend_error)
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

// **** Plan **** //

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    pub tensor: TensorId,
    pub name: String,
    pub shape: Array,
    pub data_type: DataType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: usize,
    pub name: String,
    pub op: Operator,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub input_shapes: Vec<Array>,
    pub output_shapes: Vec<Array>,
}

/// Serializable form of a linearized model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub inputs: Vec<PlanInput>,
    pub steps: Vec<Step>,
    pub outputs: Vec<TensorId>,
}
