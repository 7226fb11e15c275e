pub mod linearize;

use crate::config::Config;
use crate::error::{ConfigError, Error, GraphError};
use crate::ops::{OpKind, Operator};
use crate::shape::{check_nonzero, display_shapes, rebatch, Array, ShapeError};
use crate::tensor::{DataType, TensorHandle, TensorId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One operator invocation in the graph.
///
/// A node is created unconnected and becomes `initialized` exactly once, when
/// `Graph::connect` has inferred its shapes and linked it to its producers.
/// After that only the batch dimension of its cached shapes may change.
pub struct Node {
    name: String,
    op: Operator,

    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,

    // producer links, in connection order (may repeat)
    prev: Vec<NodeId>,
    next: Vec<NodeId>,

    input_shapes: Vec<Array>,
    output_shapes: Vec<Array>,

    initialized: bool,
    seq_id: Option<usize>,

    // linearization bookkeeping
    visited_prev: usize,
    visited: bool,
}

impl Node {
    fn new(name: String, op: Operator) -> Self {
        Node {
            name,
            op,
            inputs: Vec::new(),
            outputs: Vec::new(),
            prev: Vec::new(),
            next: Vec::new(),
            input_shapes: Vec::new(),
            output_shapes: Vec::new(),
            initialized: false,
            seq_id: None,
            visited_prev: 0,
            visited: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn prev(&self) -> &[NodeId] {
        &self.prev
    }

    pub fn next(&self) -> &[NodeId] {
        &self.next
    }

    pub fn input_shapes(&self) -> &[Array] {
        &self.input_shapes
    }

    pub fn output_shapes(&self) -> &[Array] {
        &self.output_shapes
    }

    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shapes.first().map(|s| s.as_slice())
    }

    pub fn output_shape(&self) -> Option<&[usize]> {
        self.output_shapes.first().map(|s| s.as_slice())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_input(&self) -> bool {
        matches!(self.op, Operator::Input)
    }

    /// Position in the last linearized order. Input nodes never get one.
    pub fn seq_id(&self) -> Option<usize> {
        self.seq_id
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): [{}] -> [{}]",
            self.name,
            self.kind(),
            display_shapes(&self.input_shapes),
            display_shapes(&self.output_shapes)
        )
    }
}

/// Arena owning every node and tensor of one model definition.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    tensors: Vec<TensorHandle>,
    name_counter: HashMap<OpKind, usize>,
    config: Config,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Graph {
            config,
            ..Graph::default()
        })
    }

    // ******************************** Properties ******************************** //

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn tensor(&self, id: TensorId) -> &TensorHandle {
        &self.tensors[id.0]
    }

    pub fn get_tensor(&self, id: TensorId) -> Option<&TensorHandle> {
        self.tensors.get(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    // ******************************** Construction ******************************** //

    /// Declares a graph input. A leading extent of 0 stands for the configured batch size.
    pub fn input<E>(&mut self, shape: E, data_type: DataType) -> Result<TensorId, Error>
    where
        E: AsRef<[usize]>,
    {
        self.input_inner(shape.as_ref(), data_type, None)
    }

    pub fn input_named<E>(&mut self, shape: E, data_type: DataType, name: &str) -> Result<TensorId, Error>
    where
        E: AsRef<[usize]>,
    {
        self.input_inner(shape.as_ref(), data_type, Some(name))
    }

    fn input_inner(
        &mut self,
        shape: &[usize],
        data_type: DataType,
        name: Option<&str>,
    ) -> Result<TensorId, Error> {
        let name = self.resolve_name(OpKind::Input, name);

        let mut shape: Array = shape.iter().copied().collect();
        if shape.first() == Some(&0) {
            rebatch(&mut shape, self.config.batch_size);
        }

        let checked = match shape.len() {
            0 => Err(ShapeError::InsufficientRank { min: 1, actual: 0 }),
            _ => check_nonzero(&shape),
        };
        checked.map_err(|source| Error::Shape {
            kind: OpKind::Input,
            name: name.clone(),
            inputs: vec![shape.clone()],
            source,
        })?;

        let id = NodeId(self.nodes.len());
        let tid = TensorId(self.tensors.len());

        let mut tensor = TensorHandle::new(shape.clone(), data_type, id);
        tensor.name = Some(name.clone());
        self.tensors.push(tensor);

        let mut node = Node::new(name, Operator::Input);
        node.outputs.push(tid);
        node.output_shapes.push(shape);
        node.initialized = true;
        self.nodes.push(node);

        Ok(tid)
    }

    /// Creates an unconnected node after validating its parameters.
    pub fn add_node<O>(&mut self, op: O, name: Option<&str>) -> Result<NodeId, Error>
    where
        O: Into<Operator>,
    {
        let op = op.into();
        if matches!(op, Operator::Input) {
            return Err(GraphError::ConnectInput(name.unwrap_or("input").to_string()).into());
        }
        op.validate()?;

        let name = self.resolve_name(op.kind(), name);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, op));
        Ok(id)
    }

    /// Connects an unconnected node to its inputs and returns its outputs.
    ///
    /// On error the graph is left untouched.
    pub fn connect(&mut self, id: NodeId, x: &[TensorId]) -> Result<Vec<TensorId>, Error> {
        let node = self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id.0))?;

        if node.is_input() {
            return Err(GraphError::ConnectInput(node.name.clone()).into());
        }
        if node.initialized {
            return Err(GraphError::Reused(node.name.clone()).into());
        }

        let arity = node.op.arity();
        if !arity.accepts(x.len()) {
            return Err(GraphError::Arity {
                kind: node.kind(),
                name: node.name.clone(),
                expected: arity,
                actual: x.len(),
            }
            .into());
        }

        if let Some(t) = x.iter().find(|t| t.0 >= self.tensors.len()) {
            return Err(GraphError::UnknownTensor(t.0).into());
        }

        if node.op.is_merge() {
            if let Some(t) = x.iter().duplicates().next() {
                return Err(GraphError::DuplicateInput {
                    name: node.name.clone(),
                    tensor: t.0,
                }
                .into());
            }
        }

        let input_shapes: Vec<Array> = x.iter().map(|t| self.tensors[t.0].shape.clone()).collect();
        let shapes = input_shapes.iter().map(|s| s.as_slice()).collect_vec();

        let mut op = node.op.clone();
        let output_shapes = op.infer(&shapes).map_err(|source| Error::Shape {
            kind: node.kind(),
            name: node.name.clone(),
            inputs: input_shapes.clone(),
            source,
        })?;

        let data_type = op.output_type(self.tensors[x[0].0].data_type);

        let outputs = output_shapes
            .iter()
            .map(|shape| {
                let tid = TensorId(self.tensors.len());
                self.tensors
                    .push(TensorHandle::new(shape.clone(), data_type, id));
                tid
            })
            .collect_vec();

        let prev = x.iter().map(|t| self.tensors[t.0].producer).collect_vec();
        for p in prev.iter() {
            self.nodes[p.0].next.push(id);
        }

        let node = &mut self.nodes[id.0];
        node.op = op;
        node.inputs = x.to_vec();
        node.outputs = outputs.clone();
        node.prev = prev;
        node.input_shapes = input_shapes;
        node.output_shapes = output_shapes;
        node.initialized = true;

        debug!(
            "{} `{}` input [{}], output [{}]",
            node.kind(),
            node.name,
            display_shapes(&node.input_shapes),
            display_shapes(&node.output_shapes)
        );

        Ok(outputs)
    }

    pub fn apply<O>(&mut self, op: O, x: &[TensorId]) -> Result<Vec<TensorId>, Error>
    where
        O: Into<Operator>,
    {
        let id = self.add_node(op, None)?;
        self.connect(id, x)
    }

    pub fn apply_named<O>(&mut self, op: O, name: &str, x: &[TensorId]) -> Result<Vec<TensorId>, Error>
    where
        O: Into<Operator>,
    {
        let id = self.add_node(op, Some(name))?;
        self.connect(id, x)
    }

    // ******************************** Batch size ******************************** //

    /// Rewrites the leading extent of every cached shape. Wiring is untouched.
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }

        for node in self.nodes.iter_mut() {
            node.input_shapes
                .iter_mut()
                .chain(node.output_shapes.iter_mut())
                .for_each(|s| rebatch(s, batch_size));
        }
        for tensor in self.tensors.iter_mut() {
            rebatch(&mut tensor.shape, batch_size);
        }
        self.config.batch_size = batch_size;

        info!("rebound batch size to {batch_size}");
        Ok(())
    }

    // dense, dense_1, dense_2, ...
    fn resolve_name(&mut self, kind: OpKind, name: Option<&str>) -> String {
        if let Some(name) = name {
            return name.to_string();
        }
        let count = self.name_counter.entry(kind).or_insert(0);
        let name = if *count == 0 {
            kind.default_name().to_string()
        } else {
            format!("{}_{}", kind.default_name(), count)
        };
        *count += 1;
        name
    }
}
