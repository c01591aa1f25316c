// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The staged stream node graph.
//!
//! Nodes are registered into one of a fixed number of stages. A tick walks the
//! stages in order and updates every active node of a stage in registration
//! order, so a block transmitted by a stage N node is visible to a stage N+1
//! node during the same tick. Each node input is a single-slot mailbox: a block
//! that arrives while the slot is still occupied is dropped.

use std::{fmt, sync::Arc};

use tracing::{debug, info, trace};

use crate::{
    block::{BlockMut, BlockRef, Pool},
    stats::{Fault, FaultCounters},
};

/// The largest number of stages a graph can be configured with.
pub const MAX_STAGES: usize = 32;

/// Identifies a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("stage count must be between 1 and {max}, got {stages}")]
    StageCount { stages: usize, max: usize },

    #[error("node {name} requested stage {stage}, but only {stages} stages are configured")]
    InvalidStage {
        name: String,
        stage: usize,
        stages: usize,
    },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has {outputs} outputs, output {output} is out of range")]
    OutputOutOfRange {
        node: String,
        output: usize,
        outputs: usize,
    },

    #[error("node {node} has {inputs} inputs, input {input} is out of range")]
    InputOutOfRange {
        node: String,
        input: usize,
        inputs: usize,
    },
}

/// A vertex of the stream graph.
///
/// `update` runs once per tick on the scheduler thread and must never block:
/// every node of every later stage waits for it.
pub trait StreamNode: Send {
    fn update(&mut self, ctx: &mut NodeContext<'_>);
}

/// A directed edge from a node output to an input slot of another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub source_output: usize,
    pub destination: NodeId,
    pub destination_input: usize,
}

/// Per-node wiring and mailboxes.
struct Ports {
    name: String,
    stage: usize,
    outputs: usize,
    inputs: Vec<Option<BlockRef>>,
    connections: Vec<Connection>,
    /// Set by the first connection and never cleared.
    active: bool,
}

/// The node graph. Owns every node, the per-stage execution lists and the pool
/// used for copy-on-write.
pub struct Graph {
    pool: Pool,
    stages: Vec<Vec<NodeId>>,
    nodes: Vec<Box<dyn StreamNode>>,
    ports: Vec<Ports>,
    faults: Arc<FaultCounters>,
}

impl Graph {
    /// Creates an empty graph with the given number of stages.
    pub fn new(pool: Pool, stages: usize) -> Result<Graph, GraphError> {
        if stages == 0 || stages > MAX_STAGES {
            return Err(GraphError::StageCount {
                stages,
                max: MAX_STAGES,
            });
        }

        Ok(Graph {
            pool,
            stages: vec![Vec::new(); stages],
            nodes: Vec::new(),
            ports: Vec::new(),
            faults: Arc::new(FaultCounters::new()),
        })
    }

    /// Registers a node in the given stage. Nodes are never removed.
    pub fn add_node<N: StreamNode + 'static>(
        &mut self,
        name: &str,
        stage: usize,
        inputs: usize,
        outputs: usize,
        node: N,
    ) -> Result<NodeId, GraphError> {
        if stage >= self.stages.len() {
            return Err(GraphError::InvalidStage {
                name: name.to_string(),
                stage,
                stages: self.stages.len(),
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Box::new(node));
        self.ports.push(Ports {
            name: name.to_string(),
            stage,
            outputs,
            inputs: (0..inputs).map(|_| None).collect(),
            connections: Vec::new(),
            active: false,
        });
        self.stages[stage].push(id);

        debug!(node = name, id = id.0, stage, inputs, outputs, "Registered node.");
        Ok(id)
    }

    /// Connects an output of the source node to an input of the destination node
    /// and activates both nodes.
    pub fn connect(
        &mut self,
        source: NodeId,
        source_output: usize,
        destination: NodeId,
        destination_input: usize,
    ) -> Result<(), GraphError> {
        let source_ports = self
            .ports
            .get(source.0)
            .ok_or(GraphError::UnknownNode(source))?;
        if source_output >= source_ports.outputs {
            return Err(GraphError::OutputOutOfRange {
                node: source_ports.name.clone(),
                output: source_output,
                outputs: source_ports.outputs,
            });
        }

        let destination_ports = self
            .ports
            .get(destination.0)
            .ok_or(GraphError::UnknownNode(destination))?;
        if destination_input >= destination_ports.inputs.len() {
            return Err(GraphError::InputOutOfRange {
                node: destination_ports.name.clone(),
                input: destination_input,
                inputs: destination_ports.inputs.len(),
            });
        }

        info!(
            source = self.ports[source.0].name,
            source_output,
            destination = self.ports[destination.0].name,
            destination_input,
            "Connecting nodes."
        );

        self.ports[source.0].connections.push(Connection {
            source_output,
            destination,
            destination_input,
        });
        self.ports[source.0].active = true;
        self.ports[destination.0].active = true;
        Ok(())
    }

    /// Runs one tick: every active node of every stage, in stage order and then
    /// registration order.
    pub fn update_all(&mut self) {
        let Graph {
            pool,
            stages,
            nodes,
            ports,
            faults,
        } = self;

        for stage in stages.iter() {
            for &id in stage {
                if !ports[id.0].active {
                    continue;
                }
                let mut ctx = NodeContext {
                    id,
                    ports: ports.as_mut_slice(),
                    pool: &*pool,
                    faults: &**faults,
                };
                nodes[id.0].update(&mut ctx);
            }
        }
    }

    /// Returns true once the node has been connected.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.ports.get(id.0).is_some_and(|ports| ports.active)
    }

    /// The outgoing connections of the node.
    pub fn connections(&self, id: NodeId) -> &[Connection] {
        self.ports
            .get(id.0)
            .map(|ports| ports.connections.as_slice())
            .unwrap_or_default()
    }

    /// Returns true if the input slot of the node holds an unread block.
    pub fn has_pending(&self, id: NodeId, input: usize) -> bool {
        self.ports
            .get(id.0)
            .and_then(|ports| ports.inputs.get(input))
            .is_some_and(|slot| slot.is_some())
    }

    pub fn stage_of(&self, id: NodeId) -> Option<usize> {
        self.ports.get(id.0).map(|ports| ports.stage)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The pool used for blocks created inside the graph.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Faults counted by the graph itself.
    pub fn faults(&self) -> Arc<FaultCounters> {
        self.faults.clone()
    }
}

/// What a node sees of the graph while it is being updated.
pub struct NodeContext<'a> {
    id: NodeId,
    ports: &'a mut [Ports],
    pool: &'a Pool,
    faults: &'a FaultCounters,
}

impl NodeContext<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.ports[self.id.0].name
    }

    /// Takes the pending block from the input slot. The block is shared and must
    /// be treated as read-only.
    pub fn receive(&mut self, input: usize) -> Option<BlockRef> {
        self.ports[self.id.0].inputs.get_mut(input)?.take()
    }

    /// Takes the pending block from the input slot with write access, copying it
    /// into a fresh block first if anyone else still holds it.
    pub fn receive_writable(&mut self, input: usize) -> Option<BlockMut> {
        let block = self.receive(input)?;
        match block.try_into_mut() {
            Ok(block) => Some(block),
            Err(shared) => {
                let Some(mut copy) = self.pool.allocate() else {
                    self.faults.record(Fault::ResourceExhausted);
                    debug!(
                        node = self.ports[self.id.0].name,
                        "No block available for a writable copy, dropping input."
                    );
                    return None;
                };
                copy.write().copy_from(&shared.read());
                Some(copy)
            }
        }
    }

    /// Allocates a block from the graph pool.
    pub fn allocate(&self) -> Option<BlockMut> {
        self.pool.allocate()
    }

    /// Publishes the block to every connection of the given output whose input
    /// slot is free, while the block has room for more owners. Returns the
    /// number of destinations that received it.
    pub fn transmit(&mut self, block: &BlockRef, output: usize) -> usize {
        let mut delivered = 0;
        for i in 0..self.ports[self.id.0].connections.len() {
            let connection = self.ports[self.id.0].connections[i];
            if connection.source_output != output {
                continue;
            }

            let destination = &mut self.ports[connection.destination.0];
            let slot = &mut destination.inputs[connection.destination_input];
            if slot.is_some() {
                self.faults.record(Fault::Backpressure);
                trace!(
                    destination = connection.destination.0,
                    input = connection.destination_input,
                    "Input slot occupied, dropping block."
                );
                continue;
            }

            // Destinations past the reference count limit never see the block.
            let Some(share) = block.try_share() else {
                continue;
            };
            *slot = Some(share);
            delivered += 1;
        }
        delivered
    }
}
