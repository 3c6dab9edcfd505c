// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! DAG (Directed Acyclic Graph) construction for pipeline stages
//!
//! Edges are inferred by matching each declared input against the stage
//! outputs that carry the same name. The execution order is computed once,
//! with Kahn's algorithm, and reused by every run.

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipeline::{PipelineConfig, StageDescriptor, StageKind};
use crate::stages::{StageFactory, StageRegistry};

/// A stage in the graph together with its resolved factory
pub struct StageNode {
    descriptor: StageDescriptor,
    factory: Arc<dyn StageFactory>,
}

impl StageNode {
    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> StageKind {
        self.descriptor.kind
    }

    pub(crate) fn factory(&self) -> Arc<dyn StageFactory> {
        Arc::clone(&self.factory)
    }
}

impl std::fmt::Debug for StageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageNode")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Immutable stage graph with a fixed topological order
///
/// Edge weights are the input names through which the consumer reads the
/// producer's result.
#[derive(Debug)]
pub struct StageGraph {
    graph: DiGraph<StageNode, String>,
    name_to_index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
}

/// Builds [`StageGraph`]s from pipeline configurations
pub struct GraphBuilder;

impl GraphBuilder {
    /// Resolve stages through `registry` and wire them into a graph
    pub fn build(config: &PipelineConfig, registry: &StageRegistry) -> PipeflowResult<StageGraph> {
        let mut graph: DiGraph<StageNode, String> = DiGraph::new();
        let mut name_to_index = HashMap::new();

        if !config.source.inputs.is_empty() {
            return Err(PipeflowError::ConfigInvalid {
                reason: format!("Source '{}' cannot declare inputs", config.source.name),
                help: Some("Remove the 'input' field from the source".into()),
            });
        }

        // One node per stage, in declaration order
        for descriptor in config.stages() {
            let factory = registry.resolve_for(descriptor)?;
            let node = graph.add_node(StageNode {
                descriptor: descriptor.clone(),
                factory,
            });
            if name_to_index.insert(descriptor.name.clone(), node).is_some() {
                return Err(PipeflowError::invalid(format!(
                    "Stage name '{}' is declared more than once",
                    descriptor.name
                )));
            }
        }

        let mut producers: HashMap<String, Vec<NodeIndex>> = HashMap::new();
        for node in graph.node_indices() {
            for output in &graph[node].descriptor.outputs {
                producers.entry(output.clone()).or_default().push(node);
            }
        }

        let mut edges = Vec::new();
        for consumer in graph.node_indices() {
            let stage = &graph[consumer].descriptor;

            for input in &stage.inputs {
                match producers.get(input).map(Vec::as_slice) {
                    None | Some([]) => {
                        return Err(PipeflowError::DanglingInput {
                            stage: stage.name.clone(),
                            input: input.clone(),
                        });
                    }
                    Some([producer]) => edges.push((*producer, consumer, input.clone())),
                    Some(many) => {
                        return Err(PipeflowError::AmbiguousInput {
                            stage: stage.name.clone(),
                            input: input.clone(),
                            producers: many.iter().map(|n| graph[*n].descriptor.name.clone()).collect(),
                        });
                    }
                }
            }
        }

        for (producer, consumer, input) in edges {
            graph.add_edge(producer, consumer, input);
        }

        let order = kahn_order(&graph).map_err(|_| PipeflowError::CycleDetected {
            stages: cycle_members(&graph),
        })?;

        let dag = StageGraph {
            graph,
            name_to_index,
            order,
        };

        // Acyclic with the source as the only root, so every stage hangs off it
        if let Some(orphan) = dag.roots().into_iter().find(|n| *n != config.source.name) {
            return Err(PipeflowError::ConfigInvalid {
                reason: format!(
                    "Stage '{}' declares no inputs and is not reachable from source '{}'",
                    orphan, config.source.name
                ),
                help: Some("Set 'input' to the output of an upstream stage".into()),
            });
        }

        Ok(dag)
    }
}

/// Topological order with ties broken by declaration order
///
/// Returns the partial order when the graph has a cycle.
fn kahn_order(graph: &DiGraph<StageNode, String>) -> Result<Vec<NodeIndex>, Vec<NodeIndex>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.edges_directed(n, Direction::Incoming).count())
        .collect();

    // Node indices follow declaration order, so the smallest ready index wins
    let mut ready: BTreeSet<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(node) = ready.pop_first() {
        order.push(node);

        for edge in graph.edges_directed(node, Direction::Outgoing) {
            let target = edge.target();
            in_degree[target.index()] -= 1;
            if in_degree[target.index()] == 0 {
                ready.insert(target);
            }
        }
    }

    if order.len() == graph.node_count() {
        Ok(order)
    } else {
        Err(order)
    }
}

/// Stages that sit on a cycle, in declaration order
fn cycle_members(graph: &DiGraph<StageNode, String>) -> Vec<String> {
    let mut members: Vec<NodeIndex> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .collect();

    members.sort();
    members
        .into_iter()
        .map(|n| graph[n].descriptor.name.clone())
        .collect()
}

impl StageGraph {
    /// Number of stages
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Stage names in execution order
    pub fn order_names(&self) -> Vec<&str> {
        self.order.iter().map(|n| self.graph[*n].name()).collect()
    }

    /// Stages in execution order
    pub fn nodes(&self) -> impl Iterator<Item = &StageNode> {
        self.order.iter().map(move |n| &self.graph[*n])
    }

    /// Look up a stage by name
    pub fn node(&self, name: &str) -> Option<&StageNode> {
        self.name_to_index.get(name).map(|n| &self.graph[*n])
    }

    /// Position of a stage, stable for the lifetime of the graph
    pub fn position(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).map(|n| n.index())
    }

    /// Stages nobody depends on upstream (only the source in a valid graph)
    pub fn roots(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|n| {
                self.graph
                    .neighbors_directed(**n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[*n].name())
            .collect()
    }

    /// Stages that must run before `stage_name`
    pub fn dependencies(&self, stage_name: &str) -> Option<Vec<&str>> {
        let node = self.name_to_index.get(stage_name)?;
        Some(self.neighbor_names(*node, Direction::Incoming))
    }

    /// Stages that consume the output of `stage_name`
    pub fn dependents(&self, stage_name: &str) -> Option<Vec<&str>> {
        let node = self.name_to_index.get(stage_name)?;
        Some(self.neighbor_names(*node, Direction::Outgoing))
    }

    fn neighbor_names(&self, node: NodeIndex, direction: Direction) -> Vec<&str> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors.into_iter().map(|n| self.graph[n].name()).collect()
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(stage_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(stage_b) else {
            return false;
        };

        node_a != node_b && has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Outputs no stage consumes, as `(stage, output)` pairs
    pub fn unconsumed_outputs(&self) -> Vec<(&str, &str)> {
        let consumed: BTreeSet<&str> = self
            .graph
            .edge_references()
            .map(|e| e.weight().as_str())
            .collect();

        self.nodes()
            .flat_map(|node| {
                node.descriptor
                    .outputs
                    .iter()
                    .filter(|o| !consumed.contains(o.as_str()))
                    .map(move |o| (node.name(), o.as_str()))
            })
            .collect()
    }

    pub(crate) fn order_indices(&self) -> &[NodeIndex] {
        &self.order
    }

    pub(crate) fn stage_at(&self, index: NodeIndex) -> &StageNode {
        &self.graph[index]
    }

    /// Upstream producers of a stage with the input name each one feeds
    pub(crate) fn upstream(&self, index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &str)> {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|e| (e.source(), e.weight().as_str()))
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in &self.order {
            let stage = &self.graph[*node];
            out.push_str(&format!(
                "    n{}[\"{} ({}/{})\"]\n",
                node.index(),
                stage.name(),
                stage.kind(),
                stage.descriptor.stage_type
            ));
        }

        for edge in self.graph.edge_references() {
            out.push_str(&format!(
                "    n{} -->|{}| n{}\n",
                edge.source().index(),
                edge.weight(),
                edge.target().index()
            ));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=LR;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in &self.order {
            let stage = &self.graph[*node];
            out.push_str(&format!(
                "    \"{}\" [label=\"{}\\n{}/{}\"];\n",
                stage.name(),
                stage.name(),
                stage.kind(),
                stage.descriptor.stage_type
            ));
        }

        out.push('\n');
        for edge in self.graph.edge_references() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                self.graph[edge.source()].name(),
                self.graph[edge.target()].name(),
                edge.weight()
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for (i, node) in self.order.iter().enumerate() {
            let stage = &self.graph[*node];
            let deps = self.neighbor_names(*node, Direction::Incoming);

            out.push_str(&format!(
                "{}. {} ({}/{})",
                i + 1,
                stage.name(),
                stage.kind(),
                stage.descriptor.stage_type
            ));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}
