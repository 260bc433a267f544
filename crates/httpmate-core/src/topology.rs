//! Read-only diagnostic projection of the chain graph.
//!
//! [`ChainRegistry::topology`] snapshots every chain as a node and every
//! possible action as an edge. The result serialises with serde and renders
//! to a Graphviz DOT document with [`PipelineGraph::to_dot`]. Node colours are
//! assigned per owning module. Nothing here is a stable format.

use std::collections::HashMap;

use serde::Serialize;

use crate::chain::{Action, Chain};
use crate::registry::ChainRegistry;

const CONSUME_NODE: &str = "<consume>";
const DROP_NODE: &str = "<drop>";

const PALETTE: &[&str] = &[
    "#8dd3c7", "#ffffb3", "#bebada", "#fb8072", "#80b1d3", "#fdb462", "#b3de69", "#fccde5",
    "#d9d9d9", "#bc80bd",
];

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Chain,
    Consume,
    Drop,
}

/// Why an edge may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Default,
    Rule,
    Exception,
}

/// A chain or terminal pseudo-node.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<String>,
}

/// A possible transition out of a chain.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Snapshot of a registry's chains and transitions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl PipelineGraph {
    fn add_chain(&mut self, chain: &Chain) {
        self.nodes.push(GraphNode {
            id: chain.name().to_string(),
            kind: NodeKind::Chain,
            module: Some(chain.module().to_string()),
            processors: chain.processor_names().map(str::to_string).collect(),
        });

        let from = chain.name().as_str();
        for rule in chain.rules() {
            self.add_edge(from, rule.action(), EdgeKind::Rule, Some(rule.description()));
        }
        self.add_edge(from, chain.default_action(), EdgeKind::Default, None);
        self.add_edge(from, chain.exception_action(), EdgeKind::Exception, None);
    }

    fn add_edge(&mut self, from: &str, action: &Action, kind: EdgeKind, label: Option<&str>) {
        let to = match action {
            Action::Jump(target) => target.as_str(),
            Action::Consume => CONSUME_NODE,
            Action::Drop => DROP_NODE,
        };
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            label: label.map(str::to_string),
        });
    }

    fn add_terminals(&mut self) {
        for (id, kind) in [(CONSUME_NODE, NodeKind::Consume), (DROP_NODE, NodeKind::Drop)] {
            if self.edges.iter().any(|edge| edge.to == id) {
                self.nodes.push(GraphNode {
                    id: id.to_string(),
                    kind,
                    module: None,
                    processors: Vec::new(),
                });
            }
        }
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Iterates edges leaving `id`, in evaluation order.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    /// Renders the graph as a Graphviz DOT document.
    pub fn to_dot(&self) -> String {
        let mut colours: HashMap<&str, &str> = HashMap::new();
        let mut out = String::from("digraph pipeline {\n    rankdir=LR;\n    node [shape=box, style=filled];\n");

        for node in &self.nodes {
            let id = escape(&node.id);
            let line = match node.kind {
                NodeKind::Chain => {
                    let module = node.module.as_deref().unwrap_or_default();
                    let next = PALETTE[colours.len() % PALETTE.len()];
                    let colour = *colours.entry(module).or_insert(next);
                    format!(
                        "    \"{id}\" [label=\"{id}\\n({})\", fillcolor=\"{colour}\"];\n",
                        escape(module)
                    )
                }
                NodeKind::Consume => format!(
                    "    \"{id}\" [label=\"consume\", shape=doublecircle, fillcolor=\"#ccebc5\"];\n"
                ),
                NodeKind::Drop => {
                    format!("    \"{id}\" [label=\"drop\", shape=circle, fillcolor=\"#f0f0f0\"];\n")
                }
            };
            out.push_str(&line);
        }

        for edge in &self.edges {
            let from = escape(&edge.from);
            let to = escape(&edge.to);
            let line = match edge.kind {
                EdgeKind::Default => format!("    \"{from}\" -> \"{to}\";\n"),
                EdgeKind::Rule => format!(
                    "    \"{from}\" -> \"{to}\" [label=\"{}\"];\n",
                    escape(edge.label.as_deref().unwrap_or_default())
                ),
                EdgeKind::Exception => {
                    format!("    \"{from}\" -> \"{to}\" [style=dashed, color=\"#d62728\"];\n")
                }
            };
            out.push_str(&line);
        }

        out.push_str("}\n");
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ChainRegistry {
    /// Snapshots the chain graph, chains in creation order.
    pub fn topology(&self) -> PipelineGraph {
        let mut graph = PipelineGraph::default();
        for chain in self.chains() {
            graph.add_chain(chain);
        }
        graph.add_terminals();
        graph
    }
}
