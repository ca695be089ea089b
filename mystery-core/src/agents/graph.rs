//! The dispatch flow as a minimal explicit graph.
//!
//! One pass: entry -> router -> selected character -> exit. No cycles and
//! no path back to the router. The graph exists so future nodes (hints,
//! contradiction detection) slot in between the character node and the
//! exit without reshaping the coordinator.

use super::character::CharacterAgent;
use super::master::TurnError;
use crate::state::GameState;
use std::sync::Arc;

/// A node in the flow, for description/visualization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: &'static str,
}

/// A directed edge in the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

/// Describable shape of the routing graph.
#[derive(Debug, Clone)]
pub struct GraphDescription {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Execution position within one pass.
enum Step {
    Entry,
    Router,
    Agent(Arc<CharacterAgent>),
    Exit,
}

/// entry -> router -> one character agent -> exit.
pub struct RoutingGraph {
    agents: Vec<Arc<CharacterAgent>>,
}

impl RoutingGraph {
    pub fn new(agents: Vec<Arc<CharacterAgent>>) -> Self {
        Self { agents }
    }

    fn agent(&self, id: &str) -> Option<&Arc<CharacterAgent>> {
        self.agents.iter().find(|a| a.id() == id)
    }

    /// Run one pass over the graph for the prepared state.
    ///
    /// Routing is driven by `state.selected_character_id`; an unknown id
    /// fails with [`TurnError::UnknownCharacter`] before any agent runs.
    pub async fn run(&self, state: &mut GameState) -> Result<(), TurnError> {
        let mut step = Step::Entry;
        loop {
            step = match step {
                Step::Entry => Step::Router,
                Step::Router => {
                    let selected = state.selected_character_id.clone();
                    let agent = match self.agent(&selected) {
                        Some(agent) => Arc::clone(agent),
                        None => return Err(TurnError::UnknownCharacter(selected)),
                    };
                    tracing::debug!(character = %selected, "router selected agent");
                    Step::Agent(agent)
                }
                Step::Agent(agent) => {
                    agent.invoke(state).await?;
                    Step::Exit
                }
                Step::Exit => return Ok(()),
            };
        }
    }

    /// Node/edge listing of the flow.
    pub fn describe(&self) -> GraphDescription {
        let mut nodes = vec![
            GraphNode {
                id: "entry".to_string(),
                label: "Entry".to_string(),
                kind: "entry",
            },
            GraphNode {
                id: "router".to_string(),
                label: "Router".to_string(),
                kind: "router",
            },
        ];
        let mut edges = vec![GraphEdge {
            from: "entry".to_string(),
            to: "router".to_string(),
            label: String::new(),
        }];

        for agent in &self.agents {
            nodes.push(GraphNode {
                id: agent.id().to_string(),
                label: format!("{} ({})", agent.name(), agent.role()),
                kind: "character",
            });
            edges.push(GraphEdge {
                from: "router".to_string(),
                to: agent.id().to_string(),
                label: format!("character={}", agent.id()),
            });
            edges.push(GraphEdge {
                from: agent.id().to_string(),
                to: "exit".to_string(),
                label: String::new(),
            });
        }

        nodes.push(GraphNode {
            id: "exit".to_string(),
            label: "Exit".to_string(),
            kind: "exit",
        });

        GraphDescription { nodes, edges }
    }

    /// Mermaid rendering of [`describe`](Self::describe), for debug views.
    pub fn mermaid(&self) -> String {
        let mut out = String::from("graph TD\n    Entry([Entry]) --> Router{Router}\n");
        for agent in &self.agents {
            out.push_str(&format!(
                "    Router -->|character={id}| {id}[{name}]\n    {id} --> Exit([Exit])\n",
                id = agent.id(),
                name = agent.name(),
            ));
        }
        out
    }
}
