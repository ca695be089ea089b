//! The runtime agents: per-character interrogation agents, the coordinating
//! game master, and the routing graph that dispatches turns.

mod character;
mod graph;
mod master;

pub use character::{AgentError, CharacterAgent, HISTORY_WINDOW};
pub use graph::{GraphDescription, GraphEdge, GraphNode, RoutingGraph};
pub use master::{
    CharacterDebugInfo, GameInfo, GameMaster, PersonaInfo, StateDebugInfo, TurnError, TurnResponse,
};
