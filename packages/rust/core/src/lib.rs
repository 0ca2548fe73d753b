//! Query orchestration for personagraph.
//!
//! A question flows through a small workflow graph: classification and tone
//! selection start together, a router sends temporal questions through the
//! temporal lookup, the factual lookup always runs, and synthesis waits for
//! both branches before writing the answer.
//!
//! - [`state`]: per-run state and partial updates
//! - [`graph`]: graph builder, validation and executor
//! - [`stages`]: the five nodes
//! - [`pipeline`]: the standard graph and the [`Assistant`] entry point

pub mod graph;
pub mod pipeline;
pub mod stages;
pub mod state;

pub use graph::{CompiledGraph, Endpoint, Execution, GraphBuilder, GraphOptions, Node, NodeId, Router};
pub use pipeline::{
    Answer, Assistant, PipelineOptions, Services, build_graph, route_after_classification,
};
pub use state::{Field, QueryState, StateUpdate};
