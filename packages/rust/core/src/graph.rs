//! Workflow graph: named nodes joined by fixed and conditional edges.
//!
//! A [`GraphBuilder`] collects nodes and edges; [`GraphBuilder::compile`]
//! validates the shape (known nodes, no cycles, everything reachable, a path
//! to `END`) and yields a [`CompiledGraph`] that can be invoked any number of
//! times, each invocation owning its own [`QueryState`].
//!
//! Execution is trigger-driven. An edge into a node marks it pending; a
//! pending node runs once every field it [`requires`](Node::requires) is
//! present in the state. That is the join: a node fed by two branches simply
//! requires both branches' outputs. Each node runs at most once per run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use personagraph_shared::{PersonaGraphError, Result};

use crate::state::{Field, QueryState, StateUpdate};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The closed set of nodes a graph can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Classification,
    TemporalLookup,
    FactualLookup,
    ToneSelection,
    Synthesis,
}

impl NodeId {
    pub const ALL: [NodeId; 5] = [
        Self::Classification,
        Self::TemporalLookup,
        Self::FactualLookup,
        Self::ToneSelection,
        Self::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::TemporalLookup => "temporal_lookup",
            Self::FactualLookup => "factual_lookup",
            Self::ToneSelection => "tone_selection",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either end of an edge: a node or one of the two pseudo-nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Start,
    Node(NodeId),
    End,
}

impl From<NodeId> for Endpoint {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Node(id) => id.fmt(f),
            Self::End => f.write_str("END"),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// A unit of work. Reads the state, returns a partial update.
///
/// Recoverable failures (a service being down, unreadable model output) are
/// expected to be turned into degraded values inside the node. An `Err` here
/// aborts the whole run.
#[async_trait]
pub trait Node: Send + Sync {
    /// State fields that must exist before the node may run.
    fn requires(&self) -> &'static [Field] {
        &[]
    }

    async fn run(&self, state: &QueryState) -> Result<StateUpdate>;
}

/// Picks the next node from the state. Must return one of the targets
/// declared alongside it.
pub type Router = fn(&QueryState) -> NodeId;

#[derive(Clone)]
enum Transition {
    To(Endpoint),
    Branch { router: Router, targets: Vec<NodeId> },
}

impl Transition {
    /// Every endpoint this transition can lead to.
    fn possible(&self) -> Vec<Endpoint> {
        match self {
            Self::To(to) => vec![*to],
            Self::Branch { targets, .. } => targets.iter().copied().map(Endpoint::Node).collect(),
        }
    }
}

/// Execution settings fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
    /// Run independent ready nodes on separate tasks.
    pub concurrent_branches: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects nodes and edges; see [`compile`](Self::compile).
#[derive(Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<NodeId, Arc<dyn Node>>,
    transitions: HashMap<Endpoint, Vec<Transition>>,
    problems: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, id: NodeId, node: impl Node + 'static) -> Self {
        if self.nodes.insert(id, Arc::new(node)).is_some() {
            self.problems.push(format!("node {id} registered twice"));
        }
        self
    }

    pub fn add_edge(mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> Self {
        let (from, to) = (from.into(), to.into());
        if from == Endpoint::End {
            self.problems.push(format!("edge {from} -> {to} leaves END"));
        } else if to == Endpoint::Start {
            self.problems.push(format!("edge {from} -> {to} enters START"));
        } else {
            self.transitions.entry(from).or_default().push(Transition::To(to));
        }
        self
    }

    /// Route out of `from` with `router`, which may only pick from `targets`.
    pub fn add_conditional_edges(
        mut self,
        from: NodeId,
        router: Router,
        targets: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        let targets: Vec<NodeId> = targets.into_iter().collect();
        if targets.is_empty() {
            self.problems
                .push(format!("conditional edge out of {from} declares no targets"));
        } else {
            self.transitions
                .entry(Endpoint::Node(from))
                .or_default()
                .push(Transition::Branch { router, targets });
        }
        self
    }

    /// Validate the graph and freeze it.
    ///
    /// Fails with [`PersonaGraphError::Graph`] on: an edge touching an
    /// unregistered node, no edge out of `START`, a node without outgoing
    /// edges, a cycle, a node unreachable from `START`, or no path to `END`.
    pub fn compile(self, options: GraphOptions) -> Result<CompiledGraph> {
        if let Some(problem) = self.problems.first() {
            return Err(PersonaGraphError::graph(problem.clone()));
        }

        if self.successors(Endpoint::Start).is_empty() {
            return Err(PersonaGraphError::graph("no edge leaves START"));
        }

        let registered = |e: &Endpoint| match e {
            Endpoint::Node(id) => self.nodes.contains_key(id),
            Endpoint::Start | Endpoint::End => true,
        };
        for (from, transitions) in &self.transitions {
            if !registered(from) {
                return Err(PersonaGraphError::graph(format!(
                    "edge out of unregistered node {from}"
                )));
            }
            for to in transitions.iter().flat_map(Transition::possible) {
                if !registered(&to) {
                    return Err(PersonaGraphError::graph(format!(
                        "edge {from} -> {to} targets an unregistered node"
                    )));
                }
            }
        }

        for id in self.nodes.keys() {
            if self.successors(Endpoint::Node(*id)).is_empty() {
                return Err(PersonaGraphError::graph(format!(
                    "node {id} has no outgoing edge"
                )));
            }
        }

        self.check_acyclic()?;

        let reachable = self.reachable();
        for id in self.nodes.keys() {
            if !reachable.contains(&Endpoint::Node(*id)) {
                return Err(PersonaGraphError::graph(format!(
                    "node {id} is unreachable from START"
                )));
            }
        }
        if !reachable.contains(&Endpoint::End) {
            return Err(PersonaGraphError::graph("END is unreachable from START"));
        }

        debug!(nodes = self.nodes.len(), "graph compiled");
        Ok(CompiledGraph {
            nodes: self.nodes,
            transitions: self.transitions,
            options,
        })
    }

    fn successors(&self, from: Endpoint) -> Vec<Endpoint> {
        self.transitions
            .get(&from)
            .into_iter()
            .flatten()
            .flat_map(Transition::possible)
            .collect()
    }

    fn reachable(&self) -> HashSet<Endpoint> {
        let mut seen = HashSet::from([Endpoint::Start]);
        let mut stack = vec![Endpoint::Start];
        while let Some(at) = stack.pop() {
            for next in self.successors(at) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut done = HashSet::new();
        let mut trail = Vec::new();
        let roots = std::iter::once(Endpoint::Start)
            .chain(self.nodes.keys().copied().map(Endpoint::Node));
        for root in roots {
            self.visit(root, &mut done, &mut trail)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        at: Endpoint,
        done: &mut HashSet<Endpoint>,
        trail: &mut Vec<Endpoint>,
    ) -> Result<()> {
        if done.contains(&at) {
            return Ok(());
        }
        if let Some(pos) = trail.iter().position(|e| *e == at) {
            let cycle: Vec<String> = trail[pos..]
                .iter()
                .chain(std::iter::once(&at))
                .map(ToString::to_string)
                .collect();
            return Err(PersonaGraphError::graph(format!(
                "cycle detected: {}",
                cycle.join(" -> ")
            )));
        }

        trail.push(at);
        for next in self.successors(at) {
            self.visit(next, done, trail)?;
        }
        trail.pop();
        done.insert(at);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Final state of a run plus the order nodes completed in.
#[derive(Debug, Clone)]
pub struct Execution {
    pub state: QueryState,
    pub path: Vec<NodeId>,
}

/// A validated graph, ready to run.
pub struct CompiledGraph {
    nodes: BTreeMap<NodeId, Arc<dyn Node>>,
    transitions: HashMap<Endpoint, Vec<Transition>>,
    options: GraphOptions,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl CompiledGraph {
    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Run to completion and return only the final state.
    pub async fn run(&self, initial: QueryState) -> Result<QueryState> {
        Ok(self.invoke(initial).await?.state)
    }

    /// Run to completion.
    #[instrument(skip_all, fields(concurrent = self.options.concurrent_branches))]
    pub async fn invoke(&self, initial: QueryState) -> Result<Execution> {
        let mut state = initial;
        let mut path = Vec::new();
        let mut pending = Vec::new();
        let mut reached_end = false;

        self.fire(Endpoint::Start, &state, &path, &mut pending, &mut reached_end)?;

        while !pending.is_empty() {
            let ready: Vec<NodeId> = pending
                .iter()
                .copied()
                .filter(|id| self.is_ready(*id, &state))
                .collect();

            if ready.is_empty() {
                return Err(self.stalled(&pending, &state));
            }

            let batch = if self.options.concurrent_branches {
                ready
            } else {
                ready[..1].to_vec()
            };
            pending.retain(|id| !batch.contains(id));

            for (id, update) in self.execute(&batch, &state).await? {
                debug!(node = %id, writes = ?update.fields(), "node finished");
                state.merge(update);
                path.push(id);
                self.fire(Endpoint::Node(id), &state, &path, &mut pending, &mut reached_end)?;
            }
        }

        if !reached_end {
            return Err(PersonaGraphError::graph("run stopped before reaching END"));
        }

        info!(path = ?path, "graph run complete");
        Ok(Execution { state, path })
    }

    fn node(&self, id: NodeId) -> Result<&Arc<dyn Node>> {
        self.nodes
            .get(&id)
            .ok_or_else(|| PersonaGraphError::graph(format!("node {id} is not registered")))
    }

    fn is_ready(&self, id: NodeId, state: &QueryState) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|node| node.requires().iter().all(|f| state.has(*f)))
    }

    /// Follow every transition out of `from`, queueing the targets.
    fn fire(
        &self,
        from: Endpoint,
        state: &QueryState,
        done: &[NodeId],
        pending: &mut Vec<NodeId>,
        reached_end: &mut bool,
    ) -> Result<()> {
        for transition in self.transitions.get(&from).into_iter().flatten() {
            let target = match transition {
                Transition::To(to) => *to,
                Transition::Branch { router, targets } => {
                    let chosen = router(state);
                    if !targets.contains(&chosen) {
                        return Err(PersonaGraphError::graph(format!(
                            "router out of {from} picked {chosen}, which is not a declared target"
                        )));
                    }
                    info!(from = %from, to = %chosen, "route selected");
                    Endpoint::Node(chosen)
                }
            };

            match target {
                Endpoint::End => *reached_end = true,
                Endpoint::Start => {}
                Endpoint::Node(id) if done.contains(&id) => {
                    debug!(node = %id, "already ran, trigger ignored");
                }
                Endpoint::Node(id) if pending.contains(&id) => {}
                Endpoint::Node(id) => pending.push(id),
            }
        }
        Ok(())
    }

    /// Run `batch` against one snapshot; updates come back in batch order.
    async fn execute(
        &self,
        batch: &[NodeId],
        state: &QueryState,
    ) -> Result<Vec<(NodeId, StateUpdate)>> {
        if batch.len() == 1 {
            let id = batch[0];
            let update = self
                .node(id)?
                .run(state)
                .instrument(info_span!("node", node = %id))
                .await
                .map_err(|e| node_failed(id, e))?;
            return Ok(vec![(id, update)]);
        }

        let snapshot = Arc::new(state.clone());
        let mut tasks = JoinSet::new();
        for (slot, id) in batch.iter().copied().enumerate() {
            let node = Arc::clone(self.node(id)?);
            let snapshot = Arc::clone(&snapshot);
            tasks.spawn(
                async move { (slot, id, node.run(&snapshot).await) }
                    .instrument(info_span!("node", node = %id)),
            );
        }

        let mut slots: Vec<Option<(NodeId, StateUpdate)>> = vec![None; batch.len()];
        while let Some(joined) = tasks.join_next().await {
            let (slot, id, result) = joined
                .map_err(|e| PersonaGraphError::graph(format!("node task failed: {e}")))?;
            slots[slot] = Some((id, result.map_err(|e| node_failed(id, e))?));
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn stalled(&self, pending: &[NodeId], state: &QueryState) -> PersonaGraphError {
        let waiting: Vec<String> = pending
            .iter()
            .map(|id| {
                let missing: Vec<&str> = self
                    .nodes
                    .get(id)
                    .map(|n| n.requires())
                    .unwrap_or_default()
                    .iter()
                    .filter(|f| !state.has(**f))
                    .map(Field::as_str)
                    .collect();
                format!("{id} waits on {}", missing.join(", "))
            })
            .collect();
        PersonaGraphError::graph(format!("no runnable node: {}", waiting.join("; ")))
    }
}

fn node_failed(id: NodeId, error: PersonaGraphError) -> PersonaGraphError {
    warn!(node = %id, error = %error, "node failed, aborting run");
    error
}
