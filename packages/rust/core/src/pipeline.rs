//! End-to-end question answering: question → graph run → grounded answer.

use std::sync::Arc;

use tracing::{field, info, instrument};

use personagraph_services::{
    ChatCompletionsClient, Embedder, EmbeddingsClient, ExperienceSource, JsonExperienceFile,
    JsonToneExamples, LanguageModel, OpenAiOptions, PineconeIndex, ToneExamples, VectorSearch,
};
use personagraph_shared::{
    AppConfig, Classification, PersonaGraphError, QueryKind, Result, RunId, validate_api_key,
};

use crate::graph::{CompiledGraph, Endpoint, Execution, GraphBuilder, GraphOptions, NodeId};
use crate::stages::{
    ClassificationStage, DECLINE_MESSAGE, DEFAULT_TOP_K, FactualLookupStage, SynthesisStage,
    TemporalLookupStage, ToneSelectionStage,
};
use crate::state::QueryState;

/// The external collaborators a run needs.
#[derive(Clone)]
pub struct Services {
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub search: Arc<dyn VectorSearch>,
    pub experiences: Arc<dyn ExperienceSource>,
    pub tone_examples: Arc<dyn ToneExamples>,
}

impl Services {
    /// Hosted adapters configured from `config`. Fails when a key is missing.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let keys = validate_api_key(config)?;
        let timeout = config.llm.timeout_secs;

        let model = ChatCompletionsClient::new(
            OpenAiOptions::from_llm_config(&config.llm, keys.llm),
            config.llm.temperature,
        )?;
        let embedder = EmbeddingsClient::new(OpenAiOptions::from_embeddings_config(
            &config.embeddings,
            keys.embeddings,
            timeout,
        ))?;
        let search = PineconeIndex::from_config(&config.vector, keys.vector, timeout)?;

        Ok(Self {
            model: Arc::new(model),
            embedder: Arc::new(embedder),
            search: Arc::new(search),
            experiences: Arc::new(JsonExperienceFile::new(&config.data.experience_path)),
            tone_examples: Arc::new(JsonToneExamples::with_seed(
                &config.data.tone_examples_path,
                config.tone.seed,
            )),
        })
    }
}

/// Tunables for the standard graph.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub tone_label: String,
    pub examples_per_prompt: usize,
    pub graph: GraphOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: if config.vector.top_k == 0 {
                DEFAULT_TOP_K
            } else {
                config.vector.top_k
            },
            tone_label: config.tone.label.clone(),
            examples_per_prompt: config.tone.examples_per_prompt,
            graph: GraphOptions {
                concurrent_branches: config.graph.concurrent_branches,
            },
        }
    }
}

/// Temporal questions take the temporal lookup first; everything else goes
/// straight to the factual lookup.
pub fn route_after_classification(state: &QueryState) -> NodeId {
    let kind = state
        .classification
        .as_ref()
        .map(|c| c.kind)
        .unwrap_or_default();
    match kind {
        QueryKind::Temporal => NodeId::TemporalLookup,
        QueryKind::Factual | QueryKind::Combined | QueryKind::Unknown => NodeId::FactualLookup,
    }
}

/// The standard five-node graph.
///
/// ```text
/// START ─┬─> classification ─┬─> temporal_lookup ─> factual_lookup ─┐
///        │                   └──────────────────────> factual_lookup ─┤
///        └─> tone_selection ──────────────────────────────────────────┴─> synthesis ─> END
/// ```
pub fn build_graph(services: &Services, options: &PipelineOptions) -> Result<CompiledGraph> {
    GraphBuilder::new()
        .add_node(
            NodeId::Classification,
            ClassificationStage::new(Arc::clone(&services.model)),
        )
        .add_node(
            NodeId::TemporalLookup,
            TemporalLookupStage::new(Arc::clone(&services.experiences)),
        )
        .add_node(
            NodeId::FactualLookup,
            FactualLookupStage::new(
                Arc::clone(&services.embedder),
                Arc::clone(&services.search),
                options.top_k,
            ),
        )
        .add_node(
            NodeId::ToneSelection,
            ToneSelectionStage::new(
                Arc::clone(&services.tone_examples),
                options.tone_label.clone(),
                options.examples_per_prompt,
            ),
        )
        .add_node(NodeId::Synthesis, SynthesisStage::new(Arc::clone(&services.model)))
        .add_edge(Endpoint::Start, NodeId::Classification)
        .add_edge(Endpoint::Start, NodeId::ToneSelection)
        .add_conditional_edges(
            NodeId::Classification,
            route_after_classification,
            [NodeId::TemporalLookup, NodeId::FactualLookup],
        )
        .add_edge(NodeId::TemporalLookup, NodeId::FactualLookup)
        .add_edge(NodeId::ToneSelection, NodeId::Synthesis)
        .add_edge(NodeId::FactualLookup, NodeId::Synthesis)
        .add_edge(NodeId::Synthesis, Endpoint::End)
        .compile(options.graph)
}

/// Result of [`Assistant::answer`].
#[derive(Debug, Clone)]
pub struct Answer {
    pub run_id: RunId,
    pub text: String,
    pub classification: Option<Classification>,
    /// Nodes in completion order.
    pub path: Vec<NodeId>,
}

/// Compiled graph plus its services; answers one question per call.
#[derive(Debug)]
pub struct Assistant {
    graph: CompiledGraph,
}

impl Assistant {
    pub fn new(services: Services, options: PipelineOptions) -> Result<Self> {
        let graph = build_graph(&services, &options)?;
        Ok(Self { graph })
    }

    /// Hosted services and options from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(Services::from_config(config)?, PipelineOptions::from(config))
    }

    /// Answer `query` with a fresh state.
    ///
    /// Only an empty question or a broken graph surface as errors; service
    /// trouble shows up as a degraded answer instead.
    #[instrument(skip_all, fields(run_id = field::Empty))]
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PersonaGraphError::invalid_query("question is empty"));
        }

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", field::display(run_id));
        info!(query_len = query.len(), "run started");

        let Execution { state, path } = self.graph.invoke(QueryState::new(query)).await?;
        let text = state
            .answer
            .unwrap_or_else(|| DECLINE_MESSAGE.to_string());

        info!(path = ?path, "run finished");
        Ok(Answer {
            run_id,
            text,
            classification: state.classification,
            path,
        })
    }
}
