//! Factual lookup: semantic search over the per-skill experience index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use personagraph_services::{Embedder, SearchFilter, VectorMatch, VectorSearch};
use personagraph_shared::{ContextStatus, FactualContext, FactualMatch, Result};

use super::RELEVANT_EXPERIENCE_HEADER;
use crate::graph::Node;
use crate::state::{Field, QueryState, StateUpdate};

/// Summary used on zero matches or a failed lookup.
pub const NO_RELEVANT_EXPERIENCE: &str =
    "No hay experiencia relevante registrada para esta pregunta.";

/// Default number of matches requested from the index.
pub const DEFAULT_TOP_K: usize = 10;

fn to_fact(m: VectorMatch) -> FactualMatch {
    FactualMatch {
        entity: m.metadata.entity,
        role: m.metadata.role,
        period: m.metadata.period,
        skill: m.metadata.skill,
        score: m.score,
    }
}

/// Header line, then `- Acme (Engineer, 2018-2021): python (relevancia: 0.87)` per match.
pub fn format_matches(matches: &[FactualMatch]) -> String {
    let mut lines = vec![RELEVANT_EXPERIENCE_HEADER.to_string()];
    lines.extend(matches.iter().map(|m| {
        format!(
            "- {} ({}, {}): {} (relevancia: {:.2})",
            m.entity, m.role, m.period, m.skill, m.score
        )
    }));
    lines.join("\n")
}

fn no_relevant(status: ContextStatus) -> FactualContext {
    FactualContext {
        status,
        summary: NO_RELEVANT_EXPERIENCE.to_string(),
        matches: Vec::new(),
    }
}

pub struct FactualLookupStage {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn VectorSearch>,
    top_k: usize,
}

impl FactualLookupStage {
    pub fn new(embedder: Arc<dyn Embedder>, search: Arc<dyn VectorSearch>, top_k: usize) -> Self {
        Self {
            embedder,
            search,
            top_k,
        }
    }

    async fn lookup(&self, query: &str, filter: Option<&SearchFilter>) -> Result<Vec<VectorMatch>> {
        let embedding = self.embedder.embed(query).await?;
        self.search.search(&embedding, self.top_k, filter).await
    }
}

#[async_trait]
impl Node for FactualLookupStage {
    fn requires(&self) -> &'static [Field] {
        &[Field::Conversation, Field::Classification]
    }

    #[instrument(skip_all, name = "factual_lookup", fields(top_k = self.top_k))]
    async fn run(&self, state: &QueryState) -> Result<StateUpdate> {
        let query = state.latest_user_message().unwrap_or_default();
        let filter = state
            .classification
            .as_ref()
            .and_then(|c| SearchFilter::build(c.entity.as_deref(), &c.skills));

        let context = match self.lookup(query, filter.as_ref()).await {
            Ok(found) if found.is_empty() => {
                info!(filtered = filter.is_some(), "no factual matches");
                no_relevant(ContextStatus::NoMatches)
            }
            Ok(found) => {
                let matches: Vec<FactualMatch> = found.into_iter().map(to_fact).collect();
                info!(matches = matches.len(), filtered = filter.is_some(), "factual lookup done");
                FactualContext {
                    status: ContextStatus::Found,
                    summary: format_matches(&matches),
                    matches,
                }
            }
            Err(e) => {
                warn!(error = %e, "factual lookup failed");
                no_relevant(ContextStatus::Unavailable)
            }
        };

        Ok(StateUpdate::factual_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personagraph_services::FactMetadata;
    use personagraph_services::testing::{StaticEmbedder, StaticMatches, Unavailable};
    use personagraph_shared::Classification;

    fn hit(id: &str, skill: &str, score: f32) -> VectorMatch {
        VectorMatch {
            id: id.into(),
            score,
            metadata: FactMetadata {
                entity: "Acme".into(),
                role: "Data Scientist".into(),
                period: "2018-2021".into(),
                skill: skill.into(),
            },
        }
    }

    fn classified_state(entity: Option<&str>, skills: &[&str]) -> QueryState {
        let mut state = QueryState::new("¿Usaste Python en Acme?");
        state.classification = Some(Classification {
            entity: entity.map(String::from),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        state
    }

    #[tokio::test]
    async fn formats_matches_and_passes_filter() {
        let search = Arc::new(StaticMatches::new(vec![
            hit("a", "python", 0.874),
            hit("b", "sql", 0.5),
        ]));
        let stage = FactualLookupStage::new(
            Arc::new(StaticEmbedder(vec![0.1, 0.2])),
            search.clone(),
            DEFAULT_TOP_K,
        );

        let update = stage
            .run(&classified_state(Some("Acme"), &["python"]))
            .await
            .unwrap();
        let context = update.factual_context.unwrap();

        assert_eq!(context.status, ContextStatus::Found);
        assert_eq!(
            context.summary,
            "Experiencias laborales relevantes:\n\
             - Acme (Data Scientist, 2018-2021): python (relevancia: 0.87)\n\
             - Acme (Data Scientist, 2018-2021): sql (relevancia: 0.50)"
        );
        assert_eq!(
            search.requests(),
            vec![(
                10,
                Some(SearchFilter {
                    entity: Some("Acme".into()),
                    skills: vec!["python".into()],
                })
            )]
        );
    }

    #[tokio::test]
    async fn unfiltered_when_classification_is_empty() {
        let search = Arc::new(StaticMatches::new(vec![hit("a", "python", 0.9)]));
        let stage = FactualLookupStage::new(Arc::new(StaticEmbedder(vec![1.0])), search.clone(), 3);
        stage.run(&classified_state(None, &[])).await.unwrap();
        assert_eq!(search.requests(), vec![(3, None)]);
    }

    #[tokio::test]
    async fn zero_matches_is_explicit() {
        let stage = FactualLookupStage::new(
            Arc::new(StaticEmbedder(vec![1.0])),
            Arc::new(StaticMatches::new(Vec::new())),
            DEFAULT_TOP_K,
        );
        let context = stage
            .run(&classified_state(None, &[]))
            .await
            .unwrap()
            .factual_context
            .unwrap();
        assert_eq!(context.status, ContextStatus::NoMatches);
        assert_eq!(context.summary, NO_RELEVANT_EXPERIENCE);
        assert!(context.matches.is_empty());
    }

    #[tokio::test]
    async fn service_failure_degrades() {
        let down = Arc::new(Unavailable("timeout".into()));
        let stage = FactualLookupStage::new(down.clone(), down, DEFAULT_TOP_K);
        let context = stage
            .run(&classified_state(Some("Acme"), &[]))
            .await
            .unwrap()
            .factual_context
            .unwrap();
        assert_eq!(context.status, ContextStatus::Unavailable);
        assert_eq!(context.summary, NO_RELEVANT_EXPERIENCE);
    }
}
