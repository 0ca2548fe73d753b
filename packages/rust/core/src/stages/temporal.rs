//! Temporal lookup: dated experience records narrowed by the question's
//! connector, reference year and entity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use personagraph_rules::filter_experiences;
use personagraph_services::ExperienceSource;
use personagraph_shared::{
    ContextStatus, ExperienceRecord, QueryKind, Result, TemporalContext,
};

use super::RELEVANT_EXPERIENCE_HEADER;
use crate::graph::Node;
use crate::state::{Field, QueryState, StateUpdate};

/// Summary used when nothing survives the filter or the data is unreadable.
pub const NO_EXPERIENCE_FOUND: &str = "No se encontró experiencia laboral relevante.";

/// Skills listed per record in the summary.
const SKILLS_PER_RECORD: usize = 3;

/// Header line, then one bullet per record: `- Acme (Engineer, 2018-2021): python, ai`.
pub fn format_records(records: &[ExperienceRecord]) -> String {
    let mut lines = vec![RELEVANT_EXPERIENCE_HEADER.to_string()];
    lines.extend(records.iter().map(|r| {
        let skills: Vec<&str> = r
            .skills
            .iter()
            .take(SKILLS_PER_RECORD)
            .map(String::as_str)
            .collect();
        format!("- {} ({}, {}): {}", r.entity, r.role, r.period, skills.join(", "))
    }));
    lines.join("\n")
}

fn not_found(status: ContextStatus) -> TemporalContext {
    TemporalContext {
        status,
        summary: NO_EXPERIENCE_FOUND.to_string(),
        records: Vec::new(),
    }
}

pub struct TemporalLookupStage {
    source: Arc<dyn ExperienceSource>,
}

impl TemporalLookupStage {
    pub fn new(source: Arc<dyn ExperienceSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Node for TemporalLookupStage {
    fn requires(&self) -> &'static [Field] {
        &[Field::Classification]
    }

    #[instrument(skip_all, name = "temporal_lookup")]
    async fn run(&self, state: &QueryState) -> Result<StateUpdate> {
        let Some(classification) = state
            .classification
            .as_ref()
            .filter(|c| c.kind == QueryKind::Temporal)
        else {
            debug!("question is not temporal, skipping lookup");
            return Ok(StateUpdate::temporal_context(TemporalContext::not_applicable()));
        };

        let records = match self.source.load_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "experience records unavailable");
                return Ok(StateUpdate::temporal_context(not_found(
                    ContextStatus::Unavailable,
                )));
            }
        };

        let kept: Vec<ExperienceRecord> = filter_experiences(
            &records,
            classification.connector.as_deref(),
            classification.time_range.as_deref(),
            classification.entity.as_deref(),
        )
        .into_iter()
        .cloned()
        .collect();

        info!(total = records.len(), kept = kept.len(), "temporal lookup done");

        let context = if kept.is_empty() {
            not_found(ContextStatus::NoMatches)
        } else {
            TemporalContext {
                status: ContextStatus::Found,
                summary: format_records(&kept),
                records: kept,
            }
        };
        Ok(StateUpdate::temporal_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personagraph_services::testing::{StaticExperiences, Unavailable};
    use personagraph_shared::Classification;

    fn acme_records() -> Vec<ExperienceRecord> {
        vec![
            ExperienceRecord::new("Acme", "Data Scientist", "2018-2021")
                .with_skills(["python", "ai", "sql", "docker"]),
            ExperienceRecord::new("Acme", "ML Lead", "2021-2023").with_skills(["ml"]),
        ]
    }

    fn temporal_state(connector: Option<&str>, range: Option<&str>, entity: Option<&str>) -> QueryState {
        let mut state = QueryState::new("¿Qué hiciste en Acme antes de 2021?");
        state.classification = Some(Classification {
            kind: QueryKind::Temporal,
            entity: entity.map(String::from),
            time_range: range.map(String::from),
            connector: connector.map(String::from),
            ..Default::default()
        });
        state
    }

    #[tokio::test]
    async fn entity_anchored_before_keeps_earlier_record() {
        let source = Arc::new(StaticExperiences::new(acme_records()));
        let stage = TemporalLookupStage::new(source.clone());
        let update = stage
            .run(&temporal_state(Some("before"), None, Some("Acme")))
            .await
            .unwrap();

        let context = update.temporal_context.unwrap();
        assert_eq!(context.status, ContextStatus::Found);
        assert_eq!(context.records.len(), 1);
        assert_eq!(context.records[0].period, "2018-2021");
        assert_eq!(
            context.summary,
            "Experiencias laborales relevantes:\n\
             - Acme (Data Scientist, 2018-2021): python, ai, sql"
        );
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn non_temporal_question_is_not_applicable() {
        let source = Arc::new(StaticExperiences::new(acme_records()));
        let mut state = temporal_state(Some("before"), None, Some("Acme"));
        if let Some(c) = state.classification.as_mut() {
            c.kind = QueryKind::Factual;
        }

        let update = TemporalLookupStage::new(source.clone()).run(&state).await.unwrap();
        assert_eq!(update.temporal_context, Some(TemporalContext::not_applicable()));
        assert_eq!(source.loads(), 0);
    }

    #[tokio::test]
    async fn nothing_kept_reports_not_found() {
        let source = Arc::new(StaticExperiences::new(acme_records()));
        let update = TemporalLookupStage::new(source)
            .run(&temporal_state(Some("antes"), Some("2010"), None))
            .await
            .unwrap();
        let context = update.temporal_context.unwrap();
        assert_eq!(context.status, ContextStatus::NoMatches);
        assert_eq!(context.summary, NO_EXPERIENCE_FOUND);
    }

    #[tokio::test]
    async fn missing_connector_lists_everything() {
        let source = Arc::new(StaticExperiences::new(acme_records()));
        let update = TemporalLookupStage::new(source)
            .run(&temporal_state(None, Some("2020"), None))
            .await
            .unwrap();
        assert_eq!(update.temporal_context.unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_source_degrades() {
        let update = TemporalLookupStage::new(Arc::new(Unavailable("gone".into())))
            .run(&temporal_state(Some("before"), Some("2020"), None))
            .await
            .unwrap();
        let context = update.temporal_context.unwrap();
        assert_eq!(context.status, ContextStatus::Unavailable);
        assert_eq!(context.summary, NO_EXPERIENCE_FOUND);
    }
}
