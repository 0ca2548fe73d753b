//! Synthesis: the grounded, in-character answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use personagraph_services::LanguageModel;
use personagraph_shared::Result;

use crate::graph::Node;
use crate::state::{Field, QueryState, StateUpdate};

/// Answer given when the model cannot be reached or returns nothing.
pub const DECLINE_MESSAGE: &str =
    "Perdón, en este momento no puedo responder esa pregunta. ¿Probamos de nuevo en un rato?";

const NOT_APPLICABLE: &str = "(no aplica)";

const TRAIT_GUIDE: &str = "\
- openness (apertura): curiosidad y gusto por ideas nuevas.
- conscientiousness (responsabilidad): orden, foco y cumplimiento.
- extraversion (extraversión): energía social y expresividad.
- agreeableness (amabilidad): calidez y disposición a cooperar.
- neuroticism (neuroticismo): sensibilidad emocional y tendencia a preocuparse.";

const RULES: &str = "\
1. Usá solo la información provista arriba.
2. Si no hay información relevante, decí con amabilidad que no podés responder.
3. No inventes datos, fechas ni empresas.
4. Mantené el estilo de los ejemplos.
5. Ajustá el tono a los rasgos de personalidad.
6. No contestes en neutral: contestá como argentino, pero sin lunfardo.";

fn or_not_applicable(text: Option<&str>) -> &str {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(NOT_APPLICABLE)
}

/// Assemble the answer prompt from everything the run has gathered.
pub fn build_prompt(state: &QueryState) -> String {
    let question = state.latest_user_message().unwrap_or_default();
    let factual = or_not_applicable(state.factual_context.as_ref().map(|c| c.summary.as_str()));
    let temporal = or_not_applicable(state.temporal_context.as_ref().map(|c| c.summary.as_str()));

    let (label, example, traits) = match &state.tone {
        Some(tone) => (tone.label.as_str(), tone.example.as_str(), tone.traits.to_string()),
        None => (NOT_APPLICABLE, NOT_APPLICABLE, NOT_APPLICABLE.to_string()),
    };

    format!(
        "Respondé como {label}.\n\n\
         Pregunta: {question}\n\n\
         Información factual:\n{factual}\n\n\
         Información temporal:\n{temporal}\n\n\
         Ejemplos de estilo:\n{example}\n\n\
         Rasgos de personalidad (de 0 a 1):\n{TRAIT_GUIDE}\n\
         Valores: {traits}\n\n\
         Reglas:\n{RULES}\n"
    )
}

pub struct SynthesisStage {
    model: Arc<dyn LanguageModel>,
}

impl SynthesisStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for SynthesisStage {
    fn requires(&self) -> &'static [Field] {
        &[Field::Conversation, Field::FactualContext, Field::Tone]
    }

    #[instrument(skip_all, name = "synthesis")]
    async fn run(&self, state: &QueryState) -> Result<StateUpdate> {
        let answer = match self.model.complete(&build_prompt(state)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("model returned an empty answer, declining");
                DECLINE_MESSAGE.to_string()
            }
            Err(e) => {
                warn!(error = %e, "answer generation failed, declining");
                DECLINE_MESSAGE.to_string()
            }
        };

        info!(answer_len = answer.len(), "answer synthesized");
        Ok(StateUpdate::answer(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personagraph_services::testing::{Reply, ScriptedModel, Unavailable};
    use personagraph_shared::{
        ContextStatus, ExampleOrigin, FactualContext, Role, ToneProfile, TraitVector,
    };

    fn ready_state() -> QueryState {
        let mut state = QueryState::new("¿Qué hiciste en Acme?");
        state.factual_context = Some(FactualContext {
            status: ContextStatus::Found,
            summary: "- Acme (Data Scientist, 2018-2021): python (relevancia: 0.91)".into(),
            matches: Vec::new(),
        });
        state.tone = Some(ToneProfile {
            label: "Nico, average tone".into(),
            example: "¡Hola!".into(),
            traits: TraitVector::AVERAGE,
            origin: ExampleOrigin::BuiltIn,
        });
        state
    }

    #[test]
    fn prompt_carries_every_context_field() {
        let prompt = build_prompt(&ready_state());
        assert!(prompt.contains("Respondé como Nico, average tone."));
        assert!(prompt.contains("Pregunta: ¿Qué hiciste en Acme?"));
        assert!(prompt.contains("python (relevancia: 0.91)"));
        assert!(prompt.contains("Información temporal:\n(no aplica)"));
        assert!(prompt.contains("Valores: {openness: 0.566"));
        assert!(prompt.contains("No inventes datos"));
        assert!(prompt.contains("como argentino, pero sin lunfardo"));
    }

    #[tokio::test]
    async fn answer_is_trimmed_and_appended_to_conversation() {
        let model = Arc::new(ScriptedModel::new(Reply::Text("  En Acme trabajé con Python.\n".into())));
        let update = SynthesisStage::new(model).run(&ready_state()).await.unwrap();

        assert_eq!(update.answer.as_deref(), Some("En Acme trabajé con Python."));
        assert_eq!(update.conversation.len(), 1);
        assert_eq!(update.conversation[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn model_failure_declines_politely() {
        let update = SynthesisStage::new(Arc::new(Unavailable("500".into())))
            .run(&ready_state())
            .await
            .unwrap();
        assert_eq!(update.answer.as_deref(), Some(DECLINE_MESSAGE));
    }

    #[tokio::test]
    async fn blank_answer_declines() {
        let model = Arc::new(ScriptedModel::new(Reply::Text("   ".into())));
        let update = SynthesisStage::new(model).run(&ready_state()).await.unwrap();
        assert_eq!(update.answer.as_deref(), Some(DECLINE_MESSAGE));
    }
}
