//! Classification: turn the user's question into a structured record.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use personagraph_rules::canonicalize;
use personagraph_services::LanguageModel;
use personagraph_shared::{
    Classification, ClassificationSource, PersonaGraphError, QueryKind, Result,
};

use crate::graph::Node;
use crate::state::{Field, QueryState, StateUpdate};

const PROMPT_TEMPLATE: &str = r#"Analizá el mensaje del usuario y decidí si pregunta por un hecho (factual), por un evento ubicado en el tiempo (temporal) o por ambos (combinado).

Clasificá el tema en uno de [trabajo, amistad, familia, salud, emociones, ocio, estudios, dinero, viajes, tecnología, deportes, comida, política, entretenimiento, amor] y la emoción en uno de [joy, anger, sadness, surprise, others].

Extraé las habilidades mencionadas. Pueden ser:
- Laborales: python, javascript, react, node, sql, aws, docker, langchain, ai, machine learning, data science, ci/cd, github actions, lambda, apis, backend, metodologia, estadistica, simulacion, drug discovery, multiagente, automatizacion, pipelines, hpc, coordinacion, planificacion, community manager, rag, faiss, pinecone, fluorescencia
- Personales: cocina, musica, deportes, idiomas, fotografia, viajes, lectura, escritura, meditacion, yoga, ciclismo, futbol, guitarra, piano, espanol, ingles, portugues, blogging, podcasting, fotografia digital, edicion de video

Normalizá las habilidades a términos simples:
- "inteligencia artificial", "IA", "AI", "desarrollo de IA" → "ai"
- "machine learning", "ML", "aprendizaje automático" → "machine learning"
- "data science", "ciencia de datos" → "data science"
- "desarrollo web", "web development" → "backend" o "frontend" según corresponda
- "programación", "coding", "desarrollo" → el lenguaje específico mencionado

Detectá además:
1. empresa: empresa mencionada (ej: "Google", "Microsoft", "Acme Corp") o referencia a estudios (ej: "doctorado", "maestría", "universidad"). Si no hay, null.
2. rango_temporal: años o rangos mencionados (ej: "2020-2023", "2019", "últimos 2 años", "hace 5 años"). Si no hay, null.
3. conector_temporal: conector usado, como "antes", "después", "durante", "desde", "hasta", "antes de", "después de", "en", "durante el". Si no hay, null.

Importante:
- Si se menciona un año específico (ej: "en 2020", "durante 2019"), el conector temporal debe ser "durante" o "en".
- Si se menciona "doctorado", "maestría" o "universidad", la empresa debe ser "Universidad de Buenos Aires".

Devolvé SOLO un objeto JSON con esta forma exacta:

{
  "tipo": "factual" | "temporal" | "combinado",
  "topic": "tema",
  "emotion": "emoción",
  "skills": ["skill1", "skill2"],
  "empresa": "nombre_empresa" | null,
  "rango_temporal": "rango_o_año" | null,
  "conector_temporal": "conector" | null
}

Mensaje: "{query}"
"#;

/// Render the extraction prompt for `query`.
pub fn build_prompt(query: &str) -> String {
    PROMPT_TEMPLATE.replace("{query}", query)
}

/// Remove a surrounding Markdown code fence and its language tag, if any.
pub fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.trim_end();
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

/// The outermost `{...}` span, tolerating chatter around the object.
fn object_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default, rename = "tipo", alias = "kind")]
    kind: Option<Value>,
    #[serde(default)]
    topic: Option<Value>,
    #[serde(default)]
    emotion: Option<Value>,
    #[serde(default)]
    skills: Option<Value>,
    #[serde(default, rename = "empresa", alias = "entity")]
    entity: Option<Value>,
    #[serde(default, rename = "rango_temporal", alias = "time_range")]
    time_range: Option<Value>,
    #[serde(default, rename = "conector_temporal", alias = "connector")]
    connector: Option<Value>,
}

/// Loose scalar: strings are trimmed, numbers stringified, `"null"` ignored.
fn text(value: Option<Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match s.to_lowercase().as_str() {
        "" | "null" | "none" => None,
        _ => Some(s),
    }
}

fn skill_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Parse classifier output, fenced or not.
///
/// Missing keys take neutral values; `tipo` defaults to factual.
pub fn parse_classification(raw: &str) -> Result<Classification> {
    let body = object_span(strip_fences(raw));
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PersonaGraphError::parse(format!("classifier output is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(PersonaGraphError::parse("classifier output is not a JSON object"));
    }
    let raw: RawClassification = serde_json::from_value(value)
        .map_err(|e| PersonaGraphError::parse(format!("unexpected classifier output: {e}")))?;

    Ok(Classification {
        kind: text(raw.kind)
            .map(|k| QueryKind::from_label(&k))
            .unwrap_or_default(),
        topic: text(raw.topic).unwrap_or_default(),
        emotion: text(raw.emotion).unwrap_or_default(),
        skills: canonicalize(skill_list(raw.skills)),
        entity: text(raw.entity),
        time_range: text(raw.time_range),
        connector: text(raw.connector),
        source: ClassificationSource::Model,
    })
}

/// Classification node. Never fails: unreadable or missing model output
/// yields [`Classification::fallback`].
pub struct ClassificationStage {
    model: Arc<dyn LanguageModel>,
}

impl ClassificationStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    async fn classify(&self, query: &str) -> Classification {
        let raw = match self.model.complete(&build_prompt(query)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "classifier unavailable, using fallback");
                return Classification::fallback();
            }
        };
        parse_classification(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "classifier output unreadable, using fallback");
            Classification::fallback()
        })
    }
}

#[async_trait]
impl Node for ClassificationStage {
    fn requires(&self) -> &'static [Field] {
        &[Field::Conversation]
    }

    #[instrument(skip_all, name = "classify")]
    async fn run(&self, state: &QueryState) -> Result<StateUpdate> {
        let classification = match state.latest_user_message() {
            Some(query) => self.classify(query).await,
            None => {
                warn!("no user message to classify");
                Classification::fallback()
            }
        };

        info!(
            kind = %classification.kind,
            entity = ?classification.entity,
            connector = ?classification.connector,
            time_range = ?classification.time_range,
            skills = ?classification.skills,
            source = ?classification.source,
            "question classified"
        );
        Ok(StateUpdate::classification(classification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personagraph_services::testing::{Reply, ScriptedModel, Unavailable};

    const BODY: &str = r#"{"tipo": "temporal", "topic": "trabajo", "emotion": "others",
        "skills": ["IA", "Inteligencia Artificial", "Python"], "empresa": "Acme",
        "rango_temporal": null, "conector_temporal": "antes"}"#;

    #[test]
    fn fenced_output_parses_like_plain_output() {
        let plain = parse_classification(BODY).unwrap();
        let fenced = parse_classification(&format!("```json\n{BODY}\n```")).unwrap();
        let bare_fence = parse_classification(&format!("```\n{BODY}\n```")).unwrap();

        assert_eq!(plain, fenced);
        assert_eq!(plain, bare_fence);
        assert_eq!(plain.kind, QueryKind::Temporal);
        assert_eq!(plain.skills, vec!["ai", "python"]);
        assert_eq!(plain.entity.as_deref(), Some("Acme"));
        assert_eq!(plain.connector.as_deref(), Some("antes"));
        assert_eq!(plain.time_range, None);
        assert_eq!(plain.source, ClassificationSource::Model);
    }

    #[test]
    fn strip_fences_leaves_plain_text_alone() {
        assert_eq!(strip_fences("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_fences("```JSON\n{}\n```"), "{}");
    }

    #[test]
    fn tolerates_chatter_and_loose_scalars() {
        let raw = r#"Claro, acá va: {"kind": "factual", "entity": "null", "time_range": 2020, "skills": "ml, ia"} ¡Listo!"#;
        let c = parse_classification(raw).unwrap();
        assert_eq!(c.kind, QueryKind::Factual);
        assert_eq!(c.entity, None);
        assert_eq!(c.time_range.as_deref(), Some("2020"));
        assert_eq!(c.skills, vec!["machine learning", "ai"]);
    }

    #[test]
    fn missing_kind_defaults_to_factual() {
        let c = parse_classification(r#"{"topic": "ocio"}"#).unwrap();
        assert_eq!(c.kind, QueryKind::Factual);
        assert_eq!(c.topic, "ocio");
        assert!(c.skills.is_empty());
    }

    #[test]
    fn combinado_label_maps_to_combined() {
        let c = parse_classification(r#"{"tipo": "combinado"}"#).unwrap();
        assert_eq!(c.kind, QueryKind::Combined);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_classification("no sé").is_err());
        assert!(parse_classification("[1, 2]").is_err());
        assert!(parse_classification("```json\n{\"tipo\": \n```").is_err());
    }

    #[test]
    fn prompt_embeds_question() {
        let prompt = build_prompt("¿Qué hiciste en Acme?");
        assert!(prompt.contains("Mensaje: \"¿Qué hiciste en Acme?\""));
        assert!(prompt.contains("\"conector_temporal\""));
        assert!(prompt.contains("el conector temporal debe ser \"durante\" o \"en\""));
        assert!(prompt.contains("la empresa debe ser \"Universidad de Buenos Aires\""));
        assert!(prompt.contains("github actions"));
        assert!(prompt.contains("\"ML\", \"aprendizaje automático\" → \"machine learning\""));
        assert!(prompt.contains("\"últimos 2 años\""));
    }

    #[tokio::test]
    async fn stage_writes_model_classification() {
        let model = Arc::new(ScriptedModel::new(Reply::Text(format!("```json\n{BODY}\n```"))));
        let stage = ClassificationStage::new(model.clone());
        let update = stage.run(&QueryState::new("¿Qué hiciste en Acme antes?")).await.unwrap();

        let c = update.classification.unwrap();
        assert_eq!(c.kind, QueryKind::Temporal);
        assert!(model.prompts()[0].contains("¿Qué hiciste en Acme antes?"));
    }

    #[tokio::test]
    async fn malformed_output_falls_back() {
        let model = Arc::new(ScriptedModel::new(Reply::Text("lo siento, no puedo".into())));
        let update = ClassificationStage::new(model)
            .run(&QueryState::new("hola"))
            .await
            .unwrap();
        assert_eq!(update.classification, Some(Classification::fallback()));
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let update = ClassificationStage::new(Arc::new(Unavailable("down".into())))
            .run(&QueryState::new("hola"))
            .await
            .unwrap();
        let c = update.classification.unwrap();
        assert_eq!(c.source, ClassificationSource::Fallback);
        assert_eq!(c.kind, QueryKind::Unknown);
    }
}
