//! Core domain types threaded through the query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PersonaGraphError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one query run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the append-only conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What kind of question the classifier thinks it is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Factual,
    Temporal,
    Combined,
    Unknown,
}

impl QueryKind {
    /// Map a classifier label (Spanish or English) to a kind.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "factual" => Self::Factual,
            "temporal" => Self::Temporal,
            "combined" | "combinado" => Self::Combined,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Temporal => "temporal",
            Self::Combined => "combined",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a classification came from the model or from the neutral fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    #[default]
    Model,
    Fallback,
}

/// Structured reading of the user's question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub kind: QueryKind,
    pub topic: String,
    pub emotion: String,
    /// Canonical skill identifiers, first-occurrence order.
    pub skills: Vec<String>,
    /// Company or institution named in the question.
    pub entity: Option<String>,
    /// Raw year or year range, e.g. `"2020"` or `"2017-2019"`.
    pub time_range: Option<String>,
    /// Temporal connective word, e.g. `"antes"`.
    pub connector: Option<String>,
    pub source: ClassificationSource,
}

impl Classification {
    /// Neutral record used when the classifier output cannot be read.
    pub fn fallback() -> Self {
        Self {
            kind: QueryKind::Unknown,
            source: ClassificationSource::Fallback,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// ExperienceRecord
// ---------------------------------------------------------------------------

/// A dated work or study experience. Input to the temporal filter, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    #[serde(default, alias = "empresa")]
    pub entity: String,
    #[serde(default, alias = "rol")]
    pub role: String,
    /// Raw period, e.g. `"2019 – 2024"`, `"2020"`, `"2018 – Present"`.
    #[serde(default, alias = "periodo")]
    pub period: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl ExperienceRecord {
    pub fn new(entity: impl Into<String>, role: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            role: role.into(),
            period: period.into(),
            skills: Vec::new(),
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Grounding contexts
// ---------------------------------------------------------------------------

/// Outcome of a lookup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// Matching records were found.
    Found,
    /// The stage does not apply to this question.
    NotApplicable,
    /// The lookup worked but nothing matched.
    NoMatches,
    /// The backing service or data source failed.
    Unavailable,
}

/// Output of the temporal lookup stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub status: ContextStatus,
    /// Empty string means "not applicable".
    pub summary: String,
    pub records: Vec<ExperienceRecord>,
}

impl TemporalContext {
    pub fn not_applicable() -> Self {
        Self {
            status: ContextStatus::NotApplicable,
            summary: String::new(),
            records: Vec::new(),
        }
    }
}

/// A single vector-search hit, flattened for prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactualMatch {
    pub entity: String,
    pub role: String,
    pub period: String,
    pub skill: String,
    pub score: f32,
}

/// Output of the factual lookup stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactualContext {
    pub status: ContextStatus,
    pub summary: String,
    pub matches: Vec<FactualMatch>,
}

// ---------------------------------------------------------------------------
// Tone
// ---------------------------------------------------------------------------

/// Five-factor personality profile, every component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitVector {
    pub openness: f32,
    pub conscientiousness: f32,
    pub extraversion: f32,
    pub agreeableness: f32,
    pub neuroticism: f32,
}

impl TraitVector {
    /// Averaged profile measured over the conversation corpus.
    pub const AVERAGE: Self = Self {
        openness: 0.566,
        conscientiousness: 0.505,
        extraversion: 0.494,
        agreeableness: 0.366,
        neuroticism: 0.598,
    };

    /// Build a vector, rejecting components outside `[0, 1]`.
    pub fn new(
        openness: f32,
        conscientiousness: f32,
        extraversion: f32,
        agreeableness: f32,
        neuroticism: f32,
    ) -> Result<Self> {
        let v = Self {
            openness,
            conscientiousness,
            extraversion,
            agreeableness,
            neuroticism,
        };
        for (name, value) in v.components() {
            if !(0.0..=1.0).contains(&value) {
                return Err(PersonaGraphError::validation(format!(
                    "trait {name} = {value} is outside [0, 1]"
                )));
            }
        }
        Ok(v)
    }

    /// Named components in OCEAN order.
    pub fn components(&self) -> [(&'static str, f32); 5] {
        [
            ("openness", self.openness),
            ("conscientiousness", self.conscientiousness),
            ("extraversion", self.extraversion),
            ("agreeableness", self.agreeableness),
            ("neuroticism", self.neuroticism),
        ]
    }
}

impl std::fmt::Display for TraitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .components()
            .iter()
            .map(|(name, value)| format!("{name}: {value:.3}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Where the tone example text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleOrigin {
    Sampled,
    BuiltIn,
}

/// Output of the tone selection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneProfile {
    pub label: String,
    pub example: String,
    pub traits: TraitVector,
    pub origin: ExampleOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_kind_labels() {
        assert_eq!(QueryKind::from_label("temporal"), QueryKind::Temporal);
        assert_eq!(QueryKind::from_label(" Factual "), QueryKind::Factual);
        assert_eq!(QueryKind::from_label("combinado"), QueryKind::Combined);
        assert_eq!(QueryKind::from_label("combined"), QueryKind::Combined);
        assert_eq!(QueryKind::from_label("¿?"), QueryKind::Unknown);
        assert_eq!(QueryKind::default(), QueryKind::Factual);
    }

    #[test]
    fn experience_record_accepts_spanish_keys() {
        let json = r#"{"empresa":"Acme","rol":"Data Scientist","periodo":"2018 – 2021","skills":["python"]}"#;
        let record: ExperienceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.entity, "Acme");
        assert_eq!(record.role, "Data Scientist");
        assert_eq!(record.period, "2018 – 2021");
        assert_eq!(record.skills, vec!["python"]);
    }

    #[test]
    fn trait_vector_rejects_out_of_range() {
        assert!(TraitVector::new(0.1, 0.2, 0.3, 0.4, 0.5).is_ok());
        let err = TraitVector::new(0.1, 1.2, 0.3, 0.4, 0.5).unwrap_err();
        assert!(err.to_string().contains("conscientiousness"));
    }

    #[test]
    fn trait_vector_display() {
        let shown = TraitVector::AVERAGE.to_string();
        assert!(shown.starts_with("{openness: 0.566"));
        assert!(shown.contains("neuroticism: 0.598"));
    }

    #[test]
    fn fallback_classification_is_neutral() {
        let c = Classification::fallback();
        assert_eq!(c.kind, QueryKind::Unknown);
        assert!(c.skills.is_empty());
        assert!(c.entity.is_none());
        assert_eq!(c.source, ClassificationSource::Fallback);
    }
}
