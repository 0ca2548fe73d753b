//! Vector search over the factual index.
//!
//! Index entries are one vector per (experience, skill) pair, with metadata
//! stored under Spanish keys (`empresa`, `rol`, `periodo`, `skill`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use personagraph_shared::{PersonaGraphError, Result, VectorConfig};

use crate::VectorSearch;

/// Metadata key for the company/institution.
const ENTITY_KEY: &str = "empresa";
/// Metadata key for the single skill an entry was embedded for.
const SKILL_KEY: &str = "skill";

/// Pinned data-plane API version.
const PINECONE_API_VERSION: &str = "2024-07";

/// Metadata attached to each indexed vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactMetadata {
    #[serde(default, rename = "empresa", alias = "entity")]
    pub entity: String,
    #[serde(default, rename = "rol", alias = "role")]
    pub role: String,
    #[serde(default, rename = "periodo", alias = "period")]
    pub period: String,
    #[serde(default)]
    pub skill: String,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: FactMetadata,
}

/// Optional metadata restrictions: entity equality and skill membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub entity: Option<String>,
    pub skills: Vec<String>,
}

impl SearchFilter {
    /// `None` when neither restriction is set.
    pub fn build(entity: Option<&str>, skills: &[String]) -> Option<Self> {
        let entity = entity.map(str::trim).filter(|e| !e.is_empty()).map(String::from);
        if entity.is_none() && skills.is_empty() {
            return None;
        }
        Some(Self {
            entity,
            skills: skills.to_vec(),
        })
    }

    /// Encode as a metadata filter expression (`$eq` / `$in`).
    pub fn to_expression(&self) -> Value {
        let mut expr = Map::new();
        if let Some(entity) = &self.entity {
            expr.insert(ENTITY_KEY.into(), json!({ "$eq": entity }));
        }
        if !self.skills.is_empty() {
            expr.insert(SKILL_KEY.into(), json!({ "$in": self.skills }));
        }
        Value::Object(expr)
    }

    /// Whether `metadata` passes the filter.
    pub fn accepts(&self, metadata: &FactMetadata) -> bool {
        let entity_ok = self.entity.as_ref().is_none_or(|e| *e == metadata.entity);
        let skill_ok = self.skills.is_empty() || self.skills.contains(&metadata.skill);
        entity_ok && skill_ok
    }
}

// ---------------------------------------------------------------------------
// Pinecone
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

/// [`VectorSearch`] backed by a Pinecone index's `POST /query` endpoint.
pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: Client,
}

impl PineconeIndex {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(PersonaGraphError::config("vector index host is not set"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PersonaGraphError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
            client,
        })
    }

    pub fn from_config(config: &VectorConfig, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let mut index = Self::new(&config.index_host, api_key, timeout_secs)?;
        index.namespace = config.namespace.clone();
        Ok(index)
    }
}

#[async_trait]
impl VectorSearch for PineconeIndex {
    #[instrument(skip_all, fields(top_k = top_k, filtered = filter.is_some()))]
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            filter: filter.map(SearchFilter::to_expression),
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| PersonaGraphError::Network(format!("vector search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersonaGraphError::service(
                "vector search",
                format!("HTTP {status}"),
            ));
        }

        let body: QueryResponse = response.json().await.map_err(|e| {
            PersonaGraphError::service("vector search", format!("invalid response body: {e}"))
        })?;

        debug!(matches = body.matches.len(), "vector search complete");
        Ok(body.matches)
    }
}

// ---------------------------------------------------------------------------
// In-process index
// ---------------------------------------------------------------------------

/// Small in-memory index using cosine similarity.
///
/// Ties are broken by id so results are deterministic.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    entries: Vec<(String, Vec<f32>, FactMetadata)>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: FactMetadata) {
        self.entries.push((id.into(), vector, metadata));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorSearch for MemoryIndex {
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let mut hits: Vec<VectorMatch> = self
            .entries
            .iter()
            .filter(|(_, _, meta)| filter.is_none_or(|f| f.accepts(meta)))
            .map(|(id, vector, meta)| VectorMatch {
                id: id.clone(),
                score: cosine(embedding, vector),
                metadata: meta.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn meta(entity: &str, skill: &str) -> FactMetadata {
        FactMetadata {
            entity: entity.into(),
            role: "Engineer".into(),
            period: "2020-2022".into(),
            skill: skill.into(),
        }
    }

    #[test]
    fn filter_build_none_when_empty() {
        assert_eq!(SearchFilter::build(None, &[]), None);
        assert_eq!(SearchFilter::build(Some("  "), &[]), None);
        assert!(SearchFilter::build(Some("Acme"), &[]).is_some());
    }

    #[test]
    fn filter_expression_encoding() {
        let filter = SearchFilter::build(Some("Acme"), &["ai".into(), "python".into()]).unwrap();
        assert_eq!(
            filter.to_expression(),
            json!({
                "empresa": {"$eq": "Acme"},
                "skill": {"$in": ["ai", "python"]},
            })
        );
    }

    #[test]
    fn metadata_reads_spanish_keys() {
        let m: FactMetadata = serde_json::from_value(json!({
            "empresa": "Acme", "rol": "ML Engineer", "periodo": "2019 – 2024", "skill": "ai",
            "skills": ["ai", "python"]
        }))
        .unwrap();
        assert_eq!(m.entity, "Acme");
        assert_eq!(m.role, "ML Engineer");
        assert_eq!(m.period, "2019 – 2024");
    }

    #[tokio::test]
    async fn memory_index_ranks_and_filters() {
        let mut index = MemoryIndex::new();
        index.insert("a", vec![1.0, 0.0], meta("Acme", "ai"));
        index.insert("b", vec![0.7, 0.7], meta("Acme", "python"));
        index.insert("c", vec![0.0, 1.0], meta("Globex", "ai"));

        let all = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let filter = SearchFilter::build(None, &["ai".into()]).unwrap();
        let ai = index.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        let ids: Vec<&str> = ai.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let top = index.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(top.len(), 1);
        assert!((top[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn memory_index_ties_break_by_id() {
        let mut index = MemoryIndex::new();
        index.insert("z", vec![1.0, 0.0], meta("Acme", "ai"));
        index.insert("m", vec![1.0, 0.0], meta("Acme", "ai"));
        let hits = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].id, "m");
        assert_eq!(hits[1].id, "z");
    }

    #[tokio::test]
    async fn pinecone_query_sends_filter_and_parses_matches() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Api-Key", "pc-test"))
            .and(body_partial_json(json!({
                "topK": 10,
                "includeMetadata": true,
                "filter": {"empresa": {"$eq": "Acme"}},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    {"id": "0-ai", "score": 0.91,
                     "metadata": {"empresa": "Acme", "rol": "ML Engineer", "periodo": "2018-2021", "skill": "ai"}},
                    {"id": "0-python", "score": 0.72,
                     "metadata": {"empresa": "Acme", "rol": "ML Engineer", "periodo": "2018-2021", "skill": "python"}}
                ]
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-test", 5).unwrap();
        let filter = SearchFilter::build(Some("Acme"), &[]).unwrap();
        let hits = index.search(&[0.1, 0.2], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.skill, "ai");
        assert_eq!(hits[1].metadata.entity, "Acme");
    }

    #[tokio::test]
    async fn pinecone_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "k", 5).unwrap();
        let err = index.search(&[0.1], 10, None).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn pinecone_requires_host() {
        assert!(PineconeIndex::new("", "k", 5).is_err());
    }
}
