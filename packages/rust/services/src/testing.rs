//! In-process stand-ins for the hosted services.
//!
//! Used by the stage and graph tests, and handy for wiring the pipeline
//! without network access.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use personagraph_shared::{ExperienceRecord, PersonaGraphError, Result};

use crate::{Embedder, ExperienceSource, LanguageModel, SearchFilter, ToneExamples, VectorMatch, VectorSearch};

/// What a [`ScriptedModel`] answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Echo the prompt back.
    Echo,
    Fail(String),
}

/// A [`LanguageModel`] answering from substring rules.
///
/// The first rule whose needle appears in the prompt wins; otherwise the
/// fallback reply is used. Every prompt is recorded.
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(fallback: Reply) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn when(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.fallback);

        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Echo => Ok(prompt.to_string()),
            Reply::Fail(message) => Err(PersonaGraphError::service("language model", message.clone())),
        }
    }
}

/// An [`Embedder`] returning the same vector for every input.
#[derive(Debug, Clone)]
pub struct StaticEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// A [`VectorSearch`] returning canned matches and recording each request.
pub struct StaticMatches {
    matches: Vec<VectorMatch>,
    requests: Mutex<Vec<(usize, Option<SearchFilter>)>>,
}

impl StaticMatches {
    pub fn new(matches: Vec<VectorMatch>) -> Self {
        Self {
            matches,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(top_k, filter)` of every search so far.
    pub fn requests(&self) -> Vec<(usize, Option<SearchFilter>)> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl VectorSearch for StaticMatches {
    async fn search(
        &self,
        _embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((top_k, filter.cloned()));
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

/// An [`ExperienceSource`] over a fixed record list, counting loads.
pub struct StaticExperiences {
    records: Vec<ExperienceRecord>,
    loads: AtomicUsize,
}

impl StaticExperiences {
    pub fn new(records: Vec<ExperienceRecord>) -> Self {
        Self {
            records,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExperienceSource for StaticExperiences {
    async fn load_all(&self) -> Result<Vec<ExperienceRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

/// Every service, always failing with the given message.
#[derive(Debug, Clone)]
pub struct Unavailable(pub String);

impl Unavailable {
    fn err(&self, service: &'static str) -> PersonaGraphError {
        PersonaGraphError::service(service, self.0.clone())
    }
}

#[async_trait]
impl LanguageModel for Unavailable {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(self.err("language model"))
    }
}

#[async_trait]
impl Embedder for Unavailable {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(self.err("embeddings"))
    }
}

#[async_trait]
impl VectorSearch for Unavailable {
    async fn search(
        &self,
        _embedding: &[f32],
        _top_k: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        Err(self.err("vector search"))
    }
}

#[async_trait]
impl ExperienceSource for Unavailable {
    async fn load_all(&self) -> Result<Vec<ExperienceRecord>> {
        Err(self.err("experience source"))
    }
}

#[async_trait]
impl ToneExamples for Unavailable {
    async fn sample(&self, _n: usize) -> Result<Vec<String>> {
        Err(self.err("tone examples"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_model_first_matching_rule_wins() {
        let model = ScriptedModel::new(Reply::Echo)
            .when("json", Reply::Text("{}".into()))
            .when("fail", Reply::Fail("boom".into()));

        assert_eq!(model.complete("give me json").await.unwrap(), "{}");
        assert!(model.complete("please fail").await.is_err());
        assert_eq!(model.complete("hello").await.unwrap(), "hello");
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn static_matches_honours_top_k_and_records_filter() {
        let hit = VectorMatch {
            id: "1".into(),
            score: 0.5,
            metadata: Default::default(),
        };
        let search = StaticMatches::new(vec![hit.clone(), hit.clone(), hit]);
        let filter = SearchFilter::build(Some("Acme"), &[]);
        let got = search.search(&[0.0], 2, filter.as_ref()).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(search.requests(), vec![(2, filter)]);
    }

    #[tokio::test]
    async fn unavailable_fails_everywhere() {
        let down = Unavailable("down".into());
        assert!(LanguageModel::complete(&down, "x").await.is_err());
        assert!(ExperienceSource::load_all(&down).await.is_err());
        assert!(ToneExamples::sample(&down, 1).await.is_err());
    }
}
