//! Hosted-service boundary for personagraph.
//!
//! The query stages never talk to a provider directly. They go through the
//! object-safe traits defined here, held as `Arc<dyn ...>`:
//!
//! - [`LanguageModel`]: prompt in, text out
//! - [`Embedder`]: text in, query vector out
//! - [`VectorSearch`]: query vector in, ranked matches with metadata out
//! - [`ExperienceSource`]: the dated experience records
//! - [`ToneExamples`]: style examples for the tone stage
//!
//! Concrete adapters live in [`openai`], [`vector`] and [`sources`];
//! [`testing`] holds in-process stand-ins.

pub mod openai;
pub mod sources;
pub mod testing;
pub mod vector;

use async_trait::async_trait;
use personagraph_shared::{ExperienceRecord, Result};

pub use openai::{ChatCompletionsClient, EmbeddingsClient, OpenAiOptions};
pub use sources::{FixedToneExamples, JsonExperienceFile, JsonToneExamples};
pub use vector::{FactMetadata, PineconeIndex, SearchFilter, VectorMatch};

/// Text-in / text-out model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`. Callers asking for JSON must tolerate fenced or
    /// malformed output.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Turns text into a query vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbour lookup over the factual index.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return at most `top_k` matches ranked by descending score.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>>;
}

/// Loads every experience record.
#[async_trait]
pub trait ExperienceSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ExperienceRecord>>;
}

/// Supplies style examples for tone selection.
#[async_trait]
pub trait ToneExamples: Send + Sync {
    /// Up to `n` distinct examples. May return fewer, or none.
    async fn sample(&self, n: usize) -> Result<Vec<String>>;
}
