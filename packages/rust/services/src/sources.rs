//! File-backed data sources: experience records and tone examples.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{debug, instrument};

use personagraph_shared::{ExperienceRecord, PersonaGraphError, Result};

use crate::{ExperienceSource, ToneExamples};

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PersonaGraphError::io(path, e))
}

// ---------------------------------------------------------------------------
// Experience records
// ---------------------------------------------------------------------------

/// Accepted layouts of the experience file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExperienceDocument {
    Wrapped {
        #[serde(alias = "experiencia_laboral")]
        experience: Vec<ExperienceRecord>,
    },
    Bare(Vec<ExperienceRecord>),
}

/// Parse an experience document from JSON text.
pub fn parse_experience_json(content: &str) -> Result<Vec<ExperienceRecord>> {
    let doc: ExperienceDocument = serde_json::from_str(content)
        .map_err(|e| PersonaGraphError::parse(format!("invalid experience file: {e}")))?;
    Ok(match doc {
        ExperienceDocument::Wrapped { experience } => experience,
        ExperienceDocument::Bare(records) => records,
    })
}

/// [`ExperienceSource`] reading a JSON file on every call.
#[derive(Debug, Clone)]
pub struct JsonExperienceFile {
    path: PathBuf,
}

impl JsonExperienceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ExperienceSource for JsonExperienceFile {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load_all(&self) -> Result<Vec<ExperienceRecord>> {
        let content = read_file(&self.path).await?;
        let records = parse_experience_json(&content)?;
        debug!(records = records.len(), "experience records loaded");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tone examples
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ToneEntry {
    #[serde(default, alias = "texto")]
    text: Option<String>,
}

/// [`ToneExamples`] sampling from a JSON metadata file (`[{"texto": ...}]`).
///
/// Sampling uses the injected generator, so a fixed seed gives a fixed
/// sequence of picks.
pub struct JsonToneExamples {
    path: PathBuf,
    rng: Mutex<StdRng>,
}

impl JsonToneExamples {
    pub fn new(path: impl Into<PathBuf>, rng: StdRng) -> Self {
        Self {
            path: path.into(),
            rng: Mutex::new(rng),
        }
    }

    /// Seeded from `seed` when given, from OS entropy otherwise.
    pub fn with_seed(path: impl Into<PathBuf>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(path, rng)
    }
}

#[async_trait]
impl ToneExamples for JsonToneExamples {
    #[instrument(skip_all, fields(path = %self.path.display(), n = n))]
    async fn sample(&self, n: usize) -> Result<Vec<String>> {
        let content = read_file(&self.path).await?;
        let entries: Vec<ToneEntry> = serde_json::from_str(&content)
            .map_err(|e| PersonaGraphError::parse(format!("invalid tone examples file: {e}")))?;

        let texts: Vec<String> = entries
            .into_iter()
            .filter_map(|e| e.text)
            .filter(|t| !t.trim().is_empty())
            .collect();

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let picked: Vec<String> = texts.choose_multiple(&mut *rng, n).cloned().collect();
        debug!(available = texts.len(), picked = picked.len(), "tone examples sampled");
        Ok(picked)
    }
}

/// [`ToneExamples`] returning the first `n` of a fixed list.
#[derive(Debug, Clone, Default)]
pub struct FixedToneExamples {
    examples: Vec<String>,
}

impl FixedToneExamples {
    pub fn new<I, S>(examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            examples: examples.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ToneExamples for FixedToneExamples {
    async fn sample(&self, n: usize) -> Result<Vec<String>> {
        Ok(self.examples.iter().take(n).cloned().collect())
    }
}
