//! Shared types, error model, and configuration for personagraph.
//!
//! This crate is the foundation depended on by all other personagraph crates.
//! It provides:
//! - [`PersonaGraphError`]: the unified error type
//! - Domain types ([`ExperienceRecord`], [`Classification`], [`ToneProfile`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiKeys, AppConfig, DataConfig, EmbeddingsConfig, GraphConfig, LlmConfig, ToneConfig, VectorConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{PersonaGraphError, Result};
pub use types::{
    Classification, ClassificationSource, ContextStatus, ExampleOrigin, ExperienceRecord,
    FactualContext, FactualMatch, Message, QueryKind, Role, RunId, TemporalContext, ToneProfile,
    TraitVector,
};
