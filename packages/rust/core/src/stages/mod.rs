//! The five query stages, each a [`Node`](crate::graph::Node).

pub mod classify;
pub mod factual;
pub mod synthesis;
pub mod temporal;
pub mod tone;

/// First line of a non-empty lookup summary.
pub const RELEVANT_EXPERIENCE_HEADER: &str = "Experiencias laborales relevantes:";

pub use classify::{ClassificationStage, parse_classification, strip_fences};
pub use factual::{DEFAULT_TOP_K, FactualLookupStage, NO_RELEVANT_EXPERIENCE};
pub use synthesis::{DECLINE_MESSAGE, SynthesisStage};
pub use temporal::{NO_EXPERIENCE_FOUND, TemporalLookupStage};
pub use tone::{DEFAULT_TONE_EXAMPLE, ToneSelectionStage};
