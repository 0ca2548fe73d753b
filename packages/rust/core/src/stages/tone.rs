//! Tone selection: style examples plus the speaker's trait vector.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use personagraph_services::ToneExamples;
use personagraph_shared::{ExampleOrigin, Result, ToneProfile, TraitVector};

use crate::graph::Node;
use crate::state::{QueryState, StateUpdate};

/// Used when no example can be sampled.
pub const DEFAULT_TONE_EXAMPLE: &str = "¡Hola! Si necesitas ayuda, decímelo directo. Me gusta ser claro y concreto, pero siempre con buena onda.";

/// Separator between sampled examples.
pub const EXAMPLE_SEPARATOR: &str = "\n---\n";

pub struct ToneSelectionStage {
    examples: Arc<dyn ToneExamples>,
    label: String,
    count: usize,
    traits: TraitVector,
}

impl ToneSelectionStage {
    /// Samples `count` examples per run and uses [`TraitVector::AVERAGE`].
    pub fn new(examples: Arc<dyn ToneExamples>, label: impl Into<String>, count: usize) -> Self {
        Self {
            examples,
            label: label.into(),
            count,
            traits: TraitVector::AVERAGE,
        }
    }

    pub fn with_traits(mut self, traits: TraitVector) -> Self {
        self.traits = traits;
        self
    }

    fn profile(&self, example: String, origin: ExampleOrigin) -> ToneProfile {
        ToneProfile {
            label: self.label.clone(),
            example,
            traits: self.traits,
            origin,
        }
    }
}

#[async_trait]
impl Node for ToneSelectionStage {
    #[instrument(skip_all, name = "tone_selection", fields(count = self.count))]
    async fn run(&self, _state: &QueryState) -> Result<StateUpdate> {
        let profile = match self.examples.sample(self.count).await {
            Ok(picked) if !picked.is_empty() => {
                debug!(picked = picked.len(), "tone examples sampled");
                self.profile(picked.join(EXAMPLE_SEPARATOR), ExampleOrigin::Sampled)
            }
            Ok(_) => {
                debug!("no tone examples available, using built-in example");
                self.profile(DEFAULT_TONE_EXAMPLE.to_string(), ExampleOrigin::BuiltIn)
            }
            Err(e) => {
                warn!(error = %e, "tone examples unavailable, using built-in example");
                self.profile(DEFAULT_TONE_EXAMPLE.to_string(), ExampleOrigin::BuiltIn)
            }
        };
        Ok(StateUpdate::tone(profile))
    }
}
