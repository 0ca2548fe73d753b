//! Per-run query state and the partial updates nodes return.
//!
//! A [`QueryState`] is created fresh for every question and owned by a single
//! run. Nodes never mutate it directly: they return a [`StateUpdate`] and the
//! executor merges it with [`QueryState::merge`].

use personagraph_shared::{
    Classification, FactualContext, Message, Role, TemporalContext, ToneProfile,
};

/// Named slots of the state, used by nodes to declare their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Conversation,
    Classification,
    TemporalContext,
    FactualContext,
    Tone,
    Answer,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Classification => "classification",
            Self::TemporalContext => "temporal_context",
            Self::FactualContext => "factual_context",
            Self::Tone => "tone",
            Self::Answer => "answer",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one run knows about the question being answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// Append-only message history. Seeded with the user's question.
    pub conversation: Vec<Message>,
    pub classification: Option<Classification>,
    pub temporal_context: Option<TemporalContext>,
    pub factual_context: Option<FactualContext>,
    pub tone: Option<ToneProfile>,
    pub answer: Option<String>,
}

impl QueryState {
    /// Fresh state holding a single user message.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            conversation: vec![Message::user(query)],
            ..Default::default()
        }
    }

    /// Text of the most recent user message.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Whether `field` has been written.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Conversation => !self.conversation.is_empty(),
            Field::Classification => self.classification.is_some(),
            Field::TemporalContext => self.temporal_context.is_some(),
            Field::FactualContext => self.factual_context.is_some(),
            Field::Tone => self.tone.is_some(),
            Field::Answer => self.answer.is_some(),
        }
    }

    /// Fold a node's update into the state.
    ///
    /// `conversation` entries are appended; every other field present in the
    /// update replaces the current value. Absent fields are left untouched.
    pub fn merge(&mut self, update: StateUpdate) {
        self.conversation.extend(update.conversation);
        if let Some(c) = update.classification {
            self.classification = Some(c);
        }
        if let Some(t) = update.temporal_context {
            self.temporal_context = Some(t);
        }
        if let Some(f) = update.factual_context {
            self.factual_context = Some(f);
        }
        if let Some(t) = update.tone {
            self.tone = Some(t);
        }
        if let Some(a) = update.answer {
            self.answer = Some(a);
        }
    }
}

/// Partial update returned by a node. Default is "no change".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub conversation: Vec<Message>,
    pub classification: Option<Classification>,
    pub temporal_context: Option<TemporalContext>,
    pub factual_context: Option<FactualContext>,
    pub tone: Option<ToneProfile>,
    pub answer: Option<String>,
}

impl StateUpdate {
    pub fn classification(classification: Classification) -> Self {
        Self {
            classification: Some(classification),
            ..Default::default()
        }
    }

    pub fn temporal_context(context: TemporalContext) -> Self {
        Self {
            temporal_context: Some(context),
            ..Default::default()
        }
    }

    pub fn factual_context(context: FactualContext) -> Self {
        Self {
            factual_context: Some(context),
            ..Default::default()
        }
    }

    pub fn tone(tone: ToneProfile) -> Self {
        Self {
            tone: Some(tone),
            ..Default::default()
        }
    }

    /// Final answer, also recorded as an assistant message.
    pub fn answer(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            conversation: vec![Message::assistant(text.clone())],
            answer: Some(text),
            ..Default::default()
        }
    }

    /// Fields this update writes, in declaration order.
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if !self.conversation.is_empty() {
            fields.push(Field::Conversation);
        }
        if self.classification.is_some() {
            fields.push(Field::Classification);
        }
        if self.temporal_context.is_some() {
            fields.push(Field::TemporalContext);
        }
        if self.factual_context.is_some() {
            fields.push(Field::FactualContext);
        }
        if self.tone.is_some() {
            fields.push(Field::Tone);
        }
        if self.answer.is_some() {
            fields.push(Field::Answer);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personagraph_shared::QueryKind;

    #[test]
    fn new_state_holds_only_the_question() {
        let state = QueryState::new("¿Qué hiciste en Acme?");
        assert_eq!(state.latest_user_message(), Some("¿Qué hiciste en Acme?"));
        assert!(state.has(Field::Conversation));
        assert!(!state.has(Field::Classification));
        assert!(!state.has(Field::Answer));
    }

    #[test]
    fn merge_appends_conversation_and_replaces_the_rest() {
        let mut state = QueryState::new("hola");
        state.merge(StateUpdate::classification(Classification {
            kind: QueryKind::Temporal,
            ..Default::default()
        }));
        state.merge(StateUpdate::answer("¡Hola!"));

        assert_eq!(state.conversation.len(), 2);
        assert_eq!(state.conversation[1].role, Role::Assistant);
        assert_eq!(state.answer.as_deref(), Some("¡Hola!"));
        assert_eq!(
            state.classification.as_ref().map(|c| c.kind),
            Some(QueryKind::Temporal)
        );
    }

    #[test]
    fn empty_update_changes_nothing() {
        let mut state = QueryState::new("hola");
        let before = state.clone();
        state.merge(StateUpdate::default());
        assert_eq!(state, before);
    }

    #[test]
    fn latest_user_message_skips_assistant_turns() {
        let mut state = QueryState::new("primera");
        state.merge(StateUpdate::answer("respuesta"));
        assert_eq!(state.latest_user_message(), Some("primera"));
    }

    #[test]
    fn update_reports_written_fields() {
        assert_eq!(
            StateUpdate::answer("x").fields(),
            vec![Field::Conversation, Field::Answer]
        );
        assert!(StateUpdate::default().fields().is_empty());
    }
}
