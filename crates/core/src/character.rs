//! Character Session
//!
//! A `CharacterSession` binds one conversation to one character profile, one
//! memory and one generator, and runs a single request/response turn at a time.

use crate::{
    llm_client::{GenerationError, Generator},
    memory::ConversationMemory,
    profile::CharacterProfile,
    prompt,
    response::{StructuredReply, decode_generation},
    tool::{ToolHooks, parse_tool_intent},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

/// Errors that end a turn.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Chat message has no input")]
    EmptyInput,
}

/// One character bound to one conversation.
pub struct CharacterSession {
    session_id: String,
    profile: CharacterProfile,
    memory: Box<dyn ConversationMemory>,
    generator: Arc<dyn Generator>,
    tool_hooks: Option<Arc<dyn ToolHooks>>,
}

impl CharacterSession {
    pub fn new(
        session_id: String,
        profile: CharacterProfile,
        memory: Box<dyn ConversationMemory>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            session_id,
            profile,
            memory,
            generator,
            tool_hooks: None,
        }
    }

    /// Enables the tool classification step, routing intents to `hooks`.
    pub fn with_tool_hooks(mut self, hooks: Arc<dyn ToolHooks>) -> Self {
        self.tool_hooks = Some(hooks);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn profile(&self) -> &CharacterProfile {
        &self.profile
    }

    /// Gives up the session, returning its memory so it can outlive the
    /// connection.
    pub fn into_memory(self) -> Box<dyn ConversationMemory> {
        self.memory
    }

    /// Runs one turn, failing with [`GenerationError::Timeout`] if the whole
    /// turn takes longer than `deadline`.
    #[instrument(
        name = "respond",
        skip_all,
        fields(session_id = %self.session_id, character = %self.profile.name)
    )]
    pub async fn respond(
        &mut self,
        input: &str,
        deadline: Duration,
    ) -> Result<StructuredReply, SessionError> {
        if input.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        match tokio::time::timeout(deadline, self.run_turn(input)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(deadline).into()),
        }
    }

    async fn run_turn(&mut self, input: &str) -> Result<StructuredReply, SessionError> {
        let recent = self.memory.recent_history();
        debug!(history = %recent, "Current history");
        self.memory.append_turn(input, &recent).await?;
        let summary = self.memory.summary();

        let context = self.tool_context(input).await?;

        let prompt = prompt::render(
            prompt::CHARACTER_TEMPLATE,
            &[
                ("character_name", self.profile.name.as_str()),
                ("character_description", self.profile.description.as_str()),
                ("personality", self.profile.personality.as_str()),
                ("summary_memory", summary.as_str()),
                ("chat_history", recent.as_str()),
                ("context", context.as_str()),
                ("input", input),
            ],
        );
        let generated = self.generator.generate(&prompt).await?;
        debug!(output = %generated, "Generation output");

        let reply = decode_generation(&generated);
        self.memory.record_exchange(input, &generated);
        info!(mood = %reply.mood, actions = %reply.actions, "Turn complete");
        Ok(reply)
    }

    /// Classifies the input and runs the matching hook, if tools are enabled.
    async fn tool_context(&self, input: &str) -> Result<String, GenerationError> {
        let Some(hooks) = &self.tool_hooks else {
            return Ok(String::new());
        };
        let prompt = prompt::render(prompt::TOOL_TEMPLATE, &[("input", input)]);
        let classification = self.generator.generate(&prompt).await?;
        let intent = parse_tool_intent(&classification);
        info!(?intent, "Tool intent");
        Ok(intent.dispatch(hooks.as_ref()).await.unwrap_or_default())
    }
}
