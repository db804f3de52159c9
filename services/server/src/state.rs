//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! connection shares: configuration, the session registry and the generator.

use crate::{config::Config, registry::SessionRegistry};
use companion_core::{
    character::CharacterSession,
    llm_client::Generator,
    memory::{ConversationMemory, WindowedSummaryMemory},
    profile::load_profile,
    tool::ToolHooks,
};
use std::sync::Arc;
use tracing::info;

/// The shared application state, created once at startup and passed to every
/// connection handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub generator: Arc<dyn Generator>,
    /// Present when tool classification is enabled.
    pub tool_hooks: Option<Arc<dyn ToolHooks>>,
}

impl AppState {
    /// Builds the character session for a connection's first chat message.
    ///
    /// Memory parked under `session_id` for the same character is resumed;
    /// otherwise the session starts with empty memory.
    pub async fn bind_character(
        &self,
        session_id: String,
        requested: Option<&str>,
    ) -> CharacterSession {
        let name = requested.unwrap_or(&self.config.default_character);
        let profile = load_profile(
            &self.config.characters_path,
            name,
            &self.config.default_character,
        );

        let memory: Box<dyn ConversationMemory> =
            match self.registry.resume(&session_id, &profile.name).await {
                Some(memory) => memory,
                None => Box::new(WindowedSummaryMemory::new(
                    self.config.memory_window,
                    self.generator.clone(),
                )),
            };
        info!(%session_id, character = %profile.name, "Bound character to connection");

        let session = CharacterSession::new(session_id, profile, memory, self.generator.clone());
        match &self.tool_hooks {
            Some(hooks) => session.with_tool_hooks(hooks.clone()),
            None => session,
        }
    }
}
