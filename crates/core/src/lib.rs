//! Companion Core
//!
//! Everything about talking to a character that does not touch the network:
//! profiles, memory, the generation client, prompt templates, the decoder that
//! turns generated text into a structured reply, and tool intents.

pub mod character;
pub mod llm_client;
pub mod memory;
pub mod profile;
pub mod prompt;
pub mod response;
pub mod tool;

/// Character bound when a request names none.
pub const DEFAULT_CHARACTER: &str = "Clara";
