//! Conversation Memory
//!
//! A character remembers the conversation at two resolutions: a short window
//! of the most recent exchanges, kept verbatim, and a long-term summary that
//! the generator progressively extends every turn.

use crate::{
    llm_client::{GenerationError, Generator},
    prompt,
};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Arc};
use tracing::debug;

/// The memory collaborator of a character session.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// The recent exchanges rendered as a transcript.
    fn recent_history(&self) -> String;

    /// Folds a new turn into the long-term summary.
    async fn append_turn(&mut self, input: &str, output: &str) -> Result<(), GenerationError>;

    /// The current long-term summary.
    fn summary(&self) -> String;

    /// Records a completed exchange into short-term memory.
    fn record_exchange(&mut self, input: &str, output: &str);
}

/// Sliding-window short-term memory plus a generator-maintained summary.
pub struct WindowedSummaryMemory {
    window: usize,
    exchanges: VecDeque<(String, String)>,
    summary: String,
    summarizer: Arc<dyn Generator>,
}

impl WindowedSummaryMemory {
    /// Creates an empty memory keeping at most `window` recent exchanges.
    pub fn new(window: usize, summarizer: Arc<dyn Generator>) -> Self {
        Self {
            window,
            exchanges: VecDeque::with_capacity(window),
            summary: String::new(),
            summarizer,
        }
    }
}

fn transcript_lines(input: &str, output: &str) -> String {
    format!("Human: {input}\nAI: {output}")
}

#[async_trait]
impl ConversationMemory for WindowedSummaryMemory {
    fn recent_history(&self) -> String {
        self.exchanges
            .iter()
            .map(|(input, output)| transcript_lines(input, output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn append_turn(&mut self, input: &str, output: &str) -> Result<(), GenerationError> {
        let new_lines = transcript_lines(input, output);
        let prompt = prompt::render(
            prompt::SUMMARY_TEMPLATE,
            &[
                ("summary", self.summary.as_str()),
                ("new_lines", new_lines.as_str()),
            ],
        );
        let summary = self.summarizer.generate(&prompt).await?;
        self.summary = summary.trim().to_string();
        debug!(chars = self.summary.len(), "Long-term summary updated");
        Ok(())
    }

    fn summary(&self) -> String {
        self.summary.clone()
    }

    fn record_exchange(&mut self, input: &str, output: &str) {
        if self.window == 0 {
            return;
        }
        while self.exchanges.len() >= self.window {
            self.exchanges.pop_front();
        }
        self.exchanges
            .push_back((input.to_string(), output.to_string()));
    }
}
