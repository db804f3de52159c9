//! Tool Intent Classification
//!
//! Before answering, a character can ask a short classification prompt which
//! side effect (if any) the user's message calls for. The classifier replies
//! with a single line such as `Roll 2d6` or `Lore her ship's name`, which is
//! parsed here into a [`ToolIntent`]. Executing an intent is delegated to a
//! [`ToolHooks`] implementation so deployments can plug in real lookups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A typed side-effect request derived from classifier output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolIntent {
    /// No tool is needed.
    #[default]
    None,
    /// Look up information about the character or conversation history.
    Lore { query: String },
    /// Look up real-world information.
    Search { query: String },
    /// Roll `count` dice with `sides` sides each.
    Roll { count: u32, sides: u32 },
    /// Perform a named scripted action.
    Action { name: String },
}

/// The keywords a classifier reply can start a tool request with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Lore,
    Search,
    Roll,
    Action,
}

impl Marker {
    /// Match priority order.
    const ALL: [Marker; 4] = [Marker::Lore, Marker::Search, Marker::Roll, Marker::Action];

    fn keyword(self) -> &'static str {
        match self {
            Marker::Lore => "Lore",
            Marker::Search => "Search",
            Marker::Roll => "Roll",
            Marker::Action => "Action",
        }
    }
}

/// Returns the text following `marker` and one separator character, trimmed.
fn payload_after<'a>(text: &'a str, at: usize, marker: &str) -> &'a str {
    let mut rest = text[at + marker.len()..].chars();
    rest.next();
    rest.as_str().trim()
}

/// Parses dice notation like `2d6`, `1D20` or `d8`.
fn parse_dice(spec: &str) -> Option<(u32, u32)> {
    let token = spec.split_whitespace().next()?;
    let (count, sides) = token.split_once(['d', 'D'])?;
    let count = if count.is_empty() { 1 } else { count.parse().ok()? };
    let sides = sides.parse().ok()?;
    (count > 0 && sides > 0).then_some((count, sides))
}

/// Parses classifier output into a [`ToolIntent`].
///
/// Markers are searched anywhere in the text in the fixed order `Lore`,
/// `Search`, `Roll`, `Action`; the first one found wins. Anything else,
/// including the literal `None`, produces [`ToolIntent::None`].
pub fn parse_tool_intent(text: &str) -> ToolIntent {
    debug!(text, "Parsing tool intent");
    let Some((marker, at)) = Marker::ALL
        .iter()
        .find_map(|marker| text.find(marker.keyword()).map(|at| (*marker, at)))
    else {
        return ToolIntent::None;
    };
    let payload = payload_after(text, at, marker.keyword());

    match marker {
        Marker::Lore => ToolIntent::Lore {
            query: payload.to_string(),
        },
        Marker::Search => ToolIntent::Search {
            query: payload.to_string(),
        },
        Marker::Roll => match parse_dice(payload) {
            Some((count, sides)) => ToolIntent::Roll { count, sides },
            None => {
                debug!(payload, "Unparsable dice notation, ignoring roll");
                ToolIntent::None
            }
        },
        Marker::Action => ToolIntent::Action {
            name: payload.to_string(),
        },
    }
}

/// Callbacks that execute tool intents.
///
/// Each hook may return extra context for the character prompt. The default
/// implementations only log the request.
#[async_trait]
pub trait ToolHooks: Send + Sync {
    async fn lore(&self, query: &str) -> Option<String> {
        info!(query, "Lore lookup requested");
        None
    }

    async fn search(&self, query: &str) -> Option<String> {
        info!(query, "Web search requested");
        None
    }

    async fn roll(&self, count: u32, sides: u32) -> Option<String> {
        info!(count, sides, "Dice roll requested");
        None
    }

    async fn action(&self, name: &str) -> Option<String> {
        info!(action = name, "Scripted action requested");
        None
    }
}

/// Hooks that log every request and never produce context.
pub struct LoggingToolHooks;

impl ToolHooks for LoggingToolHooks {}

impl ToolIntent {
    /// Routes the intent to the matching hook.
    pub async fn dispatch(&self, hooks: &dyn ToolHooks) -> Option<String> {
        match self {
            ToolIntent::None => None,
            ToolIntent::Lore { query } => hooks.lore(query).await,
            ToolIntent::Search { query } => hooks.search(query).await,
            ToolIntent::Roll { count, sides } => hooks.roll(*count, *sides).await,
            ToolIntent::Action { name } => hooks.action(name).await,
        }
    }
}
