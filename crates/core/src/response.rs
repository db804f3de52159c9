//! Structured Response Decoding
//!
//! The character prompt asks the model to wrap its reasoning, reply, mood and
//! actions in `<tag>` blocks, but generated text rarely follows that convention
//! exactly. Models swap bracket styles, forget the slash, or drop brackets
//! entirely. This module recovers the fields with a small priority-ordered
//! grammar instead of a strict parser, so transcripts produced by loosely
//! instruction-following models still decode.

use serde::{Deserialize, Serialize};

/// Opening-marker prefixes, highest priority first.
const OPEN_PREFIXES: [&str; 4] = ["<", "(", "{", ""];
/// Closing-marker prefixes, highest priority first.
const CLOSE_PREFIXES: [&str; 4] = ["</", "(/", "{/", ""];
/// Marker suffixes, tried for every prefix in this order.
const SUFFIXES: [&str; 4] = [">", ")", "}", ""];

/// The tag the character prompt leaves open at the end of the prompt.
pub const THINKING_OPEN: &str = "<thinking>";

/// A generated reply split into the fields the client renders.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredReply {
    /// The character's private reasoning.
    pub thinking: String,
    /// The user-visible continuation of the roleplay.
    pub answer: String,
    /// A short mood label such as `happy`.
    pub mood: String,
    /// Animation or action hints such as `wave`.
    pub actions: String,
}

/// Finds the first marker in `haystack` built from `prefixes` x `SUFFIXES`,
/// in priority order. Returns the byte offset and the marker's length.
fn find_marker(haystack: &str, prefixes: &[&str], tag: &str) -> Option<(usize, usize)> {
    prefixes.iter().find_map(|prefix| {
        SUFFIXES.iter().find_map(|suffix| {
            let marker = format!("{prefix}{tag}{suffix}");
            haystack.find(&marker).map(|idx| (idx, marker.len()))
        })
    })
}

/// Extracts the content of a single tag from generated text.
///
/// Opening markers are tried as `<tag`, `(tag`, `{tag`, then bare `tag`, each
/// combined with `>`, `)`, `}` or nothing as the closing bracket. The first
/// combination present anywhere in the text wins, so a bare `tag` is only used
/// when no bracketed variant occurs. The closing marker is searched for only
/// after the opening one, with `</`, `(/`, `{/` and bare prefixes in the same
/// order.
///
/// Returns an empty string when either marker is missing; unterminated content
/// is discarded.
pub fn extract_tag(text: &str, tag: &str) -> String {
    if tag.is_empty() {
        return String::new();
    }
    let Some((open_at, open_len)) = find_marker(text, &OPEN_PREFIXES, tag) else {
        return String::new();
    };
    let rest = &text[open_at + open_len..];
    match find_marker(rest, &CLOSE_PREFIXES, tag) {
        Some((close_at, _)) => rest[..close_at].trim().to_string(),
        None => String::new(),
    }
}

/// Decodes raw generated text into a [`StructuredReply`].
///
/// Each field is extracted independently. If no answer can be found the whole
/// raw text becomes the answer, so the caller always has something to show.
pub fn decode_response(raw: &str) -> StructuredReply {
    let mut reply = StructuredReply {
        thinking: extract_tag(raw, "thinking"),
        answer: extract_tag(raw, "answer"),
        mood: extract_tag(raw, "mood"),
        actions: extract_tag(raw, "actions"),
    };
    if reply.answer.is_empty() {
        reply.answer = raw.to_string();
    }
    reply
}

/// Decodes the output of a prompt that ended with an open `<thinking>` tag.
///
/// The model continues inside the tag, so its output starts with reasoning
/// rather than the marker. The marker is restored before extraction; the
/// answer fallback still uses the text exactly as generated.
pub fn decode_generation(generated: &str) -> StructuredReply {
    let restored = format!("{THINKING_OPEN}{generated}");
    let mut reply = decode_response(&restored);
    if reply.answer == restored {
        reply.answer = generated.to_string();
    }
    reply
}
