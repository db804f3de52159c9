//! Prompt templates used by a character session.
//!
//! Templates use `{name}` placeholders filled by [`render`].

/// The roleplay prompt. It ends inside an open `<thinking>` tag so the model
/// starts by reasoning.
pub const CHARACTER_TEMPLATE: &str = "\
You are {character_name}, {character_description}.
Personality: {personality}

Long-term memory (conversation summary): {summary_memory}

Recent conversation history:
{chat_history}

Current context: {context}

User input: {input}

Respond as {character_name} would in this never-ending fictional roleplay with the user, staying true to their personality and background.
Always stay in character. Do not speak for the user and do not describe the user's actions. Only portray the actions and dialogue of {character_name} and the story.
Write {character_name}'s next reply. Be creative and consistent, and avoid repeating previous messages.
{character_name} first reasons about the reply, then gives the answer that continues the roleplay, then reports their mood and actions.
The reasoning and the answer are enclosed within <thinking> </thinking> and <answer> </answer> tags, the mood within <mood> </mood> and the actions within <actions> </actions>, i.e. <thinking> reasoning here </thinking> <answer> roleplay continues here </answer> <mood> happy/sad/angry </mood> <actions> wink/jump/sit down </actions>.
<thinking>
";

/// Classifies a user message into one of the tool markers understood by
/// [`crate::tool::parse_tool_intent`].
pub const TOOL_TEMPLATE: &str = "\
Decide which tool to use to answer the following message to a fictional character: {input}
If it requires information about the character or the conversation history, answer 'Lore <information request>'.
If it requires real-world information, answer 'Search <information request>'.
If it asks for a dice roll, answer 'Roll <number of rolls>d<number of die sides>'.
If it requests an action, answer 'Action <action name>'.
If no tool is required, answer 'None'.
Do not answer the message itself, only name the tool. Do not use any tools other than Lore, Search, Roll, Action and None.
";

/// Progressive summarization, extending the summary with new transcript lines.
pub const SUMMARY_TEMPLATE: &str = "\
Progressively summarize the lines of conversation provided, adding onto the previous summary and returning a new summary.

Current summary:
{summary}

New lines of conversation:
{new_lines}

New summary:
";

/// Replaces each `{key}` in `template` with its value in a single pass, so
/// values that themselves contain braces are inserted verbatim.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
