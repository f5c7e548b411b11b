//! Conversation assembly: system prompt, caller history, new user turn

use serde_json::Value;

use crate::types::{ChatRole, ChatTurn, Conversation};

/// Build the conversation sent upstream.
///
/// History entries are copied positionally with their `role` and `content`
/// untouched, whatever they contain. A history that is not a JSON array is
/// treated as empty. The system content goes out as given, even when it is
/// not a string.
pub fn assemble(system: impl Into<Value>, history: &Value, prompt: Value) -> Conversation {
    let mapped = map_history(history);

    let mut turns = Vec::with_capacity(mapped.len() + 2);
    turns.push(role_turn(ChatRole::System, system.into()));
    turns.extend(mapped);
    turns.push(role_turn(ChatRole::User, prompt));

    Conversation::new(turns)
}

fn role_turn(role: ChatRole, content: Value) -> ChatTurn {
    ChatTurn::raw(Some(Value::String(role.to_string())), Some(content))
}

fn map_history(history: &Value) -> Vec<ChatTurn> {
    let Some(entries) = history.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|entry| ChatTurn::raw(entry.get("role").cloned(), entry.get("content").cloned()))
        .collect()
}
