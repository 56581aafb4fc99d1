use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Trailing assistant placeholder shown while a chat request is pending.
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

/// The role of a chat message sender. Serialized as "user"/"assistant"
/// to match the voice-order endpoint contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A chat message in the voice-order conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn thinking() -> Self {
        Self::assistant(THINKING_PLACEHOLDER)
    }

    pub fn is_thinking(&self) -> bool {
        self.role == ChatRole::Assistant && self.content == THINKING_PLACEHOLDER
    }
}

/// Ordered conversation transcript, mirrored to a JSON file after every
/// mutation so a restarted client picks up where it left off.
///
/// Messages are append-only; the single exception is swapping the trailing
/// "Thinking..." placeholder for the real (or failure) assistant reply.
#[derive(Debug)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    path: PathBuf,
}

impl Conversation {
    /// Restores a conversation from `path`. Missing, unreadable, or
    /// malformed content (anything that is not a JSON message array)
    /// yields an empty conversation rather than an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let messages = Self::restore(&path);
        Self { messages, path }
    }

    fn restore(path: &Path) -> Vec<ChatMessage> {
        let Ok(content) = fs::read_to_string(path) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<ChatMessage>>(&content) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(?path, %err, "discarding malformed saved conversation");
                Vec::new()
            }
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message and persists the updated transcript.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.persist();
    }

    /// Overwrites the final message. No-op on an empty conversation.
    pub fn replace_last(&mut self, message: ChatMessage) {
        if let Some(last) = self.messages.last_mut() {
            *last = message;
            self.persist();
        }
    }

    /// Replaces the pending placeholder at `index` with the resolved
    /// reply. Returns false without touching the transcript when the
    /// index is out of range or no longer holds the placeholder (a reset
    /// or an earlier completion got there first).
    pub fn resolve_placeholder(&mut self, index: usize, message: ChatMessage) -> bool {
        match self.messages.get_mut(index) {
            Some(slot) if slot.is_thinking() => {
                *slot = message;
                self.persist();
                true
            }
            _ => {
                warn!(index, "stale chat reply ignored; placeholder already resolved");
                false
            }
        }
    }

    /// Clears the transcript and removes the persisted copy.
    pub fn reset(&mut self) {
        self.messages.clear();
        if self.path.exists() {
            if let Err(err) = fs::remove_file(&self.path) {
                warn!(path = ?self.path, %err, "failed to remove saved conversation");
            }
        }
    }

    fn persist(&self) {
        if let Err(err) = self.try_persist() {
            warn!(path = ?self.path, %err, "failed to save conversation");
        }
    }

    fn try_persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&self.messages)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("conversation.json");
        (dir, path)
    }

    #[test]
    fn append_keeps_insertion_order() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        conv.append(ChatMessage::assistant("hello"));
        conv.append(ChatMessage::user("two apples"));
        conv.append(ChatMessage::assistant("added"));

        let contents: Vec<&str> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "two apples", "added"]);
    }

    #[test]
    fn replace_last_swaps_trailing_placeholder() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        conv.append(ChatMessage::user("buy milk"));
        conv.append(ChatMessage::thinking());
        conv.replace_last(ChatMessage::assistant("Got it"));

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[1], ChatMessage::assistant("Got it"));
    }

    #[test]
    fn replace_last_on_empty_is_a_no_op() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        conv.replace_last(ChatMessage::assistant("orphan"));
        assert!(conv.is_empty());
    }

    #[test]
    fn resolve_placeholder_targets_its_own_turn() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        conv.append(ChatMessage::user("apples"));
        conv.append(ChatMessage::thinking());
        conv.append(ChatMessage::user("and bananas"));
        conv.append(ChatMessage::thinking());

        // Second turn resolves first; the first turn's placeholder is untouched.
        assert!(conv.resolve_placeholder(3, ChatMessage::assistant("bananas added")));
        assert!(conv.messages()[1].is_thinking());
        assert!(conv.resolve_placeholder(1, ChatMessage::assistant("apples added")));

        // A stale completion for an already-resolved slot is ignored.
        assert!(!conv.resolve_placeholder(1, ChatMessage::assistant("again")));
        assert_eq!(conv.messages()[1], ChatMessage::assistant("apples added"));
    }

    #[test]
    fn resolve_placeholder_out_of_range_is_ignored() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        assert!(!conv.resolve_placeholder(0, ChatMessage::assistant("ghost")));
        assert!(conv.is_empty());
    }

    #[test]
    fn persist_restore_round_trip() {
        let (_dir, path) = scratch();
        {
            let mut conv = Conversation::load(&path);
            conv.append(ChatMessage::assistant("Hi! What would you like to order?"));
            conv.append(ChatMessage::user("buy two apples"));
        }

        let restored = Conversation::load(&path);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.messages()[0].role, ChatRole::Assistant);
        assert_eq!(restored.messages()[1], ChatMessage::user("buy two apples"));
    }

    #[test]
    fn malformed_saved_data_restores_empty() {
        let (_dir, path) = scratch();
        fs::write(&path, "{\"not\": \"an array\"}").expect("write");
        let conv = Conversation::load(&path);
        assert!(conv.is_empty());

        fs::write(&path, "%%%garbage%%%").expect("write");
        let conv = Conversation::load(&path);
        assert!(conv.is_empty());
    }

    #[test]
    fn reset_clears_memory_and_disk() {
        let (_dir, path) = scratch();
        let mut conv = Conversation::load(&path);
        conv.append(ChatMessage::user("milk"));
        assert!(path.exists());

        conv.reset();
        assert!(conv.is_empty());
        assert!(!path.exists());
        assert!(Conversation::load(&path).is_empty());
    }

    #[test]
    fn roles_serialize_lowercase_for_the_wire() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).expect("serialize");
        assert_eq!(json, "{\"role\":\"user\",\"content\":\"hi\"}");
        let json = serde_json::to_string(&ChatMessage::assistant("hello")).expect("serialize");
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
