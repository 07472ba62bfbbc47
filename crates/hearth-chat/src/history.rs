//! Per-user conversation history with a sliding window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the person on the other end of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifier of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Use an identifier supplied by the transport.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier for a message the transport did not number.
    ///
    /// The digest covers a process-wide sequence number, so repeating the same
    /// text yields a different id.
    pub fn derive(user: &UserId, role: Role, text: &str) -> Self {
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(user.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(role.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(seq.to_le_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<MessageId>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            message_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message_id(&self) -> Option<&MessageId> {
        self.message_id.as_ref()
    }
}

type History = Arc<Mutex<VecDeque<ConversationTurn>>>;

/// Bounded conversation histories keyed by user.
///
/// The map is sharded, and each user's history has its own lock, so appends
/// for different users do not wait on each other while appends for the same
/// user are applied one at a time.
pub struct ConversationStore {
    window: usize,
    histories: DashMap<UserId, History>,
}

impl ConversationStore {
    /// Create a store keeping the last `window` turns per user (at least one).
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            histories: DashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append a turn and drop the oldest turns beyond the window.
    pub fn append(&self, user: &UserId, turn: ConversationTurn) {
        // Clone the handle so the shard lock is released before the user lock is taken.
        let history = self.histories.entry(user.clone()).or_default().clone();
        let mut turns = history.lock().unwrap_or_else(PoisonError::into_inner);
        turns.push_back(turn);
        while turns.len() > self.window {
            turns.pop_front();
        }
    }

    /// Copy of the user's history, oldest first.
    pub fn snapshot(&self, user: &UserId) -> Vec<ConversationTurn> {
        let Some(history) = self.history(user) else {
            return Vec::new();
        };
        let turns = history.lock().unwrap_or_else(PoisonError::into_inner);
        turns.iter().cloned().collect()
    }

    /// Number of turns stored for the user.
    pub fn len(&self, user: &UserId) -> usize {
        self.history(user)
            .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    /// Text of the most recent non-empty user or assistant turn.
    pub fn last_text(&self, user: &UserId) -> Option<String> {
        let history = self.history(user)?;
        let turns = history.lock().unwrap_or_else(PoisonError::into_inner);
        turns
            .iter()
            .rev()
            .find(|t| t.role != Role::System && !t.content.trim().is_empty())
            .map(|t| t.content.clone())
    }

    /// Number of users with a history.
    pub fn users(&self) -> usize {
        self.histories.len()
    }

    fn history(&self, user: &UserId) -> Option<History> {
        self.histories.get(user).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_window_keeps_most_recent_in_order() {
        let store = ConversationStore::new(5);
        let user = UserId::from("alice");

        for i in 0..12 {
            store.append(&user, ConversationTurn::user(format!("msg {}", i)));
            assert!(store.len(&user) <= 5);
        }

        let contents: Vec<_> = store
            .snapshot(&user)
            .iter()
            .map(|t| t.content().to_string())
            .collect();
        assert_eq!(contents, vec!["msg 7", "msg 8", "msg 9", "msg 10", "msg 11"]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = ConversationStore::new(10);
        let user = UserId::from(42i64);
        store.append(&user, ConversationTurn::user("hello"));

        let before = store.snapshot(&user);
        store.append(&user, ConversationTurn::assistant("hi there"));

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot(&user).len(), 2);
    }

    #[test]
    fn test_users_are_independent() {
        let store = ConversationStore::new(3);
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        store.append(&alice, ConversationTurn::user("a"));
        store.append(&bob, ConversationTurn::user("b"));
        store.append(&bob, ConversationTurn::user("c"));

        assert_eq!(store.len(&alice), 1);
        assert_eq!(store.len(&bob), 2);
        assert_eq!(store.users(), 2);
        assert!(store.snapshot(&UserId::from("carol")).is_empty());
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let store = ConversationStore::new(0);
        assert_eq!(store.window(), 1);
    }

    #[test]
    fn test_last_text_skips_system_and_blank() {
        let store = ConversationStore::new(10);
        let user = UserId::from("alice");
        assert_eq!(store.last_text(&user), None);

        store.append(&user, ConversationTurn::user("tell me a joke"));
        store.append(&user, ConversationTurn::assistant("   "));
        store.append(&user, ConversationTurn::system("note"));

        assert_eq!(store.last_text(&user).as_deref(), Some("tell me a joke"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(ConversationStore::new(100));
        let user = UserId::from("alice");

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    store.append(&user, ConversationTurn::user(format!("turn {}", i)));
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let turns = store.snapshot(&user);
        assert_eq!(turns.len(), 64);
        let unique: HashSet<_> = turns.iter().map(|t| t.content().to_string()).collect();
        assert_eq!(unique.len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_respect_window() {
        let store = Arc::new(ConversationStore::new(10));
        let user = UserId::from("bob");

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    store.append(&user, ConversationTurn::user(i.to_string()));
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(&user), 10);
    }

    #[test]
    fn test_derived_message_ids_differ_for_repeated_text() {
        let user = UserId::from("alice");
        let a = MessageId::derive(&user, Role::User, "hello");
        let b = MessageId::derive(&user, Role::User, "hello");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
