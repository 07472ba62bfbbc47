//! Long-term memory seam.
//!
//! The assistant saves every turn and recalls similar past texts through
//! [`MemoryStore`]. Vector databases plug in behind the trait; [`NoMemory`]
//! is used when none is configured.

use async_trait::async_trait;
use thiserror::Error;

use crate::history::{MessageId, Role, UserId};

/// Errors reported by a memory backend.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory backend unavailable: {0}")]
    Unavailable(String),
    #[error("Memory backend error: {0}")]
    Backend(String),
}

/// A text saved to memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub text: String,
    pub role: Role,
    pub user: UserId,
    pub message_id: MessageId,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>, role: Role, user: UserId, message_id: MessageId) -> Self {
        Self {
            text: text.into(),
            role,
            user,
            message_id,
        }
    }

    /// Stable document key, `<role>_<user>_<message id>`.
    pub fn document_id(&self) -> String {
        format!("{}_{}_{}", self.role, self.user, self.message_id)
    }
}

/// Similarity store for past messages.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist an entry.
    async fn save(&self, entry: MemoryEntry) -> Result<(), MemoryError>;

    /// Up to `top_k` stored texts most similar to `text`.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<String>, MemoryError>;
}

/// A memory that stores nothing and recalls nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

#[async_trait]
impl MemoryStore for NoMemory {
    async fn save(&self, _entry: MemoryEntry) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id() {
        let entry = MemoryEntry::new(
            "hello",
            Role::User,
            UserId::from(7i64),
            MessageId::new("1234"),
        );
        assert_eq!(entry.document_id(), "user_7_1234");
    }

    #[tokio::test]
    async fn test_no_memory_recalls_nothing() {
        let memory = NoMemory;
        let entry = MemoryEntry::new("hi", Role::User, UserId::from("a"), MessageId::new("1"));
        memory.save(entry).await.unwrap();
        assert!(memory.query("hi", 3).await.unwrap().is_empty());
    }
}
