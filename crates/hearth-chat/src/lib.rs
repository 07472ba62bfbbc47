//! Conversation handling for Hearth.
//!
//! [`Assistant`] is what a transport talks to. It keeps a bounded history per
//! user, asks Ollama for replies through [`ChatGateway`] and runs ComfyUI jobs
//! through [`ImageWorkflow`], swapping the two servers on the GPU as needed.
//!
//! # Example
//!
//! ```ignore
//! use hearth_chat::{Assistant, HearthConfig, UserId};
//!
//! let config = HearthConfig::from_env()?;
//! let assistant = Assistant::from_config(&config)?;
//! let reply = assistant.handle_message(&UserId::from("me"), "hello", None).await?;
//! ```

mod assistant;
mod comfy;
mod config;
mod history;
mod memory;
mod ollama;

#[cfg(test)]
mod testing;

pub use assistant::{Assistant, AssistantStatus, ServiceKind, ServiceStatus};
pub use comfy::{ImageError, ImageRun, ImageStage, ImageWorkflow};
pub use config::{
    ConfigError, HearthConfig, HearthConfigBuilder, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT,
};
pub use history::{ConversationStore, ConversationTurn, MessageId, Role, UserId};
pub use memory::{MemoryEntry, MemoryError, MemoryStore, NoMemory};
pub use ollama::{ChatError, ChatGateway, ChatOptions};
