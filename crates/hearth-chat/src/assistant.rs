//! The message handler behind every transport.

use std::sync::Arc;

use hearth_local::{
    Holder, ManagedService, ResourceArbiter, ServiceError, ServiceState, StopOutcome,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::comfy::{ImageRun, ImageWorkflow};
use crate::config::{ConfigError, HearthConfig};
use crate::history::{ConversationStore, ConversationTurn, MessageId, Role, UserId};
use crate::memory::{MemoryEntry, MemoryStore, NoMemory};
use crate::ollama::{ChatError, ChatGateway, ChatOptions};

/// Which managed service a command refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Chat,
    Image,
}

/// Observed state of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub reachable: bool,
    pub state: ServiceState,
}

/// Snapshot for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantStatus {
    pub chat: ServiceStatus,
    pub image: ServiceStatus,
    pub holder: Holder,
    pub users: usize,
}

/// Chat and image generation on a single shared GPU.
pub struct Assistant {
    system_prompt: String,
    memory_top_k: usize,
    options: ChatOptions,
    history: ConversationStore,
    memory: Arc<dyn MemoryStore>,
    gateway: ChatGateway,
    images: ImageWorkflow,
    arbiter: Arc<ResourceArbiter>,
    chat_service: Arc<dyn ManagedService>,
    image_service: Arc<dyn ManagedService>,
    /// Chats share it, image runs take it exclusively.
    gpu: RwLock<()>,
}

impl Assistant {
    pub fn new(
        config: &HearthConfig,
        chat_service: Arc<dyn ManagedService>,
        image_service: Arc<dyn ManagedService>,
    ) -> Self {
        let arbiter = Arc::new(ResourceArbiter::new(
            chat_service.clone(),
            image_service.clone(),
        ));
        Self {
            system_prompt: config.system_prompt.clone(),
            memory_top_k: config.memory_top_k,
            options: config.chat_options(),
            history: ConversationStore::new(config.context_window),
            memory: Arc::new(NoMemory),
            gateway: ChatGateway::new(&config.ollama_url, &config.model, chat_service.clone()),
            images: ImageWorkflow::from_config(config, arbiter.clone()),
            arbiter,
            chat_service,
            image_service,
            gpu: RwLock::new(()),
        }
    }

    /// Build an assistant that supervises the real Ollama and ComfyUI processes.
    pub fn from_config(config: &HearthConfig) -> Result<Self, ConfigError> {
        let ollama = Arc::new(config.ollama_supervisor()?);
        let comfy = Arc::new(config.comfy_supervisor()?);
        Ok(Self::new(config, ollama, comfy))
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn history(&self) -> &ConversationStore {
        &self.history
    }

    pub fn images(&self) -> &ImageWorkflow {
        &self.images
    }

    /// Answer one user message.
    ///
    /// The user turn is recorded before the model is asked, so a failed
    /// request leaves it in the history without a reply.
    pub async fn handle_message(
        &self,
        user: &UserId,
        text: &str,
        message_id: Option<MessageId>,
    ) -> Result<String, ChatError> {
        let message_id = message_id.unwrap_or_else(|| MessageId::derive(user, Role::User, text));
        self.history.append(
            user,
            ConversationTurn::user(text).with_message_id(message_id.clone()),
        );
        self.remember(MemoryEntry::new(text, Role::User, user.clone(), message_id))
            .await;

        let recalled = match self.memory.query(text, self.memory_top_k).await {
            Ok(texts) => texts,
            Err(e) => {
                warn!("Memory recall failed: {}", e);
                Vec::new()
            }
        };
        let system_prompt = with_recollections(&self.system_prompt, &recalled);

        let turns = self.history.snapshot(user);
        let reply = {
            let _gpu = self.gpu.read().await;
            self.gateway
                .converse(&turns, &system_prompt, &self.options)
                .await?
        };

        let reply_id = MessageId::derive(user, Role::Assistant, &reply);
        self.history.append(
            user,
            ConversationTurn::assistant(reply.clone()).with_message_id(reply_id.clone()),
        );
        self.remember(MemoryEntry::new(
            reply.clone(),
            Role::Assistant,
            user.clone(),
            reply_id,
        ))
        .await;

        Ok(reply)
    }

    /// Generate an image. Chats wait until the run has restored Ollama.
    pub async fn imagine(&self, user: &UserId, prompt: &str, cancel: &CancellationToken) -> ImageRun {
        let _gpu = self.gpu.write().await;
        info!("Image requested by {}: {}", user, prompt);
        self.images.run(prompt, cancel).await
    }

    pub async fn status(&self) -> AssistantStatus {
        AssistantStatus {
            chat: service_status(self.chat_service.as_ref()).await,
            image: service_status(self.image_service.as_ref()).await,
            holder: self.arbiter.holder(),
            users: self.history.users(),
        }
    }

    /// Stop one service. Waits for any hand-off in progress.
    pub async fn stop(&self, kind: ServiceKind) -> Result<StopOutcome, ServiceError> {
        let _lease = self.arbiter.acquire().await;
        match kind {
            ServiceKind::Chat => self.chat_service.stop().await,
            ServiceKind::Image => self.image_service.stop().await,
        }
    }

    async fn remember(&self, entry: MemoryEntry) {
        let id = entry.document_id();
        if let Err(e) = self.memory.save(entry).await {
            warn!("Could not save {} to memory: {}", id, e);
        }
    }
}

async fn service_status(service: &dyn ManagedService) -> ServiceStatus {
    ServiceStatus {
        name: service.name().to_string(),
        reachable: service.is_running().await,
        state: service.state().await,
    }
}

fn with_recollections(system_prompt: &str, recalled: &[String]) -> String {
    if recalled.is_empty() {
        return system_prompt.to_string();
    }
    let mut prompt = format!("{}\n\nThings you remember from earlier conversations:", system_prompt);
    for text in recalled {
        prompt.push_str("\n- ");
        prompt.push_str(text);
    }
    prompt
}
