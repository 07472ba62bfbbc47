//! Local service supervision for Hearth.
//!
//! Hearth drives two heavyweight local servers that share one GPU: an
//! inference server (Ollama) and an image-generation server (ComfyUI). This
//! crate owns their processes and decides which one may run.
//!
//! ```text
//! ┌─────────────────┐  stop/start  ┌───────────────────┐  probe  ┌─────────────┐
//! │ ResourceArbiter │ ───────────> │ ServiceSupervisor │ ──────> │ HealthProbe │
//! └─────────────────┘              └───────────────────┘         └─────────────┘
//!                                            │ spawn / signal
//!                                      ┌─────┴─────┐
//!                                      │  process  │
//!                                      └───────────┘
//! ```
//!
//! The [`watcher`] module detects files a service writes, such as generated
//! images.

pub mod arbiter;
mod error;
pub mod probe;
pub mod process;
pub mod supervisor;
pub mod watcher;

pub use arbiter::{HandoffReport, Holder, ResourceArbiter, ResourceLease, Step, StepResult};
pub use error::{ArbiterError, ServiceError, WatchError};
pub use probe::{HealthProbe, HttpProbe, TcpProbe};
pub use process::LaunchSpec;
pub use supervisor::{
    ManagedService, ServiceSpec, ServiceState, ServiceSupervisor, StartOutcome, StopOutcome,
    StoppedProcess,
};
pub use watcher::{watch_for_new_artifact, ArtifactPatterns, ArtifactSnapshot};

/// Default port of the Ollama server.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Default port of the ComfyUI server.
pub const DEFAULT_COMFY_PORT: u16 = 8188;
