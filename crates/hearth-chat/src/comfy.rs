//! ComfyUI image generation workflow.
//!
//! One run leases the GPU from the arbiter, swaps Ollama for ComfyUI, submits
//! the job, waits for the image and always swaps back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hearth_local::watcher;
use hearth_local::{
    watch_for_new_artifact, ArbiterError, ArtifactPatterns, ResourceArbiter, ServiceError,
    WatchError,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::HearthConfig;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from an image run.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Workflow template error: {0}")]
    Template(String),
    #[error("Could not start {service}: {source}")]
    Handoff {
        service: String,
        #[source]
        source: ServiceError,
    },
    #[error("ComfyUI rejected the job: {reason}")]
    Submit { status: Option<u16>, reason: String },
    #[error(transparent)]
    Artifact(#[from] WatchError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Progress of an image run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStage {
    Idle,
    TemplateWritten,
    ResourceHandedOff,
    ServiceLaunched,
    PromptSubmitted,
    WatchingArtifact,
    ArtifactFound,
    TimedOut,
    ResourceRestored,
    Failed(String),
}

/// Everything that happened during one run.
#[derive(Debug)]
pub struct ImageRun {
    /// Stages reached, in order
    pub trail: Vec<ImageStage>,
    pub outcome: Result<PathBuf, ImageError>,
    /// Cleanup failures that did not affect the outcome
    pub warnings: Vec<ServiceError>,
}

impl ImageRun {
    pub fn reached(&self, stage: &ImageStage) -> bool {
        self.trail.contains(stage)
    }
}

/// Runs prompts through ComfyUI.
pub struct ImageWorkflow {
    arbiter: Arc<ResourceArbiter>,
    client: reqwest::Client,
    comfy_url: String,
    template: PathBuf,
    prompt_pointer: String,
    job_file: PathBuf,
    output_dir: PathBuf,
    patterns: ArtifactPatterns,
    artifact_timeout: Duration,
    poll_interval: Duration,
}

impl ImageWorkflow {
    pub fn new(arbiter: Arc<ResourceArbiter>, comfy_url: impl Into<String>) -> Self {
        let defaults = HearthConfig::default();
        Self {
            arbiter,
            client: reqwest::Client::new(),
            comfy_url: comfy_url.into().trim_end_matches('/').to_string(),
            template: defaults.comfy_template,
            prompt_pointer: defaults.comfy_prompt_pointer,
            job_file: defaults.comfy_job_file,
            output_dir: defaults.comfy_dir.join("output"),
            patterns: ArtifactPatterns::images(),
            artifact_timeout: defaults.artifact_timeout,
            poll_interval: defaults.poll_interval,
        }
    }

    pub fn from_config(config: &HearthConfig, arbiter: Arc<ResourceArbiter>) -> Self {
        Self::new(arbiter, config.comfy_url())
            .with_template(&config.comfy_template, &config.comfy_prompt_pointer)
            .with_job_file(&config.comfy_job_file)
            .with_output_dir(config.output_dir())
            .with_artifact_timeout(config.artifact_timeout)
            .with_poll_interval(config.poll_interval)
    }

    /// Template file and the JSON pointer of its prompt text field.
    pub fn with_template(mut self, path: impl Into<PathBuf>, pointer: impl Into<String>) -> Self {
        self.template = path.into();
        self.prompt_pointer = pointer.into();
        self
    }

    pub fn with_job_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.job_file = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_artifact_timeout(mut self, timeout: Duration) -> Self {
        self.artifact_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate an image for `prompt`.
    ///
    /// Runs are serialized by the arbiter lease. Once the hand-off has been
    /// attempted the primary service is always restored, whatever the outcome.
    /// A cancelled `cancel` is honoured at every stage; before the hand-off it
    /// leaves both services untouched.
    pub async fn run(&self, prompt: &str, cancel: &CancellationToken) -> ImageRun {
        let mut trail = vec![ImageStage::Idle];
        let mut warnings = Vec::new();

        let mut lease = tokio::select! {
            lease = self.arbiter.acquire() => lease,
            _ = cancel.cancelled() => return cancelled_before_hand_off(trail),
        };
        if cancel.is_cancelled() {
            return cancelled_before_hand_off(trail);
        }

        let job = match self.write_job(prompt).await {
            Ok(job) => job,
            Err(e) => {
                error!("Cannot prepare image job: {}", e);
                trail.push(ImageStage::Failed(e.to_string()));
                return ImageRun {
                    trail,
                    outcome: Err(e),
                    warnings,
                };
            }
        };
        trail.push(ImageStage::TemplateWritten);

        if cancel.is_cancelled() {
            return cancelled_before_hand_off(trail);
        }

        let handoff = tokio::select! {
            handoff = lease.hand_off_to_secondary() => Some(handoff),
            _ = cancel.cancelled() => None,
        };
        let outcome = match handoff {
            Some(Ok(report)) => {
                warnings.extend(report.into_failures());
                trail.push(ImageStage::ResourceHandedOff);
                trail.push(ImageStage::ServiceLaunched);
                self.drive(job, cancel, &mut trail).await
            }
            Some(Err(ArbiterError::HandoffFailed {
                service,
                source,
                report,
            })) => {
                warnings.extend(report.into_failures());
                Err(ImageError::Handoff { service, source })
            }
            None => {
                info!("Image run cancelled during hand-off");
                Err(ImageError::Artifact(WatchError::Cancelled))
            }
        };

        match &outcome {
            Ok(path) => info!("Image ready: {}", path.display()),
            Err(ImageError::Artifact(WatchError::ArtifactTimeout { .. })) => {
                warn!("Timed out waiting for image in {}", self.output_dir.display());
                trail.push(ImageStage::TimedOut);
            }
            Err(e) => {
                error!("Image run failed: {}", e);
                trail.push(ImageStage::Failed(e.to_string()));
            }
        }

        let restore = lease.hand_back_to_primary().await;
        for failure in restore.failures() {
            warn!("Restoring primary service: {}", failure);
        }
        warnings.extend(restore.into_failures());
        trail.push(ImageStage::ResourceRestored);

        ImageRun {
            trail,
            outcome,
            warnings,
        }
    }

    async fn drive(
        &self,
        job: Value,
        cancel: &CancellationToken,
        trail: &mut Vec<ImageStage>,
    ) -> Result<PathBuf, ImageError> {
        let baseline = watcher::snapshot(&self.output_dir, &self.patterns).await?;

        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled.into());
        }
        self.submit(job).await?;
        trail.push(ImageStage::PromptSubmitted);

        trail.push(ImageStage::WatchingArtifact);
        let path = watch_for_new_artifact(
            &self.output_dir,
            &self.patterns,
            &baseline,
            self.artifact_timeout,
            self.poll_interval,
            cancel,
        )
        .await?;
        trail.push(ImageStage::ArtifactFound);
        Ok(path)
    }

    /// Fill the template with `prompt` and write it to the job file.
    pub async fn write_job(&self, prompt: &str) -> Result<Value, ImageError> {
        let raw = tokio::fs::read_to_string(&self.template)
            .await
            .map_err(|e| {
                ImageError::Template(format!("cannot read {}: {}", self.template.display(), e))
            })?;
        let mut doc: Value = serde_json::from_str(&raw)?;

        let slot = doc.pointer_mut(&self.prompt_pointer).ok_or_else(|| {
            ImageError::Template(format!(
                "{} has no field at {}",
                self.template.display(),
                self.prompt_pointer
            ))
        })?;
        *slot = Value::String(prompt.to_string());

        tokio::fs::write(&self.job_file, serde_json::to_vec_pretty(&doc)?).await?;
        info!("Wrote image job to {}", self.job_file.display());
        Ok(doc)
    }

    /// POST the job to ComfyUI's queue.
    pub async fn submit(&self, job: Value) -> Result<(), ImageError> {
        let url = format!("{}/prompt", self.comfy_url);
        let response = self
            .client
            .post(&url)
            .timeout(SUBMIT_TIMEOUT)
            .json(&request_body(job))
            .send()
            .await
            .map_err(|e| ImageError::Submit {
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Submit {
                status: Some(status.as_u16()),
                reason: format!("{}: {}", status, body),
            });
        }

        info!("Submitted image job to {}", url);
        Ok(())
    }
}

fn cancelled_before_hand_off(mut trail: Vec<ImageStage>) -> ImageRun {
    let error = ImageError::Artifact(WatchError::Cancelled);
    info!("Image run cancelled before hand-off");
    trail.push(ImageStage::Failed(error.to_string()));
    ImageRun {
        trail,
        outcome: Err(error),
        warnings: Vec::new(),
    }
}

/// ComfyUI expects the graph under a top-level `prompt` key.
fn request_body(doc: Value) -> Value {
    if doc.get("prompt").is_some_and(Value::is_object) {
        doc
    } else {
        json!({ "prompt": doc })
    }
}
