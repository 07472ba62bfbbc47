//! Hearth configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hearth_local::{
    HttpProbe, LaunchSpec, ServiceSpec, ServiceSupervisor, TcpProbe, DEFAULT_COMFY_PORT,
    DEFAULT_OLLAMA_PORT,
};
use thiserror::Error;

use crate::ollama::ChatOptions;

/// Default system prompt when `SYSTEM_PROMPT` is unset.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Default Ollama model.
pub const DEFAULT_MODEL: &str = "llama3";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{0} must not be empty")]
    EmptyCommand(&'static str),
}

/// Configuration for the assistant and the services it manages.
#[derive(Debug, Clone)]
pub struct HearthConfig {
    /// Ollama model identifier
    pub model: String,
    /// System instruction prepended to every conversation
    pub system_prompt: String,
    /// Number of turns kept per user
    pub context_window: usize,
    /// Number of similar memories recalled per message
    pub memory_top_k: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub num_predict: i32,
    /// Timeout for a single chat request
    pub chat_timeout: Duration,

    /// Ollama base URL
    pub ollama_url: String,
    /// Command that launches Ollama
    pub ollama_command: String,
    /// Optional command that stops Ollama cleanly
    pub ollama_stop_command: Option<String>,
    pub ollama_start_timeout: Duration,

    /// ComfyUI installation directory, used as its working directory
    pub comfy_dir: PathBuf,
    /// Command that launches ComfyUI from `comfy_dir`
    pub comfy_command: String,
    pub comfy_port: u16,
    pub comfy_start_timeout: Duration,
    /// Workflow template the prompt is written into
    pub comfy_template: PathBuf,
    /// Where the filled-in workflow is written
    pub comfy_job_file: PathBuf,
    /// JSON pointer of the prompt text field inside the template
    pub comfy_prompt_pointer: String,
    /// Output directory (default: `<comfy_dir>/output`)
    pub comfy_output_dir: Option<PathBuf>,

    /// How long to wait for a generated image
    pub artifact_timeout: Duration,
    /// Pause between service and artifact polls
    pub poll_interval: Duration,
    /// Time a service gets to exit before it is killed
    pub stop_grace: Duration,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            context_window: 20,
            memory_top_k: 3,
            temperature: 0.7,
            num_predict: 1000,
            chat_timeout: Duration::from_secs(180),
            ollama_url: format!("http://127.0.0.1:{}", DEFAULT_OLLAMA_PORT),
            ollama_command: "ollama serve".to_string(),
            ollama_stop_command: None,
            ollama_start_timeout: Duration::from_secs(30),
            comfy_dir: PathBuf::from("ComfyUI"),
            comfy_command: "python main.py".to_string(),
            comfy_port: DEFAULT_COMFY_PORT,
            comfy_start_timeout: Duration::from_secs(100),
            comfy_template: PathBuf::from("workflow_template.json"),
            comfy_job_file: PathBuf::from("comfy_job.json"),
            comfy_prompt_pointer: "/6/inputs/text".to_string(),
            comfy_output_dir: None,
            artifact_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl HearthConfig {
    /// Create config from environment variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            parse(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            model: text("OLLAMA_MODEL", defaults.model),
            system_prompt: text("SYSTEM_PROMPT", defaults.system_prompt),
            context_window: parse(&lookup, "HEARTH_CONTEXT_WINDOW", defaults.context_window)?,
            memory_top_k: parse(&lookup, "HEARTH_MEMORY_TOP_K", defaults.memory_top_k)?,
            temperature: parse(&lookup, "HEARTH_TEMPERATURE", defaults.temperature)?,
            num_predict: parse(&lookup, "HEARTH_NUM_PREDICT", defaults.num_predict)?,
            chat_timeout: secs("HEARTH_CHAT_TIMEOUT_SECS", defaults.chat_timeout)?,
            ollama_url: text("OLLAMA_URL", defaults.ollama_url),
            ollama_command: text("OLLAMA_COMMAND", defaults.ollama_command),
            ollama_stop_command: lookup("OLLAMA_STOP_COMMAND").filter(|v| !v.trim().is_empty()),
            ollama_start_timeout: secs("OLLAMA_START_TIMEOUT_SECS", defaults.ollama_start_timeout)?,
            comfy_dir: lookup("COMFY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.comfy_dir),
            comfy_command: text("COMFY_COMMAND", defaults.comfy_command),
            comfy_port: parse(&lookup, "COMFY_PORT", defaults.comfy_port)?,
            comfy_start_timeout: secs("COMFY_START_TIMEOUT_SECS", defaults.comfy_start_timeout)?,
            comfy_template: lookup("COMFY_TEMPLATE")
                .map(PathBuf::from)
                .unwrap_or(defaults.comfy_template),
            comfy_job_file: lookup("COMFY_JOB_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.comfy_job_file),
            comfy_prompt_pointer: text("COMFY_PROMPT_POINTER", defaults.comfy_prompt_pointer),
            comfy_output_dir: lookup("COMFY_OUTPUT_DIR").map(PathBuf::from),
            artifact_timeout: secs("HEARTH_ARTIFACT_TIMEOUT_SECS", defaults.artifact_timeout)?,
            poll_interval: Duration::from_millis(parse(
                &lookup,
                "HEARTH_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            stop_grace: secs("HEARTH_STOP_GRACE_SECS", defaults.stop_grace)?,
        })
    }

    /// Create a builder for configuration.
    pub fn builder() -> HearthConfigBuilder {
        HearthConfigBuilder::default()
    }

    /// Directory ComfyUI writes images to.
    pub fn output_dir(&self) -> PathBuf {
        self.comfy_output_dir
            .clone()
            .unwrap_or_else(|| self.comfy_dir.join("output"))
    }

    /// ComfyUI base URL.
    pub fn comfy_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.comfy_port)
    }

    /// Sampling options for chat requests.
    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
            timeout: self.chat_timeout,
        }
    }

    /// Supervisor for the Ollama server.
    pub fn ollama_supervisor(&self) -> Result<ServiceSupervisor, ConfigError> {
        let launch = LaunchSpec::from_command_line(&self.ollama_command)
            .ok_or(ConfigError::EmptyCommand("OLLAMA_COMMAND"))?;

        let mut spec = ServiceSpec::new("ollama", launch)
            .with_startup_timeout(self.ollama_start_timeout)
            .with_poll_interval(self.poll_interval)
            .with_stop_grace(self.stop_grace);
        if let Some(stop) = self
            .ollama_stop_command
            .as_deref()
            .and_then(LaunchSpec::from_command_line)
        {
            spec = spec.with_stop_command(stop);
        }

        Ok(ServiceSupervisor::new(
            spec,
            Arc::new(HttpProbe::new(self.ollama_url.clone())),
        ))
    }

    /// Supervisor for the ComfyUI server.
    pub fn comfy_supervisor(&self) -> Result<ServiceSupervisor, ConfigError> {
        let launch = LaunchSpec::from_command_line(&self.comfy_command)
            .ok_or(ConfigError::EmptyCommand("COMFY_COMMAND"))?
            .in_dir(&self.comfy_dir);

        let spec = ServiceSpec::new("comfyui", launch)
            .with_startup_timeout(self.comfy_start_timeout)
            .with_poll_interval(self.poll_interval)
            .with_stop_grace(self.stop_grace);

        Ok(ServiceSupervisor::new(
            spec,
            Arc::new(TcpProbe::new("127.0.0.1", self.comfy_port)),
        ))
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

/// Builder for Hearth configuration.
#[derive(Debug, Default)]
pub struct HearthConfigBuilder {
    config: HearthConfig,
}

impl HearthConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn context_window(mut self, window: usize) -> Self {
        self.config.context_window = window;
        self
    }

    pub fn memory_top_k(mut self, top_k: usize) -> Self {
        self.config.memory_top_k = top_k;
        self
    }

    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_url = url.into();
        self
    }

    pub fn chat_timeout(mut self, timeout: Duration) -> Self {
        self.config.chat_timeout = timeout;
        self
    }

    pub fn comfy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.comfy_dir = dir.into();
        self
    }

    pub fn comfy_port(mut self, port: u16) -> Self {
        self.config.comfy_port = port;
        self
    }

    pub fn comfy_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.comfy_template = path.into();
        self
    }

    pub fn comfy_job_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.comfy_job_file = path.into();
        self
    }

    pub fn comfy_prompt_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.config.comfy_prompt_pointer = pointer.into();
        self
    }

    pub fn comfy_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.comfy_output_dir = Some(dir.into());
        self
    }

    pub fn artifact_timeout(mut self, timeout: Duration) -> Self {
        self.config.artifact_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn build(self) -> HearthConfig {
        self.config
    }
}
