//! Reachability checks for local services.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Default timeout for a single probe attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A stateless check of whether a service endpoint answers.
///
/// Unreachable is an ordinary result, so implementations never return errors.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns `true` if the endpoint answered within the probe timeout.
    async fn is_reachable(&self) -> bool;

    /// Human readable endpoint, used in logs.
    fn endpoint(&self) -> &str;
}

/// Probe that issues a GET against an HTTP base address.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set a custom per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", self.url, e);
                false
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Probe that only checks whether a TCP port accepts connections.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set a custom per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn is_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }

    fn endpoint(&self) -> &str {
        &self.addr
    }
}
