//! Test doubles shared by the module tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_local::{ManagedService, ServiceError, StartOutcome, StopOutcome};

/// In-memory service recording how often it was started and stopped.
pub struct FakeService {
    name: &'static str,
    pub running: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    /// Milliseconds `start` takes before it returns.
    pub start_delay: AtomicU64,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeService {
    pub fn new(name: &'static str, running: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            running: AtomicBool::new(running),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_delay: AtomicU64::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn is_up(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedService for FakeService {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) -> Result<StartOutcome, ServiceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let delay = self.start_delay.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ServiceError::StartupTimeout {
                service: self.name.to_string(),
                waited: Duration::from_millis(10),
            });
        }
        if self.running.swap(true, Ordering::SeqCst) {
            Ok(StartOutcome::AlreadyRunning)
        } else {
            Ok(StartOutcome::Launched { pid: None })
        }
    }

    async fn stop(&self) -> Result<StopOutcome, ServiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ServiceError::ShutdownFailure {
                service: self.name.to_string(),
                reason: "refused".to_string(),
            });
        }
        Ok(StopOutcome::default())
    }

    async fn is_running(&self) -> bool {
        self.is_up()
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}
