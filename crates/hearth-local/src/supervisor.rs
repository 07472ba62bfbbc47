//! Lifecycle management for one externally launched service process.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::probe::HealthProbe;
use crate::process::{self, LaunchSpec};

/// Default time to wait for a service to answer its probe.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between startup probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a process gets to exit before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Static description of a supervised service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Display name used in logs and errors.
    pub name: String,
    /// How the service is launched.
    pub launch: LaunchSpec,
    /// Optional command that asks the service to shut down cleanly.
    pub stop_command: Option<LaunchSpec>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
}

impl ServiceSpec {
    /// Create a spec with default timeouts.
    pub fn new(name: impl Into<String>, launch: LaunchSpec) -> Self {
        Self {
            name: name.into(),
            launch,
            stop_command: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_command(mut self, command: LaunchSpec) -> Self {
        self.stop_command = Some(command);
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Lifecycle state as last observed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    /// Launched, but the probe never answered.
    Unresponsive,
    Stopping,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Unresponsive => "unresponsive",
            ServiceState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The probe already succeeded; nothing was launched.
    AlreadyRunning,
    /// A new process was launched and became ready.
    Launched { pid: Option<u32> },
}

/// A process that `stop` terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppedProcess {
    pub pid: Option<u32>,
    /// Had to be killed after the grace period.
    pub forced: bool,
}

/// Result of a successful `stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOutcome {
    pub stopped: Vec<StoppedProcess>,
}

impl StopOutcome {
    /// Whether no process was found to stop.
    pub fn nothing_found(&self) -> bool {
        self.stopped.is_empty()
    }
}

/// A service whose process can be started and stopped.
///
/// This is the seam the resource arbiter and chat gateway work against.
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<StartOutcome, ServiceError>;

    async fn stop(&self) -> Result<StopOutcome, ServiceError>;

    async fn is_running(&self) -> bool;

    /// Lifecycle state, for status reporting.
    async fn state(&self) -> ServiceState {
        if self.is_running().await {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        }
    }
}

/// Owns the process of one local service.
pub struct ServiceSupervisor {
    spec: ServiceSpec,
    probe: Arc<dyn HealthProbe>,
    /// Held for the whole of a start or stop.
    child: Mutex<Option<Child>>,
    /// Only ever locked briefly, so it can be read while an operation runs.
    state: StdMutex<ServiceState>,
}

impl ServiceSupervisor {
    /// Create a supervisor. Nothing is launched until `start` is called.
    pub fn new(spec: ServiceSpec, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            spec,
            probe,
            child: Mutex::new(None),
            state: StdMutex::new(ServiceState::Stopped),
        }
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Probe endpoint, for status output.
    pub fn endpoint(&self) -> &str {
        self.probe.endpoint()
    }

    /// Current lifecycle state. Does not wait for a start or stop in progress.
    ///
    /// Without a retained process the state is taken from the probe, so a
    /// service launched by someone else reports `Running`.
    pub async fn state(&self) -> ServiceState {
        let recorded = self.recorded_state();
        if matches!(recorded, ServiceState::Starting | ServiceState::Stopping) {
            return recorded;
        }

        let retained = match self.child.try_lock() {
            Ok(child) => child.is_some(),
            // An operation just began and has not recorded its state yet.
            Err(_) => return recorded,
        };
        if retained {
            recorded
        } else if self.probe.is_reachable().await {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        }
    }

    fn recorded_state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ServiceState) {
        debug!("{} is now {}", self.spec.name, state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    #[cfg(test)]
    async fn has_handle(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Start the service unless it already answers its probe.
    ///
    /// The whole call, including the initial probe, is bounded by the startup
    /// timeout plus one poll interval.
    pub async fn start(&self) -> Result<StartOutcome, ServiceError> {
        let mut retained = self.child.lock().await;
        let started = Instant::now();
        let deadline = started + self.spec.startup_timeout;

        if let Ok(true) = timeout(self.spec.startup_timeout, self.probe.is_reachable()).await {
            info!("{} already running at {}", self.spec.name, self.probe.endpoint());
            self.set_state(ServiceState::Running);
            return Ok(StartOutcome::AlreadyRunning);
        }

        if let Some(stale) = retained.take() {
            warn!(
                "{} has a retained process that does not answer, replacing it",
                self.spec.name
            );
            self.set_state(ServiceState::Stopping);
            if let Err(e) = self.stop_child(stale).await {
                warn!("{}", e);
            }
        }

        info!("Starting {}: {}", self.spec.name, self.spec.launch.display());
        let mut child = self.spec.launch.spawn().map_err(|e| {
            self.set_state(ServiceState::Stopped);
            ServiceError::Launch {
                service: self.spec.name.clone(),
                reason: e.to_string(),
            }
        })?;
        let pid = child.id();
        debug!("{} process started with PID: {:?}", self.spec.name, pid);
        self.set_state(ServiceState::Starting);

        match self.wait_ready(&mut child, started, deadline).await {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                *retained = Some(child);
                Ok(StartOutcome::Launched { pid })
            }
            Err(e @ ServiceError::ExitedDuringStartup { .. }) => {
                self.set_state(ServiceState::Stopped);
                Err(e)
            }
            Err(e) => {
                // Keep the handle so a later stop can reap it.
                self.set_state(ServiceState::Unresponsive);
                *retained = Some(child);
                Err(e)
            }
        }
    }

    /// Poll the probe until it answers, the child exits, or the deadline passes.
    async fn wait_ready(
        &self,
        child: &mut Child,
        started: Instant,
        deadline: Instant,
    ) -> Result<(), ServiceError> {
        info!("Waiting for {} to become ready...", self.spec.name);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(true) = timeout(remaining, self.probe.is_reachable()).await {
                info!("{} is ready", self.spec.name);
                return Ok(());
            }

            if let Ok(Some(status)) = child.try_wait() {
                warn!("{} exited during startup: {}", self.spec.name, status);
                return Err(ServiceError::ExitedDuringStartup {
                    service: self.spec.name.clone(),
                    status: status.to_string(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            debug!("{} not ready yet", self.spec.name);
            sleep(self.spec.poll_interval.min(deadline - now)).await;
        }

        warn!(
            "{} did not become ready within {:?}",
            self.spec.name, self.spec.startup_timeout
        );
        Err(ServiceError::StartupTimeout {
            service: self.spec.name.clone(),
            waited: started.elapsed(),
        })
    }

    /// Stop the service.
    ///
    /// Uses the retained process when there is one, otherwise looks for
    /// processes matching the launch spec. The retained handle is always
    /// cleared.
    pub async fn stop(&self) -> Result<StopOutcome, ServiceError> {
        let mut retained = self.child.lock().await;
        self.set_state(ServiceState::Stopping);

        let result = match retained.take() {
            Some(child) => self
                .stop_child(child)
                .await
                .map(|stopped| StopOutcome {
                    stopped: vec![stopped],
                }),
            None => self.stop_matching().await,
        };

        let state = match &result {
            Ok(_) => ServiceState::Stopped,
            Err(_) if self.probe.is_reachable().await => ServiceState::Running,
            Err(_) => ServiceState::Stopped,
        };
        self.set_state(state);

        result
    }

    async fn stop_child(&self, mut child: Child) -> Result<StoppedProcess, ServiceError> {
        let pid = child.id();

        if let Ok(Some(status)) = child.try_wait() {
            debug!("{} had already exited with status: {}", self.spec.name, status);
            return Ok(StoppedProcess { pid, forced: false });
        }

        info!("Stopping {} (PID: {:?})", self.spec.name, pid);

        if !self.run_stop_command().await {
            match pid {
                Some(pid) if process::request_terminate(pid) => {}
                _ => {
                    if let Err(e) = child.start_kill() {
                        debug!("Failed to signal {}: {}", self.spec.name, e);
                    }
                }
            }
        }

        match timeout(self.spec.stop_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} exited with status: {}", self.spec.name, status);
                Ok(StoppedProcess { pid, forced: false })
            }
            _ => {
                warn!("{} didn't exit gracefully, killing...", self.spec.name);
                if let Some(pid) = pid {
                    process::force_kill(pid);
                }
                child.kill().await.map_err(|e| ServiceError::ShutdownFailure {
                    service: self.spec.name.clone(),
                    reason: e.to_string(),
                })?;
                Ok(StoppedProcess { pid, forced: true })
            }
        }
    }

    async fn stop_matching(&self) -> Result<StopOutcome, ServiceError> {
        let launch = self.spec.launch.clone();
        let pids = tokio::task::spawn_blocking(move || process::find_matching(&launch))
            .await
            .map_err(|e| ServiceError::ShutdownFailure {
                service: self.spec.name.clone(),
                reason: format!("process scan failed: {}", e),
            })?;

        if pids.is_empty() {
            debug!("No running {} process found", self.spec.name);
            return Ok(StopOutcome::default());
        }

        info!(
            "Stopping {} without a retained handle, matched PIDs: {:?}",
            self.spec.name, pids
        );

        let graceful = self.run_stop_command().await;
        let mut outcome = StopOutcome::default();
        let mut survivors = Vec::new();

        for pid in pids {
            if !graceful {
                process::request_terminate(pid);
            }
            if self.wait_exit(pid).await {
                outcome.stopped.push(StoppedProcess {
                    pid: Some(pid),
                    forced: false,
                });
                continue;
            }

            warn!("{} (PID: {}) didn't exit gracefully, killing...", self.spec.name, pid);
            let killed = tokio::task::spawn_blocking(move || process::force_kill(pid))
                .await
                .unwrap_or(false);
            if killed || !process::is_alive(pid) {
                outcome.stopped.push(StoppedProcess {
                    pid: Some(pid),
                    forced: true,
                });
            } else {
                survivors.push(pid);
            }
        }

        if survivors.is_empty() {
            Ok(outcome)
        } else {
            Err(ServiceError::ShutdownFailure {
                service: self.spec.name.clone(),
                reason: format!("processes still alive: {:?}", survivors),
            })
        }
    }

    /// Wait up to the grace period for `pid` to disappear.
    async fn wait_exit(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.spec.stop_grace;
        let step = Duration::from_millis(100);
        loop {
            if !process::is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(step).await;
        }
    }

    /// Run the configured graceful stop command. Returns `true` if it ran and
    /// exited successfully.
    async fn run_stop_command(&self) -> bool {
        let Some(command) = &self.spec.stop_command else {
            return false;
        };

        debug!("Running stop command for {}: {}", self.spec.name, command.display());
        let mut child = match command.clone().attached().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Stop command for {} failed to launch: {}", self.spec.name, e);
                return false;
            }
        };

        match timeout(self.spec.stop_grace, child.wait()).await {
            Ok(Ok(status)) if status.success() => true,
            Ok(Ok(status)) => {
                warn!("Stop command for {} exited with {}", self.spec.name, status);
                false
            }
            _ => {
                warn!("Stop command for {} did not finish", self.spec.name);
                let _ = child.kill().await;
                false
            }
        }
    }

    /// Check whether the service answers its probe. Never fails.
    pub async fn is_running(&self) -> bool {
        self.probe.is_reachable().await
    }
}

#[async_trait]
impl ManagedService for ServiceSupervisor {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn start(&self) -> Result<StartOutcome, ServiceError> {
        ServiceSupervisor::start(self).await
    }

    async fn stop(&self) -> Result<StopOutcome, ServiceError> {
        ServiceSupervisor::stop(self).await
    }

    async fn is_running(&self) -> bool {
        ServiceSupervisor::is_running(self).await
    }

    async fn state(&self) -> ServiceState {
        ServiceSupervisor::state(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Probe whose answer the test controls.
    struct FlagProbe {
        up: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlagProbe {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for FlagProbe {
        async fn is_reachable(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.up.load(Ordering::SeqCst)
        }

        fn endpoint(&self) -> &str {
            "flag"
        }
    }

    fn spec(launch: LaunchSpec) -> ServiceSpec {
        ServiceSpec::new("test-service", launch)
            .with_startup_timeout(Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(100))
            .with_stop_grace(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_start_when_already_running_is_noop() {
        let probe = FlagProbe::new(true);
        // Launching this would fail, so a no-op start proves nothing was spawned.
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("/nonexistent/hearth-test-binary")),
            probe.clone(),
        );

        let outcome = supervisor.start().await.unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyRunning);
        assert!(!supervisor.has_handle().await);
        assert_eq!(supervisor.state().await, ServiceState::Running);
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("/nonexistent/hearth-test-binary")),
            FlagProbe::new(false),
        );

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Launch { .. }));
        assert_eq!(supervisor.state().await, ServiceState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_times_out_within_bound() {
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("sleep").arg("30")),
            FlagProbe::new(false),
        );

        let began = std::time::Instant::now();
        let err = supervisor.start().await.unwrap_err();
        let elapsed = began.elapsed();

        assert!(matches!(err, ServiceError::StartupTimeout { .. }));
        assert!(elapsed >= Duration::from_millis(500));
        // timeout + poll interval, with slack for process spawn
        assert!(elapsed < Duration::from_millis(500 + 100 + 400));
        assert_eq!(supervisor.state().await, ServiceState::Unresponsive);
        assert!(supervisor.has_handle().await);

        let stopped = supervisor.stop().await.unwrap();
        assert_eq!(stopped.stopped.len(), 1);
        assert!(!supervisor.has_handle().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_then_stop_retained_process() {
        let probe = FlagProbe::new(false);
        let supervisor =
            ServiceSupervisor::new(spec(LaunchSpec::new("sleep").arg("30")), probe.clone());

        let flip = probe.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            flip.up.store(true, Ordering::SeqCst);
        });

        let outcome = supervisor.start().await.unwrap();
        assert!(matches!(outcome, StartOutcome::Launched { pid: Some(_) }));
        assert_eq!(supervisor.state().await, ServiceState::Running);

        probe.up.store(false, Ordering::SeqCst);
        let stopped = supervisor.stop().await.unwrap();
        assert_eq!(stopped.stopped.len(), 1);
        assert!(!stopped.stopped[0].forced);
        assert_eq!(supervisor.state().await, ServiceState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_startup_fails_fast() {
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("sh").arg("-c").arg("exit 3"))
                .with_startup_timeout(Duration::from_secs(10)),
            FlagProbe::new(false),
        );

        let began = std::time::Instant::now();
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::ExitedDuringStartup { .. }));
        assert!(began.elapsed() < Duration::from_secs(5));
        assert!(!supervisor.has_handle().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_without_handle_finds_process_by_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut orphan = std::process::Command::new("sleep")
            .arg("41.25")
            .current_dir(dir.path())
            .spawn()
            .unwrap();

        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("sleep").arg("41.25").in_dir(dir.path())),
            FlagProbe::new(false),
        );

        let outcome = supervisor.stop().await.unwrap();
        assert_eq!(outcome.stopped.len(), 1);
        assert_eq!(outcome.stopped[0].pid, Some(orphan.id()));

        let status = orphan.wait().unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_command_is_used_before_signals() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FlagProbe::new(false);
        let stop_command = LaunchSpec::new("sh")
            .arg("-c")
            .arg("touch stopped-by-command; kill $(cat service.pid)")
            .in_dir(dir.path());
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("sleep").arg("38.5").in_dir(dir.path()))
                .with_stop_command(stop_command),
            probe.clone(),
        );

        let flip = probe.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            flip.up.store(true, Ordering::SeqCst);
        });
        let StartOutcome::Launched { pid: Some(pid) } = supervisor.start().await.unwrap() else {
            panic!("expected a launched process");
        };
        std::fs::write(dir.path().join("service.pid"), pid.to_string()).unwrap();

        probe.up.store(false, Ordering::SeqCst);
        let outcome = supervisor.stop().await.unwrap();
        assert_eq!(outcome.stopped.len(), 1);
        assert!(!outcome.stopped[0].forced);
        assert!(dir.path().join("stopped-by-command").exists());
        assert!(!process::is_alive(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forced_stop_kills_whole_process_group() {
        let probe = FlagProbe::new(false);
        // The shell and its background sleep both ignore SIGTERM.
        let supervisor = ServiceSupervisor::new(
            spec(
                LaunchSpec::new("sh")
                    .arg("-c")
                    .arg("trap '' TERM; sleep 37.75 & wait"),
            )
            .with_stop_grace(Duration::from_millis(500)),
            probe.clone(),
        );

        let flip = probe.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            flip.up.store(true, Ordering::SeqCst);
        });
        supervisor.start().await.unwrap();
        let grandchild = LaunchSpec::new("sleep").arg("37.75");
        assert!(!process::find_matching(&grandchild).is_empty());

        probe.up.store(false, Ordering::SeqCst);
        let outcome = supervisor.stop().await.unwrap();
        assert_eq!(outcome.stopped.len(), 1);
        assert!(outcome.stopped[0].forced);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !process::find_matching(&grandchild).is_empty() {
            assert!(
                std::time::Instant::now() < deadline,
                "background sleep survived the forced stop"
            );
            sleep(Duration::from_millis(50)).await;
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_state_is_readable_while_starting() {
        let supervisor = Arc::new(ServiceSupervisor::new(
            spec(LaunchSpec::new("sleep").arg("30"))
                .with_startup_timeout(Duration::from_secs(1)),
            FlagProbe::new(false),
        ));

        let starting = supervisor.clone();
        let start = tokio::spawn(async move { starting.start().await });

        sleep(Duration::from_millis(300)).await;
        let state = timeout(Duration::from_millis(500), supervisor.state())
            .await
            .expect("state() blocked behind start()");
        assert_eq!(state, ServiceState::Starting);

        let err = start.await.unwrap().unwrap_err();
        assert!(matches!(err, ServiceError::StartupTimeout { .. }));
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_of_fresh_supervisor_follows_reachability() {
        let probe = FlagProbe::new(true);
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("hearth-never-launched")),
            probe.clone(),
        );
        assert_eq!(supervisor.state().await, ServiceState::Running);

        probe.up.store(false, Ordering::SeqCst);
        assert_eq!(supervisor.state().await, ServiceState::Stopped);
    }

    /// Probe that never answers in time.
    struct StalledHealth;

    #[async_trait]
    impl HealthProbe for StalledHealth {
        async fn is_reachable(&self) -> bool {
            sleep(Duration::from_secs(5)).await;
            true
        }

        fn endpoint(&self) -> &str {
            "stalled"
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_health_check_does_not_extend_startup() {
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("sleep").arg("30")),
            Arc::new(StalledHealth),
        );

        let began = std::time::Instant::now();
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::StartupTimeout { .. }));
        assert!(began.elapsed() < Duration::from_millis(500 + 100 + 400));

        let stopped = supervisor.stop().await.unwrap();
        assert_eq!(stopped.stopped.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_with_nothing_running() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ServiceSupervisor::new(
            spec(LaunchSpec::new("hearth-never-launched").in_dir(dir.path())),
            FlagProbe::new(false),
        );

        let outcome = supervisor.stop().await.unwrap();
        assert!(outcome.nothing_found());
        assert_eq!(supervisor.state().await, ServiceState::Stopped);
    }
}
