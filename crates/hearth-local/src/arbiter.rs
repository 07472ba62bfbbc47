//! Arbitration of the shared GPU between the inference and image services.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::error::{ArbiterError, ServiceError};
use crate::supervisor::ManagedService;

/// Which service currently holds the shared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    None,
    Primary,
    Secondary,
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Holder::None => "none",
            Holder::Primary => "primary",
            Holder::Secondary => "secondary",
        };
        f.write_str(s)
    }
}

/// One step of a hand-off sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    StopPrimary,
    StartSecondary,
    StopSecondary,
    StartPrimary,
}

/// The outcome of a single step.
#[derive(Debug)]
pub struct StepResult {
    pub step: Step,
    pub service: String,
    pub result: Result<(), ServiceError>,
}

/// Every step attempted during a hand-off, in order.
#[derive(Debug, Default)]
pub struct HandoffReport {
    pub steps: Vec<StepResult>,
}

impl HandoffReport {
    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.result.is_ok())
    }

    /// Errors of the steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ServiceError> {
        self.steps.iter().filter_map(|s| s.result.as_ref().err())
    }

    /// Consume the report, keeping only the failures.
    pub fn into_failures(self) -> Vec<ServiceError> {
        self.steps.into_iter().filter_map(|s| s.result.err()).collect()
    }

    fn record<T>(&mut self, step: Step, service: &str, result: Result<T, ServiceError>) -> bool {
        let ok = result.is_ok();
        if let Err(e) = &result {
            warn!("{:?} on {} failed: {}", step, service, e);
        }
        self.steps.push(StepResult {
            step,
            service: service.to_string(),
            result: result.map(|_| ()),
        });
        ok
    }
}

/// Serializes use of the shared resource between two services.
///
/// `primary` is the inference service, `secondary` the image service.
pub struct ResourceArbiter {
    primary: Arc<dyn ManagedService>,
    secondary: Arc<dyn ManagedService>,
    lock: Arc<Mutex<()>>,
    holder: Arc<StdMutex<Holder>>,
}

impl ResourceArbiter {
    pub fn new(primary: Arc<dyn ManagedService>, secondary: Arc<dyn ManagedService>) -> Self {
        Self {
            primary,
            secondary,
            lock: Arc::new(Mutex::new(())),
            holder: Arc::new(StdMutex::new(Holder::None)),
        }
    }

    /// Wait for exclusive use of the resource.
    ///
    /// Only one lease exists at a time; others queue here until it is dropped.
    pub async fn acquire(&self) -> ResourceLease {
        let guard = self.lock.clone().lock_owned().await;
        ResourceLease {
            _guard: guard,
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            holder: self.holder.clone(),
        }
    }

    /// Current holder of the resource.
    pub fn holder(&self) -> Holder {
        read_holder(&self.holder)
    }

    pub fn primary(&self) -> &Arc<dyn ManagedService> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn ManagedService> {
        &self.secondary
    }
}

fn read_holder(holder: &StdMutex<Holder>) -> Holder {
    *holder.lock().unwrap_or_else(|e| e.into_inner())
}

fn set_holder(holder: &StdMutex<Holder>, value: Holder) {
    *holder.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

/// Exclusive access to the shared resource, released on drop.
pub struct ResourceLease {
    _guard: OwnedMutexGuard<()>,
    primary: Arc<dyn ManagedService>,
    secondary: Arc<dyn ManagedService>,
    holder: Arc<StdMutex<Holder>>,
}

impl ResourceLease {
    /// Stop the primary service, then start the secondary.
    ///
    /// A failed primary stop is recorded but does not abort the hand-off. A
    /// failed secondary start fails the hand-off; the primary is not resumed.
    pub async fn hand_off_to_secondary(&mut self) -> Result<HandoffReport, ArbiterError> {
        let mut report = HandoffReport::default();
        info!(
            "Handing resource from {} to {}",
            self.primary.name(),
            self.secondary.name()
        );

        report.record(Step::StopPrimary, self.primary.name(), self.primary.stop().await);
        set_holder(&self.holder, Holder::None);

        match self.secondary.start().await {
            Ok(_) => {
                report.record::<()>(Step::StartSecondary, self.secondary.name(), Ok(()));
                set_holder(&self.holder, Holder::Secondary);
                Ok(report)
            }
            Err(source) => {
                warn!("Hand-off to {} failed: {}", self.secondary.name(), source);
                Err(ArbiterError::HandoffFailed {
                    service: self.secondary.name().to_string(),
                    source,
                    report,
                })
            }
        }
    }

    /// Stop the secondary service, then start the primary.
    ///
    /// Both steps are always attempted; failures are collected in the report.
    pub async fn hand_back_to_primary(&mut self) -> HandoffReport {
        let mut report = HandoffReport::default();
        info!(
            "Handing resource back from {} to {}",
            self.secondary.name(),
            self.primary.name()
        );

        report.record(
            Step::StopSecondary,
            self.secondary.name(),
            self.secondary.stop().await,
        );
        set_holder(&self.holder, Holder::None);

        if report.record(
            Step::StartPrimary,
            self.primary.name(),
            self.primary.start().await,
        ) {
            set_holder(&self.holder, Holder::Primary);
        }

        report
    }

    pub fn holder(&self) -> Holder {
        read_holder(&self.holder)
    }
}
