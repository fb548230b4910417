use crate::error::MeshError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What the state machine does with an error that reached the iteration boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Log and keep the current state
    Continue,
    /// Leave the current state for the Error state
    EnterErrorState,
    /// Stop all mesh activity
    Halt,
}

/// Classifies iteration errors and tracks how often each component failed
#[derive(Debug, Default)]
pub struct RecoveryManager {
    error_counts: HashMap<String, u32>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Determine recovery action for an error
    pub fn handle_error(&mut self, component: &str, error: &MeshError) -> RecoveryAction {
        if !error.is_recoverable() {
            error!("Non-recoverable error in {}: {}", component, error);
            return RecoveryAction::Halt;
        }

        match error {
            MeshError::Payload(e) => {
                warn!("Discarding malformed payload in {}: {}", component, e);
                RecoveryAction::Continue
            }
            MeshError::UnknownTarget { target } => {
                warn!("Unknown target '{}' requested in {}", target, component);
                RecoveryAction::Continue
            }
            _ => {
                let count = self.error_counts.entry(component.to_string()).or_insert(0);
                *count += 1;
                warn!(
                    "Scheduling recovery for {} (failure {}): {}",
                    component, count, error
                );
                RecoveryAction::EnterErrorState
            }
        }
    }

    /// Reset the failure count for a component after it recovered
    pub fn reset_error_count(&mut self, component: &str) {
        if self.error_counts.remove(component).is_some() {
            info!("Component {} recovered successfully, reset error count", component);
        }
    }

    pub fn error_count(&self, component: &str) -> u32 {
        self.error_counts.get(component).copied().unwrap_or(0)
    }
}

/// Consecutive delivery failures towards one destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounter {
    count: u32,
}

impl FailureCounter {
    pub fn record_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Long-interval background retry of a critical report to the coordinator
///
/// Armed when a confirmed send to the coordinator exhausts its budget. While
/// armed, the stored payload is retried once per `interval` until a send to
/// the coordinator succeeds.
#[derive(Debug, Clone)]
pub struct CoordinatorRetryEscalation {
    active: bool,
    last_attempt: Option<Instant>,
    interval: Duration,
    payload: Option<Vec<u8>>,
}

impl CoordinatorRetryEscalation {
    pub fn new(interval: Duration) -> Self {
        Self {
            active: false,
            last_attempt: None,
            interval,
            payload: None,
        }
    }

    /// Arm with `payload` as the report to resend. Re-arming while armed
    /// replaces the payload and keeps the schedule.
    pub fn arm(&mut self, payload: &[u8]) {
        if !self.active {
            info!(
                "Coordinator unreachable, retrying every {:?} until it answers",
                self.interval
            );
            self.active = true;
            self.last_attempt = Some(Instant::now());
        }
        self.payload = Some(payload.to_vec());
    }

    pub fn is_armed(&self) -> bool {
        self.active
    }

    pub fn is_due(&self) -> bool {
        match (self.active, self.last_attempt) {
            (true, Some(last)) => last.elapsed() >= self.interval,
            _ => false,
        }
    }

    /// The payload to resend, if an escalation attempt is due
    pub fn due_payload(&self) -> Option<Vec<u8>> {
        if self.is_due() {
            self.payload.clone()
        } else {
            None
        }
    }

    /// Reschedule the next attempt one interval from now
    pub fn record_failure(&mut self) {
        self.last_attempt = Some(Instant::now());
        debug!("Coordinator escalation rescheduled in {:?}", self.interval);
    }

    pub fn disarm(&mut self) {
        if self.active {
            info!("Coordinator reachable again, escalation disarmed");
        }
        self.active = false;
        self.last_attempt = None;
        self.payload = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use tokio::time::advance;

    #[test]
    fn test_error_classification() {
        let mut manager = RecoveryManager::new();

        let malformed = MeshError::Payload(PayloadError::NotUtf8);
        assert_eq!(manager.handle_error("node", &malformed), RecoveryAction::Continue);

        let unknown = MeshError::UnknownTarget {
            target: "CAMARA9".to_string(),
        };
        assert_eq!(manager.handle_error("router", &unknown), RecoveryAction::Continue);

        let fatal = MeshError::fatal_init("radio", "no device");
        assert_eq!(manager.handle_error("node", &fatal), RecoveryAction::Halt);

        let transient = MeshError::system("hub went away");
        assert_eq!(
            manager.handle_error("node", &transient),
            RecoveryAction::EnterErrorState
        );
        assert_eq!(manager.handle_error("node", &transient), RecoveryAction::EnterErrorState);
        assert_eq!(manager.error_count("node"), 2);

        manager.reset_error_count("node");
        assert_eq!(manager.error_count("node"), 0);
    }

    #[test]
    fn test_failure_counter() {
        let mut failures = FailureCounter::default();
        assert_eq!(failures.record_failure(), 1);
        assert_eq!(failures.record_failure(), 2);
        failures.reset();
        assert_eq!(failures.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_schedule() {
        let mut escalation = CoordinatorRetryEscalation::new(Duration::from_secs(12 * 3600));
        assert!(!escalation.is_due());

        escalation.arm(b"XBEE_CAM:3.70:started");
        assert!(escalation.is_armed());
        assert!(escalation.due_payload().is_none());

        advance(Duration::from_secs(12 * 3600)).await;
        assert_eq!(
            escalation.due_payload().as_deref(),
            Some(&b"XBEE_CAM:3.70:started"[..])
        );

        escalation.record_failure();
        assert!(escalation.is_armed());
        assert!(!escalation.is_due());

        advance(Duration::from_secs(12 * 3600)).await;
        assert!(escalation.is_due());

        escalation.disarm();
        assert!(!escalation.is_armed());
        assert!(escalation.due_payload().is_none());
    }
}
