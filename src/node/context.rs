use crate::address::NodeAddress;
use crate::config::{RoleKind, TimingConfig};
use crate::error::ProtocolError;
use crate::inputs::Battery;
use crate::message::{Reply, Report};
use crate::protocol::{Delivery, RetryAckProtocol};
use crate::radio::RadioLink;
use crate::recovery::{CoordinatorRetryEscalation, FailureCounter};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub role: RoleKind,
    pub node_id: String,
    pub address: NodeAddress,
    pub coordinator: NodeAddress,
}

/// Everything one node owns, constructed once at startup
pub struct NodeContext<R: RadioLink> {
    pub identity: NodeIdentity,
    pub protocol: RetryAckProtocol<R>,
    pub escalation: CoordinatorRetryEscalation,
    pub failures: FailureCounter,
    pub battery: Battery,
    pub timing: TimingConfig,
    pub max_attempts: u32,
}

impl<R: RadioLink> NodeContext<R> {
    pub fn new(
        identity: NodeIdentity,
        protocol: RetryAckProtocol<R>,
        battery: Battery,
        timing: TimingConfig,
        max_attempts: u32,
    ) -> Self {
        let escalation = CoordinatorRetryEscalation::new(timing.coordinator_retry_interval());
        Self {
            identity,
            protocol,
            escalation,
            failures: FailureCounter::default(),
            battery,
            timing,
            max_attempts,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.identity.node_id
    }

    pub fn battery_volts(&mut self) -> f32 {
        self.protocol.feed_watchdog();
        self.battery.read_volts()
    }

    /// A report from this node with the current battery voltage
    pub fn report(&mut self, text: &str) -> Report {
        let volts = self.battery_volts();
        Report::new(self.identity.node_id.clone(), volts, text)
    }

    /// Confirmed send with failure bookkeeping
    ///
    /// Exhausting the budget towards the coordinator arms the long-interval
    /// escalation with `payload`; any success towards it disarms the
    /// escalation and clears the failure count.
    pub async fn send_confirmed(
        &mut self,
        destination: NodeAddress,
        payload: &[u8],
    ) -> Result<Delivery, ProtocolError> {
        let result = self
            .protocol
            .send_confirmed(destination, payload, self.max_attempts)
            .await;
        let to_coordinator = destination == self.identity.coordinator;

        match &result {
            Ok(_) if to_coordinator => {
                self.failures.reset();
                self.escalation.disarm();
            }
            Ok(_) => {}
            Err(e) => {
                let failures = self.failures.record_failure();
                warn!("Delivery failed ({} consecutive failures): {}", failures, e);
                if to_coordinator {
                    self.escalation.arm(payload);
                }
            }
        }
        result
    }

    pub async fn report_to_coordinator(&mut self, text: &str) -> Result<Delivery, ProtocolError> {
        let wire = self.report(text).to_wire();
        let coordinator = self.identity.coordinator;
        self.send_confirmed(coordinator, wire.as_bytes()).await
    }

    /// Answer a command; replies are never confirmed
    pub async fn reply(&mut self, destination: NodeAddress, reply: &Reply) {
        let wire = reply.to_wire();
        if let Err(e) = self
            .protocol
            .send_unconfirmed(destination, wire.as_bytes(), self.max_attempts)
            .await
        {
            warn!("Could not reply '{}' to {}: {}", wire, destination, e);
            self.failures.record_failure();
        }
    }

    /// Run a due escalation attempt; returns its outcome if one was made
    pub async fn service_escalation(&mut self) -> Option<bool> {
        let payload = self.escalation.due_payload()?;
        info!("Retrying critical report to coordinator");

        let coordinator = self.identity.coordinator;
        match self
            .protocol
            .send_confirmed(coordinator, &payload, self.max_attempts)
            .await
        {
            Ok(_) => {
                self.escalation.disarm();
                self.failures.reset();
                Some(true)
            }
            Err(e) => {
                warn!("Escalation attempt failed: {}", e);
                self.failures.record_failure();
                self.escalation.record_failure();
                Some(false)
            }
        }
    }

    pub async fn fed_sleep(&mut self, duration: Duration) {
        self.protocol.fed_sleep(duration).await;
    }
}
