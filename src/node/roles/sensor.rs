use super::on_off;
use crate::config::RoleKind;
use crate::debounce::Debouncer;
use crate::error::{MeshError, Result};
use crate::inputs::{Actuator, SensorInput};
use crate::node::{NodeContext, NodeState, RoleHooks};
use crate::radio::RadioLink;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const ALERT_TEXT: &str = "ALERT sensor triggered";

/// Remote sensor: switches a local camera output and alerts the coordinator
///
/// Alerts repeat while the sensor stays active, at most once per debounce
/// interval. Quiet sleep cycles end in a periodic battery report.
pub struct SensorRole {
    sensor: Box<dyn SensorInput>,
    camera: Box<dyn Actuator>,
    camera_on_since: Option<Instant>,
    camera_on_duration: Duration,
    alert_debounce: Debouncer<()>,
    check_interval: Duration,
}

impl SensorRole {
    pub fn new(
        sensor: Box<dyn SensorInput>,
        camera: Box<dyn Actuator>,
        camera_on_duration: Duration,
        debounce: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            sensor,
            camera,
            camera_on_since: None,
            camera_on_duration,
            alert_debounce: Debouncer::new(debounce),
            check_interval,
        }
    }

    fn expire_camera(&mut self) {
        if let Some(since) = self.camera_on_since {
            if since.elapsed() > self.camera_on_duration {
                self.camera.set(false);
                self.camera_on_since = None;
                info!("Camera output OFF (timer expired)");
            }
        }
    }

    async fn alert<R: RadioLink>(&mut self, ctx: &mut NodeContext<R>) {
        if !self.alert_debounce.ready(&()) {
            debug!(
                "Alert suppressed, next in {:?}",
                self.alert_debounce.remaining(&())
            );
            return;
        }
        let sent_at = Instant::now();
        if ctx.report_to_coordinator(ALERT_TEXT).await.is_ok() {
            self.alert_debounce.record_at((), sent_at);
        }
    }
}

#[async_trait]
impl<R: RadioLink> RoleHooks<R> for SensorRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Sensor
    }

    fn extra_states(&self) -> &'static [NodeState] {
        &[NodeState::SensorTriggered, NodeState::SensorActive]
    }

    async fn on_state_enter(
        &mut self,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<NodeState> {
        match state {
            NodeState::SensorTriggered => {
                self.camera.set(true);
                self.camera_on_since = Some(Instant::now());
                info!("Sensor triggered, camera output ON");
                self.alert(ctx).await;
                Ok(NodeState::SensorActive)
            }
            NodeState::SensorActive => {
                self.expire_camera();
                if !self.sensor.is_active() {
                    info!("Sensor cleared");
                    return Ok(NodeState::Idle);
                }
                self.alert(ctx).await;
                ctx.fed_sleep(self.check_interval).await;
                Ok(NodeState::SensorActive)
            }
            other => Err(MeshError::InvalidTransition {
                from: other.to_string(),
                to: NodeState::Idle.to_string(),
            }),
        }
    }

    async fn on_idle_tick(&mut self, _ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        self.expire_camera();
        if self.sensor.is_active() {
            return Ok(Some(NodeState::SensorTriggered));
        }
        Ok(None)
    }

    fn on_sleep_elapsed(&self) -> NodeState {
        NodeState::ReportBattery
    }

    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String {
        format!(
            "State: {}, Sensor: {}, Camera: {}, Failures: {}, Battery: {:.2}V",
            state,
            on_off(self.sensor.is_active()),
            on_off(self.camera.is_on()),
            ctx.failures.count(),
            ctx.battery_volts()
        )
    }
}
