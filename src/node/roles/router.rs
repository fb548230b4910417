use super::on_off;
use crate::address::NodeAddress;
use crate::config::RoleKind;
use crate::debounce::Debouncer;
use crate::error::{MeshError, Result};
use crate::inputs::SensorInput;
use crate::message::Command;
use crate::node::{NodeContext, NodeState, RoleHooks};
use crate::radio::RadioLink;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Sensor relay: forwards local sensor activity to a camera as `SENSOR:ON`
pub struct RouterRole {
    sensor: Box<dyn SensorInput>,
    camera: NodeAddress,
    notify_debounce: Debouncer<()>,
    check_interval: Duration,
}

impl RouterRole {
    pub fn new(
        sensor: Box<dyn SensorInput>,
        camera: NodeAddress,
        debounce: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            sensor,
            camera,
            notify_debounce: Debouncer::new(debounce),
            check_interval,
        }
    }
}

#[async_trait]
impl<R: RadioLink> RoleHooks<R> for RouterRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Router
    }

    fn extra_states(&self) -> &'static [NodeState] {
        &[NodeState::SensorTriggered]
    }

    async fn on_state_enter(
        &mut self,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<NodeState> {
        if state != NodeState::SensorTriggered {
            return Err(MeshError::InvalidTransition {
                from: state.to_string(),
                to: NodeState::Idle.to_string(),
            });
        }

        if !self.sensor.is_active() {
            info!("Sensor cleared");
            return Ok(NodeState::Idle);
        }

        if self.notify_debounce.ready(&()) {
            info!("Sensor active, notifying camera {}", self.camera);
            let wire = Command::SensorOn.to_wire();
            let sent_at = Instant::now();
            // Only a confirmed notification starts the debounce interval
            if ctx.send_confirmed(self.camera, wire.as_bytes()).await.is_ok() {
                self.notify_debounce.record_at((), sent_at);
            }
        } else {
            debug!(
                "Sensor still active, next notification in {:?}",
                self.notify_debounce.remaining(&())
            );
        }

        ctx.fed_sleep(self.check_interval).await;
        Ok(NodeState::SensorTriggered)
    }

    async fn on_idle_tick(&mut self, _ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        if self.sensor.is_active() {
            return Ok(Some(NodeState::SensorTriggered));
        }
        Ok(None)
    }

    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String {
        format!(
            "State: {}, Sensor: {}, Failures: {}, Battery: {:.2}V",
            state,
            on_off(self.sensor.is_active()),
            ctx.failures.count(),
            ctx.battery_volts()
        )
    }
}
