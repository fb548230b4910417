use super::on_off;
use crate::address::NodeAddress;
use crate::config::RoleKind;
use crate::debounce::Debouncer;
use crate::error::{MeshError, Result};
use crate::inputs::{Actuator, SensorInput};
use crate::message::{Command, Reply};
use crate::node::{common_command_reply, CommandOutcome, NodeContext, NodeState, RoleHooks};
use crate::radio::RadioLink;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Camera node: drives the camera output from commands and local sensors
///
/// `TEL:ON` holds the camera on until `TEL:OFF`. `SENSOR:ON` and local sensor
/// edges start a timed activation that ends after `on_duration`.
pub struct CameraRole {
    camera: Box<dyn Actuator>,
    sensor: Box<dyn SensorInput>,
    manual: bool,
    on_since: Option<Instant>,
    on_duration: Duration,
    sensor_debounce: Debouncer<()>,
}

impl CameraRole {
    pub fn new(
        camera: Box<dyn Actuator>,
        sensor: Box<dyn SensorInput>,
        on_duration: Duration,
        sensor_debounce: Duration,
    ) -> Self {
        Self {
            camera,
            sensor,
            manual: false,
            on_since: None,
            on_duration,
            sensor_debounce: Debouncer::new(sensor_debounce),
        }
    }

    pub fn camera_on(&self) -> bool {
        self.camera.is_on()
    }

    pub fn manual(&self) -> bool {
        self.manual
    }

    fn switch_manual(&mut self, on: bool) {
        self.camera.set(on);
        self.manual = on;
        self.on_since = None;
        info!("Camera {} (manual)", on_off(on));
    }

    /// Timed activation; a manual activation is left untouched
    fn switch_timed(&mut self) {
        if self.manual {
            return;
        }
        self.camera.set(true);
        self.on_since = Some(Instant::now());
        info!("Camera ON for {:?}", self.on_duration);
    }

    fn expire_timer(&mut self) {
        if let Some(since) = self.on_since {
            if !self.manual && since.elapsed() > self.on_duration {
                self.camera.set(false);
                self.on_since = None;
                info!("Camera OFF (timer expired)");
            }
        }
    }
}

#[async_trait]
impl<R: RadioLink> RoleHooks<R> for CameraRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Camera
    }

    fn extra_states(&self) -> &'static [NodeState] {
        &[NodeState::CameraTriggered]
    }

    async fn on_state_enter(
        &mut self,
        state: NodeState,
        _ctx: &mut NodeContext<R>,
    ) -> Result<NodeState> {
        match state {
            NodeState::CameraTriggered => {
                self.switch_timed();
                Ok(NodeState::Idle)
            }
            other => Err(MeshError::InvalidTransition {
                from: other.to_string(),
                to: NodeState::Idle.to_string(),
            }),
        }
    }

    async fn on_command(
        &mut self,
        command: &Command,
        sender: NodeAddress,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<CommandOutcome> {
        let ok = Reply::ok(ctx.node_id());
        let outcome = match command {
            Command::CameraOn => {
                self.switch_manual(true);
                CommandOutcome::reply(ok).then(NodeState::Idle)
            }
            Command::CameraOff => {
                self.switch_manual(false);
                CommandOutcome::reply(ok).then(NodeState::Idle)
            }
            Command::SensorOn => {
                self.switch_timed();
                CommandOutcome::reply(ok).then(NodeState::Idle)
            }
            other => {
                let status = <Self as RoleHooks<R>>::status(self, state, ctx);
                common_command_reply(other, sender, ctx.node_id(), status)
            }
        };
        Ok(outcome)
    }

    async fn on_idle_tick(&mut self, _ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        self.expire_timer();
        if self.sensor.is_active() && self.sensor_debounce.try_fire(()) {
            return Ok(Some(NodeState::CameraTriggered));
        }
        Ok(None)
    }

    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String {
        format!(
            "State: {}, Camera: {}, Battery: {:.2}V, Manual: {}",
            state,
            on_off(self.camera.is_on()),
            ctx.battery_volts(),
            self.manual
        )
    }
}
