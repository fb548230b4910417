use crate::config::{NamedTarget, RoleKind};
use crate::debounce::Debouncer;
use crate::error::{MeshError, Result};
use crate::inputs::{Button, ButtonPad};
use crate::message::Command;
use crate::node::{NodeContext, NodeState, RoleHooks};
use crate::radio::RadioLink;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handheld remote control
///
/// ON, OFF and REPORT queue a command for the selected target and enter
/// SendCommand; NEXT cycles the selection. Each button is debounced on its
/// own clock.
pub struct RemoteRole {
    buttons: Box<dyn ButtonPad>,
    targets: Vec<NamedTarget>,
    selected: usize,
    button_debounce: Debouncer<Button>,
    pending: Option<Command>,
}

impl RemoteRole {
    pub fn new(buttons: Box<dyn ButtonPad>, targets: Vec<NamedTarget>, debounce: Duration) -> Self {
        Self {
            buttons,
            targets,
            selected: 0,
            button_debounce: Debouncer::new(debounce),
            pending: None,
        }
    }

    pub fn selected_target(&self) -> Option<&NamedTarget> {
        self.targets.get(self.selected)
    }

    pub fn pending(&self) -> Option<&Command> {
        self.pending.as_ref()
    }

    fn select_next(&mut self) {
        if self.targets.is_empty() {
            return;
        }
        self.selected = (self.selected + 1) % self.targets.len();
        if let Some(target) = self.selected_target() {
            info!("Selected target {} ({})", target.name, target.address);
        }
    }

    fn command_for(button: Button) -> Option<Command> {
        match button {
            Button::On => Some(Command::CameraOn),
            Button::Off => Some(Command::CameraOff),
            Button::Report => Some(Command::Report),
            Button::Next => None,
        }
    }
}

#[async_trait]
impl<R: RadioLink> RoleHooks<R> for RemoteRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Remote
    }

    fn extra_states(&self) -> &'static [NodeState] {
        &[NodeState::SendCommand]
    }

    async fn on_state_enter(
        &mut self,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<NodeState> {
        if state != NodeState::SendCommand {
            return Err(MeshError::InvalidTransition {
                from: state.to_string(),
                to: NodeState::Idle.to_string(),
            });
        }

        let Some(command) = self.pending.take() else {
            debug!("SendCommand entered with nothing queued");
            return Ok(NodeState::Idle);
        };
        let Some(target) = self.selected_target().cloned() else {
            warn!("No target configured for '{}'", command);
            return Ok(NodeState::Idle);
        };

        let wire = command.to_wire();
        info!("Sending '{}' to {} ({})", wire, target.name, target.address);
        match ctx.send_confirmed(target.address, wire.as_bytes()).await {
            Ok(delivery) => info!(
                "'{}' confirmed by {} after {} attempt(s)",
                wire, target.name, delivery.attempts
            ),
            Err(e) => warn!("'{}' to {} not confirmed: {}", wire, target.name, e),
        }
        Ok(NodeState::Idle)
    }

    async fn on_idle_tick(&mut self, _ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        while let Some(button) = self.buttons.poll_pressed() {
            if !self.button_debounce.try_fire(button) {
                debug!("Button {} ignored (debounce)", button);
                continue;
            }
            match Self::command_for(button) {
                Some(command) => {
                    self.pending = Some(command);
                    return Ok(Some(NodeState::SendCommand));
                }
                None => self.select_next(),
            }
        }
        Ok(None)
    }

    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String {
        let target = self
            .selected_target()
            .map(|t| t.name.as_str())
            .unwrap_or("none");
        format!(
            "State: {}, Target: {}, Failures: {}, Battery: {:.2}V",
            state,
            target,
            ctx.failures.count(),
            ctx.battery_volts()
        )
    }
}
