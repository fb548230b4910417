use super::{NodeContext, NodeState, RoleHooks};
use crate::error::{MeshError, Result};
use crate::message::{Message, Payload};
use crate::radio::RadioLink;
use crate::recovery::{RecoveryAction, RecoveryManager};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Generic node lifecycle, specialized by a role
///
/// Each [`step`](Self::step) runs exactly one iteration: feed the watchdog,
/// service a due coordinator escalation, handle one pending inbound frame or
/// run the current state's action, then apply the resulting transition.
pub struct NodeStateMachine<R: RadioLink, P: RoleHooks<R>> {
    ctx: NodeContext<R>,
    role: P,
    state: NodeState,
    recovery: RecoveryManager,
    transitions: u64,
}

impl<R: RadioLink, P: RoleHooks<R>> NodeStateMachine<R, P> {
    pub fn new(ctx: NodeContext<R>, role: P) -> Self {
        Self {
            ctx,
            role,
            state: NodeState::Startup,
            recovery: RecoveryManager::new(),
            transitions: 0,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn context(&self) -> &NodeContext<R> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut NodeContext<R> {
        &mut self.ctx
    }

    pub fn role(&self) -> &P {
        &self.role
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// True if `state` belongs to this node's state table
    pub fn supports(&self, state: NodeState) -> bool {
        state.is_core() || self.role.extra_states().contains(&state)
    }

    /// Run iterations until `shutdown` is cancelled or an error halts the node
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Node {} ({}) starting as {}",
            self.ctx.identity.node_id, self.ctx.identity.address, self.ctx.identity.role
        );

        let stabilization = self.ctx.timing.stabilization();
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = self.ctx.fed_sleep(stabilization) => {}
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Node loop stopping in state {}", self.state);
                    return Ok(());
                }
                result = self.step() => result?,
            }
        }
    }

    /// One iteration of the main loop. Errors are classified here; only a
    /// halting error is returned.
    pub async fn step(&mut self) -> Result<()> {
        self.ctx.protocol.feed_watchdog();

        if let Some(succeeded) = self.ctx.service_escalation().await {
            debug!("Coordinator escalation attempt succeeded: {}", succeeded);
        }

        let outcome = match self.iterate().await {
            Ok(next) if !self.supports(next) => Err(MeshError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }),
            other => other,
        };

        match outcome {
            Ok(next) => {
                self.recovery.reset_error_count("node");
                self.transition(next);
                Ok(())
            }
            Err(e) => match self.recovery.handle_error("node", &e) {
                RecoveryAction::Continue => Ok(()),
                RecoveryAction::EnterErrorState => {
                    self.transition(NodeState::Error);
                    Ok(())
                }
                RecoveryAction::Halt => {
                    error!("Node halted in state {}: {}", self.state, e);
                    Err(e)
                }
            },
        }
    }

    async fn iterate(&mut self) -> Result<NodeState> {
        let state = self.state;

        if state.accepts_inbound() {
            if let Some(message) = self.ctx.protocol.poll_inbound().await? {
                let next = self.handle_inbound(message).await?;
                return Ok(next.unwrap_or(state));
            }
        }

        match state {
            NodeState::Startup => self.role.on_startup(&mut self.ctx).await,
            NodeState::Idle => self.idle().await,
            NodeState::ReportBattery => {
                if let Err(e) = self.ctx.report_to_coordinator("periodic report").await {
                    debug!("Periodic report not delivered: {}", e);
                }
                Ok(NodeState::Idle)
            }
            NodeState::Error => {
                let backoff = self.ctx.timing.error_backoff();
                info!("Error state, restarting in {:?}", backoff);
                self.ctx.fed_sleep(backoff).await;
                Ok(NodeState::Startup)
            }
            role_state => self.role.on_state_enter(role_state, &mut self.ctx).await,
        }
    }

    /// Wait one sleep cycle for an inbound frame, a local event or expiry
    async fn idle(&mut self) -> Result<NodeState> {
        let deadline = Instant::now() + self.ctx.timing.sleep_cycle();
        let poll_interval = self.ctx.protocol.settings().poll_interval;

        loop {
            self.ctx.protocol.feed_watchdog();

            if let Some(message) = self.ctx.protocol.poll_inbound().await? {
                let next = self.handle_inbound(message).await?;
                return Ok(next.unwrap_or(NodeState::Idle));
            }

            if let Some(next) = self.role.on_idle_tick(&mut self.ctx).await? {
                return Ok(next);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(self.role.on_sleep_elapsed());
            }
            sleep(poll_interval.min(deadline - now)).await;
        }
    }

    async fn handle_inbound(&mut self, message: Message) -> Result<Option<NodeState>> {
        let sender = message.sender;
        if sender == self.ctx.identity.address {
            debug!("Ignoring frame from own address");
            return Ok(None);
        }

        match message.classify()? {
            Payload::Report(report) => {
                debug!("Report from {}: {}", sender, report.to_wire());
                self.role.on_report(sender, report, &mut self.ctx).await?;
                Ok(None)
            }
            Payload::Reply(text) => {
                self.role.on_reply(sender, &text, &mut self.ctx).await?;
                Ok(None)
            }
            Payload::Command(command) => {
                let command = command.addressed_to(&self.ctx.identity.node_id);
                info!("Command '{}' from {}", command, sender);
                let outcome = self
                    .role
                    .on_command(&command, sender, self.state, &mut self.ctx)
                    .await?;
                self.ctx.reply(sender, &outcome.reply).await;
                Ok(outcome.next)
            }
        }
    }

    fn transition(&mut self, next: NodeState) {
        if next != self.state {
            info!("State {} -> {}", self.state, next);
            self.state = next;
            self.transitions += 1;
        }
    }
}
