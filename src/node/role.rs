use super::{NodeContext, NodeState};
use crate::address::NodeAddress;
use crate::config::RoleKind;
use crate::error::Result;
use crate::message::{Command, Reply, Report};
use crate::radio::RadioLink;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Result of handling one inbound command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub reply: Reply,
    /// State to move to after replying; `None` keeps the current state
    pub next: Option<NodeState>,
}

impl CommandOutcome {
    pub fn reply(reply: Reply) -> Self {
        Self { reply, next: None }
    }

    pub fn then(mut self, next: NodeState) -> Self {
        self.next = Some(next);
        self
    }
}

/// Role-specific callbacks driven by the node state machine
#[async_trait]
pub trait RoleHooks<R: RadioLink>: Send {
    fn kind(&self) -> RoleKind;

    /// States this role adds to the core set
    fn extra_states(&self) -> &'static [NodeState] {
        &[]
    }

    /// Startup entry action: announce this node to the coordinator
    async fn on_startup(&mut self, ctx: &mut NodeContext<R>) -> Result<NodeState> {
        match ctx.report_to_coordinator("started").await {
            Ok(_) => Ok(NodeState::Idle),
            Err(e) => {
                warn!("Coordinator did not confirm startup: {}", e);
                Ok(NodeState::Error)
            }
        }
    }

    /// Entry action of a role-specific state
    async fn on_state_enter(
        &mut self,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<NodeState>;

    /// Side effect and reply for a command token
    async fn on_command(
        &mut self,
        command: &Command,
        sender: NodeAddress,
        state: NodeState,
        ctx: &mut NodeContext<R>,
    ) -> Result<CommandOutcome> {
        let status = self.status(state, ctx);
        Ok(common_command_reply(command, sender, ctx.node_id(), status))
    }

    /// Polled on every Idle wait iteration; `Some` ends the wait
    async fn on_idle_tick(&mut self, _ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        Ok(None)
    }

    /// State entered when a full sleep cycle passed without events
    fn on_sleep_elapsed(&self) -> NodeState {
        NodeState::Idle
    }

    async fn on_report(
        &mut self,
        sender: NodeAddress,
        report: Report,
        _ctx: &mut NodeContext<R>,
    ) -> Result<()> {
        debug!("Ignoring report from {} ({})", report.node_id, sender);
        Ok(())
    }

    async fn on_reply(
        &mut self,
        sender: NodeAddress,
        text: &str,
        _ctx: &mut NodeContext<R>,
    ) -> Result<()> {
        info!("Reply from {}: {}", sender, text);
        Ok(())
    }

    /// Status text sent in answer to `REPORT`
    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String;
}

/// Reply shared by all roles: `REPORT` gets the status, anything else is
/// unknown
pub fn common_command_reply(
    command: &Command,
    sender: NodeAddress,
    node_id: &str,
    status: String,
) -> CommandOutcome {
    match command {
        Command::Report => {
            info!("Status requested by {}", sender);
            CommandOutcome::reply(Reply::status(node_id, status))
        }
        other => {
            warn!("Unsupported command '{}' from {}", other, sender);
            CommandOutcome::reply(Reply::UnknownCommand)
        }
    }
}
