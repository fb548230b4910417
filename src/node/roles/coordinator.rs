use crate::address::NodeAddress;
use crate::command_router::CommandRouter;
use crate::config::RoleKind;
use crate::error::{MeshError, Result};
use crate::hub::HubLink;
use crate::message::Report;
use crate::node::{NodeContext, NodeState, RoleHooks};
use crate::radio::RadioLink;
use crate::registry::DeviceRegistry;
use async_trait::async_trait;
use tracing::{debug, info};

/// Gateway node: keeps the device registry and bridges the mesh to the hub
pub struct CoordinatorRole<H: HubLink> {
    router: CommandRouter<H>,
}

impl<H: HubLink> CoordinatorRole<H> {
    pub fn new(router: CommandRouter<H>) -> Self {
        Self { router }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        self.router.registry()
    }
}

#[async_trait]
impl<R: RadioLink, H: HubLink> RoleHooks<R> for CoordinatorRole<H> {
    fn kind(&self) -> RoleKind {
        RoleKind::Coordinator
    }

    async fn on_startup(&mut self, _ctx: &mut NodeContext<R>) -> Result<NodeState> {
        self.router.announce_online().await?;
        info!("Coordinator online");
        Ok(NodeState::Idle)
    }

    async fn on_state_enter(
        &mut self,
        state: NodeState,
        _ctx: &mut NodeContext<R>,
    ) -> Result<NodeState> {
        Err(MeshError::InvalidTransition {
            from: state.to_string(),
            to: NodeState::Idle.to_string(),
        })
    }

    async fn on_idle_tick(&mut self, ctx: &mut NodeContext<R>) -> Result<Option<NodeState>> {
        let max_attempts = ctx.max_attempts;
        match self
            .router
            .service_hub(&mut ctx.protocol, max_attempts)
            .await?
        {
            Some(dispatch) => {
                debug!("Hub line handled: {:?}", dispatch);
                Ok(Some(NodeState::Idle))
            }
            None => Ok(None),
        }
    }

    async fn on_report(
        &mut self,
        sender: NodeAddress,
        report: Report,
        ctx: &mut NodeContext<R>,
    ) -> Result<()> {
        let max_attempts = ctx.max_attempts;
        self.router
            .ingest_report(&mut ctx.protocol, sender, &report, max_attempts)
            .await
    }

    async fn on_reply(
        &mut self,
        sender: NodeAddress,
        text: &str,
        _ctx: &mut NodeContext<R>,
    ) -> Result<()> {
        self.router.forward_reply(sender, text).await
    }

    fn status(&self, state: NodeState, ctx: &mut NodeContext<R>) -> String {
        format!(
            "State: {}, Devices: {}, Battery: {:.2}V",
            state,
            self.router.registry().len(),
            ctx.battery_volts()
        )
    }
}
