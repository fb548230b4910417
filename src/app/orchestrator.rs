use super::types::ShutdownReason;
use crate::command_router::CommandRouter;
use crate::config::{MeshConfig, NamedTarget, RoleKind};
use crate::error::{MeshError, Result};
use crate::hub::{LineHub, NullHub};
use crate::inputs::{Battery, BatteryCalibration, FixedBattery, SimulatedPanel};
use crate::keyboard_input::KeyboardInputHandler;
use crate::node::roles::{CameraRole, CoordinatorRole, RemoteRole, RouterRole, SensorRole};
use crate::node::{NodeContext, NodeIdentity, NodeStateMachine, RoleHooks};
use crate::protocol::{ProtocolSettings, RetryAckProtocol};
use crate::radio::{RadioLink, UdpRadio};
use crate::watchdog::{SoftwareWatchdog, WatchdogSupervisor};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns one node process: its configuration, the hardware stand-ins and the
/// shutdown plumbing
pub struct NodeOrchestrator {
    pub(super) config: MeshConfig,
    pub(super) panel: SimulatedPanel,
    pub(super) context: Option<NodeContext<UdpRadio>>,

    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    /// Cancelled by the software watchdog when it is starved
    pub(super) watchdog_reset: CancellationToken,
}

impl NodeOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub fn new(config: MeshConfig) -> Result<Self> {
        config.validate()?;

        let panel = SimulatedPanel::new();
        let cancellation_token = CancellationToken::new();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        // Disabled by default, enable via set_keyboard_enabled()
        let keyboard_handler = Some(KeyboardInputHandler::new(
            panel.clone(),
            cancellation_token.clone(),
        ));

        Ok(Self {
            config,
            panel,
            context: None,
            keyboard_handler,
            keyboard_enabled: false,
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
            watchdog_reset: CancellationToken::new(),
        })
    }

    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Panel driven by the keyboard handler and read by the role
    pub fn panel(&self) -> &SimulatedPanel {
        &self.panel
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            role: self.config.node.role,
            node_id: self.config.node.node_id.clone(),
            address: self.config.node.address,
            coordinator: self.config.node.coordinator,
        }
    }

    /// Start the watchdog and bring up the radio
    ///
    /// Errors from here are [`MeshError::FatalInit`]; the node must not take
    /// part in the mesh after one.
    pub async fn initialize(&mut self) -> Result<()> {
        info!(
            "Initializing {} node {}",
            self.config.node.role, self.config.node.node_id
        );

        let watchdog = self.start_watchdog()?;
        let radio = UdpRadio::bind(&self.config.radio, self.config.node.address).await?;
        let protocol = RetryAckProtocol::new(
            radio,
            watchdog,
            ProtocolSettings::from(&self.config.retry),
        );
        let battery = Battery::new(
            Box::new(FixedBattery::new(self.config.battery.simulated_raw)),
            BatteryCalibration::from(&self.config.battery),
        );

        self.context = Some(NodeContext::new(
            self.identity(),
            protocol,
            battery,
            self.config.timing.clone(),
            self.config.retry.max_attempts,
        ));

        info!("Node components initialized");
        Ok(())
    }

    fn start_watchdog(&self) -> Result<WatchdogSupervisor> {
        if !self.config.watchdog.enabled {
            warn!("Watchdog disabled by configuration");
            return Ok(WatchdogSupervisor::disabled());
        }
        let watchdog =
            SoftwareWatchdog::start_from_config(&self.config.watchdog, self.watchdog_reset.clone())?;
        Ok(WatchdogSupervisor::new(Arc::new(watchdog)))
    }
}

async fn drive<R, P>(ctx: NodeContext<R>, role: P, shutdown: CancellationToken) -> Result<()>
where
    R: RadioLink,
    P: RoleHooks<R>,
{
    let mut machine = NodeStateMachine::new(ctx, role);
    machine.run(shutdown).await
}

/// Instantiate the configured role and run its state machine
pub(super) async fn run_role<R: RadioLink>(
    ctx: NodeContext<R>,
    config: MeshConfig,
    panel: SimulatedPanel,
    shutdown: CancellationToken,
) -> Result<()> {
    let timing = &config.timing;
    let node = &config.node;

    match node.role {
        RoleKind::Coordinator => {
            let node_id = node.node_id.clone();
            if config.hub.enabled {
                let router = CommandRouter::new(node_id, LineHub::stdio());
                drive(ctx, CoordinatorRole::new(router), shutdown).await
            } else {
                let router = CommandRouter::new(node_id, NullHub);
                drive(ctx, CoordinatorRole::new(router), shutdown).await
            }
        }
        RoleKind::Camera => {
            let role = CameraRole::new(
                Box::new(panel.clone()),
                Box::new(panel),
                timing.camera_on_duration(),
                timing.sensor_debounce(),
            );
            drive(ctx, role, shutdown).await
        }
        RoleKind::Router => {
            let peer = node
                .peer
                .ok_or_else(|| MeshError::fatal_init("router", "node.peer is not configured"))?;
            let role = RouterRole::new(
                Box::new(panel),
                peer,
                timing.sensor_debounce(),
                timing.sensor_check_interval(),
            );
            drive(ctx, role, shutdown).await
        }
        RoleKind::Sensor => {
            let role = SensorRole::new(
                Box::new(panel.clone()),
                Box::new(panel),
                timing.camera_on_duration(),
                timing.sensor_debounce(),
                timing.sensor_check_interval(),
            );
            drive(ctx, role, shutdown).await
        }
        RoleKind::Remote => {
            let targets = remote_targets(&config)?;
            let role = RemoteRole::new(Box::new(panel), targets, timing.button_debounce());
            drive(ctx, role, shutdown).await
        }
    }
}

/// Configured target list, or the single peer when none is given
pub(super) fn remote_targets(config: &MeshConfig) -> Result<Vec<NamedTarget>> {
    if !config.node.targets.is_empty() {
        return Ok(config.node.targets.clone());
    }
    match config.node.peer {
        Some(address) => Ok(vec![NamedTarget {
            name: address.to_string(),
            address,
        }]),
        None => Err(MeshError::fatal_init(
            "remote",
            "node.peer or node.targets is required",
        )),
    }
}
