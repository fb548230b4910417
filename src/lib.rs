pub mod address;
pub mod app;
pub mod command_router;
pub mod config;
pub mod debounce;
pub mod error;
pub mod hub;
pub mod inputs;
pub mod keyboard_input;
pub mod message;
pub mod node;
pub mod protocol;
pub mod radio;
pub mod recovery;
pub mod registry;
pub mod watchdog;

pub use address::NodeAddress;
pub use app::{NodeOrchestrator, ShutdownReason};
pub use command_router::{CommandRouter, Dispatch};
pub use config::{AckMode, MeshConfig, RoleKind};
pub use error::{MeshError, ProtocolError, Result};
pub use hub::{HubLink, HubMessage, HubRequest, LineHub, MemoryHub, NullHub};
pub use message::{Command, Message, Payload, Reply, Report};
pub use node::roles::{CameraRole, CoordinatorRole, RemoteRole, RouterRole, SensorRole};
pub use node::{NodeContext, NodeIdentity, NodeState, NodeStateMachine, RoleHooks};
pub use protocol::{Delivery, ProtocolSettings, RetryAckProtocol, RetryBudget};
pub use radio::{MockRadio, RadioLink, UdpRadio};
pub use recovery::{CoordinatorRetryEscalation, RecoveryAction, RecoveryManager};
pub use registry::{DeviceRegistry, RegistryEntry};
pub use watchdog::{CountingWatchdog, ResetTimer, SoftwareWatchdog, WatchdogSupervisor};
