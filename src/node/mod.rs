//! Node lifecycle shared by every role.
//!
//! [`NodeStateMachine`] runs the core states (Startup, Idle, ReportBattery,
//! Error) and hands role-specific states and events to a [`RoleHooks`]
//! implementation. All per-node mutable state lives in one [`NodeContext`].

mod context;
mod machine;
mod role;
pub mod roles;


pub use context::{NodeContext, NodeIdentity};
pub use machine::NodeStateMachine;
pub use role::{common_command_reply, CommandOutcome, RoleHooks};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Startup,
    Idle,
    ReportBattery,
    SensorTriggered,
    SensorActive,
    SendCommand,
    CameraTriggered,
    Error,
}

impl NodeState {
    /// States every role supports
    pub const CORE: [NodeState; 4] = [
        NodeState::Startup,
        NodeState::Idle,
        NodeState::ReportBattery,
        NodeState::Error,
    ];

    pub fn is_core(self) -> bool {
        Self::CORE.contains(&self)
    }

    /// Whether pending inbound frames are handled before this state's action
    pub fn accepts_inbound(self) -> bool {
        !matches!(self, NodeState::Startup | NodeState::Error)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Startup => "Startup",
            NodeState::Idle => "Idle",
            NodeState::ReportBattery => "ReportBattery",
            NodeState::SensorTriggered => "SensorTriggered",
            NodeState::SensorActive => "SensorActive",
            NodeState::SendCommand => "SendCommand",
            NodeState::CameraTriggered => "CameraTriggered",
            NodeState::Error => "Error",
        };
        f.write_str(name)
    }
}
