use crate::address::NodeAddress;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Malformed payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown target node: {target}")]
    UnknownTarget { target: String },

    #[error("Fatal initialization error in {component}: {details}")]
    FatalInit { component: String, details: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures of a single transmit or receive call on the radio link
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RadioError {
    #[error("transmit failed: {details}")]
    Transmit { details: String },

    #[error("receive failed: {details}")]
    Receive { details: String },

    #[error("no route to {address}")]
    UnknownPeer { address: NodeAddress },

    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("battery field '{value}' is not a number")]
    InvalidBattery { value: String },

    #[error("field '{field}' is empty")]
    EmptyField { field: &'static str },

    #[error("invalid node address '{value}': {details}")]
    InvalidAddress { value: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    #[error("publish failed: {details}")]
    Publish { details: String },

    #[error("hub connection closed")]
    Closed,
}

/// Why a single send attempt did not succeed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    #[error("transport error: {0}")]
    Transport(RadioError),

    #[error("no reply within {window:?}")]
    Timeout { window: Duration },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("delivery to {destination} failed after {attempts} attempts ({last})")]
    Exhausted {
        destination: NodeAddress,
        attempts: u32,
        last: AttemptFailure,
    },
}

impl MeshError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn fatal_init<S: Into<String>>(component: S, details: S) -> Self {
        Self::FatalInit {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Whether the node can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            MeshError::FatalInit { .. } | MeshError::Config(_) | MeshError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
