//! Boundary to the external message-queue hub.
//!
//! The coordinator publishes status lines and reads command lines. The
//! transport is a [`HubLink`]; line parsing and formatting live here so every
//! transport speaks the same protocol.

mod line;
mod mock;

pub use line::LineHub;
pub use mock::MemoryHub;

use crate::error::{HubError, PayloadError};
use crate::message::{Command, Report};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

#[async_trait]
pub trait HubLink: Send {
    async fn publish(&mut self, line: &str) -> Result<(), HubError>;

    /// Next pending command line, without waiting
    async fn poll_command(&mut self) -> Result<Option<String>, HubError>;
}

/// Hub used when the bridge is disabled: lines only go to the log
#[derive(Debug, Default)]
pub struct NullHub;

#[async_trait]
impl HubLink for NullHub {
    async fn publish(&mut self, line: &str) -> Result<(), HubError> {
        debug!("Hub disabled, not publishing: {}", line);
        Ok(())
    }

    async fn poll_command(&mut self) -> Result<Option<String>, HubError> {
        Ok(None)
    }
}

/// A command line received from the hub
#[derive(Debug, Clone, PartialEq)]
pub struct HubRequest {
    pub target: String,
    pub command: Command,
}

impl HubRequest {
    /// Accepts `<target>;<command>`, `CAMERA:<target>:<ON|OFF>` and
    /// `REPORT:<target>`
    pub fn parse(line: &str) -> Result<Self, PayloadError> {
        let line = line.trim();

        if line.contains(';') {
            let parts: Vec<&str> = line.split(';').collect();
            if parts.len() != 2 {
                return Err(PayloadError::FieldCount {
                    expected: 2,
                    found: parts.len(),
                });
            }
            let target = parts[0].trim();
            let command = parts[1].trim();
            if target.is_empty() {
                return Err(PayloadError::EmptyField { field: "target" });
            }
            if command.is_empty() {
                return Err(PayloadError::EmptyField { field: "command" });
            }
            return Ok(Self {
                target: target.to_string(),
                command: Command::parse(command),
            });
        }

        match Command::parse(line) {
            Command::Camera { target, on } => Ok(Self {
                target,
                command: if on {
                    Command::CameraOn
                } else {
                    Command::CameraOff
                },
            }),
            _ => match line.split_once(':') {
                Some(("REPORT", target)) if !target.trim().is_empty() => Ok(Self {
                    target: target.trim().to_string(),
                    command: Command::Report,
                }),
                _ => Err(PayloadError::FieldCount {
                    expected: 2,
                    found: 1,
                }),
            },
        }
    }
}

/// Lines the coordinator publishes to the hub
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Status { node_id: String, battery: f32, text: String },
    Online { node_id: String },
    Reply { node: String, text: String },
    DeviceNotFound { target: String },
    SendFailed { target: String },
}

impl HubMessage {
    pub fn status(report: &Report) -> Self {
        HubMessage::Status {
            node_id: report.node_id.clone(),
            battery: report.battery,
            text: report.text.clone(),
        }
    }
}

impl fmt::Display for HubMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubMessage::Status {
                node_id,
                battery,
                text,
            } => write!(f, "{};Bateria={:.2}V, Status={}", node_id, battery, text),
            HubMessage::Online { node_id } => write!(f, "{};Status=online", node_id),
            HubMessage::Reply { node, text } => write!(f, "{};Reply={}", node, text),
            HubMessage::DeviceNotFound { target } => {
                write!(f, "ERROR:DEVICE_NOT_FOUND:{}", target)
            }
            HubMessage::SendFailed { target } => write!(f, "ERROR:SEND_FAILED:{}", target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_command_lines() {
        assert_eq!(
            HubRequest::parse("CAMARA1;TEL:ON\n").unwrap(),
            HubRequest {
                target: "CAMARA1".to_string(),
                command: Command::CameraOn,
            }
        );
        assert_eq!(
            HubRequest::parse("0013A200423D8AAC;REPORT").unwrap().command,
            Command::Report
        );
        assert_eq!(
            HubRequest::parse("CAMARA1;REBOOT").unwrap().command,
            Command::Unknown("REBOOT".to_string())
        );
    }

    #[test]
    fn test_parse_prefixed_lines() {
        assert_eq!(
            HubRequest::parse("CAMERA:CAMARA1:OFF").unwrap(),
            HubRequest {
                target: "CAMARA1".to_string(),
                command: Command::CameraOff,
            }
        );
        assert_eq!(
            HubRequest::parse("REPORT:SENSOR1").unwrap(),
            HubRequest {
                target: "SENSOR1".to_string(),
                command: Command::Report,
            }
        );
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(matches!(
            HubRequest::parse("A;B;C"),
            Err(PayloadError::FieldCount { found: 3, .. })
        ));
        assert!(HubRequest::parse(";TEL:ON").is_err());
        assert!(HubRequest::parse("CAMARA1;").is_err());
        assert!(HubRequest::parse("TEL:ON").is_err());
        assert!(HubRequest::parse("REPORT:").is_err());
        assert!(HubRequest::parse("").is_err());
    }

    #[test]
    fn test_message_formats() {
        let report = Report::new("SENSOR1", 3.456, "ALERT");
        assert_eq!(
            HubMessage::status(&report).to_string(),
            "SENSOR1;Bateria=3.46V, Status=ALERT"
        );
        assert_eq!(
            HubMessage::Online {
                node_id: "XBEE_COORD".to_string()
            }
            .to_string(),
            "XBEE_COORD;Status=online"
        );
        assert_eq!(
            HubMessage::Reply {
                node: "CAMARA1".to_string(),
                text: "CAMARA1:OK".to_string()
            }
            .to_string(),
            "CAMARA1;Reply=CAMARA1:OK"
        );
        assert_eq!(
            HubMessage::DeviceNotFound {
                target: "X".to_string()
            }
            .to_string(),
            "ERROR:DEVICE_NOT_FOUND:X"
        );
    }
}
