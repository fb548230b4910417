//! Mesh wire payloads.
//!
//! Payloads are UTF-8 text with no header; the kind of a payload is decided
//! by its structure. A `Report` is exactly three colon-separated fields with
//! a numeric battery field, a reply is one of the acknowledgement shapes sent
//! back by a node, and everything else is treated as a command token.

use crate::address::NodeAddress;
use crate::error::PayloadError;
use std::fmt;

/// Reply sent for command tokens a node does not understand
pub const UNKNOWN_COMMAND_REPLY: &str = "UNKNOWN COMMAND RECEIVED";

/// A frame received from the radio
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: NodeAddress,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(sender: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    pub fn text(&self) -> Result<&str, PayloadError> {
        std::str::from_utf8(&self.payload).map_err(|_| PayloadError::NotUtf8)
    }

    /// Classify the payload into report, reply or command
    pub fn classify(&self) -> Result<Payload, PayloadError> {
        Ok(Payload::classify(self.text()?))
    }
}

/// Status report: `"<node_id>:<battery_volts>:<free_text>"`
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub node_id: String,
    pub battery: f32,
    pub text: String,
}

impl Report {
    pub fn new(node_id: impl Into<String>, battery: f32, text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            battery,
            text: text.into(),
        }
    }

    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() != 3 {
            return Err(PayloadError::FieldCount {
                expected: 3,
                found: parts.len(),
            });
        }

        let node_id = parts[0].trim();
        if node_id.is_empty() {
            return Err(PayloadError::EmptyField { field: "node_id" });
        }

        let battery_field = parts[1].trim();
        let battery = battery_field
            .parse::<f32>()
            .ok()
            .filter(|volts| volts.is_finite())
            .ok_or_else(|| PayloadError::InvalidBattery {
                value: battery_field.to_string(),
            })?;

        let text = parts[2].trim();

        Ok(Self {
            node_id: node_id.to_string(),
            battery,
            text: text.to_string(),
        })
    }

    pub fn to_wire(&self) -> String {
        format!("{}:{:.2}:{}", self.node_id, self.battery, self.text)
    }
}

/// Command tokens understood by mesh nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `REPORT` (also `REQ_REPORT`, `TEL:REPORT`)
    Report,
    /// `TEL:ON`
    CameraOn,
    /// `TEL:OFF`
    CameraOff,
    /// `SENSOR:ON`
    SensorOn,
    /// `CAMERA:<target>:<ON|OFF>`
    Camera { target: String, on: bool },
    Unknown(String),
}

impl Command {
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token {
            "REPORT" | "REQ_REPORT" | "TEL:REPORT" => return Command::Report,
            "TEL:ON" => return Command::CameraOn,
            "TEL:OFF" => return Command::CameraOff,
            "SENSOR:ON" => return Command::SensorOn,
            _ => {}
        }

        let parts: Vec<&str> = token.split(':').collect();
        if let ["CAMERA", target, action] = parts.as_slice() {
            if !target.is_empty() {
                match *action {
                    "ON" => {
                        return Command::Camera {
                            target: target.to_string(),
                            on: true,
                        }
                    }
                    "OFF" => {
                        return Command::Camera {
                            target: target.to_string(),
                            on: false,
                        }
                    }
                    _ => {}
                }
            }
        }

        Command::Unknown(token.to_string())
    }

    pub fn to_wire(&self) -> String {
        match self {
            Command::Report => "REPORT".to_string(),
            Command::CameraOn => "TEL:ON".to_string(),
            Command::CameraOff => "TEL:OFF".to_string(),
            Command::SensorOn => "SENSOR:ON".to_string(),
            Command::Camera { target, on } => {
                format!("CAMERA:{}:{}", target, if *on { "ON" } else { "OFF" })
            }
            Command::Unknown(token) => token.clone(),
        }
    }

    /// Resolve `CAMERA:<target>:<ON|OFF>` addressed to `node_id` into the
    /// plain camera command; other commands are returned unchanged.
    pub fn addressed_to(self, node_id: &str) -> Self {
        match self {
            Command::Camera { ref target, on } if target == node_id => {
                if on {
                    Command::CameraOn
                } else {
                    Command::CameraOff
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Answers sent back to the sender of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `"{node_id}:OK"`
    Ok { node_id: String },
    /// `"{node_id}: {status}"`
    Status { node_id: String, status: String },
    /// `"UNKNOWN COMMAND RECEIVED"`
    UnknownCommand,
}

impl Reply {
    pub fn ok(node_id: &str) -> Self {
        Reply::Ok {
            node_id: node_id.to_string(),
        }
    }

    pub fn status(node_id: &str, status: impl Into<String>) -> Self {
        Reply::Status {
            node_id: node_id.to_string(),
            status: status.into(),
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Reply::Ok { node_id } => format!("{}:OK", node_id),
            Reply::Status { node_id, status } => format!("{}: {}", node_id, status),
            Reply::UnknownCommand => UNKNOWN_COMMAND_REPLY.to_string(),
        }
    }

    /// True if `text` has the shape of an acknowledgement or status reply
    pub fn looks_like_reply(text: &str) -> bool {
        text == "OK"
            || text == UNKNOWN_COMMAND_REPLY
            || text.ends_with(":OK")
            || text.contains(": ")
    }
}

/// Structural classification of an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Report(Report),
    Reply(String),
    Command(Command),
}

impl Payload {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        if let Ok(report) = Report::parse(text) {
            return Payload::Report(report);
        }
        if Reply::looks_like_reply(text) {
            return Payload::Reply(text.to_string());
        }
        Payload::Command(Command::parse(text))
    }
}
