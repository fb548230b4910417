use crate::error::PayloadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit hardware address of a mesh node (EUI-64)
///
/// Used as the routing key on the radio and as the registry key on the
/// coordinator. The text form is 16 hex digits, e.g. `0013A200423D8B99`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress([u8; 8]);

impl NodeAddress {
    pub const LEN: usize = 8;

    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// True if `text` looks like a literal address rather than a node name
    pub fn is_address_literal(text: &str) -> bool {
        text.len() == Self::LEN * 2 && text.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({})", self)
    }
}

impl FromStr for NodeAddress {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if !Self::is_address_literal(text) {
            return Err(PayloadError::InvalidAddress {
                value: s.to_string(),
                details: "expected 16 hex digits".to_string(),
            });
        }

        let mut bytes = [0u8; 8];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &text[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|e| PayloadError::InvalidAddress {
                value: s.to_string(),
                details: e.to_string(),
            })?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = PayloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.to_string()
    }
}
