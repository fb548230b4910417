//! Radio link boundary.
//!
//! The mesh radio is a best-effort datagram transport: frames may be lost,
//! reordered or duplicated and routing is handled by the radio itself. The
//! node core only depends on the `RadioLink` contract below.

mod mock;
mod udp;

pub use mock::{MockRadio, Transmission};
pub use udp::UdpRadio;

use crate::address::NodeAddress;
use crate::error::RadioError;
use crate::message::Message;
use async_trait::async_trait;

#[async_trait]
pub trait RadioLink: Send {
    /// Hand one frame to the radio. Success means the radio accepted the
    /// frame, not that it was delivered.
    async fn send(&mut self, destination: NodeAddress, payload: &[u8]) -> Result<(), RadioError>;

    /// Poll for one inbound frame without waiting.
    async fn receive(&mut self) -> Result<Option<Message>, RadioError>;
}
