use super::RadioLink;
use crate::address::NodeAddress;
use crate::config::RadioConfig;
use crate::error::{MeshError, RadioError, Result};
use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Radio simulated over UDP datagrams
///
/// Each datagram carries the 8-byte sender address followed by the payload.
/// Destinations are routed through the static peer table from configuration.
pub struct UdpRadio {
    socket: UdpSocket,
    local_address: NodeAddress,
    peers: HashMap<NodeAddress, SocketAddr>,
    max_payload: usize,
}

impl UdpRadio {
    /// Bind the radio socket. Failure here is fatal for the node.
    pub async fn bind(config: &RadioConfig, local_address: NodeAddress) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind.as_str()).await.map_err(|e| {
            MeshError::fatal_init("radio".to_string(), format!("bind {}: {}", config.bind, e))
        })?;

        let mut peers = HashMap::new();
        for peer in &config.peers {
            let endpoint: SocketAddr = peer.endpoint.parse().map_err(|e| {
                MeshError::fatal_init(
                    "radio".to_string(),
                    format!("peer endpoint '{}': {}", peer.endpoint, e),
                )
            })?;
            peers.insert(peer.address, endpoint);
        }

        info!(
            "Radio {} listening on {} with {} peers",
            local_address,
            config.bind,
            peers.len()
        );

        Ok(Self {
            socket,
            local_address,
            peers,
            max_payload: config.max_payload,
        })
    }

    pub fn local_endpoint(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn add_peer(&mut self, address: NodeAddress, endpoint: SocketAddr) {
        self.peers.insert(address, endpoint);
    }

    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(NodeAddress::LEN + payload.len());
        frame.extend_from_slice(self.local_address.as_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn decode(datagram: &[u8]) -> Option<Message> {
        if datagram.len() < NodeAddress::LEN {
            return None;
        }
        let (header, payload) = datagram.split_at(NodeAddress::LEN);
        let sender = NodeAddress::from_slice(header)?;
        Some(Message::new(sender, payload))
    }
}

#[async_trait]
impl RadioLink for UdpRadio {
    async fn send(&mut self, destination: NodeAddress, payload: &[u8]) -> std::result::Result<(), RadioError> {
        if payload.len() > self.max_payload {
            return Err(RadioError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        let endpoint = *self
            .peers
            .get(&destination)
            .ok_or(RadioError::UnknownPeer {
                address: destination,
            })?;

        let frame = self.encode(payload);
        self.socket
            .send_to(&frame, endpoint)
            .await
            .map_err(|e| RadioError::Transmit {
                details: e.to_string(),
            })?;

        debug!("Radio sent {} bytes to {} ({})", payload.len(), destination, endpoint);
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<Option<Message>, RadioError> {
        let mut buffer = vec![0u8; NodeAddress::LEN + self.max_payload];
        loop {
            match self.socket.try_recv_from(&mut buffer) {
                Ok((len, from)) => match Self::decode(&buffer[..len]) {
                    Some(message) => return Ok(Some(message)),
                    None => {
                        warn!("Dropping malformed {} byte frame from {}", len, from);
                        continue;
                    }
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => {
                    return Err(RadioError::Receive {
                        details: e.to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PeerConfig, RadioConfig};
    use std::time::Duration;

    fn radio_config() -> RadioConfig {
        RadioConfig {
            bind: "127.0.0.1:0".to_string(),
            max_payload: 64,
            peers: Vec::<PeerConfig>::new(),
        }
    }

    async fn receive_within(radio: &mut UdpRadio, wait: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if let Some(message) = radio.receive().await.unwrap() {
                return Some(message);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_udp_radio_exchange() {
        let a_addr = NodeAddress::new([0xA; 8]);
        let b_addr = NodeAddress::new([0xB; 8]);

        let mut a = UdpRadio::bind(&radio_config(), a_addr).await.unwrap();
        let mut b = UdpRadio::bind(&radio_config(), b_addr).await.unwrap();
        a.add_peer(b_addr, b.local_endpoint().unwrap());

        a.send(b_addr, b"TEL:ON").await.unwrap();
        let message = receive_within(&mut b, Duration::from_secs(2)).await.unwrap();
        assert_eq!(message.sender, a_addr);
        assert_eq!(message.text().unwrap(), "TEL:ON");
    }

    #[tokio::test]
    async fn test_udp_radio_rejects_unknown_and_oversized() {
        let mut radio = UdpRadio::bind(&radio_config(), NodeAddress::new([1; 8]))
            .await
            .unwrap();
        let stranger = NodeAddress::new([2; 8]);

        assert!(matches!(
            radio.send(stranger, b"REPORT").await,
            Err(RadioError::UnknownPeer { .. })
        ));

        radio.add_peer(stranger, "127.0.0.1:9".parse().unwrap());
        assert!(matches!(
            radio.send(stranger, &[b'x'; 65]).await,
            Err(RadioError::PayloadTooLarge { len: 65, max: 64 })
        ));
        assert_eq!(radio.receive().await.unwrap(), None);
    }

    #[test]
    fn test_decode_short_frame() {
        assert!(UdpRadio::decode(&[1, 2, 3]).is_none());
        let message = UdpRadio::decode(&[1, 2, 3, 4, 5, 6, 7, 8, b'O', b'K']).unwrap();
        assert_eq!(message.text().unwrap(), "OK");
    }
}
