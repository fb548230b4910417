use super::RadioLink;
use crate::address::NodeAddress;
use crate::error::RadioError;
use crate::message::Message;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// A frame accepted by the mock radio
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub destination: NodeAddress,
    pub payload: Vec<u8>,
}

impl Transmission {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

type Responder = Box<dyn FnMut(&Transmission, usize) -> Vec<Message> + Send>;

#[derive(Default)]
struct MockRadioState {
    transmissions: Vec<Transmission>,
    transmit_calls: usize,
    inbox: VecDeque<Message>,
    failing_sends: u32,
    failing_receives: u32,
    responder: Option<Responder>,
}

/// In-memory radio for testing without hardware
///
/// Clones share the same state, so a test can keep one handle for
/// scripting and inspection while the node owns another.
#[derive(Clone, Default)]
pub struct MockRadio {
    state: Arc<Mutex<MockRadioState>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by the next `receive`
    pub fn push_inbound(&self, message: Message) {
        self.state.lock().inbox.push_back(message);
    }

    /// Make the next `count` transmit calls fail with a transport error
    pub fn fail_next_sends(&self, count: u32) {
        self.state.lock().failing_sends = count;
    }

    /// Make the next `count` receive calls fail
    pub fn fail_next_receives(&self, count: u32) {
        self.state.lock().failing_receives = count;
    }

    /// Install a responder called for every accepted transmission with the
    /// transmission and its 1-based index; returned frames are queued inbound.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&Transmission, usize) -> Vec<Message> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Reply `payload` from the destination of every accepted transmission
    pub fn ack_everything(&self, payload: &str) {
        let payload = payload.to_string();
        self.respond_with(move |tx, _| vec![Message::new(tx.destination, payload.clone())]);
    }

    /// Reply from the destination only to the `n`th accepted transmission
    pub fn ack_on_transmission(&self, n: usize, payload: &str) {
        let payload = payload.to_string();
        self.respond_with(move |tx, index| {
            if index == n {
                vec![Message::new(tx.destination, payload.clone())]
            } else {
                Vec::new()
            }
        });
    }

    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().transmissions.clone()
    }

    /// Payloads of accepted transmissions, as text
    pub fn sent_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .transmissions
            .iter()
            .map(Transmission::text)
            .collect()
    }

    /// Number of accepted transmissions
    pub fn transmission_count(&self) -> usize {
        self.state.lock().transmissions.len()
    }

    /// Number of transmit calls, including failed ones
    pub fn transmit_calls(&self) -> usize {
        self.state.lock().transmit_calls
    }

    pub fn clear_transmissions(&self) {
        let mut state = self.state.lock();
        state.transmissions.clear();
        state.transmit_calls = 0;
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbox.len()
    }
}

#[async_trait]
impl RadioLink for MockRadio {
    async fn send(&mut self, destination: NodeAddress, payload: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        state.transmit_calls += 1;

        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(RadioError::Transmit {
                details: "mock transmit failure".to_string(),
            });
        }

        let transmission = Transmission {
            destination,
            payload: payload.to_vec(),
        };
        debug!(
            "Mock radio accepted '{}' for {}",
            transmission.text(),
            destination
        );
        state.transmissions.push(transmission.clone());
        let index = state.transmissions.len();

        if let Some(mut responder) = state.responder.take() {
            let replies = responder(&transmission, index);
            state.inbox.extend(replies);
            state.responder = Some(responder);
        }

        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Message>, RadioError> {
        let mut state = self.state.lock();
        if state.failing_receives > 0 {
            state.failing_receives -= 1;
            return Err(RadioError::Receive {
                details: "mock receive failure".to_string(),
            });
        }
        Ok(state.inbox.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_radio_records_and_replies() {
        let peer = NodeAddress::new([0, 0, 0, 0, 0, 0, 0, 2]);
        let handle = MockRadio::new();
        handle.ack_on_transmission(2, "CAM:OK");

        let mut radio = handle.clone();
        radio.send(peer, b"first").await.unwrap();
        assert_eq!(radio.receive().await.unwrap(), None);

        radio.send(peer, b"second").await.unwrap();
        let reply = radio.receive().await.unwrap().unwrap();
        assert_eq!(reply.sender, peer);
        assert_eq!(reply.text().unwrap(), "CAM:OK");

        assert_eq!(handle.sent_texts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_mock_radio_forced_failures() {
        let peer = NodeAddress::new([9; 8]);
        let handle = MockRadio::new();
        handle.fail_next_sends(1);

        let mut radio = handle.clone();
        assert!(radio.send(peer, b"x").await.is_err());
        assert!(radio.send(peer, b"x").await.is_ok());
        assert_eq!(handle.transmit_calls(), 2);
        assert_eq!(handle.transmission_count(), 1);
    }
}
