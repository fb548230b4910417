//! Coordinator bridge between the mesh and the hub.

use crate::address::NodeAddress;
use crate::error::Result;
use crate::hub::{HubLink, HubMessage, HubRequest};
use crate::message::{Command, Reply, Report};
use crate::protocol::RetryAckProtocol;
use crate::radio::RadioLink;
use crate::registry::DeviceRegistry;
use tracing::{debug, info, warn};

/// What happened to one hub command line
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Forwarded {
        address: NodeAddress,
        command: Command,
    },
    UnknownTarget {
        target: String,
    },
    /// Every transmit attempt towards a resolved target failed
    SendFailed {
        address: NodeAddress,
        command: Command,
    },
    /// Malformed line, logged and dropped
    Dropped,
}

pub struct CommandRouter<H: HubLink> {
    node_id: String,
    registry: DeviceRegistry,
    hub: H,
}

impl<H: HubLink> CommandRouter<H> {
    pub fn new(node_id: impl Into<String>, hub: H) -> Self {
        Self {
            node_id: node_id.into(),
            registry: DeviceRegistry::new(),
            hub,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub async fn announce_online(&mut self) -> Result<()> {
        let line = HubMessage::Online {
            node_id: self.node_id.clone(),
        };
        self.publish(&line).await
    }

    /// Record a mesh report, acknowledge it to the sender and forward it to
    /// the hub
    pub async fn ingest_report<R: RadioLink>(
        &mut self,
        protocol: &mut RetryAckProtocol<R>,
        sender: NodeAddress,
        report: &Report,
        max_attempts: u32,
    ) -> Result<()> {
        self.registry
            .record_report(sender, &report.node_id, report.battery);

        let ack = Reply::ok(&self.node_id).to_wire();
        if let Err(e) = protocol
            .send_unconfirmed(sender, ack.as_bytes(), max_attempts)
            .await
        {
            warn!("Could not acknowledge report from {}: {}", report.node_id, e);
        }

        self.publish(&HubMessage::status(report)).await
    }

    /// Forward a reply from a mesh node to the hub
    pub async fn forward_reply(&mut self, sender: NodeAddress, text: &str) -> Result<()> {
        let node = self
            .registry
            .get(&sender)
            .map(|entry| entry.node_id.clone())
            .unwrap_or_else(|| sender.to_string());

        self.publish(&HubMessage::Reply {
            node,
            text: text.to_string(),
        })
        .await
    }

    /// Handle one hub command line
    pub async fn dispatch_hub_line<R: RadioLink>(
        &mut self,
        protocol: &mut RetryAckProtocol<R>,
        line: &str,
        max_attempts: u32,
    ) -> Result<Dispatch> {
        let request = match HubRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed hub line '{}': {}", line.trim(), e);
                return Ok(Dispatch::Dropped);
            }
        };

        let Some(address) = self.registry.resolve(&request.target) else {
            warn!("Hub target '{}' is not a known device", request.target);
            self.publish(&HubMessage::DeviceNotFound {
                target: request.target.clone(),
            })
            .await?;
            return Ok(Dispatch::UnknownTarget {
                target: request.target,
            });
        };

        let wire = request.command.to_wire();
        if let Err(e) = protocol
            .send_unconfirmed(address, wire.as_bytes(), max_attempts)
            .await
        {
            warn!("Could not forward '{}' to {}: {}", wire, request.target, e);
            self.publish(&HubMessage::SendFailed {
                target: request.target.clone(),
            })
            .await?;
            return Ok(Dispatch::SendFailed {
                address,
                command: request.command,
            });
        }
        info!("Forwarded '{}' to {} ({})", wire, request.target, address);

        Ok(Dispatch::Forwarded {
            address,
            command: request.command,
        })
    }

    /// Dispatch the next pending hub line, if any
    pub async fn service_hub<R: RadioLink>(
        &mut self,
        protocol: &mut RetryAckProtocol<R>,
        max_attempts: u32,
    ) -> Result<Option<Dispatch>> {
        match self.hub.poll_command().await? {
            Some(line) => {
                let dispatch = self.dispatch_hub_line(protocol, &line, max_attempts).await?;
                Ok(Some(dispatch))
            }
            None => Ok(None),
        }
    }

    async fn publish(&mut self, message: &HubMessage) -> Result<()> {
        let line = message.to_string();
        debug!("Publishing to hub: {}", line);
        self.hub.publish(&line).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryHub;
    use crate::protocol::ProtocolSettings;
    use crate::radio::MockRadio;
    use crate::watchdog::WatchdogSupervisor;

    const CAMARA1: NodeAddress = NodeAddress::new([0, 0x13, 0xA2, 0, 0x42, 0x3D, 0x8A, 0xAC]);

    fn fixture() -> (CommandRouter<MemoryHub>, MemoryHub, RetryAckProtocol<MockRadio>, MockRadio) {
        let hub = MemoryHub::new();
        let radio = MockRadio::new();
        let protocol = RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::disabled(),
            ProtocolSettings::default(),
        );
        (CommandRouter::new("XBEE_COORD", hub.clone()), hub, protocol, radio)
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_is_recorded_acknowledged_and_published() {
        let (mut router, hub, mut protocol, radio) = fixture();
        let report = Report::new("CAMARA1", 3.7, "started");

        router
            .ingest_report(&mut protocol, CAMARA1, &report, 3)
            .await
            .unwrap();

        assert_eq!(router.registry().find_by_node_id("CAMARA1"), Some(CAMARA1));
        assert_eq!(radio.sent_texts(), vec!["XBEE_COORD:OK"]);
        assert_eq!(radio.transmissions()[0].destination, CAMARA1);
        assert_eq!(hub.published(), vec!["CAMARA1;Bateria=3.70V, Status=started"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_command_to_registered_node() {
        let (mut router, _hub, mut protocol, radio) = fixture();
        router
            .ingest_report(&mut protocol, CAMARA1, &Report::new("CAMARA1", 3.7, "started"), 3)
            .await
            .unwrap();
        radio.clear_transmissions();

        let dispatch = router
            .dispatch_hub_line(&mut protocol, "CAMARA1;TEL:ON", 3)
            .await
            .unwrap();

        assert_eq!(
            dispatch,
            Dispatch::Forwarded {
                address: CAMARA1,
                command: Command::CameraOn
            }
        );
        let sent = radio.transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, CAMARA1);
        assert_eq!(sent[0].text(), "TEL:ON");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_command_to_unknown_node() {
        let (mut router, hub, mut protocol, radio) = fixture();

        let dispatch = router
            .dispatch_hub_line(&mut protocol, "UNKNOWN;TEL:ON", 3)
            .await
            .unwrap();

        assert_eq!(
            dispatch,
            Dispatch::UnknownTarget {
                target: "UNKNOWN".to_string()
            }
        );
        assert_eq!(radio.transmit_calls(), 0);
        assert_eq!(hub.published(), vec!["ERROR:DEVICE_NOT_FOUND:UNKNOWN"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_command_send_failure_is_reported_to_hub() {
        let (mut router, hub, mut protocol, radio) = fixture();
        router
            .ingest_report(&mut protocol, CAMARA1, &Report::new("CAMARA1", 3.7, "started"), 3)
            .await
            .unwrap();
        radio.clear_transmissions();
        hub.clear_published();
        radio.fail_next_sends(3);

        let dispatch = router
            .dispatch_hub_line(&mut protocol, "CAMARA1;TEL:ON", 3)
            .await
            .unwrap();

        assert_eq!(
            dispatch,
            Dispatch::SendFailed {
                address: CAMARA1,
                command: Command::CameraOn
            }
        );
        assert_eq!(radio.transmit_calls(), 3);
        assert_eq!(hub.published(), vec!["ERROR:SEND_FAILED:CAMARA1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_hub_line_is_dropped() {
        let (mut router, hub, mut protocol, radio) = fixture();

        let dispatch = router
            .dispatch_hub_line(&mut protocol, "CAMARA1;TEL;ON", 3)
            .await
            .unwrap();

        assert_eq!(dispatch, Dispatch::Dropped);
        assert_eq!(radio.transmit_calls(), 0);
        assert!(hub.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_variant_by_literal_address() {
        let (mut router, hub, mut protocol, radio) = fixture();
        hub.push_command("CAMERA:0013A200423D8AAC:OFF");

        let dispatch = router.service_hub(&mut protocol, 3).await.unwrap();

        assert!(matches!(dispatch, Some(Dispatch::Forwarded { address, .. }) if address == CAMARA1));
        assert_eq!(radio.sent_texts(), vec!["TEL:OFF"]);
        assert_eq!(router.service_hub(&mut protocol, 3).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_are_forwarded_with_node_name() {
        let (mut router, hub, mut protocol, _radio) = fixture();
        let stranger = NodeAddress::new([7; 8]);
        router
            .ingest_report(&mut protocol, CAMARA1, &Report::new("CAMARA1", 3.7, "started"), 3)
            .await
            .unwrap();
        hub.clear_published();

        router.forward_reply(CAMARA1, "CAMARA1:OK").await.unwrap();
        router.forward_reply(stranger, "OK").await.unwrap();

        assert_eq!(
            hub.published(),
            vec!["CAMARA1;Reply=CAMARA1:OK", "0707070707070707;Reply=OK"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_is_an_error() {
        let (mut router, hub, _protocol, _radio) = fixture();
        hub.fail_next_publishes(1);

        assert!(router.announce_online().await.is_err());
        router.announce_online().await.unwrap();
        assert_eq!(hub.published(), vec!["XBEE_COORD;Status=online"]);
    }
}
