//! Retry and acknowledgement primitives over a lossy radio.
//!
//! Two sends are offered. [`RetryAckProtocol::send_unconfirmed`] only retries
//! local transmit failures. [`RetryAckProtocol::send_confirmed`] additionally
//! listens for a reply from the destination for one hearing window per attempt.
//! Every wait is a bounded polling loop that feeds the watchdog on each poll.

use crate::address::NodeAddress;
use crate::config::{AckMode, RetryConfig};
use crate::error::{AttemptFailure, ProtocolError, RadioError};
use crate::message::{Message, Payload};
use crate::radio::RadioLink;
use crate::watchdog::WatchdogSupervisor;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub retry_delay: Duration,
    pub hearing_window: Duration,
    pub poll_interval: Duration,
    pub ack_mode: AckMode,
    pub backlog_capacity: usize,
}

impl From<&RetryConfig> for ProtocolSettings {
    fn from(config: &RetryConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            hearing_window: config.hearing_window(),
            poll_interval: config.poll_interval(),
            ack_mode: config.ack_mode,
            backlog_capacity: config.backlog_capacity,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            hearing_window: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
            ack_mode: AckMode::AnyFromSender,
            backlog_capacity: 16,
        }
    }
}

/// Attempt accounting for one logical send
#[derive(Debug, Clone)]
pub struct RetryBudget {
    attempts_made: u32,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl RetryBudget {
    /// A budget of zero attempts is treated as one
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
            attempt_timeout,
        }
    }

    /// Consume one attempt, returning its 1-based number
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts_made += 1;
        Some(self.attempts_made)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}

/// Outcome of a successful send
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub attempts: u32,
    /// The frame accepted as acknowledgement (confirmed sends only)
    pub ack: Option<Message>,
}

pub struct RetryAckProtocol<R: RadioLink> {
    radio: R,
    watchdog: WatchdogSupervisor,
    settings: ProtocolSettings,
    backlog: VecDeque<Message>,
}

impl<R: RadioLink> RetryAckProtocol<R> {
    pub fn new(radio: R, watchdog: WatchdogSupervisor, settings: ProtocolSettings) -> Self {
        Self {
            radio,
            watchdog,
            settings,
            backlog: VecDeque::new(),
        }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor {
        &self.watchdog
    }

    pub fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }

    /// Transmit, retrying only transport failures
    pub async fn send_unconfirmed(
        &mut self,
        destination: NodeAddress,
        payload: &[u8],
        max_attempts: u32,
    ) -> Result<Delivery, ProtocolError> {
        let mut budget = RetryBudget::new(max_attempts, Duration::ZERO);
        let mut last_failure = None;

        while let Some(attempt) = budget.next_attempt() {
            self.watchdog.feed();
            let result = self.radio.send(destination, payload).await;
            self.watchdog.feed();

            match result {
                Ok(()) => {
                    trace!("Sent {} bytes to {} on attempt {}", payload.len(), destination, attempt);
                    return Ok(Delivery {
                        attempts: attempt,
                        ack: None,
                    });
                }
                Err(e) => {
                    warn!(
                        "Transmit to {} failed (attempt {}/{}): {}",
                        destination,
                        attempt,
                        budget.max_attempts(),
                        e
                    );
                    last_failure = Some(AttemptFailure::Transport(e));
                }
            }

            if !budget.is_exhausted() {
                self.fed_sleep(self.settings.retry_delay).await;
            }
        }

        Err(self.exhausted(destination, &budget, last_failure))
    }

    /// Transmit and wait for a reply from `destination`, retrying on transport
    /// failure or silence
    pub async fn send_confirmed(
        &mut self,
        destination: NodeAddress,
        payload: &[u8],
        max_attempts: u32,
    ) -> Result<Delivery, ProtocolError> {
        let mut budget = RetryBudget::new(max_attempts, self.settings.hearing_window);
        let mut last_failure = None;

        while let Some(attempt) = budget.next_attempt() {
            self.watchdog.feed();
            let failure = match self.radio.send(destination, payload).await {
                Ok(()) => match self.hear_from(destination, budget.attempt_timeout()).await {
                    Some(ack) => {
                        debug!(
                            "Delivery to {} confirmed after {} attempt(s)",
                            destination, attempt
                        );
                        return Ok(Delivery {
                            attempts: attempt,
                            ack: Some(ack),
                        });
                    }
                    None => AttemptFailure::Timeout {
                        window: budget.attempt_timeout(),
                    },
                },
                Err(e) => AttemptFailure::Transport(e),
            };

            warn!(
                "No confirmation from {} (attempt {}/{}): {}",
                destination,
                attempt,
                budget.max_attempts(),
                failure
            );
            last_failure = Some(failure);

            if !budget.is_exhausted() {
                self.fed_sleep(self.settings.retry_delay).await;
            }
        }

        Err(self.exhausted(destination, &budget, last_failure))
    }

    /// Next inbound frame, serving the backlog first
    pub async fn poll_inbound(&mut self) -> Result<Option<Message>, RadioError> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(Some(message));
        }
        self.radio.receive().await
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Sleep for `duration` in poll-interval slices, feeding the watchdog
    pub async fn fed_sleep(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            self.watchdog.feed();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    async fn hear_from(&mut self, destination: NodeAddress, window: Duration) -> Option<Message> {
        let deadline = Instant::now() + window;
        loop {
            self.watchdog.feed();

            match self.radio.receive().await {
                Ok(Some(message)) => {
                    if self.acknowledges(&message, destination) {
                        return Some(message);
                    }
                    self.stash(message);
                    if Instant::now() < deadline {
                        continue;
                    }
                    return None;
                }
                Ok(None) => {}
                Err(e) => debug!("Receive failed while waiting for {}: {}", destination, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    fn acknowledges(&self, message: &Message, destination: NodeAddress) -> bool {
        if message.sender != destination {
            return false;
        }
        match self.settings.ack_mode {
            AckMode::AnyFromSender => true,
            AckMode::ExactReply => matches!(message.classify(), Ok(Payload::Reply(_))),
        }
    }

    fn stash(&mut self, message: Message) {
        if self.settings.backlog_capacity == 0 {
            debug!("Dropping frame from {} (backlog disabled)", message.sender);
            return;
        }
        if self.backlog.len() >= self.settings.backlog_capacity {
            if let Some(dropped) = self.backlog.pop_front() {
                warn!("Inbound backlog full, dropping frame from {}", dropped.sender);
            }
        }
        self.backlog.push_back(message);
    }

    fn exhausted(
        &self,
        destination: NodeAddress,
        budget: &RetryBudget,
        last_failure: Option<AttemptFailure>,
    ) -> ProtocolError {
        ProtocolError::Exhausted {
            destination,
            attempts: budget.attempts_made(),
            last: last_failure.unwrap_or(AttemptFailure::Timeout {
                window: budget.attempt_timeout(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MockRadio;
    use crate::watchdog::CountingWatchdog;
    use std::sync::Arc;

    const CAMERA: NodeAddress = NodeAddress::new([0, 0x13, 0xA2, 0, 0x42, 0x3D, 0x8A, 0xAC]);
    const STRANGER: NodeAddress = NodeAddress::new([9; 8]);

    fn protocol(radio: &MockRadio) -> RetryAckProtocol<MockRadio> {
        RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::disabled(),
            ProtocolSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_send_exhausts_budget_when_nothing_answers() {
        let radio = MockRadio::new();
        let mut protocol = protocol(&radio);
        let started = Instant::now();

        let result = protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await;

        assert_eq!(
            result,
            Err(ProtocolError::Exhausted {
                destination: CAMERA,
                attempts: 3,
                last: AttemptFailure::Timeout {
                    window: Duration::from_secs(3)
                },
            })
        );
        assert_eq!(radio.transmission_count(), 3);
        // three hearing windows plus two retry delays
        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_send_succeeds_on_second_attempt() {
        let radio = MockRadio::new();
        radio.ack_on_transmission(2, "XBEE_CAM:OK");
        let mut protocol = protocol(&radio);

        let delivery = protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await.unwrap();

        assert_eq!(delivery.attempts, 2);
        assert_eq!(delivery.ack.unwrap().text().unwrap(), "XBEE_CAM:OK");
        assert_eq!(radio.transmission_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_counts_as_attempt() {
        let radio = MockRadio::new();
        radio.fail_next_sends(1);
        radio.ack_everything("OK");
        let mut protocol = protocol(&radio);

        let delivery = protocol.send_confirmed(CAMERA, b"REPORT", 3).await.unwrap();

        assert_eq!(delivery.attempts, 2);
        assert_eq!(radio.transmit_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_frames_are_backlogged() {
        let radio = MockRadio::new();
        radio.respond_with(|tx, index| {
            let mut replies = vec![Message::new(STRANGER, "REPORT")];
            if index == 1 {
                replies.push(Message::new(tx.destination, "CAM:OK"));
            }
            replies
        });
        let mut protocol = protocol(&radio);

        let delivery = protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await.unwrap();
        assert_eq!(delivery.attempts, 1);
        assert_eq!(protocol.backlog_len(), 1);

        let queued = protocol.poll_inbound().await.unwrap().unwrap();
        assert_eq!(queued.sender, STRANGER);
        assert_eq!(queued.text().unwrap(), "REPORT");
        assert_eq!(protocol.poll_inbound().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_frames_do_not_extend_hearing_window() {
        let radio = MockRadio::new();
        radio.respond_with(|_, _| (0..5).map(|n| Message::new(STRANGER, format!("frame {}", n))).collect());
        let mut protocol = RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::disabled(),
            ProtocolSettings {
                hearing_window: Duration::ZERO,
                ..ProtocolSettings::default()
            },
        );

        assert!(protocol.send_confirmed(CAMERA, b"TEL:ON", 1).await.is_err());

        // Window closed after the first frame; the rest wait on the radio
        assert_eq!(protocol.backlog_len(), 1);
        assert_eq!(radio.pending_inbound(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_is_bounded() {
        let radio = MockRadio::new();
        radio.respond_with(|_, index| vec![Message::new(STRANGER, format!("frame {}", index))]);
        let mut protocol = RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::disabled(),
            ProtocolSettings {
                backlog_capacity: 2,
                ..ProtocolSettings::default()
            },
        );

        assert!(protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await.is_err());
        assert_eq!(protocol.backlog_len(), 2);

        let first = protocol.poll_inbound().await.unwrap().unwrap();
        assert_eq!(first.text().unwrap(), "frame 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_reply_mode_ignores_commands_from_destination() {
        let radio = MockRadio::new();
        radio.respond_with(|tx, index| {
            if index == 1 {
                vec![Message::new(tx.destination, "REPORT")]
            } else {
                vec![Message::new(tx.destination, "XBEE_CAM:OK")]
            }
        });
        let mut protocol = RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::disabled(),
            ProtocolSettings {
                ack_mode: AckMode::ExactReply,
                ..ProtocolSettings::default()
            },
        );

        let delivery = protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await.unwrap();
        assert_eq!(delivery.attempts, 2);
        assert_eq!(protocol.backlog_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_reply_mode_accepts_commands_from_destination() {
        let radio = MockRadio::new();
        radio.ack_everything("REPORT");
        let mut protocol = protocol(&radio);

        let delivery = protocol.send_confirmed(CAMERA, b"TEL:ON", 3).await.unwrap();
        assert_eq!(delivery.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_send_retries_transport_failures() {
        let radio = MockRadio::new();
        radio.fail_next_sends(2);
        let mut protocol = protocol(&radio);

        let delivery = protocol.send_unconfirmed(CAMERA, b"TEL:OFF", 3).await.unwrap();
        assert_eq!(delivery.attempts, 3);
        assert!(delivery.ack.is_none());

        radio.fail_next_sends(3);
        let result = protocol.send_unconfirmed(CAMERA, b"TEL:OFF", 3).await;
        assert!(matches!(
            result,
            Err(ProtocolError::Exhausted {
                attempts: 3,
                last: AttemptFailure::Transport(_),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_transmits_once() {
        let radio = MockRadio::new();
        let mut protocol = protocol(&radio);

        assert!(protocol.send_unconfirmed(CAMERA, b"REPORT", 0).await.is_ok());
        assert_eq!(radio.transmission_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fed_throughout_hearing_window() {
        let radio = MockRadio::new();
        let counter = CountingWatchdog::new();
        let mut protocol = RetryAckProtocol::new(
            radio.clone(),
            WatchdogSupervisor::new(Arc::new(counter.clone())),
            ProtocolSettings::default(),
        );

        let _ = protocol.send_confirmed(CAMERA, b"TEL:ON", 1).await;

        // 3 s window polled every 100 ms
        assert!(counter.feeds() >= 30, "only {} feeds", counter.feeds());
        assert!(protocol.watchdog().since_last_feed() <= Duration::from_millis(100));
    }

    #[test]
    fn test_retry_budget() {
        let mut budget = RetryBudget::new(2, Duration::from_secs(3));
        assert_eq!(budget.next_attempt(), Some(1));
        assert_eq!(budget.next_attempt(), Some(2));
        assert_eq!(budget.next_attempt(), None);
        assert!(budget.is_exhausted());
        assert_eq!(RetryBudget::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
