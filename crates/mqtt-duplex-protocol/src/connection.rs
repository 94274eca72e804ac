//! Connection lifecycle state machine and reconnect policy.

use crate::error::{MqttError, Result};
use crate::packet::ConnAckPacket;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Created, connect not yet requested.
    Initializing,
    /// Transport dialing or CONNACK outstanding. `attempt` is the
    /// zero-based index of this connect attempt; retries carry the
    /// count forward so the bound survives the round trip through
    /// `Connecting`.
    Connecting { attempt: u32 },
    /// CONNACK accepted; the negotiated ack is kept for its properties.
    Open(Box<ConnAckPacket>),
    /// Client-initiated shutdown in progress.
    Closing,
    Closed(Option<DisconnectReason>),
    /// A connect attempt failed; a retry may follow.
    ConnectionFailure { attempt: u32 },
}

impl ConnectionState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_closed()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Connecting { .. } => "connecting",
            Self::Open(_) => "open",
            Self::Closing => "closing",
            Self::Closed(_) => "closed",
            Self::ConnectionFailure { .. } => "connection-failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientInitiated,
    ServerClosed,
    NetworkError(String),
    ProtocolError(String),
    KeepAliveTimeout,
    AuthFailure,
    RetriesExhausted,
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connect (or retry) requested by the owner.
    ConnectRequested,
    ConnAckReceived(Box<ConnAckPacket>),
    CloseRequested,
    /// The transport dropped or a connect attempt failed.
    ConnectionLost { reason: DisconnectReason },
    /// Orderly transport shutdown finished.
    TransportClosed,
}

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor_tenths: u32,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor_tenths: 20,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn backoff_factor(&self) -> f64 {
        f64::from(self.backoff_factor_tenths) / 10.0
    }

    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_factor().powi(attempt as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        Duration::from_millis(delay_ms.min(max_ms))
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        if !self.enabled {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Drives the lifecycle. Events from an illegal state return
/// [`MqttError::InvalidState`] and leave the state untouched, so a
/// racing caller cannot corrupt the machine.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    reconnect_config: ReconnectConfig,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

impl ConnectionStateMachine {
    #[must_use]
    pub fn new(reconnect_config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Initializing,
            reconnect_config,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[must_use]
    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect_config
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// The CONNACK negotiated for the current connection.
    #[must_use]
    pub fn connack(&self) -> Option<&ConnAckPacket> {
        match &self.state {
            ConnectionState::Open(connack) => Some(connack),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: ConnectionEvent) -> Result<&ConnectionState> {
        let next = match (&self.state, event) {
            (
                ConnectionState::Initializing | ConnectionState::Closed(_),
                ConnectionEvent::ConnectRequested,
            ) => ConnectionState::Connecting { attempt: 0 },
            (
                ConnectionState::ConnectionFailure { attempt },
                ConnectionEvent::ConnectRequested,
            ) => ConnectionState::Connecting {
                attempt: *attempt + 1,
            },

            (ConnectionState::Connecting { .. }, ConnectionEvent::ConnAckReceived(connack)) => {
                if connack.is_success() {
                    ConnectionState::Open(connack)
                } else {
                    ConnectionState::Closed(Some(DisconnectReason::ProtocolError(format!(
                        "connection refused: {:?}",
                        connack.reason_code
                    ))))
                }
            }

            (ConnectionState::Open(_), ConnectionEvent::CloseRequested) => {
                ConnectionState::Closing
            }

            (
                ConnectionState::Connecting { attempt },
                ConnectionEvent::ConnectionLost { reason },
            ) => self.failure_or_closed(*attempt, reason),
            (ConnectionState::Open(_), ConnectionEvent::ConnectionLost { reason }) => {
                self.failure_or_closed(0, reason)
            }

            (
                ConnectionState::Closing,
                ConnectionEvent::TransportClosed | ConnectionEvent::ConnectionLost { .. },
            ) => ConnectionState::Closed(Some(DisconnectReason::ClientInitiated)),

            (state, event) => {
                return Err(MqttError::InvalidState(format!(
                    "event {event:?} not valid in state {}",
                    state.name()
                )));
            }
        };

        self.state = next;
        Ok(&self.state)
    }

    fn failure_or_closed(&self, attempt: u32, reason: DisconnectReason) -> ConnectionState {
        if self.reconnect_config.should_retry(attempt) {
            ConnectionState::ConnectionFailure { attempt }
        } else if self.reconnect_config.enabled {
            ConnectionState::Closed(Some(DisconnectReason::RetriesExhausted))
        } else {
            ConnectionState::Closed(Some(reason))
        }
    }

    /// Delay before the retry implied by the current failure state.
    #[must_use]
    pub fn next_retry_delay(&self) -> Option<Duration> {
        match self.state {
            ConnectionState::ConnectionFailure { attempt } => {
                Some(self.reconnect_config.calculate_delay(attempt))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::v5::reason_codes::ReasonCode;

    fn success_connack() -> Box<ConnAckPacket> {
        Box::new(ConnAckPacket::new(false, ReasonCode::Success))
    }

    #[test]
    fn test_happy_path() {
        let mut sm = ConnectionStateMachine::default();
        assert_eq!(sm.state().name(), "initializing");

        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        assert_eq!(sm.state().name(), "connecting");

        sm.transition(ConnectionEvent::ConnAckReceived(success_connack()))
            .unwrap();
        assert!(sm.is_open());
        assert!(sm.connack().is_some());

        sm.transition(ConnectionEvent::CloseRequested).unwrap();
        sm.transition(ConnectionEvent::TransportClosed).unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::Closed(Some(DisconnectReason::ClientInitiated))
        );
    }

    #[test]
    fn test_refused_connack_closes() {
        let mut sm = ConnectionStateMachine::default();
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();

        let connack = Box::new(ConnAckPacket::new(false, ReasonCode::NotAuthorized));
        sm.transition(ConnectionEvent::ConnAckReceived(connack))
            .unwrap();
        assert!(sm.state().is_closed());
    }

    #[test]
    fn test_illegal_edge_rejected_and_state_kept() {
        let mut sm = ConnectionStateMachine::default();
        let err = sm
            .transition(ConnectionEvent::CloseRequested)
            .unwrap_err();
        assert!(matches!(err, MqttError::InvalidState(_)));
        assert_eq!(sm.state().name(), "initializing");
    }

    #[test]
    fn test_connack_outside_connecting_rejected() {
        let mut sm = ConnectionStateMachine::default();
        assert!(sm
            .transition(ConnectionEvent::ConnAckReceived(success_connack()))
            .is_err());
    }

    #[test]
    fn test_retry_loop_bounded_by_max_attempts() {
        let mut sm = ConnectionStateMachine::new(ReconnectConfig {
            max_attempts: Some(2),
            ..Default::default()
        });

        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        sm.transition(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::NetworkError("refused".into()),
        })
        .unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::ConnectionFailure { attempt: 0 }
        );
        assert!(sm.next_retry_delay().is_some());

        // The retry round trip must not lose the count.
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        assert_eq!(*sm.state(), ConnectionState::Connecting { attempt: 1 });
        sm.transition(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::NetworkError("refused".into()),
        })
        .unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::ConnectionFailure { attempt: 1 }
        );

        // Third failure exceeds max_attempts.
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        sm.transition(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::NetworkError("refused".into()),
        })
        .unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::Closed(Some(DisconnectReason::RetriesExhausted))
        );
        assert_eq!(sm.next_retry_delay(), None);
    }

    #[test]
    fn test_open_drop_restarts_attempt_counter() {
        let mut sm = ConnectionStateMachine::default();
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        sm.transition(ConnectionEvent::ConnAckReceived(success_connack()))
            .unwrap();

        sm.transition(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::ServerClosed,
        })
        .unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::ConnectionFailure { attempt: 0 }
        );
    }

    #[test]
    fn test_disabled_reconnect_closes_immediately() {
        let mut sm = ConnectionStateMachine::new(ReconnectConfig::disabled());
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        sm.transition(ConnectionEvent::ConnectionLost {
            reason: DisconnectReason::KeepAliveTimeout,
        })
        .unwrap();
        assert_eq!(
            *sm.state(),
            ConnectionState::Closed(Some(DisconnectReason::KeepAliveTimeout))
        );
    }

    #[test]
    fn test_backoff_delays() {
        let config = ReconnectConfig {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor_tenths: 20,
            max_attempts: Some(10),
        };

        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(config.calculate_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_reconnect_after_close_allowed() {
        let mut sm = ConnectionStateMachine::default();
        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        sm.transition(ConnectionEvent::ConnAckReceived(success_connack()))
            .unwrap();
        sm.transition(ConnectionEvent::CloseRequested).unwrap();
        sm.transition(ConnectionEvent::TransportClosed).unwrap();

        sm.transition(ConnectionEvent::ConnectRequested).unwrap();
        assert_eq!(sm.state().name(), "connecting");
    }
}
