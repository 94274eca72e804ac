use crate::protocol::v5::reason_codes::ReasonCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Malformed variable byte integer")]
    MalformedVariableByteInteger,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid reason code: 0x{0:02X}")]
    InvalidReasonCode(u8),

    #[error("Invalid property ID: 0x{0:02X}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: 0x{0:02X}")]
    DuplicatePropertyId(u8),

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("String too long: {0} bytes exceeds maximum of 65535")]
    StringTooLong(usize),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Keep alive timeout")]
    KeepAliveTimeout,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ReasonCode),

    #[error("Connection closed by peer")]
    ConnectionClosedByPeer,

    #[error("Client closed connection")]
    ClientClosed,

    #[error("Packet ID exhausted")]
    PacketIdExhausted,

    #[error("Subscription failed: {0:?}")]
    SubscriptionFailed(ReasonCode),

    #[error("Publish failed: {0:?}")]
    PublishFailed(ReasonCode),

    #[error("Validation warning escalated: {0}")]
    EscalatedWarning(MqttWarning),
}

impl MqttError {
    /// True when the error is the expected result of an orderly
    /// shutdown rather than a genuine failure.
    #[must_use]
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            Self::ClientClosed | Self::ConnectionClosedByPeer => true,
            Self::Io(msg) => {
                msg.contains("Connection reset") || msg.contains("stream has been shut down")
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

impl From<MqttWarning> for MqttError {
    fn from(warning: MqttWarning) -> Self {
        MqttError::EscalatedWarning(warning)
    }
}

/// A normative "SHOULD"/"MUST" violation that still yields a
/// structurally encodable packet. Returned, never thrown; senders
/// escalate a warning to [`MqttError::EscalatedWarning`] before
/// putting the packet on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MqttWarning {
    #[error("string contains control character at index {index}")]
    ControlCharacterInString { index: usize },

    #[error("string contains private-use character at index {index}")]
    PrivateUseCharacterInString { index: usize },

    #[error("will QoS set without a will message")]
    WillQosWithoutWill,

    #[error("will retain set without a will message")]
    WillRetainWithoutWill,

    #[error("empty client identifier with clean start disabled")]
    EmptyClientIdWithoutCleanStart,

    #[error("wildcard character in topic name")]
    WildcardInTopicName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MqttError::InvalidTopicFilter("sport/tennis#".to_string());
        assert_eq!(err.to_string(), "Invalid topic filter: sport/tennis#");

        let err = MqttError::PacketTooLarge {
            size: 1000,
            max: 500,
        };
        assert_eq!(
            err.to_string(),
            "Packet too large: size 1000 exceeds maximum 500"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let mqtt_err: MqttError = io_err.into();
        match mqtt_err {
            MqttError::Io(msg) => assert!(msg.contains("refused")),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_warning_escalation() {
        let warning = MqttWarning::WillRetainWithoutWill;
        let err: MqttError = warning.into();
        assert!(matches!(
            err,
            MqttError::EscalatedWarning(MqttWarning::WillRetainWithoutWill)
        ));
    }

    #[test]
    fn test_normal_disconnect_classification() {
        assert!(MqttError::ClientClosed.is_normal_disconnect());
        assert!(MqttError::ConnectionClosedByPeer.is_normal_disconnect());
        assert!(!MqttError::Timeout.is_normal_disconnect());
        assert!(MqttError::Io("Connection reset by peer".into()).is_normal_disconnect());
    }
}
