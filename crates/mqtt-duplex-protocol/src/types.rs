use crate::error::MqttError;
use crate::protocol::v5::properties::Properties;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V311,
    #[default]
    V5,
}

impl ProtocolVersion {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            ProtocolVersion::V311 => 4,
            ProtocolVersion::V5 => 5,
        }
    }

    #[must_use]
    pub fn is_v5(self) -> bool {
        matches!(self, ProtocolVersion::V5)
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        version.as_u8()
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self, MqttError> {
        match value {
            4 => Ok(ProtocolVersion::V311),
            5 => Ok(ProtocolVersion::V5),
            _ => Err(MqttError::UnsupportedProtocolVersion),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Strict conversion for decode paths, where 0b11 is malformed.
    pub fn try_from_bits(value: u8) -> Result<Self, MqttError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

#[derive(Debug, Clone)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    /// Will properties (protocol version 5 only).
    pub properties: Properties,
}

impl WillMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Everything needed to build a CONNECT packet for either protocol
/// version.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<WillMessage>,
    /// CONNECT properties (protocol version 5 only).
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new("")
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            clean_start: true,
            username: None,
            password: None,
            will: None,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    #[must_use]
    pub fn with_clean_start(mut self, clean: bool) -> Self {
        self.clean_start = clean;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl AsRef<[u8]>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn keep_alive_secs(&self) -> u16 {
        self.keep_alive.as_secs().min(u64::from(u16::MAX)) as u16
    }
}

/// An application message delivered to (or published by) the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_conversions() {
        assert_eq!(ProtocolVersion::V311.as_u8(), 4);
        assert_eq!(ProtocolVersion::V5.as_u8(), 5);
        assert_eq!(ProtocolVersion::try_from(4).unwrap(), ProtocolVersion::V311);
        assert!(ProtocolVersion::try_from(3).is_err());
    }

    #[test]
    fn test_qos_strict_bits() {
        assert_eq!(QoS::try_from_bits(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(QoS::try_from_bits(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(QoS::try_from_bits(3), Err(MqttError::InvalidQoS(3))));
    }

    #[test]
    fn test_message_builder() {
        let message = Message::new("a/b", b"x".to_vec())
            .with_qos(QoS::ExactlyOnce)
            .with_retain(true);
        assert_eq!(message.qos, QoS::ExactlyOnce);
        assert!(message.retain);
        assert!(!message.dup);
    }

    #[test]
    fn test_connect_options_builder() {
        let options = ConnectOptions::new("device-42")
            .with_protocol_version(ProtocolVersion::V311)
            .with_keep_alive(Duration::from_secs(30))
            .with_clean_start(false)
            .with_credentials("user", b"pass");

        assert_eq!(options.client_id, "device-42");
        assert_eq!(options.keep_alive_secs(), 30);
        assert!(!options.clean_start);
        assert_eq!(options.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_keep_alive_secs_saturates() {
        let options = ConnectOptions::new("c").with_keep_alive(Duration::from_secs(100_000));
        assert_eq!(options.keep_alive_secs(), u16::MAX);
    }
}
