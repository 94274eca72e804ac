use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, MqttWarning, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::{Message, ProtocolVersion, QoS};
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishPacket {
    pub protocol_version: ProtocolVersion,
    pub topic: String,
    /// Present exactly when `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub payload: Vec<u8>,
    pub properties: Properties,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol_version: ProtocolVersion::V5,
            topic: topic.into(),
            packet_id: None,
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            payload: payload.into(),
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn from_message(message: &Message, version: ProtocolVersion) -> Self {
        Self {
            protocol_version: version,
            topic: message.topic.clone(),
            packet_id: None,
            qos: message.qos,
            retain: message.retain,
            dup: message.dup,
            payload: message.payload.clone(),
            properties: message.properties.clone(),
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message {
        Message {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            qos: self.qos,
            retain: self.retain,
            dup: self.dup,
            properties: self.properties.clone(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS, packet_id: u16) -> Self {
        self.qos = qos;
        self.packet_id = (qos != QoS::AtMostOnce).then_some(packet_id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Retransmission copy: dup flag raised, everything else intact.
    #[must_use]
    pub fn as_duplicate(&self) -> Self {
        let mut packet = self.clone();
        packet.dup = true;
        packet
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<MqttWarning> {
        let mut warnings = Vec::new();
        if self.topic.contains(['+', '#']) {
            warnings.push(MqttWarning::WildcardInTopicName);
        }
        warnings
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.retain {
            flags |= 0x01;
        }
        flags
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic)?;

        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, None) => {}
            (QoS::AtMostOnce, Some(_)) => {
                return Err(MqttError::ProtocolError(
                    "QoS 0 PUBLISH must not carry a packet identifier".to_string(),
                ));
            }
            (_, Some(packet_id)) if packet_id != 0 => buf.put_u16(packet_id),
            (_, _) => {
                return Err(MqttError::ProtocolError(
                    "QoS 1/2 PUBLISH requires a non-zero packet identifier".to_string(),
                ));
            }
        }

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}

impl PublishPacket {
    /// # Errors
    /// Returns an error if decoding fails.
    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        let dup = fixed_header.flags & 0x08 != 0;
        let qos = QoS::try_from_bits((fixed_header.flags >> 1) & 0x03)?;
        let retain = fixed_header.flags & 0x01 != 0;

        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::MalformedPacket(
                "PUBLISH dup flag set on a QoS 0 message".to_string(),
            ));
        }

        let topic = decode_string(buf)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            let id = buf.get_u16();
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH packet identifier must be non-zero".to_string(),
                ));
            }
            Some(id)
        };

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        // Whatever is left of the body is the payload.
        let payload = buf.copy_to_bytes(buf.remaining()).to_vec();

        Ok(Self {
            protocol_version: version,
            topic,
            packet_id,
            qos,
            retain,
            dup,
            payload,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(packet: &PublishPacket, version: ProtocolVersion) -> PublishPacket {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        PublishPacket::decode_body_with_version(&mut buf, &fixed_header, version).unwrap()
    }

    #[test]
    fn test_publish_qos0_round_trip() {
        let packet = PublishPacket::new("sensors/temp", b"21.5".to_vec()).with_retain(true);
        let decoded = round_trip(&packet, ProtocolVersion::V5);

        assert_eq!(decoded.topic, "sensors/temp");
        assert_eq!(decoded.payload, b"21.5");
        assert_eq!(decoded.qos, QoS::AtMostOnce);
        assert_eq!(decoded.packet_id, None);
        assert!(decoded.retain);
        assert!(!decoded.dup);
    }

    #[test]
    fn test_publish_qos2_round_trip_v311() {
        let mut packet =
            PublishPacket::new("a/b", b"payload".to_vec()).with_qos(QoS::ExactlyOnce, 42);
        packet.protocol_version = ProtocolVersion::V311;
        let decoded = round_trip(&packet, ProtocolVersion::V311);

        assert_eq!(decoded.qos, QoS::ExactlyOnce);
        assert_eq!(decoded.packet_id, Some(42));
        assert_eq!(decoded.payload, b"payload");
        assert!(decoded.properties.is_empty());
    }

    #[test]
    fn test_publish_empty_payload_round_trip() {
        let packet = PublishPacket::new("retain/clear", Vec::new());
        let decoded = round_trip(&packet, ProtocolVersion::V5);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_publish_qos_bits_11_rejected() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "a").unwrap();
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x06, 3);
        let err =
            PublishPacket::decode_body(&mut buf, &fixed_header).unwrap_err();
        assert!(matches!(err, MqttError::InvalidQoS(3)));
    }

    #[test]
    fn test_publish_dup_on_qos0_rejected() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "a").unwrap();
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x08, 3);
        assert!(PublishPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_publish_zero_packet_id_rejected() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "a").unwrap();
        buf.put_u16(0);
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x02, 5);
        assert!(PublishPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_publish_qos1_without_packet_id_fails_encode() {
        let mut packet = PublishPacket::new("a", Vec::new());
        packet.qos = QoS::AtLeastOnce;
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn test_as_duplicate_sets_dup_only() {
        let packet = PublishPacket::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce, 7);
        let dup = packet.as_duplicate();
        assert!(dup.dup);
        assert_eq!(dup.packet_id, Some(7));
        assert_eq!(dup.payload, packet.payload);
    }

    #[test]
    fn test_wildcard_topic_warns() {
        let packet = PublishPacket::new("a/+/b", Vec::new());
        assert_eq!(packet.warnings(), vec![MqttWarning::WildcardInTopicName]);
    }
}
