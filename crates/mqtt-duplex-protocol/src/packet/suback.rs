use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::{ProtocolVersion, QoS};
use bytes::{Buf, BufMut};

fn is_valid_suback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::GrantedQoS1
            | ReasonCode::GrantedQoS2
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::SharedSubscriptionsNotSupported
            | ReasonCode::SubscriptionIdentifiersNotSupported
            | ReasonCode::WildcardSubscriptionsNotSupported
    )
}

/// One reason code per filter in the matching SUBSCRIBE, in order.
#[derive(Debug, Clone)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<ReasonCode>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    /// The `QoS` granted for the filter at `index`, or `None` when the
    /// subscription was rejected.
    #[must_use]
    pub fn granted_qos(&self, index: usize) -> Option<QoS> {
        match self.reason_codes.get(index)? {
            ReasonCode::Success => Some(QoS::AtMostOnce),
            ReasonCode::GrantedQoS1 => Some(QoS::AtLeastOnce),
            ReasonCode::GrantedQoS2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    #[must_use]
    pub fn all_granted(&self) -> bool {
        !self.reason_codes.is_empty() && self.reason_codes.iter().all(ReasonCode::is_success)
    }

    /// # Errors
    /// Returns an error if decoding fails.
    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one reason code".to_string(),
            ));
        }

        let mut reason_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            let code_byte = buf.get_u8();
            let code = ReasonCode::from_u8(code_byte)
                .filter(|code| is_valid_suback_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Invalid SUBACK reason code: 0x{code_byte:02X}"
                    ))
                })?;
            reason_codes.push(code);
        }

        Ok(Self {
            packet_id,
            reason_codes,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        if self.reason_codes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one reason code".to_string(),
            ));
        }
        for code in &self.reason_codes {
            buf.put_u8((*code).into());
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_suback_round_trip() {
        let packet = SubAckPacket::new(
            31,
            vec![
                ReasonCode::GrantedQoS1,
                ReasonCode::Success,
                ReasonCode::NotAuthorized,
            ],
        );

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = SubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 31);
        assert_eq!(decoded.reason_codes.len(), 3);
        assert_eq!(decoded.granted_qos(0), Some(QoS::AtLeastOnce));
        assert_eq!(decoded.granted_qos(1), Some(QoS::AtMostOnce));
        assert_eq!(decoded.granted_qos(2), None);
        assert!(!decoded.all_granted());
    }

    #[test]
    fn test_suback_v311_failure_code() {
        // 3.1.1 SUBACK: packet id then raw return codes, 0x80 = failure.
        let mut buf = BytesMut::new();
        buf.put_u16(9);
        buf.put_u8(0x02);
        buf.put_u8(0x80);

        let fixed_header = FixedHeader::new(PacketType::SubAck, 0, 4);
        let decoded =
            SubAckPacket::decode_body_with_version(&mut buf, &fixed_header, ProtocolVersion::V311)
                .unwrap();
        assert_eq!(decoded.granted_qos(0), Some(QoS::ExactlyOnce));
        assert_eq!(decoded.reason_codes[1], ReasonCode::UnspecifiedError);
    }

    #[test]
    fn test_suback_empty_reason_codes_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(9);
        buf.put_u8(0x00); // empty properties

        let fixed_header = FixedHeader::new(PacketType::SubAck, 0, 3);
        assert!(SubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_suback_invalid_reason_code_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(9);
        buf.put_u8(0x00);
        buf.put_u8(0x11); // NoSubscriptionExisted is UNSUBACK-only

        let fixed_header = FixedHeader::new(PacketType::SubAck, 0, 4);
        assert!(SubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
