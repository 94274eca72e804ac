use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::ProtocolVersion;
use bytes::{Buf, BufMut};

fn is_valid_unsuback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoSubscriptionExisted
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
    )
}

/// One reason code per filter on version 5; a bare packet id on 3.1.1.
#[derive(Debug, Clone)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<ReasonCode>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl UnsubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
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
                "UNSUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();

        if !version.is_v5() {
            return Ok(Self {
                packet_id,
                reason_codes: Vec::new(),
                properties: Properties::default(),
                protocol_version: version,
            });
        }

        let properties = Properties::decode(buf)?;

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK must contain at least one reason code".to_string(),
            ));
        }

        let mut reason_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            let code_byte = buf.get_u8();
            let code = ReasonCode::from_u8(code_byte)
                .filter(|code| is_valid_unsuback_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Invalid UNSUBACK reason code: 0x{code_byte:02X}"
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

impl MqttPacket for UnsubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
            if self.reason_codes.is_empty() {
                return Err(MqttError::MalformedPacket(
                    "UNSUBACK must contain at least one reason code".to_string(),
                ));
            }
            for code in &self.reason_codes {
                buf.put_u8((*code).into());
            }
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
    fn test_unsuback_round_trip() {
        let packet = UnsubAckPacket::new(
            64,
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
        );

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = UnsubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 64);
        assert_eq!(
            decoded.reason_codes,
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted]
        );
    }

    #[test]
    fn test_unsuback_v311_is_bare_packet_id() {
        let mut packet = UnsubAckPacket::new(8, Vec::new());
        packet.protocol_version = ProtocolVersion::V311;

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xB0, 0x02, 0x00, 0x08]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            UnsubAckPacket::decode_body_with_version(&mut buf, &fixed_header, ProtocolVersion::V311)
                .unwrap();
        assert_eq!(decoded.packet_id, 8);
        assert!(decoded.reason_codes.is_empty());
    }
}
