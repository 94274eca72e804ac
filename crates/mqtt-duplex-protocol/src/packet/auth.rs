use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use bytes::{Buf, BufMut};

fn is_valid_auth_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success | ReasonCode::ContinueAuthentication | ReasonCode::ReAuthenticate
    )
}

/// Extended authentication exchange, protocol version 5 only.
#[derive(Debug, Clone)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }
}

impl MqttPacket for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
            buf.put_u8(self.reason_code.into());
            if !self.properties.is_empty() {
                self.properties.encode(buf)?;
            }
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let mut reason_code = ReasonCode::Success;
        let mut properties = Properties::default();

        if buf.has_remaining() {
            let code_byte = buf.get_u8();
            reason_code = ReasonCode::from_u8(code_byte)
                .filter(|code| is_valid_auth_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Invalid AUTH reason code: 0x{code_byte:02X}"
                    ))
                })?;

            if buf.has_remaining() {
                properties = Properties::decode(buf)?;
            }
        }

        Ok(Self {
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::v5::properties::{PropertyId, PropertyValue};
    use bytes::BytesMut;

    #[test]
    fn test_auth_round_trip() {
        let mut packet = AuthPacket::new(ReasonCode::ContinueAuthentication);
        packet
            .properties
            .add(
                PropertyId::AuthenticationMethod,
                PropertyValue::Utf8String("SCRAM-SHA-256".to_string()),
            )
            .unwrap();

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = AuthPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::ContinueAuthentication);
        assert!(decoded.properties.contains(PropertyId::AuthenticationMethod));
    }

    #[test]
    fn test_auth_empty_body_is_success() {
        let mut buf = BytesMut::new();
        let fixed_header = FixedHeader::new(PacketType::Auth, 0, 0);
        let decoded = AuthPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::Success);
    }

    #[test]
    fn test_auth_invalid_reason_code_rejected() {
        use bytes::BufMut;
        let mut buf = BytesMut::new();
        buf.put_u8(0x80);
        let fixed_header = FixedHeader::new(PacketType::Auth, 0, 1);
        assert!(AuthPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
