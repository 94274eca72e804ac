use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::ProtocolVersion;
use bytes::{Buf, BufMut};

fn is_valid_disconnect_reason_code(code: ReasonCode) -> bool {
    matches!(code, ReasonCode::Success | ReasonCode::DisconnectWithWillMessage) || code.is_error()
}

/// On 3.1.1 DISCONNECT is always an empty body; the version 5 form may
/// carry a reason code and properties, with an empty body meaning
/// normal disconnection.
#[derive(Debug, Clone)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl DisconnectPacket {
    #[must_use]
    pub fn normal() -> Self {
        Self {
            reason_code: ReasonCode::Success,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn with_reason(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// # Errors
    /// Returns an error if decoding fails.
    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if !version.is_v5() {
            if buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "DISCONNECT must have an empty body on protocol version 3.1.1".to_string(),
                ));
            }
            return Ok(Self {
                reason_code: ReasonCode::Success,
                properties: Properties::default(),
                protocol_version: version,
            });
        }

        let mut reason_code = ReasonCode::Success;
        let mut properties = Properties::default();

        if buf.has_remaining() {
            let code_byte = buf.get_u8();
            reason_code = ReasonCode::from_u8(code_byte)
                .filter(|code| is_valid_disconnect_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Invalid DISCONNECT reason code: 0x{code_byte:02X}"
                    ))
                })?;

            if buf.has_remaining() {
                properties = Properties::decode(buf)?;
            }
        }

        Ok(Self {
            reason_code,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.protocol_version.is_v5()
            && (self.reason_code != ReasonCode::Success || !self.properties.is_empty())
        {
            buf.put_u8(self.reason_code.into());
            if !self.properties.is_empty() {
                self.properties.encode(buf)?;
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
    fn test_disconnect_normal_is_empty_body() {
        let packet = DisconnectPacket::normal();

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xE0, 0x00]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = DisconnectPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::Success);
    }

    #[test]
    fn test_disconnect_with_reason_round_trip() {
        let packet = DisconnectPacket::with_reason(ReasonCode::KeepAliveTimeout);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = DisconnectPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::KeepAliveTimeout);
    }

    #[test]
    fn test_disconnect_v311_nonempty_body_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00);
        let fixed_header = FixedHeader::new(PacketType::Disconnect, 0, 1);
        assert!(DisconnectPacket::decode_body_with_version(
            &mut buf,
            &fixed_header,
            ProtocolVersion::V311
        )
        .is_err());
    }

    #[test]
    fn test_disconnect_granted_qos_code_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x01);
        let fixed_header = FixedHeader::new(PacketType::Disconnect, 0, 1);
        assert!(DisconnectPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
