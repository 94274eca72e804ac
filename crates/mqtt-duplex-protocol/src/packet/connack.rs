use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::ProtocolVersion;
use bytes::{Buf, BufMut};

/// 3.1.1 CONNACK return codes. Version 5 replaced these with reason
/// codes; both sides map through [`ReasonCode`] internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Accepted),
            1 => Some(Self::UnacceptableProtocolVersion),
            2 => Some(Self::IdentifierRejected),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadUsernameOrPassword),
            5 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_reason_code(self) -> ReasonCode {
        match self {
            Self::Accepted => ReasonCode::Success,
            Self::UnacceptableProtocolVersion => ReasonCode::UnsupportedProtocolVersion,
            Self::IdentifierRejected => ReasonCode::ClientIdentifierNotValid,
            Self::ServerUnavailable => ReasonCode::ServerUnavailable,
            Self::BadUsernameOrPassword => ReasonCode::BadUsernameOrPassword,
            Self::NotAuthorized => ReasonCode::NotAuthorized,
        }
    }

    #[must_use]
    pub fn from_reason_code(code: ReasonCode) -> Self {
        match code {
            ReasonCode::Success => Self::Accepted,
            ReasonCode::UnsupportedProtocolVersion => Self::UnacceptableProtocolVersion,
            ReasonCode::ClientIdentifierNotValid => Self::IdentifierRejected,
            ReasonCode::ServerUnavailable | ReasonCode::ServerBusy => Self::ServerUnavailable,
            ReasonCode::BadUsernameOrPassword => Self::BadUsernameOrPassword,
            _ => Self::NotAuthorized,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnAckPacket {
    pub protocol_version: ProtocolVersion,
    pub session_present: bool,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason_code: ReasonCode) -> Self {
        Self {
            protocol_version: ProtocolVersion::V5,
            session_present,
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn new_v311(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            protocol_version: ProtocolVersion::V311,
            session_present,
            reason_code: return_code.to_reason_code(),
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.reason_code.is_success()
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
                "CONNACK missing acknowledge flags or reason code".to_string(),
            ));
        }

        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "CONNACK reserved acknowledge flag bits set: 0x{ack_flags:02X}"
            )));
        }
        let session_present = ack_flags & 0x01 != 0;

        let code_byte = buf.get_u8();
        let (reason_code, properties) = if version.is_v5() {
            let reason_code =
                ReasonCode::from_u8(code_byte).ok_or(MqttError::InvalidReasonCode(code_byte))?;
            (reason_code, Properties::decode(buf)?)
        } else {
            let return_code = ConnectReturnCode::from_u8(code_byte).ok_or_else(|| {
                MqttError::MalformedPacket(format!("Invalid CONNACK return code: {code_byte}"))
            })?;
            (return_code.to_reason_code(), Properties::default())
        };

        Ok(Self {
            protocol_version: version,
            session_present,
            reason_code,
            properties,
        })
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        if self.protocol_version.is_v5() {
            buf.put_u8(self.reason_code.into());
            self.properties.encode(buf)?;
        } else {
            buf.put_u8(ConnectReturnCode::from_reason_code(self.reason_code) as u8);
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
    use crate::protocol::v5::properties::{PropertyId, PropertyValue};
    use bytes::BytesMut;

    #[test]
    fn test_connack_v5_round_trip() {
        let mut packet = ConnAckPacket::new(true, ReasonCode::Success);
        packet
            .properties
            .add(PropertyId::ServerKeepAlive, PropertyValue::TwoByteInteger(30))
            .unwrap();

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert!(decoded.session_present);
        assert!(decoded.is_success());
        assert_eq!(decoded.properties.server_keep_alive(), Some(30));
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_connack_v311_round_trip() {
        let packet = ConnAckPacket::new_v311(false, ConnectReturnCode::BadUsernameOrPassword);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        // Fixed header, ack flags, return code. Nothing else on 3.1.1.
        assert_eq!(&buf[..], &[0x20, 0x02, 0x00, 0x04]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            ConnAckPacket::decode_body_with_version(&mut buf, &fixed_header, ProtocolVersion::V311)
                .unwrap();
        assert!(!decoded.session_present);
        assert_eq!(decoded.reason_code, ReasonCode::BadUsernameOrPassword);
    }

    #[test]
    fn test_connack_reserved_ack_flags_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x02);
        buf.put_u8(0x00);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0, 2);
        assert!(ConnAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_connack_v311_invalid_return_code_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00);
        buf.put_u8(0x06);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0, 2);
        assert!(ConnAckPacket::decode_body_with_version(
            &mut buf,
            &fixed_header,
            ProtocolVersion::V311
        )
        .is_err());
    }

    #[test]
    fn test_return_code_reason_code_mapping() {
        assert_eq!(
            ConnectReturnCode::IdentifierRejected.to_reason_code(),
            ReasonCode::ClientIdentifierNotValid
        );
        assert_eq!(
            ConnectReturnCode::from_reason_code(ReasonCode::NotAuthorized),
            ConnectReturnCode::NotAuthorized
        );
        assert_eq!(
            ConnectReturnCode::from_reason_code(ReasonCode::Banned),
            ConnectReturnCode::NotAuthorized
        );
    }
}
