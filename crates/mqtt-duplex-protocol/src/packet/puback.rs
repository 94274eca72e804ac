use super::ack_common::{define_ack_packet, is_valid_publish_ack_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// MQTT PUBACK packet (`QoS` 1 publish acknowledgment)
    pub struct PubAckPacket;
    packet_type = PacketType::PubAck;
    flags = 0x00;
    validator = is_valid_publish_ack_reason_code;
    error_prefix = "PUBACK";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FixedHeader, MqttPacket};
    use crate::protocol::v5::properties::PropertyId;
    use crate::protocol::v5::reason_codes::ReasonCode;
    use crate::types::ProtocolVersion;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_puback_basic() {
        let packet = PubAckPacket::new(123);

        assert_eq!(packet.packet_id, 123);
        assert_eq!(packet.reason_code, ReasonCode::Success);
        assert!(packet.properties.is_empty());
    }

    #[test]
    fn test_puback_success_encodes_abridged() {
        let packet = PubAckPacket::new(789);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        // Success with no properties is the 2-byte body form.
        assert_eq!(&buf[..], &[0x40, 0x02, 0x03, 0x15]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.packet_type, PacketType::PubAck);

        let decoded = PubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 789);
        assert_eq!(decoded.reason_code, ReasonCode::Success);
    }

    #[test]
    fn test_puback_encode_decode_with_reason() {
        let packet = PubAckPacket::new_with_reason(999, ReasonCode::QuotaExceeded)
            .with_user_property("quota".to_string(), "exceeded".to_string());

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = PubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();

        assert_eq!(decoded.packet_id, 999);
        assert_eq!(decoded.reason_code, ReasonCode::QuotaExceeded);
        assert!(decoded.properties.contains(PropertyId::UserProperty));
    }

    #[test]
    fn test_puback_v311_style() {
        let mut buf = BytesMut::new();
        buf.put_u16(1234);

        let fixed_header = FixedHeader::new(PacketType::PubAck, 0, 2);
        let decoded =
            PubAckPacket::decode_body_with_version(&mut buf, &fixed_header, ProtocolVersion::V311)
                .unwrap();

        assert_eq!(decoded.packet_id, 1234);
        assert_eq!(decoded.reason_code, ReasonCode::Success);
        assert!(decoded.properties.is_empty());
    }

    #[test]
    fn test_puback_invalid_reason_code() {
        let mut buf = BytesMut::new();
        buf.put_u16(123);
        buf.put_u8(0xFF);

        let fixed_header = FixedHeader::new(PacketType::PubAck, 0, 3);
        let result = PubAckPacket::decode_body(&mut buf, &fixed_header);
        assert!(result.is_err());
    }

    #[test]
    fn test_puback_pubrel_only_reason_code_rejected() {
        // PacketIdentifierNotFound is a PUBREL/PUBCOMP code, not PUBACK.
        let mut buf = BytesMut::new();
        buf.put_u16(123);
        buf.put_u8(0x92);

        let fixed_header = FixedHeader::new(PacketType::PubAck, 0, 3);
        assert!(PubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_puback_zero_packet_id_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);

        let fixed_header = FixedHeader::new(PacketType::PubAck, 0, 2);
        assert!(PubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_puback_missing_packet_id() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);

        let fixed_header = FixedHeader::new(PacketType::PubAck, 0, 1);
        let result = PubAckPacket::decode_body(&mut buf, &fixed_header);
        assert!(result.is_err());
    }
}
