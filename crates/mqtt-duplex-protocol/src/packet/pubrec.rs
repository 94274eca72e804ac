use super::ack_common::{define_ack_packet, is_valid_publish_ack_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// MQTT PUBREC packet (`QoS` 2 publish received, step 1)
    pub struct PubRecPacket;
    packet_type = PacketType::PubRec;
    flags = 0x00;
    validator = is_valid_publish_ack_reason_code;
    error_prefix = "PUBREC";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FixedHeader, MqttPacket};
    use crate::protocol::v5::reason_codes::ReasonCode;
    use bytes::BytesMut;

    #[test]
    fn test_pubrec_round_trip_with_error_reason() {
        let packet = PubRecPacket::new_with_reason(55, ReasonCode::NotAuthorized);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.packet_type, PacketType::PubRec);
        assert_eq!(fixed_header.flags, 0x00);

        let decoded = PubRecPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 55);
        assert_eq!(decoded.reason_code, ReasonCode::NotAuthorized);
        assert!(decoded.reason_code.is_error());
    }
}
