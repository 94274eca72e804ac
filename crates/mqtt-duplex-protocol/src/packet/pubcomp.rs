use super::ack_common::{define_ack_packet, is_valid_pubrel_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// MQTT PUBCOMP packet (`QoS` 2 publish complete, step 3)
    pub struct PubCompPacket;
    packet_type = PacketType::PubComp;
    flags = 0x00;
    validator = is_valid_pubrel_reason_code;
    error_prefix = "PUBCOMP";
}
