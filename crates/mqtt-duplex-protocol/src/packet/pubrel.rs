use super::ack_common::{define_ack_packet, is_valid_pubrel_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// MQTT PUBREL packet (`QoS` 2 publish release, step 2).
    /// The fixed header flags are mandated to be 0x02.
    pub struct PubRelPacket;
    packet_type = PacketType::PubRel;
    flags = 0x02;
    validator = is_valid_pubrel_reason_code;
    error_prefix = "PUBREL";
}
