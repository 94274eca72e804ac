//! Control packet model: the fixed header shared by all fifteen packet
//! types, the [`MqttPacket`] encode/decode trait, and the closed
//! [`Packet`] enum the rest of the crate passes around.

use crate::encoding::{decode_variable_int, encode_variable_int, MAX_VARIABLE_INT};
use crate::error::{MqttError, Result};
use crate::types::ProtocolVersion;
use bytes::{Buf, BufMut, BytesMut};

mod ack_common;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod subscribe_options;
pub mod unsuback;
pub mod unsubscribe;

pub use auth::AuthPacket;
pub use connack::{ConnAckPacket, ConnectReturnCode};
pub use connect::ConnectPacket;
pub use disconnect::DisconnectPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribePacket, TopicFilter};
pub use subscribe_options::{RetainHandling, SubscriptionOptions};
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    /// Fixed flags bits 3-0 mandated by the protocol, or `None` when
    /// the flags carry per-packet state (PUBLISH).
    #[must_use]
    pub fn required_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            15 => Ok(Self::Auth),
            other => Err(MqttError::InvalidPacketType(other)),
        }
    }
}

/// First byte plus the variable-byte-integer remaining length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        encode_variable_int(buf, self.remaining_length)
    }

    /// Decodes a fixed header from a buffer that already holds the
    /// complete header bytes. Streaming readers assemble the header
    /// incrementally instead.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Missing fixed header".to_string(),
            ));
        }
        let first = buf.get_u8();
        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0F;
        let remaining_length = decode_variable_int(buf)?;

        let header = Self::new(packet_type, flags, remaining_length);
        header.validate_flags()?;
        Ok(header)
    }

    /// Reserved flag bits must match exactly; a violation is a
    /// malformed packet, not something to silently mask off.
    pub fn validate_flags(&self) -> Result<()> {
        if let Some(required) = self.packet_type.required_flags() {
            if self.flags != required {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid {:?} flags: expected 0x{required:02X}, got 0x{:02X}",
                    self.packet_type, self.flags
                )));
            }
        }
        Ok(())
    }
}

/// Shared encode/decode shape for every control packet.
///
/// `encode_body` writes the variable header and payload only; the
/// default `encode` buffers the body to learn its length, then emits
/// the fixed header in front of it.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        0
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        if body.len() > MAX_VARIABLE_INT as usize {
            return Err(MqttError::PacketTooLarge {
                size: body.len(),
                max: MAX_VARIABLE_INT as usize,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let header = FixedHeader::new(self.packet_type(), self.flags(), body.len() as u32);
        header.encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// Any complete MQTT control packet.
#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
        }
    }

    /// The packet identifier, for the packet types that carry one.
    #[must_use]
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PubAck(p) => Some(p.packet_id),
            Packet::PubRec(p) => Some(p.packet_id),
            Packet::PubRel(p) => Some(p.packet_id),
            Packet::PubComp(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode(buf),
            Packet::PubRec(p) => p.encode(buf),
            Packet::PubRel(p) => p.encode(buf),
            Packet::PubComp(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::UnsubAck(p) => p.encode(buf),
            Packet::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Packet::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Packet::Disconnect(p) => p.encode(buf),
            Packet::Auth(p) => p.encode(buf),
        }
    }

    /// Decodes one complete packet. The buffer must contain at least
    /// the full frame; the frame's bytes are consumed exactly.
    pub fn decode<B: Buf>(buf: &mut B, version: ProtocolVersion) -> Result<Self> {
        let fixed_header = FixedHeader::decode(buf)?;
        let body_len = fixed_header.remaining_length as usize;
        if buf.remaining() < body_len {
            return Err(MqttError::MalformedPacket(format!(
                "Truncated {:?}: declared {body_len} body bytes, got {}",
                fixed_header.packet_type,
                buf.remaining()
            )));
        }

        let mut body = buf.copy_to_bytes(body_len);
        let packet = Self::decode_body(&mut body, &fixed_header, version)?;

        if body.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{:?} body has {} trailing bytes",
                fixed_header.packet_type,
                body.remaining()
            )));
        }
        Ok(packet)
    }

    /// Decodes a packet body whose fixed header has already been
    /// consumed. `buf` must hold exactly the remaining-length bytes.
    pub fn decode_body<B: Buf>(
        buf: &mut B,
        fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        fixed_header.validate_flags()?;

        match fixed_header.packet_type {
            PacketType::Connect => Ok(Packet::Connect(Box::new(ConnectPacket::decode_body(
                buf,
                fixed_header,
            )?))),
            PacketType::ConnAck => Ok(Packet::ConnAck(ConnAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::Publish => Ok(Packet::Publish(PublishPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PubAck => Ok(Packet::PubAck(PubAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PubRec => Ok(Packet::PubRec(PubRecPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PubRel => Ok(Packet::PubRel(PubRelPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PubComp => Ok(Packet::PubComp(PubCompPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::Subscribe => Ok(Packet::Subscribe(
                SubscribePacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
            PacketType::SubAck => Ok(Packet::SubAck(SubAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::Unsubscribe => Ok(Packet::Unsubscribe(
                UnsubscribePacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
            PacketType::UnsubAck => Ok(Packet::UnsubAck(UnsubAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PingReq => {
                Self::expect_empty_body(fixed_header)?;
                Ok(Packet::PingReq)
            }
            PacketType::PingResp => {
                Self::expect_empty_body(fixed_header)?;
                Ok(Packet::PingResp)
            }
            PacketType::Disconnect => Ok(Packet::Disconnect(
                DisconnectPacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
            PacketType::Auth => {
                if !version.is_v5() {
                    return Err(MqttError::ProtocolError(
                        "AUTH packet is not valid in protocol version 3.1.1".to_string(),
                    ));
                }
                Ok(Packet::Auth(AuthPacket::decode_body(buf, fixed_header)?))
            }
        }
    }

    fn expect_empty_body(fixed_header: &FixedHeader) -> Result<()> {
        if fixed_header.remaining_length != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "{:?} must have an empty body, got {} bytes",
                fixed_header.packet_type, fixed_header.remaining_length
            )));
        }
        Ok(())
    }
}
