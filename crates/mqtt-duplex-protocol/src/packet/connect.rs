use crate::encoding::{
    decode_binary, decode_string, encode_binary, encode_string, string_warning,
};
use crate::error::{MqttError, MqttWarning, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::{ConnectOptions, ProtocolVersion, QoS, WillMessage};
use bytes::{Buf, BufMut};

const PROTOCOL_NAME: &str = "MQTT";

/// Connect flags byte layout.
const FLAG_RESERVED: u8 = 0x01;
const FLAG_CLEAN_START: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_QOS_SHIFT: u8 = 3;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct ConnectPacket {
    pub protocol_version: ProtocolVersion,
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<WillMessage>,
    pub properties: Properties,
}

impl ConnectPacket {
    #[must_use]
    pub fn from_options(options: &ConnectOptions) -> Self {
        Self {
            protocol_version: options.protocol_version,
            client_id: options.client_id.clone(),
            keep_alive: options.keep_alive_secs(),
            clean_start: options.clean_start,
            username: options.username.clone(),
            password: options.password.clone(),
            will: options.will.clone(),
            properties: options.properties.clone(),
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_start {
            flags |= FLAG_CLEAN_START;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL;
            flags |= (will.qos as u8) << FLAG_WILL_QOS_SHIFT;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }

    /// Normative SHOULD violations that still encode. Callers decide
    /// whether to escalate.
    #[must_use]
    pub fn warnings(&self) -> Vec<MqttWarning> {
        let mut warnings = Vec::new();
        if self.client_id.is_empty() && !self.clean_start {
            warnings.push(MqttWarning::EmptyClientIdWithoutCleanStart);
        }
        if let Some(warning) = string_warning(&self.client_id) {
            warnings.push(warning);
        }
        warnings
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(self.protocol_version.as_u8());
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        encode_string(buf, &self.client_id)?;

        if let Some(will) = &self.will {
            if self.protocol_version.is_v5() {
                will.properties.encode(buf)?;
            }
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }

        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid protocol name: {protocol_name:?}"
            )));
        }

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing protocol level".to_string(),
            ));
        }
        let protocol_version = ProtocolVersion::try_from(buf.get_u8())?;

        if buf.remaining() < 3 {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing connect flags or keep alive".to_string(),
            ));
        }
        let flags = buf.get_u8();
        if flags & FLAG_RESERVED != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag bit must be 0".to_string(),
            ));
        }

        let clean_start = flags & FLAG_CLEAN_START != 0;
        let will_flag = flags & FLAG_WILL != 0;
        let will_qos_bits = (flags >> FLAG_WILL_QOS_SHIFT) & 0x03;
        let will_retain = flags & FLAG_WILL_RETAIN != 0;
        let has_password = flags & FLAG_PASSWORD != 0;
        let has_username = flags & FLAG_USERNAME != 0;

        if !will_flag && (will_qos_bits != 0 || will_retain) {
            return Err(MqttError::MalformedPacket(
                "CONNECT will QoS/retain set without will flag".to_string(),
            ));
        }
        let will_qos = QoS::try_from_bits(will_qos_bits)?;

        // 3.1.1 ties the password flag to the username flag.
        if !protocol_version.is_v5() && has_password && !has_username {
            return Err(MqttError::MalformedPacket(
                "CONNECT password flag set without username flag".to_string(),
            ));
        }

        let keep_alive = buf.get_u16();

        let properties = if protocol_version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        let client_id = decode_string(buf)?;

        let will = if will_flag {
            let will_properties = if protocol_version.is_v5() {
                Properties::decode(buf)?
            } else {
                Properties::default()
            };
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            Some(WillMessage {
                topic,
                payload,
                qos: will_qos,
                retain: will_retain,
                properties: will_properties,
            })
        } else {
            None
        };

        let username = if has_username {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if has_password {
            Some(decode_binary(buf)?)
        } else {
            None
        };

        Ok(Self {
            protocol_version,
            client_id,
            keep_alive,
            clean_start,
            username,
            password,
            will,
            properties,
        })
    }
}
