//! MQTT 5.0 properties: a variable-byte-integer length prefix followed
//! by repeated (identifier, typed value) entries. Protocol version 4
//! packets carry no properties block at all.

use crate::encoding::{
    binary_len, decode_binary, decode_string, decode_variable_int, encode_binary, encode_string,
    encode_variable_int, string_len, variable_int_len,
};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PropertyId {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0B,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValueType {
    Byte,
    TwoByteInteger,
    FourByteInteger,
    VariableByteInteger,
    BinaryData,
    Utf8String,
    Utf8StringPair,
}

impl PropertyId {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PayloadFormatIndicator),
            0x02 => Some(Self::MessageExpiryInterval),
            0x03 => Some(Self::ContentType),
            0x08 => Some(Self::ResponseTopic),
            0x09 => Some(Self::CorrelationData),
            0x0B => Some(Self::SubscriptionIdentifier),
            0x11 => Some(Self::SessionExpiryInterval),
            0x12 => Some(Self::AssignedClientIdentifier),
            0x13 => Some(Self::ServerKeepAlive),
            0x15 => Some(Self::AuthenticationMethod),
            0x16 => Some(Self::AuthenticationData),
            0x17 => Some(Self::RequestProblemInformation),
            0x18 => Some(Self::WillDelayInterval),
            0x19 => Some(Self::RequestResponseInformation),
            0x1A => Some(Self::ResponseInformation),
            0x1C => Some(Self::ServerReference),
            0x1F => Some(Self::ReasonString),
            0x21 => Some(Self::ReceiveMaximum),
            0x22 => Some(Self::TopicAliasMaximum),
            0x23 => Some(Self::TopicAlias),
            0x24 => Some(Self::MaximumQoS),
            0x25 => Some(Self::RetainAvailable),
            0x26 => Some(Self::UserProperty),
            0x27 => Some(Self::MaximumPacketSize),
            0x28 => Some(Self::WildcardSubscriptionAvailable),
            0x29 => Some(Self::SubscriptionIdentifierAvailable),
            0x2A => Some(Self::SharedSubscriptionAvailable),
            _ => None,
        }
    }

    #[must_use]
    pub fn value_type(self) -> PropertyValueType {
        match self {
            Self::PayloadFormatIndicator
            | Self::RequestProblemInformation
            | Self::RequestResponseInformation
            | Self::MaximumQoS
            | Self::RetainAvailable
            | Self::WildcardSubscriptionAvailable
            | Self::SubscriptionIdentifierAvailable
            | Self::SharedSubscriptionAvailable => PropertyValueType::Byte,
            Self::ServerKeepAlive
            | Self::ReceiveMaximum
            | Self::TopicAliasMaximum
            | Self::TopicAlias => PropertyValueType::TwoByteInteger,
            Self::MessageExpiryInterval
            | Self::SessionExpiryInterval
            | Self::WillDelayInterval
            | Self::MaximumPacketSize => PropertyValueType::FourByteInteger,
            Self::SubscriptionIdentifier => PropertyValueType::VariableByteInteger,
            Self::CorrelationData | Self::AuthenticationData => PropertyValueType::BinaryData,
            Self::ContentType
            | Self::ResponseTopic
            | Self::AssignedClientIdentifier
            | Self::AuthenticationMethod
            | Self::ResponseInformation
            | Self::ServerReference
            | Self::ReasonString => PropertyValueType::Utf8String,
            Self::UserProperty => PropertyValueType::Utf8StringPair,
        }
    }

    /// Only user properties (and subscription identifiers on PUBLISH)
    /// may appear more than once.
    #[must_use]
    pub fn allows_multiple(self) -> bool {
        matches!(self, Self::UserProperty | Self::SubscriptionIdentifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInteger(u16),
    FourByteInteger(u32),
    VariableByteInteger(u32),
    BinaryData(Vec<u8>),
    Utf8String(String),
    Utf8StringPair(String, String),
}

/// An ordered collection of v5 properties. Order is preserved so a
/// decoded packet re-encodes byte-identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(PropertyId, PropertyValue)>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: PropertyId, value: PropertyValue) -> Result<()> {
        if !id.allows_multiple() && self.contains(id) {
            return Err(MqttError::DuplicatePropertyId(id as u8));
        }
        self.entries.push((id, value));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PropertyId, PropertyValue)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn add_user_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((
            PropertyId::UserProperty,
            PropertyValue::Utf8StringPair(key.into(), value.into()),
        ));
    }

    #[must_use]
    pub fn user_properties(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(id, value)| match (id, value) {
                (PropertyId::UserProperty, PropertyValue::Utf8StringPair(k, v)) => {
                    Some((k.as_str(), v.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        match self.get(PropertyId::SessionExpiryInterval) {
            Some(PropertyValue::FourByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        match self.get(PropertyId::ServerKeepAlive) {
            Some(PropertyValue::TwoByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        match self.get(PropertyId::ReceiveMaximum) {
            Some(PropertyValue::TwoByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        match self.get(PropertyId::AssignedClientIdentifier) {
            Some(PropertyValue::Utf8String(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn reason_string(&self) -> Option<&str> {
        match self.get(PropertyId::ReasonString) {
            Some(PropertyValue::Utf8String(v)) => Some(v),
            _ => None,
        }
    }

    /// Encodes the length-prefixed properties block.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let body_len = self.entries_encoded_len();
        let len = u32::try_from(body_len).map_err(|_| MqttError::PacketTooLarge {
            size: body_len,
            max: u32::MAX as usize,
        })?;
        encode_variable_int(buf, len)?;
        self.encode_entries(buf)
    }

    fn encode_entries<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        for (id, value) in &self.entries {
            encode_variable_int(buf, u32::from(*id as u8))?;
            match value {
                PropertyValue::Byte(v) => buf.put_u8(*v),
                PropertyValue::TwoByteInteger(v) => buf.put_u16(*v),
                PropertyValue::FourByteInteger(v) => buf.put_u32(*v),
                PropertyValue::VariableByteInteger(v) => encode_variable_int(buf, *v)?,
                PropertyValue::BinaryData(v) => encode_binary(buf, v)?,
                PropertyValue::Utf8String(v) => encode_string(buf, v)?,
                PropertyValue::Utf8StringPair(k, v) => {
                    encode_string(buf, k)?;
                    encode_string(buf, v)?;
                }
            }
        }
        Ok(())
    }

    /// Decodes a length-prefixed properties block, consuming exactly
    /// the declared byte count.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let props_len = decode_variable_int(buf)? as usize;
        if buf.remaining() < props_len {
            return Err(MqttError::MalformedPacket(format!(
                "Insufficient data for properties: expected {props_len}, got {}",
                buf.remaining()
            )));
        }

        let mut props_buf = buf.copy_to_bytes(props_len);
        let mut properties = Self::new();

        while props_buf.has_remaining() {
            let id_val = decode_variable_int(&mut props_buf)?;
            let id_byte = u8::try_from(id_val).map_err(|_| MqttError::InvalidPropertyId(0xFF))?;
            let id = PropertyId::from_u8(id_byte).ok_or(MqttError::InvalidPropertyId(id_byte))?;

            let value = match id.value_type() {
                PropertyValueType::Byte => {
                    if !props_buf.has_remaining() {
                        return Err(MqttError::MalformedPacket(
                            "Insufficient data for byte property".to_string(),
                        ));
                    }
                    PropertyValue::Byte(props_buf.get_u8())
                }
                PropertyValueType::TwoByteInteger => {
                    if props_buf.remaining() < 2 {
                        return Err(MqttError::MalformedPacket(
                            "Insufficient data for two-byte integer property".to_string(),
                        ));
                    }
                    PropertyValue::TwoByteInteger(props_buf.get_u16())
                }
                PropertyValueType::FourByteInteger => {
                    if props_buf.remaining() < 4 {
                        return Err(MqttError::MalformedPacket(
                            "Insufficient data for four-byte integer property".to_string(),
                        ));
                    }
                    PropertyValue::FourByteInteger(props_buf.get_u32())
                }
                PropertyValueType::VariableByteInteger => {
                    PropertyValue::VariableByteInteger(decode_variable_int(&mut props_buf)?)
                }
                PropertyValueType::BinaryData => {
                    PropertyValue::BinaryData(decode_binary(&mut props_buf)?)
                }
                PropertyValueType::Utf8String => {
                    PropertyValue::Utf8String(decode_string(&mut props_buf)?)
                }
                PropertyValueType::Utf8StringPair => {
                    let key = decode_string(&mut props_buf)?;
                    let value = decode_string(&mut props_buf)?;
                    PropertyValue::Utf8StringPair(key, value)
                }
            };

            properties.add(id, value)?;
        }

        Ok(properties)
    }

    /// Total encoded length, length prefix included. Computed without
    /// serializing.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let body = self.entries_encoded_len();
        variable_int_len(u32::try_from(body).unwrap_or(u32::MAX)) + body
    }

    fn entries_encoded_len(&self) -> usize {
        let mut len = 0;
        for (id, value) in &self.entries {
            len += variable_int_len(u32::from(*id as u8));
            len += match value {
                PropertyValue::Byte(_) => 1,
                PropertyValue::TwoByteInteger(_) => 2,
                PropertyValue::FourByteInteger(_) => 4,
                PropertyValue::VariableByteInteger(v) => variable_int_len(*v),
                PropertyValue::BinaryData(v) => binary_len(v),
                PropertyValue::Utf8String(v) => string_len(v),
                PropertyValue::Utf8StringPair(k, v) => string_len(k) + string_len(v),
            };
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_empty_properties_encode_as_zero_length() {
        let properties = Properties::default();
        let mut buf = BytesMut::new();
        properties.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00]);
        assert_eq!(properties.encoded_len(), 1);
    }

    #[test]
    fn test_round_trip_mixed_values() {
        let mut properties = Properties::new();
        properties
            .add(
                PropertyId::SessionExpiryInterval,
                PropertyValue::FourByteInteger(3600),
            )
            .unwrap();
        properties
            .add(PropertyId::ReceiveMaximum, PropertyValue::TwoByteInteger(20))
            .unwrap();
        properties
            .add(
                PropertyId::ContentType,
                PropertyValue::Utf8String("application/json".to_string()),
            )
            .unwrap();
        properties.add_user_property("origin", "sensor-7");
        properties.add_user_property("origin", "sensor-8");

        let mut buf = BytesMut::new();
        properties.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), properties.encoded_len());

        let decoded = Properties::decode(&mut buf).unwrap();
        assert_eq!(decoded, properties);
        assert_eq!(decoded.session_expiry_interval(), Some(3600));
        assert_eq!(decoded.receive_maximum(), Some(20));
        assert_eq!(decoded.user_properties().len(), 2);
    }

    #[test]
    fn test_duplicate_non_repeatable_rejected() {
        let mut properties = Properties::new();
        properties
            .add(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(1))
            .unwrap();
        let err = properties
            .add(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(2))
            .unwrap_err();
        assert!(matches!(err, MqttError::DuplicatePropertyId(0x23)));
    }

    #[test]
    fn test_unknown_property_id_rejected() {
        // Length 2, id 0x7B (unassigned), one value byte.
        let mut buf = BytesMut::from(&[0x02, 0x7B, 0x00][..]);
        assert!(matches!(
            Properties::decode(&mut buf),
            Err(MqttError::InvalidPropertyId(0x7B))
        ));
    }

    #[test]
    fn test_declared_length_overrun_rejected() {
        // Declares 1 byte of properties but the id needs a 4-byte value.
        let mut buf = BytesMut::from(&[0x01, 0x11][..]);
        assert!(Properties::decode(&mut buf).is_err());
    }

    #[test]
    fn test_truncated_block_rejected() {
        let mut buf = BytesMut::from(&[0x05, 0x11][..]);
        assert!(Properties::decode(&mut buf).is_err());
    }
}
