use crate::protocol::v5::reason_codes::ReasonCode;

pub fn is_valid_publish_ack_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoMatchingSubscribers
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicNameInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::PayloadFormatInvalid
    )
}

pub fn is_valid_pubrel_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success | ReasonCode::PacketIdentifierNotFound
    )
}

/// PUBACK, PUBREC, PUBREL and PUBCOMP share one shape: packet id, then
/// on version 5 an optional reason code and properties. The abridged
/// forms (2- and 3-byte bodies) decode as Success with no properties.
macro_rules! define_ack_packet {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        packet_type = $packet_type:expr;
        flags = $flags:expr;
        validator = $validator:path;
        error_prefix = $prefix:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub packet_id: u16,
            pub reason_code: $crate::protocol::v5::reason_codes::ReasonCode,
            pub properties: $crate::protocol::v5::properties::Properties,
            pub protocol_version: $crate::types::ProtocolVersion,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self {
                    packet_id,
                    reason_code: $crate::protocol::v5::reason_codes::ReasonCode::Success,
                    properties: $crate::protocol::v5::properties::Properties::default(),
                    protocol_version: $crate::types::ProtocolVersion::V5,
                }
            }

            #[must_use]
            pub fn new_with_reason(
                packet_id: u16,
                reason_code: $crate::protocol::v5::reason_codes::ReasonCode,
            ) -> Self {
                Self {
                    packet_id,
                    reason_code,
                    properties: $crate::protocol::v5::properties::Properties::default(),
                    protocol_version: $crate::types::ProtocolVersion::V5,
                }
            }

            #[must_use]
            pub fn with_version(
                mut self,
                version: $crate::types::ProtocolVersion,
            ) -> Self {
                self.protocol_version = version;
                self
            }

            #[must_use]
            pub fn with_reason_string(mut self, reason: String) -> Self {
                let _ = self.properties.add(
                    $crate::protocol::v5::properties::PropertyId::ReasonString,
                    $crate::protocol::v5::properties::PropertyValue::Utf8String(reason),
                );
                self
            }

            #[must_use]
            pub fn with_user_property(mut self, key: String, value: String) -> Self {
                self.properties.add_user_property(key, value);
                self
            }

            /// # Errors
            /// Returns an error if decoding fails.
            pub fn decode_body_with_version<B: bytes::Buf>(
                buf: &mut B,
                _fixed_header: &$crate::packet::FixedHeader,
                version: $crate::types::ProtocolVersion,
            ) -> $crate::error::Result<Self> {
                use $crate::protocol::v5::reason_codes::ReasonCode;

                if buf.remaining() < 2 {
                    return Err($crate::error::MqttError::MalformedPacket(
                        concat!($prefix, " missing packet identifier").to_string(),
                    ));
                }
                let packet_id = buf.get_u16();
                if packet_id == 0 {
                    return Err($crate::error::MqttError::MalformedPacket(
                        concat!($prefix, " packet identifier must be non-zero").to_string(),
                    ));
                }

                let mut reason_code = ReasonCode::Success;
                let mut properties = $crate::protocol::v5::properties::Properties::default();

                if version.is_v5() && buf.has_remaining() {
                    let code_byte = buf.get_u8();
                    reason_code = ReasonCode::from_u8(code_byte)
                        .filter(|code| $validator(*code))
                        .ok_or_else(|| {
                            $crate::error::MqttError::MalformedPacket(format!(
                                concat!("Invalid ", $prefix, " reason code: 0x{:02X}"),
                                code_byte
                            ))
                        })?;

                    if buf.has_remaining() {
                        properties =
                            $crate::protocol::v5::properties::Properties::decode(buf)?;
                    }
                }

                Ok(Self {
                    packet_id,
                    reason_code,
                    properties,
                    protocol_version: version,
                })
            }
        }

        impl $crate::packet::MqttPacket for $name {
            fn packet_type(&self) -> $crate::packet::PacketType {
                $packet_type
            }

            fn flags(&self) -> u8 {
                $flags
            }

            fn encode_body<B: bytes::BufMut>(
                &self,
                buf: &mut B,
            ) -> $crate::error::Result<()> {
                use $crate::protocol::v5::reason_codes::ReasonCode;

                buf.put_u16(self.packet_id);

                if self.protocol_version.is_v5()
                    && (self.reason_code != ReasonCode::Success
                        || !self.properties.is_empty())
                {
                    buf.put_u8(self.reason_code.into());
                    if !self.properties.is_empty() {
                        self.properties.encode(buf)?;
                    }
                }
                Ok(())
            }

            fn decode_body<B: bytes::Buf>(
                buf: &mut B,
                fixed_header: &$crate::packet::FixedHeader,
            ) -> $crate::error::Result<Self> {
                Self::decode_body_with_version(
                    buf,
                    fixed_header,
                    $crate::types::ProtocolVersion::V5,
                )
            }
        }
    };
}

pub(crate) use define_ack_packet;
