use crate::error::{MqttError, Result};
use crate::types::QoS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RetainHandling {
    SendAtSubscribe = 0,
    SendAtSubscribeIfNew = 1,
    DoNotSend = 2,
}

/// The subscription options byte carried with each filter in a
/// protocol version 5 SUBSCRIBE. Version 3.1.1 uses the two `QoS` bits
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::SendAtSubscribe,
        }
    }
}

impl SubscriptionOptions {
    #[must_use]
    pub fn new(qos: QoS) -> Self {
        Self {
            qos,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn encode(&self) -> u8 {
        let mut byte = self.qos as u8;

        if self.no_local {
            byte |= 0x04;
        }

        if self.retain_as_published {
            byte |= 0x08;
        }

        byte |= (self.retain_handling as u8) << 4;

        byte
    }

    /// # Errors
    /// Returns an error if the `QoS` value or retain handling is invalid, or reserved bits are set.
    pub fn decode(byte: u8) -> Result<Self> {
        if (byte & 0xC0) != 0 {
            return Err(MqttError::MalformedPacket(
                "Reserved bits in subscription options must be 0".to_string(),
            ));
        }

        let qos = QoS::try_from_bits(byte & 0x03)?;

        let no_local = (byte & 0x04) != 0;
        let retain_as_published = (byte & 0x08) != 0;

        let retain_handling = match (byte >> 4) & 0x03 {
            0 => RetainHandling::SendAtSubscribe,
            1 => RetainHandling::SendAtSubscribeIfNew,
            2 => RetainHandling::DoNotSend,
            other => {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid retain handling value: {other}"
                )))
            }
        };

        Ok(Self {
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        })
    }
}
