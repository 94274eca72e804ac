//! MQTT primitive encodings: variable byte integers, length-prefixed
//! UTF-8 strings, and binary data.
//!
//! All multi-byte integers are big-endian. Strings are a two-byte
//! length prefix (byte count, not character count) followed by raw
//! UTF-8 with no terminator.

use crate::error::{MqttError, MqttWarning, Result};
use bytes::{Buf, BufMut};

/// Largest value representable in four variable-byte-integer digits.
pub const MAX_VARIABLE_INT: u32 = 268_435_455;

/// Largest encoded byte length of an MQTT string.
pub const MAX_STRING_LEN: usize = 65_535;

pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > MAX_VARIABLE_INT {
        return Err(MqttError::MalformedVariableByteInteger);
    }

    let mut remaining = value;
    loop {
        let mut digit = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            digit |= 0x80;
        }
        buf.put_u8(digit);
        if remaining == 0 {
            return Ok(());
        }
    }
}

pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut decoder = IncrementalVarInt::new();
    while buf.has_remaining() {
        if let Some(value) = decoder.push(buf.get_u8())? {
            return Ok(value);
        }
    }
    Err(MqttError::MalformedPacket(
        "Insufficient data for variable byte integer".to_string(),
    ))
}

/// Encoded byte length of `value` as a variable byte integer.
#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Resumable variable byte integer decoder for streaming reads.
///
/// Feed one byte at a time; already-consumed digits are carried across
/// buffer refills, so a decode interrupted by a short read picks up
/// where it left off.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementalVarInt {
    value: u32,
    multiplier: u32,
    digits: u8,
}

impl IncrementalVarInt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: 0,
            multiplier: 1,
            digits: 0,
        }
    }

    /// Consumes one digit byte. Returns `Ok(Some(value))` once the
    /// continuation bit clears, `Ok(None)` when more bytes are needed.
    pub fn push(&mut self, byte: u8) -> Result<Option<u32>> {
        if self.digits >= 4 {
            return Err(MqttError::MalformedVariableByteInteger);
        }

        self.value += u32::from(byte & 0x7F) * self.multiplier;
        self.digits += 1;

        if byte & 0x80 == 0 {
            if self.value > MAX_VARIABLE_INT {
                return Err(MqttError::MalformedVariableByteInteger);
            }
            return Ok(Some(self.value));
        }

        if self.digits == 4 {
            // Continuation bit set on the fourth digit.
            return Err(MqttError::MalformedVariableByteInteger);
        }

        self.multiplier *= 128;
        Ok(None)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn digits_consumed(&self) -> u8 {
        self.digits
    }
}

pub fn encode_string<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    validate_string(value)?;
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient data for string length".to_string(),
        ));
    }
    let len = buf.get_u16() as usize;
    if len == 0 {
        return Ok(String::new());
    }
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient data for string: expected {len}, got {}",
            buf.remaining()
        )));
    }

    let raw = buf.copy_to_bytes(len);
    // Invalid UTF-8 covers CESU-8 encoded surrogates (U+D800..U+DFFF);
    // a compliant peer never sends them.
    let value = String::from_utf8(raw.to_vec())
        .map_err(|_| MqttError::MalformedPacket("String is not valid UTF-8".to_string()))?;
    validate_string(&value)?;
    Ok(value)
}

/// Encoded byte length of `value` as an MQTT string, prefix included.
#[must_use]
pub fn string_len(value: &str) -> usize {
    2 + value.len()
}

pub fn encode_binary<B: BufMut>(buf: &mut B, value: &[u8]) -> Result<()> {
    if value.len() > MAX_STRING_LEN {
        return Err(MqttError::StringTooLong(value.len()));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient data for binary length".to_string(),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient data for binary data: expected {len}, got {}",
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len).to_vec())
}

/// Encoded byte length of `value` as MQTT binary data, prefix included.
#[must_use]
pub fn binary_len(value: &[u8]) -> usize {
    2 + value.len()
}

/// Hard MQTT string rules: at most 65535 encoded bytes, no U+0000.
pub fn validate_string(value: &str) -> Result<()> {
    if value.len() > MAX_STRING_LEN {
        return Err(MqttError::StringTooLong(value.len()));
    }
    if let Some(index) = value.find('\u{0000}') {
        return Err(MqttError::MalformedPacket(format!(
            "String contains null character at index {index}"
        )));
    }
    Ok(())
}

/// Soft MQTT string rules. A hit is a warning the caller may choose to
/// escalate, never an automatic failure: control characters
/// U+0001..U+001F and U+007F..U+009F, and the private-use area
/// U+E000..U+F8FF.
#[must_use]
pub fn string_warning(value: &str) -> Option<MqttWarning> {
    for (index, c) in value.char_indices() {
        if ('\u{0001}'..='\u{001F}').contains(&c) || ('\u{007F}'..='\u{009F}').contains(&c) {
            return Some(MqttWarning::ControlCharacterInString { index });
        }
        if ('\u{E000}'..='\u{F8FF}').contains(&c) {
            return Some(MqttWarning::PrivateUseCharacterInString { index });
        }
    }
    None
}
