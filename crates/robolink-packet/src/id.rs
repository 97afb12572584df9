use std::fmt;

use rand::Rng;
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::wire::CORRELATION_ID_LENGTH;

/// Four-digit identifier linking an outbound command to its acknowledgment.
///
/// Generated ids are drawn from `1000..=9999`. Ids parsed off the wire may be any
/// four-digit value, including ones with leading zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(u16);

impl CorrelationId {
    /// Smallest generated id.
    pub const MIN: u16 = 1000;
    /// Largest id representable in four digits.
    pub const MAX: u16 = 9999;

    /// Wrap a raw value, rejecting anything wider than four digits.
    pub fn new(value: u16) -> Result<Self> {
        if value > Self::MAX {
            return Err(CodecError::InvalidCorrelationId(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Draw a random id in `MIN..=MAX`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(Self::MIN..=Self::MAX))
    }

    /// Parse an acknowledgment line: exactly four ASCII decimal digits.
    pub fn from_ascii(text: &[u8]) -> Option<Self> {
        if text.len() != CORRELATION_ID_LENGTH || !text.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let value = text
            .iter()
            .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
        Some(Self(value))
    }

    /// Parse a response suffix: four bytes, each holding one decimal digit's value.
    pub fn from_digit_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CORRELATION_ID_LENGTH || bytes.iter().any(|&d| d > 9) {
            return Err(CodecError::InvalidCorrelationId(format!("{bytes:?}")));
        }
        let value = bytes.iter().fold(0u16, |acc, &d| acc * 10 + u16::from(d));
        Ok(Self(value))
    }

    /// Digit-per-byte form used in command packets and response suffixes.
    pub fn to_digit_bytes(self) -> [u8; CORRELATION_ID_LENGTH] {
        let v = self.0;
        [
            (v / 1000 % 10) as u8,
            (v / 100 % 10) as u8,
            (v / 10 % 10) as u8,
            (v % 10) as u8,
        ]
    }

    /// ASCII form used by acknowledgment lines.
    pub fn to_ascii(self) -> [u8; CORRELATION_ID_LENGTH] {
        self.to_digit_bytes().map(|d| d + b'0')
    }

    /// The numeric value.
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl TryFrom<u16> for CorrelationId {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}
