//! Lobby game codes.
//!
//! A game code is a 32-bit integer on the wire and a short string for
//! humans. Two generations coexist:
//!
//! - **V1** (non-negative values): the four little-endian bytes of the
//!   integer read as characters, e.g. `"ABCD"`.
//! - **V2** (negative values): six letters from a scrambled alphabet. The
//!   low 10 bits carry the first two letters, the next 20 bits the last
//!   four, and the sign bit marks the code as V2.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

const V2_ALPHABET: &[u8; 26] = b"QWXRTYLPESDFGHUJKZOCVBINMA";

/// A lobby identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(pub i32);

impl GameCode {
    pub fn from_i32(value: i32) -> Self {
        Self(value)
    }

    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` for six-letter (V2) codes.
    pub fn is_v2(self) -> bool {
        self.0 < 0
    }

    fn v2_letters(self) -> [u8; 6] {
        let value = self.0 as u32;
        let a = (value & 0x3FF) as usize;
        let b = ((value >> 10) & 0xFFFFF) as usize;
        [
            V2_ALPHABET[a % 26],
            V2_ALPHABET[a / 26 % 26],
            V2_ALPHABET[b % 26],
            V2_ALPHABET[b / 26 % 26],
            V2_ALPHABET[b / (26 * 26) % 26],
            V2_ALPHABET[b / (26 * 26 * 26) % 26],
        ]
    }

    fn parse_v2(code: &[u8]) -> Option<Self> {
        let mut digits = [0u32; 6];
        for (digit, letter) in digits.iter_mut().zip(code) {
            let upper = letter.to_ascii_uppercase();
            *digit = V2_ALPHABET.iter().position(|&c| c == upper)? as u32;
        }
        let [a, b, c, d, e, f] = digits;
        let one = (a + 26 * b) & 0x3FF;
        let two = c + 26 * (d + 26 * (e + 26 * f));
        let value = one | ((two << 10) & 0x3FFF_FC00) | 0x8000_0000;
        Some(Self(value as i32))
    }
}

impl From<i32> for GameCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_v2() {
            let letters = self.v2_letters();
            // The alphabet is ASCII, so this never falls back.
            f.write_str(std::str::from_utf8(&letters).unwrap_or("??????"))
        } else {
            let bytes = self.0.to_le_bytes();
            f.write_str(&String::from_utf8_lossy(&bytes))
        }
    }
}

impl FromStr for GameCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(ProtocolError::InvalidMessage(format!(
                "game code {s:?} must be letters only"
            )));
        }
        match bytes.len() {
            4 => {
                let mut raw = [0u8; 4];
                for (slot, letter) in raw.iter_mut().zip(bytes) {
                    *slot = letter.to_ascii_uppercase();
                }
                Ok(Self(i32::from_le_bytes(raw)))
            }
            6 => Self::parse_v2(bytes).ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("invalid game code {s:?}"))
            }),
            _ => Err(ProtocolError::InvalidMessage(format!(
                "game code {s:?} must be 4 or 6 letters"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_code_renders_four_characters() {
        let code: GameCode = "ABCD".parse().unwrap();
        assert!(!code.is_v2());
        assert_eq!(code.as_i32(), i32::from_le_bytes(*b"ABCD"));
        assert_eq!(code.to_string(), "ABCD");
    }

    #[test]
    fn test_v2_code_round_trips_through_text() {
        for text in ["REDSUS", "QWXRTY", "AAAAAA", "ZZZZZZ"] {
            let code: GameCode = text.parse().unwrap();
            assert!(code.is_v2(), "{text} should be a V2 code");
            assert_eq!(code.to_string(), text);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let upper: GameCode = "REDSUS".parse().unwrap();
        let lower: GameCode = "redsus".parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!("ABC".parse::<GameCode>().is_err());
        assert!("ABCDEFG".parse::<GameCode>().is_err());
        assert!("AB1D".parse::<GameCode>().is_err());
    }

    #[test]
    fn test_serializes_as_raw_integer() {
        let json = serde_json::to_string(&GameCode(123456)).unwrap();
        assert_eq!(json, "123456");
    }
}
