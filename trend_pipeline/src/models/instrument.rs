//! Instrument codes and their exchange-qualified form.
//!
//! Callers pass bare six-digit codes (`600519`); the upstream provider wants the
//! board suffix (`600519.SH`). [`InstrumentCode::parse`] accepts either form plus
//! the lowercase prefix style (`sh600519`) and works out the board from the
//! leading digits when no suffix is given.

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Listing board of an A-share instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// Shanghai Stock Exchange (`.SH`).
    Shanghai,
    /// Shenzhen Stock Exchange (`.SZ`).
    Shenzhen,
    /// Beijing Stock Exchange (`.BJ`).
    Beijing,
}

impl Board {
    /// Provider suffix without the dot.
    pub fn suffix(self) -> &'static str {
        match self {
            Board::Shanghai => "SH",
            Board::Shenzhen => "SZ",
            Board::Beijing => "BJ",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SH" | "SS" => Some(Board::Shanghai),
            "SZ" => Some(Board::Shenzhen),
            "BJ" | "BSE" => Some(Board::Beijing),
            _ => None,
        }
    }

    /// Infers the board from the code's leading digits.
    fn infer(code: &str) -> Option<Self> {
        if code.starts_with("92") || code.starts_with('4') || code.starts_with('8') {
            return Some(Board::Beijing);
        }
        match code.as_bytes().first()? {
            b'6' | b'9' => Some(Board::Shanghai),
            b'0' | b'2' | b'3' => Some(Board::Shenzhen),
            _ => None,
        }
    }
}

/// Volatility tier used to size synthetic values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// ChiNext, STAR and Beijing listings: wider daily limits.
    Growth,
    /// Main-board listings.
    Standard,
    /// Specially flagged names (risk warnings, suspensions): narrow band.
    Restricted,
}

/// A validated six-digit instrument code plus its board.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentCode {
    code: String,
    board: Board,
}

impl InstrumentCode {
    /// Normalizes `600519`, `600519.SH` or `sh600519` into an [`InstrumentCode`].
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (digits, explicit) = match trimmed.split_once('.') {
            Some((digits, suffix)) => (digits, Some(suffix)),
            None if trimmed.len() == 8 && trimmed.is_char_boundary(2) => {
                let (prefix, digits) = trimmed.split_at(2);
                if prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                    (digits, Some(prefix))
                } else {
                    (trimmed, None)
                }
            }
            None => (trimmed, None),
        };

        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid(format!(
                "instrument code '{raw}' must be six digits"
            )));
        }

        let board = match explicit {
            Some(suffix) => Board::from_suffix(suffix).ok_or_else(|| {
                Error::invalid(format!("unknown exchange suffix '{suffix}' in '{raw}'"))
            })?,
            None => Board::infer(digits).ok_or_else(|| {
                Error::invalid(format!("cannot infer exchange for instrument '{raw}'"))
            })?,
        };

        Ok(Self {
            code: digits.to_string(),
            board,
        })
    }

    /// The bare six-digit code (`600519`).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Listing board.
    pub fn board(&self) -> Board {
        self.board
    }

    /// Provider-qualified code (`600519.SH`).
    pub fn ts_code(&self) -> String {
        format!("{}.{}", self.code, self.board.suffix())
    }

    /// Volatility tier; `restricted` holds bare codes flagged by configuration.
    pub fn class(&self, restricted: &HashSet<String>) -> InstrumentClass {
        if restricted.contains(&self.code) {
            return InstrumentClass::Restricted;
        }
        let growth = self.board == Board::Beijing
            || ["300", "301", "688", "689"]
                .iter()
                .any(|p| self.code.starts_with(p));
        if growth {
            InstrumentClass::Growth
        } else {
            InstrumentClass::Standard
        }
    }
}

impl FromStr for InstrumentCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.board.suffix())
    }
}
