//! Instrument sessions and the two bench instruments driven by a sweep.
//!
//! - [`InstrumentSession`]: owns one transport and its connect/close lifecycle
//! - [`PowerSupply`]: channel select, set-point, current limit, output switch
//! - [`Multimeter`]: DC-voltage configuration, input impedance, readings

pub mod dmm;
pub mod psu;
pub mod session;

pub use dmm::{parse_reading, ImpedanceMode, Multimeter};
pub use psu::PowerSupply;
pub use session::{CloseOutcome, InstrumentRole, InstrumentSession};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output channel on a triple-output supply.
///
/// The front-panel colours follow the Keysight E36300 series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ChannelRepr", into = "u8")]
pub enum Channel {
    One,
    Two,
    Three,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::One, Channel::Two, Channel::Three];

    /// SCPI channel number (`INST:NSEL <n>`)
    pub fn number(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
            Channel::Three => 3,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Channel::One => "Yellow",
            Channel::Two => "Green",
            Channel::Three => "Blue",
        }
    }

    /// Label in the form `"1 - Yellow"`
    pub fn label(self) -> String {
        format!("{} - {}", self.number(), self.color())
    }
}

impl TryFrom<u8> for Channel {
    type Error = anyhow::Error;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            3 => Ok(Channel::Three),
            other => Err(anyhow!("Unsupported channel {} (expected 1, 2 or 3)", other)),
        }
    }
}

impl From<Channel> for u8 {
    fn from(c: Channel) -> u8 {
        c.number()
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    /// Accepts `"2"` as well as labelled forms like `"2 - Green"`.
    fn from_str(s: &str) -> Result<Self> {
        let head = s.split(" - ").next().unwrap_or_default().trim();
        let n: u8 = head
            .parse()
            .map_err(|_| anyhow!("Invalid channel '{}'", s.trim()))?;
        Channel::try_from(n)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelRepr {
    Number(u8),
    Text(String),
}

impl TryFrom<ChannelRepr> for Channel {
    type Error = String;

    fn try_from(repr: ChannelRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ChannelRepr::Number(n) => Channel::try_from(n).map_err(|e| e.to_string()),
            ChannelRepr::Text(s) => s.parse().map_err(|e: anyhow::Error| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parsing() {
        assert_eq!("1".parse::<Channel>().unwrap(), Channel::One);
        assert_eq!("2 - Green".parse::<Channel>().unwrap(), Channel::Two);
        assert_eq!(" 3 ".parse::<Channel>().unwrap(), Channel::Three);
        assert!("4".parse::<Channel>().is_err());
        assert!("Yellow".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_labels() {
        assert_eq!(Channel::One.label(), "1 - Yellow");
        assert_eq!(Channel::Three.color(), "Blue");
        assert_eq!(Channel::Two.to_string(), "2");
        for c in Channel::ALL {
            assert_eq!(c.label().parse::<Channel>().unwrap(), c);
        }
    }
}
