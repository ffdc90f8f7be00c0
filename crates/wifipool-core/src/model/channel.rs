// ── Channel identity ──
//
// A channel is one IO line on the pool controller, addressed on the wire
// as `<device-uuid>.<direction><index>` (e.g. `…c0ffee.o3`). The vendor
// publishes no channel schema, so the candidate space is enumerated here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Highest output index probed (`o0..=o12`).
pub const MAX_OUTPUT_INDEX: u8 = 12;
/// Highest input index probed (`i0..=i7`).
pub const MAX_INPUT_INDEX: u8 = 7;

/// IO direction of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn letter(self) -> char {
        match self {
            Self::Input => 'i',
            Self::Output => 'o',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Input),
            'o' => Some(Self::Output),
            _ => None,
        }
    }
}

/// Error returned when a string is not a `<device>.<i|o><n>` channel id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid channel id {0:?}: expected <device>.<i|o><index>")]
pub struct ParseChannelIdError(String);

/// Fully qualified channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    device: String,
    direction: Direction,
    index: u8,
}

impl ChannelId {
    pub fn new(device: impl Into<String>, direction: Direction, index: u8) -> Self {
        Self {
            device: device.into(),
            direction,
            index,
        }
    }

    pub fn output(device: impl Into<String>, index: u8) -> Self {
        Self::new(device, Direction::Output, index)
    }

    pub fn input(device: impl Into<String>, index: u8) -> Self {
        Self::new(device, Direction::Input, index)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// The local part after the device, e.g. `o3`.
    pub fn suffix(&self) -> String {
        format!("{}{}", self.direction.letter(), self.index)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.device, self.direction.letter(), self.index)
    }
}

impl FromStr for ChannelId {
    type Err = ParseChannelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseChannelIdError(s.to_owned());

        let (device, local) = s.rsplit_once('.').ok_or_else(invalid)?;
        if device.is_empty() {
            return Err(invalid());
        }
        let mut chars = local.chars();
        let direction = chars
            .next()
            .and_then(Direction::from_letter)
            .ok_or_else(invalid)?;
        let index: u8 = chars.as_str().parse().map_err(|_| invalid())?;

        Ok(Self::new(device, direction, index))
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ParseChannelIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.to_string()
    }
}

/// Probe order used by discovery: inputs `i0..i7`, then outputs `o0..o12`.
pub fn candidate_channels(device: &str) -> Vec<ChannelId> {
    (0..=MAX_INPUT_INDEX)
        .map(|i| ChannelId::input(device, i))
        .chain((0..=MAX_OUTPUT_INDEX).map(|o| ChannelId::output(device, o)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let id: ChannelId = "3f1c0000-0000-4000-8000-00000000abcd.o12".parse().unwrap();
        assert_eq!(id.device(), "3f1c0000-0000-4000-8000-00000000abcd");
        assert_eq!(id.direction(), Direction::Output);
        assert_eq!(id.index(), 12);
        assert_eq!(id.suffix(), "o12");
        assert_eq!(id.to_string(), "3f1c0000-0000-4000-8000-00000000abcd.o12");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["dev", "dev.x1", "dev.o", "dev.o-1", ".i0", "dev.i300"] {
            assert!(bad.parse::<ChannelId>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ChannelId::input("dev", 2);
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("dev.i2"));
        let back: ChannelId = serde_json::from_value(serde_json::json!("dev.i2")).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn candidate_space_is_inputs_then_outputs() {
        let all = candidate_channels("dev");
        assert_eq!(all.len(), 21);
        assert_eq!(all[0].to_string(), "dev.i0");
        assert_eq!(all[7].to_string(), "dev.i7");
        assert_eq!(all[8].to_string(), "dev.o0");
        assert_eq!(all[20].to_string(), "dev.o12");
    }
}
