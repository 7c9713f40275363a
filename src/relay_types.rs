use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;

use thiserror::Error;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayId {
    Relay1,
    Relay2,
    Relay3,
    Relay4,
}

impl RelayId {
    pub const ALL: [RelayId; 4] = [
        RelayId::Relay1,
        RelayId::Relay2,
        RelayId::Relay3,
        RelayId::Relay4,
    ];

    pub fn index(&self) -> usize {
        match self {
            RelayId::Relay1 => 0,
            RelayId::Relay2 => 1,
            RelayId::Relay3 => 2,
            RelayId::Relay4 => 3,
        }
    }

    /// Channel number as printed on the relay board, `1` to `4`.
    pub fn number(&self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(number: u8) -> Option<RelayId> {
        match number {
            1 => Some(RelayId::Relay1),
            2 => Some(RelayId::Relay2),
            3 => Some(RelayId::Relay3),
            4 => Some(RelayId::Relay4),
            _ => None,
        }
    }
}

impl Display for RelayId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid relay number '{0}'")]
pub struct InvalidRelayId(pub String);

impl FromStr for RelayId {
    type Err = InvalidRelayId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(RelayId::Relay1),
            "2" => Ok(RelayId::Relay2),
            "3" => Ok(RelayId::Relay3),
            "4" => Ok(RelayId::Relay4),
            unknown => Err(InvalidRelayId(unknown.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct RelayState {
    pub id: RelayId,
    pub logical_on: bool,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum PinValue {
    High,
    Low,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn level_for(&self, logical_on: bool) -> PinValue {
        match (self, logical_on) {
            (Polarity::ActiveLow, true) => PinValue::Low,
            (Polarity::ActiveLow, false) => PinValue::High,
            (Polarity::ActiveHigh, true) => PinValue::High,
            (Polarity::ActiveHigh, false) => PinValue::Low,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct HardwareBinding {
    pub id: RelayId,
    pub line: u32,
    pub polarity: Polarity,
}

/// Complete capture of every relay's logical state, indexed by [`RelayId::index`].
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct PersistedSnapshot {
    states: [bool; 4],
}

impl PersistedSnapshot {
    pub fn new(states: [bool; 4]) -> PersistedSnapshot {
        PersistedSnapshot { states }
    }

    pub fn all_off() -> PersistedSnapshot {
        PersistedSnapshot::default()
    }

    pub fn get(&self, id: RelayId) -> bool {
        self.states[id.index()]
    }

    pub fn set(&mut self, id: RelayId, logical_on: bool) {
        self.states[id.index()] = logical_on;
    }

    pub fn with(mut self, id: RelayId, logical_on: bool) -> PersistedSnapshot {
        self.set(id, logical_on);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = RelayState> + '_ {
        RelayId::ALL.into_iter().map(move |id| RelayState {
            id,
            logical_on: self.get(id),
        })
    }
}
