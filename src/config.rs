use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::ArgAction;
use clap::Parser;
use thiserror::Error;

use crate::relay_types::HardwareBinding;
use crate::relay_types::Polarity;
use crate::relay_types::RelayId;

pub const DEFAULT_LINES: [u32; 4] = [22, 23, 24, 25];

/// A binding table the control surface can not be built from. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationFault {
    #[error("Expected one GPIO line per relay (4), but got {0}")]
    LineCount(usize),

    #[error("Invalid GPIO line '{0}'")]
    InvalidLine(String),

    #[error("GPIO line {0} is bound to more than one relay")]
    DuplicateLine(u32),

    #[error("Relay {0} is bound more than once")]
    DuplicateBinding(RelayId),

    #[error("No hardware binding for relay {0}")]
    MissingBinding(RelayId),

    #[error("GPIO chip path is empty")]
    EmptyChipPath,

    #[error("Hardware timeout must be greater than zero")]
    ZeroTimeout,
}

/// Validated RelayId to line mapping, one binding per relay.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindingTable {
    bindings: [HardwareBinding; 4],
}

impl BindingTable {
    pub fn new(bindings: &[HardwareBinding]) -> Result<BindingTable, ConfigurationFault> {
        let mut table: [Option<HardwareBinding>; 4] = [None; 4];
        let mut lines = HashSet::new();
        for binding in bindings {
            if table[binding.id.index()].is_some() {
                return Err(ConfigurationFault::DuplicateBinding(binding.id));
            }
            if !lines.insert(binding.line) {
                return Err(ConfigurationFault::DuplicateLine(binding.line));
            }
            table[binding.id.index()] = Some(*binding);
        }

        let mut checked = Vec::with_capacity(4);
        for id in RelayId::ALL {
            checked.push(table[id.index()].ok_or(ConfigurationFault::MissingBinding(id))?);
        }
        Ok(BindingTable {
            bindings: [checked[0], checked[1], checked[2], checked[3]],
        })
    }

    /// Binds `lines[n]` to relay `n + 1`, all with the same polarity.
    pub fn uniform(lines: &[u32], polarity: Polarity) -> Result<BindingTable, ConfigurationFault> {
        if lines.len() != RelayId::ALL.len() {
            return Err(ConfigurationFault::LineCount(lines.len()));
        }
        let bindings: Vec<HardwareBinding> = RelayId::ALL
            .into_iter()
            .zip(lines)
            .map(|(id, line)| HardwareBinding {
                id,
                line: *line,
                polarity,
            })
            .collect();
        BindingTable::new(&bindings)
    }

    pub fn get(&self, id: RelayId) -> &HardwareBinding {
        &self.bindings[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &HardwareBinding> {
        self.bindings.iter()
    }
}

impl Default for BindingTable {
    /// Four active-low relays on GPIO 22 to 25.
    fn default() -> Self {
        let bindings = RelayId::ALL.map(|id| HardwareBinding {
            id,
            line: DEFAULT_LINES[id.index()],
            polarity: Polarity::ActiveLow,
        });
        BindingTable { bindings }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "relay-tui",
    version,
    about = "Toggle relays from the terminal. Relay states survive restarts."
)]
pub struct Config {
    /// File holding the relay states
    #[arg(long, default_value = "relay_state.json")]
    pub state_file: PathBuf,

    /// Diagnostic log, standard error is appended to it while running
    #[arg(long, default_value = "relay_control.log")]
    pub log_file: PathBuf,

    /// Keep logging to standard error instead of the log file
    #[arg(long)]
    pub log_to_stderr: bool,

    /// GPIO character device the relays are wired to
    #[arg(long, default_value = "/dev/gpiochip0")]
    pub gpio_chip: PathBuf,

    /// GPIO lines of relay 1 to 4, comma separated
    #[arg(long, default_value = "22,23,24,25")]
    pub lines: String,

    /// Relays energize on a high level (default: low level)
    #[arg(long)]
    pub active_high: bool,

    /// Upper bound for a single GPIO operation
    #[arg(long, default_value_t = 500)]
    pub hw_timeout_ms: u64,

    /// Drive simulated lines instead of the GPIO chip
    #[arg(long)]
    pub simulate: bool,

    /// More log output, repeat for even more
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// No log output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Config {
    pub fn polarity(&self) -> Polarity {
        match self.active_high {
            true => Polarity::ActiveHigh,
            false => Polarity::ActiveLow,
        }
    }

    pub fn bindings(&self) -> Result<BindingTable, ConfigurationFault> {
        if !self.simulate && self.gpio_chip.as_os_str().is_empty() {
            return Err(ConfigurationFault::EmptyChipPath);
        }
        let lines = self
            .lines
            .split(',')
            .map(|line| {
                let line = line.trim();
                line.parse::<u32>()
                    .map_err(|_| ConfigurationFault::InvalidLine(line.to_string()))
            })
            .collect::<Result<Vec<u32>, ConfigurationFault>>()?;
        BindingTable::uniform(&lines, self.polarity())
    }

    pub fn hw_timeout(&self) -> Result<Duration, ConfigurationFault> {
        match self.hw_timeout_ms {
            0 => Err(ConfigurationFault::ZeroTimeout),
            ms => Ok(Duration::from_millis(ms)),
        }
    }

    /// stderrlog verbosity, `info` unless raised with `-v`.
    pub fn log_verbosity(&self) -> usize {
        2 + self.verbose as usize
    }
}
