// Command Vocabulary
// Maps operator-facing command names to the short wire tokens the firmware expects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while validating a command token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command token: {0:?}")]
    UnknownToken(String),
}

// ============================================================================
// COMMAND CATEGORY
// ============================================================================

/// Which logical channel a command travels on
///
/// The distinction is part of the protocol: transports with separate
/// channels (BLE characteristics) route on it, transports with a single
/// request type keep it implicit in the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCategory {
    /// Drive motors: F/B/L/R/S
    Movement,
    /// Pump and extinguisher: P1/P0/EXTINGUISH
    Actuator,
}

// ============================================================================
// COMMAND
// ============================================================================

/// A single command from the closed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    PumpOn,
    PumpOff,
    AutonomousExtinguish,
}

impl Command {
    /// Every command, in declaration order
    pub const ALL: [Command; 8] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::Stop,
        Command::PumpOn,
        Command::PumpOff,
        Command::AutonomousExtinguish,
    ];

    /// Operator-facing name (`FORWARD`, `PUMP_ON`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Stop => "STOP",
            Self::PumpOn => "PUMP_ON",
            Self::PumpOff => "PUMP_OFF",
            Self::AutonomousExtinguish => "AUTONOMOUS_EXTINGUISH",
        }
    }

    /// Token written to the device
    pub fn wire_token(&self) -> &'static str {
        match self {
            Self::Forward => "F",
            Self::Backward => "B",
            Self::Left => "L",
            Self::Right => "R",
            Self::Stop => "S",
            Self::PumpOn => "P1",
            Self::PumpOff => "P0",
            Self::AutonomousExtinguish => "EXTINGUISH",
        }
    }

    /// Wire token as raw bytes (no framing)
    pub fn wire_bytes(&self) -> &'static [u8] {
        self.wire_token().as_bytes()
    }

    pub fn category(&self) -> CommandCategory {
        match self {
            Self::Forward | Self::Backward | Self::Left | Self::Right | Self::Stop => {
                CommandCategory::Movement
            }
            Self::PumpOn | Self::PumpOff | Self::AutonomousExtinguish => CommandCategory::Actuator,
        }
    }

    pub fn is_movement(&self) -> bool {
        self.category() == CommandCategory::Movement
    }

    pub fn is_actuator(&self) -> bool {
        self.category() == CommandCategory::Actuator
    }

    /// Parse a firmware wire token (`F`, `P1`, `EXTINGUISH`, ...)
    pub fn from_wire(token: &str) -> Result<Self, CommandError> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.wire_token() == token)
            .ok_or_else(|| CommandError::UnknownToken(token.to_string()))
    }

    /// Accept either an operator name or a wire token
    ///
    /// Used by the console, where typing `F` is friendlier than `FORWARD`.
    /// Surrounding whitespace is ignored; case is not.
    pub fn parse_any(input: &str) -> Result<Self, CommandError> {
        let trimmed = input.trim();
        trimmed
            .parse::<Command>()
            .or_else(|_| Self::from_wire(trimmed))
            .map_err(|_| CommandError::UnknownToken(input.to_string()))
    }
}

impl FromStr for Command {
    type Err = CommandError;

    /// Only the exact operator names are valid
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| CommandError::UnknownToken(s.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
