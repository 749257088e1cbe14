//! Transport boundary: where final position commands leave the core.

pub mod null;
pub mod serial;

pub use null::NullTransport;
pub use serial::SerialTransport;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::servo::{Servo, ServoPositions};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// Accepts fully resolved position commands. Implementations serialize
/// their own writes; the controller never issues concurrent sends.
#[async_trait]
pub trait ServoTransport: Send + Sync {
    /// Move servos to the given positions. `move_time_ms` is the uniform
    /// move time; `None` when per-servo speeds are embedded in the
    /// positions (or no time applies).
    async fn move_to(
        &self,
        positions: &ServoPositions,
        move_time_ms: Option<u32>,
    ) -> Result<(), TransportError>;

    /// Stop the named servos where they are.
    async fn stop_servos(&self, servos: &BTreeSet<Servo>) -> Result<(), TransportError>;

    /// Shut the transport down.
    async fn stop(&self) -> Result<(), TransportError>;
}

/// Assembles the full wire command: position tokens plus a trailing
/// `T<ms>` when a uniform move time applies.
pub fn move_command(positions: &ServoPositions, move_time_ms: Option<u32>) -> String {
    match move_time_ms {
        Some(ms) => format!("{}T{}\r", positions.to_wire_string(), ms),
        None => format!("{}\r", positions.to_wire_string()),
    }
}

/// Wire command stopping the given servos.
pub fn stop_command(servos: &BTreeSet<Servo>) -> String {
    let tokens: String = servos.iter().map(|servo| format!("STOP {servo}\r")).collect();
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::{PositionEntry, ServoLimits};
    use std::collections::BTreeMap;

    #[test]
    fn move_command_appends_uniform_time() {
        let limits = ServoLimits::default();
        let positions = ServoPositions::new(
            BTreeMap::from([(Servo::Jaw, PositionEntry::new(1500))]),
            &limits,
        );
        assert_eq!(move_command(&positions, Some(300)), "#0P1500T300\r");
    }

    #[test]
    fn move_command_omits_time_when_speeds_embedded() {
        let limits = ServoLimits::default();
        let positions = ServoPositions::new(
            BTreeMap::from([(Servo::Jaw, PositionEntry::with_speed(1500, 20))]),
            &limits,
        );
        assert_eq!(move_command(&positions, None), "#0P1500S20\r");
    }

    #[test]
    fn stop_command_lists_servos() {
        let servos = BTreeSet::from([Servo::Jaw, Servo::LipsUpper]);
        assert_eq!(stop_command(&servos), "STOP 0\rSTOP 1\r");
    }
}
