//! Per-servo position limits.
//!
//! Calibration values for the current head build. Positions outside a
//! servo's range can stall the motor or collide with the skull shell, so
//! every position is clamped through this table before it reaches the wire.

use std::collections::BTreeMap;

use super::map::Servo;

/// Travel limits for one servo, in raw pulse-width units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoLimit {
    pub lower: i32,
    pub mid: i32,
    pub upper: i32,
}

impl ServoLimit {
    pub fn clamp(&self, position: i32) -> i32 {
        position.clamp(self.lower, self.upper)
    }
}

/// Limit table for the whole head. Constructed once and passed by
/// reference to everything that builds positions.
#[derive(Debug, Clone)]
pub struct ServoLimits {
    limits: BTreeMap<Servo, ServoLimit>,
}

impl ServoLimits {
    /// Clamps `position` into the configured range for `servo`.
    pub fn clamp(&self, servo: Servo, position: i32) -> i32 {
        match self.limits.get(&servo) {
            Some(limit) => limit.clamp(position),
            // Every enum variant is in the default table; a custom table
            // missing an entry falls back to passing the value through.
            None => position,
        }
    }

    pub fn get(&self, servo: Servo) -> Option<&ServoLimit> {
        self.limits.get(&servo)
    }

    pub fn from_table(limits: BTreeMap<Servo, ServoLimit>) -> Self {
        Self { limits }
    }
}

impl Default for ServoLimits {
    fn default() -> Self {
        let mut limits = BTreeMap::new();
        let mut set = |servo, lower, mid, upper| {
            limits.insert(servo, ServoLimit { lower, mid, upper });
        };
        set(Servo::Jaw, 1440, 1520, 1600);
        set(Servo::LipsUpper, 1430, 1480, 1530);
        set(Servo::LipsRight, 1220, 1385, 1550);
        set(Servo::LipsLeft, 1530, 1690, 1850);
        set(Servo::LipsLower, 1550, 1650, 1750);
        set(Servo::EyesX, 1380, 1465, 1550);
        set(Servo::EyeRightY, 1510, 1570, 1630);
        set(Servo::EyeLeftY, 1440, 1520, 1600);
        set(Servo::EyelidRightUpper, 1650, 1720, 1790);
        set(Servo::EyelidRightLower, 1250, 1340, 1430);
        set(Servo::EyelidLeftUpper, 1260, 1330, 1400);
        set(Servo::EyelidLeftLower, 1500, 1610, 1720);
        set(Servo::EyebrowRight, 1570, 1585, 1600);
        set(Servo::EyebrowLeft, 1520, 1545, 1570);
        Self { limits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::map::ALL_SERVOS;

    #[test]
    fn clamps_to_range() {
        let limits = ServoLimits::default();
        assert_eq!(limits.clamp(Servo::Jaw, 0), 1440);
        assert_eq!(limits.clamp(Servo::Jaw, 9999), 1600);
        assert_eq!(limits.clamp(Servo::Jaw, 1500), 1500);
    }

    #[test]
    fn clamp_is_idempotent() {
        let limits = ServoLimits::default();
        for servo in ALL_SERVOS {
            for raw in [-500, 0, 1000, 1500, 2200, 10_000] {
                let once = limits.clamp(servo, raw);
                assert_eq!(limits.clamp(servo, once), once);
            }
        }
    }

    #[test]
    fn every_servo_has_a_limit() {
        let limits = ServoLimits::default();
        for servo in ALL_SERVOS {
            let limit = limits.get(servo).expect("missing limit entry");
            assert!(limit.lower <= limit.mid && limit.mid <= limit.upper);
        }
    }
}
