//! Mapping from servo names to hardware channels.

use std::fmt;

/// One motor channel on the head. The discriminant is the hardware pin
/// number used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Servo {
    Jaw = 0,
    LipsUpper = 1,
    LipsRight = 2,
    LipsLeft = 3,
    LipsLower = 4,
    EyesX = 5,
    EyeRightY = 6,
    EyeLeftY = 7,
    EyelidRightUpper = 8,
    EyelidRightLower = 9,
    EyelidLeftUpper = 10,
    EyelidLeftLower = 11,
    EyebrowRight = 12,
    EyebrowLeft = 13,
}

/// Every channel, in pin order.
pub const ALL_SERVOS: [Servo; 14] = [
    Servo::Jaw,
    Servo::LipsUpper,
    Servo::LipsRight,
    Servo::LipsLeft,
    Servo::LipsLower,
    Servo::EyesX,
    Servo::EyeRightY,
    Servo::EyeLeftY,
    Servo::EyelidRightUpper,
    Servo::EyelidRightLower,
    Servo::EyelidLeftUpper,
    Servo::EyelidLeftLower,
    Servo::EyebrowRight,
    Servo::EyebrowLeft,
];

/// Channels driven by phoneme playback.
pub const MOUTH_SERVOS: [Servo; 5] = [
    Servo::Jaw,
    Servo::LipsUpper,
    Servo::LipsLower,
    Servo::LipsLeft,
    Servo::LipsRight,
];

impl Servo {
    /// Hardware pin number for this channel.
    pub fn pin(self) -> u8 {
        self as u8
    }

    pub fn is_mouth(self) -> bool {
        MOUTH_SERVOS.contains(&self)
    }
}

impl TryFrom<u8> for Servo {
    type Error = UnknownServo;

    fn try_from(pin: u8) -> Result<Self, Self::Error> {
        ALL_SERVOS
            .iter()
            .copied()
            .find(|s| s.pin() == pin)
            .ok_or(UnknownServo(pin))
    }
}

impl fmt::Display for Servo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pin())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown servo pin {0}")]
pub struct UnknownServo(pub u8);
