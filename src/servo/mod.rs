//! Servo identity, limits, position sets and phoneme shapes.

pub mod limits;
pub mod map;
pub mod phoneme;
pub mod positions;

pub use limits::{ServoLimit, ServoLimits};
pub use map::{ALL_SERVOS, MOUTH_SERVOS, Servo, UnknownServo};
pub use phoneme::{Phoneme, PhonemeMap, UnknownPhoneme};
pub use positions::{PositionEntry, ServoPositions};
