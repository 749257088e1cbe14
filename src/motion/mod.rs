//! Instruction dispatch, override merging and transport forwarding.

pub mod controller;

pub use controller::MotionController;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::servo::{Servo, ServoPositions};
use crate::transport::TransportError;

/// Events the controller publishes to whoever is driving the experience.
#[derive(Debug, Clone)]
pub enum MotionEvent {
    /// Positions that were actually transmitted (post merge/dedup).
    Move(ServoPositions),
    /// Servos a stop command was sent for.
    Stop(BTreeSet<Servo>),
    /// Every registered handle has finished playing.
    AllComplete,
}

/// Per-instruction failures. Recovered locally: the offending instruction
/// is logged and skipped, playback continues.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("phoneme {0:?} is not mapped")]
    UnmappedPhoneme(String),
    #[error("nested sequence {0:?} has no prepared handle")]
    InvalidNestedReference(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
