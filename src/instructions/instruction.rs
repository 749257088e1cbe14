//! A single timed servo instruction.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

use crate::servo::{Servo, ServoLimits, ServoPositions};

use super::LoadError;

/// What an instruction does when it fires. Closed set; unknown tags are
/// rejected when the source is loaded, not when it plays.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Move the mouth to a named phoneme shape. Resolved against the
    /// phoneme map at dispatch.
    Phoneme(String),
    /// Move servos to literal positions.
    Position(ServoPositions),
    /// Stop the named servos.
    Stop(BTreeSet<Servo>),
    /// Trigger concurrent playback of another sequence.
    NestedSequence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    Phoneme,
    Position,
    Stop,
    NestedSequence,
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::Phoneme(_) => InstructionKind::Phoneme,
            Instruction::Position(_) => InstructionKind::Position,
            Instruction::Stop(_) => InstructionKind::Stop,
            Instruction::NestedSequence(_) => InstructionKind::NestedSequence,
        }
    }
}

/// An instruction with its place on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedInstruction {
    pub offset: Duration,
    /// Uniform move time for this instruction's send. Always `None` for
    /// nested-sequence triggers.
    pub move_time_ms: Option<u32>,
    pub instruction: Instruction,
}

impl TimedInstruction {
    /// Decodes one source row (`time,instruction,arg_1,arg_2`).
    pub fn from_row(
        fields: &[String],
        line: usize,
        default_move_time_ms: u32,
        limits: &ServoLimits,
    ) -> Result<Self, LoadError> {
        let parse_err = |reason: String| LoadError::Parse { line, reason };

        if fields.len() < 3 {
            return Err(parse_err(format!(
                "expected at least 3 fields, got {}",
                fields.len()
            )));
        }

        let time: f64 = fields[0]
            .trim()
            .parse()
            .map_err(|_| parse_err(format!("invalid time {:?}", fields[0])))?;
        // Rejects NaN, negatives and offsets beyond Duration's range.
        let offset = Duration::try_from_secs_f64(time)
            .map_err(|_| parse_err(format!("time must be a representable non-negative duration, got {time}")))?;

        let tag = fields[1].trim().to_ascii_uppercase();
        let arg = fields[2].trim();
        let move_time_ms = match fields.get(3).map(|field| field.trim()) {
            None | Some("") => default_move_time_ms,
            Some(raw) => raw
                .parse()
                .map_err(|_| parse_err(format!("invalid move time {raw:?}")))?,
        };

        let instruction = match tag.as_str() {
            "PHONEME" => Instruction::Phoneme(arg.to_string()),
            "POSITION" => {
                let value: Value = serde_json::from_str(arg)
                    .map_err(|e| parse_err(format!("invalid position payload: {e}")))?;
                let positions = ServoPositions::from_json(&value, limits)
                    .ok_or_else(|| parse_err("position payload is not an object".to_string()))?;
                Instruction::Position(positions)
            }
            "STOP" => Instruction::Stop(decode_servo_list(arg, line)?),
            "PARALLEL_SEQUENCE" => Instruction::NestedSequence(arg.to_string()),
            other => {
                return Err(parse_err(format!("unknown instruction tag {other:?}")));
            }
        };

        // Nested triggers have no send of their own, so no move time.
        let move_time_ms = match instruction {
            Instruction::NestedSequence(_) => None,
            _ => Some(move_time_ms),
        };

        Ok(Self {
            offset,
            move_time_ms,
            instruction,
        })
    }
}

fn decode_servo_list(arg: &str, line: usize) -> Result<BTreeSet<Servo>, LoadError> {
    let value: Value = serde_json::from_str(arg).map_err(|e| LoadError::Parse {
        line,
        reason: format!("invalid servo list: {e}"),
    })?;
    let pins = value.as_array().ok_or_else(|| LoadError::Parse {
        line,
        reason: "servo list is not an array".to_string(),
    })?;

    let mut servos = BTreeSet::new();
    for pin in pins {
        let servo = pin
            .as_u64()
            .and_then(|p| u8::try_from(p).ok())
            .and_then(|p| Servo::try_from(p).ok());
        match servo {
            Some(servo) => {
                servos.insert(servo);
            }
            None => tracing::warn!(%pin, line, "ignoring unknown servo in stop list"),
        }
    }
    Ok(servos)
}
