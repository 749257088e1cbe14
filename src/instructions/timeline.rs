//! Time-ordered instruction storage for one playable sequence.

use std::collections::BTreeMap;
use std::time::Duration;

use super::instruction::{Instruction, InstructionKind, TimedInstruction};

/// Instructions keyed by time offset, at most one per kind per offset.
///
/// Inserting applies the per-kind merge policy: a `Position` landing on an
/// existing `Position` at the same offset merges its entries in
/// (last-merged-wins, field-level union); every other kind replaces the
/// existing instruction in place. Iteration is strictly time-ascending,
/// with same-offset instructions in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    entries: BTreeMap<u64, Vec<TimedInstruction>>,
}

fn key(offset: Duration) -> u64 {
    offset.as_micros() as u64
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instruction: TimedInstruction) {
        let slot = self.entries.entry(key(instruction.offset)).or_default();
        let kind = instruction.instruction.kind();

        match slot.iter_mut().find(|held| held.instruction.kind() == kind) {
            Some(held) => {
                if let (
                    Instruction::Position(existing),
                    Instruction::Position(incoming),
                ) = (&held.instruction, &instruction.instruction)
                {
                    held.instruction = Instruction::Position(existing.merge(incoming));
                    held.move_time_ms = instruction.move_time_ms;
                } else {
                    *held = instruction;
                }
            }
            None => slot.push(instruction),
        }
    }

    /// Folds another timeline in entry-wise, applying the same per-kind
    /// policy at colliding offsets.
    pub fn merge(&mut self, other: Timeline) {
        for (_, slot) in other.entries {
            for instruction in slot {
                self.insert(instruction);
            }
        }
    }

    /// Returns this timeline with every offset moved later by `by`.
    pub fn shifted(self, by: Duration) -> Timeline {
        let mut shifted = Timeline::new();
        for (_, slot) in self.entries {
            for mut instruction in slot {
                instruction.offset += by;
                shifted.insert(instruction);
            }
        }
        shifted
    }

    /// Removes nested-sequence triggers. Used when nested references have
    /// been merged into this timeline instead.
    pub fn drop_nested_triggers(&mut self) {
        for slot in self.entries.values_mut() {
            slot.retain(|held| held.instruction.kind() != InstructionKind::NestedSequence);
        }
        self.entries.retain(|_, slot| !slot.is_empty());
    }

    /// Time-ascending iteration over `(offset, same-offset instructions)`.
    pub fn iter(&self) -> impl Iterator<Item = (Duration, &[TimedInstruction])> {
        self.entries
            .iter()
            .map(|(micros, slot)| (Duration::from_micros(*micros), slot.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct time offsets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl FromIterator<TimedInstruction> for Timeline {
    fn from_iter<I: IntoIterator<Item = TimedInstruction>>(iter: I) -> Self {
        let mut timeline = Timeline::new();
        for instruction in iter {
            timeline.insert(instruction);
        }
        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::{PositionEntry, Servo, ServoLimits, ServoPositions};
    use std::collections::{BTreeMap, BTreeSet};

    fn positions(entries: &[(Servo, i32)]) -> ServoPositions {
        let raw: BTreeMap<_, _> = entries
            .iter()
            .map(|&(servo, pos)| (servo, PositionEntry::new(pos)))
            .collect();
        // Default limits clamp; use in-range values in tests.
        ServoPositions::new(raw, &ServoLimits::default())
    }

    fn at(secs: f64, instruction: Instruction) -> TimedInstruction {
        TimedInstruction {
            offset: Duration::from_secs_f64(secs),
            move_time_ms: Some(100),
            instruction,
        }
    }

    #[test]
    fn iteration_is_time_ascending() {
        let timeline: Timeline = [
            at(1.5, Instruction::Phoneme("AI".into())),
            at(0.0, Instruction::Phoneme("REST".into())),
            at(0.5, Instruction::Phoneme("O".into())),
        ]
        .into_iter()
        .collect();

        let offsets: Vec<_> = timeline.iter().map(|(offset, _)| offset).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1500)
            ]
        );
    }

    #[test]
    fn one_instruction_per_kind_per_offset() {
        let mut timeline = Timeline::new();
        timeline.insert(at(1.0, Instruction::Phoneme("AI".into())));
        timeline.insert(at(1.0, Instruction::Phoneme("O".into())));
        timeline.insert(at(1.0, Instruction::Stop(BTreeSet::from([Servo::Jaw]))));

        let (_, slot) = timeline.iter().next().unwrap();
        assert_eq!(slot.len(), 2);
        // Later phoneme replaced the earlier one, in place.
        assert_eq!(slot[0].instruction, Instruction::Phoneme("O".into()));
    }

    #[test]
    fn positions_merge_at_same_offset() {
        let mut timeline = Timeline::new();
        timeline.insert(at(
            2.0,
            Instruction::Position(positions(&[(Servo::Jaw, 1500), (Servo::EyesX, 1400)])),
        ));
        timeline.insert(at(2.0, Instruction::Position(positions(&[(Servo::Jaw, 1550)]))));

        let (_, slot) = timeline.iter().next().unwrap();
        let Instruction::Position(merged) = &slot[0].instruction else {
            panic!("expected position instruction");
        };
        // Last-merged wins per servo; untouched servos survive.
        assert_eq!(merged.get(Servo::Jaw).unwrap().position, 1550);
        assert_eq!(merged.get(Servo::EyesX).unwrap().position, 1400);
    }

    #[test]
    fn merge_folds_other_timeline_in() {
        let mut base: Timeline =
            [at(0.0, Instruction::Phoneme("REST".into()))].into_iter().collect();
        let other: Timeline = [
            at(0.0, Instruction::Stop(BTreeSet::from([Servo::Jaw]))),
            at(1.0, Instruction::Phoneme("AI".into())),
        ]
        .into_iter()
        .collect();

        base.merge(other);
        assert_eq!(base.len(), 2);
        assert_eq!(base.instruction_count(), 3);
    }

    #[test]
    fn shifted_moves_offsets_later() {
        let timeline: Timeline =
            [at(0.5, Instruction::Phoneme("AI".into()))].into_iter().collect();
        let shifted = timeline.shifted(Duration::from_secs(2));
        let (offset, _) = shifted.iter().next().unwrap();
        assert_eq!(offset, Duration::from_millis(2500));
    }

    #[test]
    fn drop_nested_triggers_removes_only_triggers() {
        let mut timeline: Timeline = [
            at(0.0, Instruction::Phoneme("REST".into())),
            at(0.0, Instruction::NestedSequence("blink.csv".into())),
            at(1.0, Instruction::NestedSequence("nod.csv".into())),
        ]
        .into_iter()
        .collect();

        timeline.drop_nested_triggers();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.instruction_count(), 1);
    }
}
