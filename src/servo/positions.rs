//! A single set of target servo positions.
//!
//! Positions are clamped through [`ServoLimits`] when the set is built, so
//! everything downstream (merging, dedup, the wire string) works on values
//! that are already safe to send.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::limits::ServoLimits;
use super::map::Servo;

/// Target for one servo. `speed` is a per-servo rate; when any entry in a
/// set carries a speed, the uniform move time is dropped from the send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEntry {
    pub position: i32,
    pub speed: Option<u32>,
}

impl PositionEntry {
    pub fn new(position: i32) -> Self {
        Self {
            position,
            speed: None,
        }
    }

    pub fn with_speed(position: i32, speed: u32) -> Self {
        Self {
            position,
            speed: Some(speed),
        }
    }
}

/// Ordered servo → target mapping. Iteration (and therefore the wire
/// string) is in pin order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServoPositions {
    positions: BTreeMap<Servo, PositionEntry>,
}

impl ServoPositions {
    /// Builds a set from raw entries, clamping every position.
    pub fn new(raw: BTreeMap<Servo, PositionEntry>, limits: &ServoLimits) -> Self {
        let positions = raw
            .into_iter()
            .map(|(servo, entry)| {
                (
                    servo,
                    PositionEntry {
                        position: limits.clamp(servo, entry.position),
                        speed: entry.speed,
                    },
                )
            })
            .collect();
        Self { positions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes a JSON object of `{pin: position}` or
    /// `{pin: {"position": p, "speed": s}}` entries. Unknown pins and
    /// malformed values fail closed: they are logged and dropped.
    pub fn from_json(value: &Value, limits: &ServoLimits) -> Option<Self> {
        let object = value.as_object()?;
        let mut raw = BTreeMap::new();
        for (key, entry) in object {
            let Some(servo) = key
                .parse::<u8>()
                .ok()
                .and_then(|pin| Servo::try_from(pin).ok())
            else {
                tracing::warn!(pin = %key, "ignoring position for unknown servo");
                continue;
            };
            match Self::decode_entry(entry) {
                Some(decoded) => {
                    raw.insert(servo, decoded);
                }
                None => {
                    tracing::warn!(%servo, %entry, "ignoring malformed position entry");
                }
            }
        }
        Some(Self::new(raw, limits))
    }

    fn decode_entry(value: &Value) -> Option<PositionEntry> {
        if let Some(position) = value.as_i64() {
            return Some(PositionEntry::new(position as i32));
        }
        let object = value.as_object()?;
        let position = object.get("position")?.as_i64()? as i32;
        let speed = match object.get("speed") {
            Some(speed) => Some(speed.as_u64()? as u32),
            None => None,
        };
        Some(PositionEntry { position, speed })
    }

    /// Right-biased union: `other`'s entries win on collision. Pure.
    pub fn merge(&self, other: &Self) -> Self {
        let mut positions = self.positions.clone();
        for (servo, entry) in &other.positions {
            positions.insert(*servo, *entry);
        }
        Self { positions }
    }

    /// Projection excluding the given servos.
    pub fn without(&self, excluded: &BTreeSet<Servo>) -> Self {
        let positions = self
            .positions
            .iter()
            .filter(|(servo, _)| !excluded.contains(servo))
            .map(|(servo, entry)| (*servo, *entry))
            .collect();
        Self { positions }
    }

    /// Removes the given servos in place. Used when a control releases the
    /// servos it was overriding.
    pub fn clear(&mut self, servos: &BTreeSet<Servo>) {
        for servo in servos {
            self.positions.remove(servo);
        }
    }

    /// True iff every entry in `self` has a counterpart in `other` whose
    /// position differs by at most `threshold`. A missing counterpart (or
    /// `other` being `None`) means the send is not redundant. Extra keys in
    /// `other` are irrelevant.
    pub fn within_threshold(&self, other: Option<&Self>, threshold: i32) -> bool {
        let Some(other) = other else {
            return false;
        };
        self.positions.iter().all(|(servo, entry)| {
            other
                .positions
                .get(servo)
                .is_some_and(|last| (entry.position - last.position).abs() <= threshold)
        })
    }

    /// Per-servo dedup filter: keeps entries that are absent from `last` or
    /// differ in position by more than `threshold`.
    pub fn without_duplicates(&self, last: &Self, threshold: i32) -> Self {
        let positions = self
            .positions
            .iter()
            .filter(|(servo, entry)| {
                last.positions
                    .get(servo)
                    .is_none_or(|sent| (entry.position - sent.position).abs() > threshold)
            })
            .map(|(servo, entry)| (*servo, *entry))
            .collect();
        Self { positions }
    }

    /// One `#<pin>P<position>[S<speed>]` token per entry, in pin order.
    pub fn to_wire_string(&self) -> String {
        let mut wire = String::new();
        for (servo, entry) in &self.positions {
            wire.push('#');
            wire.push_str(&servo.pin().to_string());
            wire.push('P');
            wire.push_str(&entry.position.to_string());
            if let Some(speed) = entry.speed {
                wire.push('S');
                wire.push_str(&speed.to_string());
            }
        }
        wire
    }

    /// True if any entry carries a per-servo speed.
    pub fn speed_specified(&self) -> bool {
        self.positions.values().any(|entry| entry.speed.is_some())
    }

    pub fn controlled_servos(&self) -> BTreeSet<Servo> {
        self.positions.keys().copied().collect()
    }

    pub fn get(&self, servo: Servo) -> Option<&PositionEntry> {
        self.positions.get(&servo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Servo, &PositionEntry)> {
        self.positions.iter().map(|(servo, entry)| (*servo, entry))
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unlimited() -> ServoLimits {
        // Wide open table so tests can use small sentinel values.
        let mut table = BTreeMap::new();
        for servo in crate::servo::map::ALL_SERVOS {
            table.insert(
                servo,
                crate::servo::limits::ServoLimit {
                    lower: i32::MIN,
                    mid: 0,
                    upper: i32::MAX,
                },
            );
        }
        ServoLimits::from_table(table)
    }

    fn set(entries: &[(Servo, i32)]) -> ServoPositions {
        let raw = entries
            .iter()
            .map(|&(servo, position)| (servo, PositionEntry::new(position)))
            .collect();
        ServoPositions::new(raw, &unlimited())
    }

    #[test]
    fn positions_are_clamped_on_construction() {
        let limits = ServoLimits::default();
        let raw = BTreeMap::from([(Servo::Jaw, PositionEntry::new(9999))]);
        let positions = ServoPositions::new(raw, &limits);
        assert_eq!(positions.get(Servo::Jaw).unwrap().position, 1600);
    }

    #[test]
    fn merge_is_right_biased() {
        let a = set(&[(Servo::Jaw, 1000), (Servo::LipsUpper, 1100)]);
        let b = set(&[(Servo::Jaw, 1200)]);
        let merged = a.merge(&b);
        assert_eq!(merged.get(Servo::Jaw).unwrap().position, 1200);
        assert_eq!(merged.get(Servo::LipsUpper).unwrap().position, 1100);
        // Inputs untouched.
        assert_eq!(a.get(Servo::Jaw).unwrap().position, 1000);
    }

    #[test]
    fn without_projects_out_servos() {
        let positions = set(&[(Servo::Jaw, 1000), (Servo::EyesX, 1400)]);
        let filtered = positions.without(&BTreeSet::from([Servo::Jaw]));
        assert!(filtered.get(Servo::Jaw).is_none());
        assert_eq!(filtered.get(Servo::EyesX).unwrap().position, 1400);
    }

    #[test]
    fn within_threshold_against_none_is_false() {
        let positions = set(&[(Servo::Jaw, 1000)]);
        assert!(!positions.within_threshold(None, 100));
    }

    #[test]
    fn within_threshold_against_self_is_true() {
        let positions = set(&[(Servo::Jaw, 1000), (Servo::EyesX, 1400)]);
        assert!(positions.within_threshold(Some(&positions), 0));
    }

    #[test]
    fn within_threshold_boundaries() {
        let a = set(&[(Servo::Jaw, 1000)]);
        let b = set(&[(Servo::Jaw, 1003)]);
        assert!(a.within_threshold(Some(&b), 5));
        assert!(!a.within_threshold(Some(&b), 2));
    }

    #[test]
    fn within_threshold_missing_key_is_false() {
        let a = set(&[(Servo::Jaw, 1000), (Servo::EyesX, 1400)]);
        let b = set(&[(Servo::Jaw, 1000)]);
        assert!(!a.within_threshold(Some(&b), 10));
        // Extra keys in the comparison set don't matter.
        assert!(b.within_threshold(Some(&a), 10));
    }

    #[test]
    fn without_duplicates_filters_per_servo() {
        let last = set(&[(Servo::Jaw, 1000), (Servo::EyesX, 1400)]);
        let next = set(&[(Servo::Jaw, 1002), (Servo::EyesX, 1450), (Servo::LipsUpper, 1500)]);
        let to_send = next.without_duplicates(&last, 5);
        assert!(to_send.get(Servo::Jaw).is_none());
        assert_eq!(to_send.get(Servo::EyesX).unwrap().position, 1450);
        assert_eq!(to_send.get(Servo::LipsUpper).unwrap().position, 1500);
    }

    #[test]
    fn wire_string_without_speed() {
        let positions = set(&[(Servo::Jaw, 1500), (Servo::LipsUpper, 1460)]);
        assert_eq!(positions.to_wire_string(), "#0P1500#1P1460");
    }

    #[test]
    fn wire_string_with_speed() {
        let raw = BTreeMap::from([
            (Servo::Jaw, PositionEntry::with_speed(1500, 5)),
            (Servo::LipsUpper, PositionEntry::with_speed(1460, 10)),
        ]);
        let positions = ServoPositions::new(raw, &unlimited());
        assert_eq!(positions.to_wire_string(), "#0P1500S5#1P1460S10");
        assert!(positions.speed_specified());
    }

    #[test]
    fn from_json_scalar_and_structured() {
        let value = json!({"0": 1500, "5": {"position": 1400, "speed": 20}});
        let positions = ServoPositions::from_json(&value, &unlimited()).unwrap();
        assert_eq!(positions.get(Servo::Jaw).unwrap().position, 1500);
        let eyes = positions.get(Servo::EyesX).unwrap();
        assert_eq!(eyes.position, 1400);
        assert_eq!(eyes.speed, Some(20));
    }

    #[test]
    fn from_json_drops_unknown_servos() {
        let value = json!({"0": 1500, "99": 1200, "bogus": 1});
        let positions = ServoPositions::from_json(&value, &unlimited()).unwrap();
        assert_eq!(positions.len(), 1);
        assert!(positions.get(Servo::Jaw).is_some());
    }

    #[test]
    fn clear_removes_servos() {
        let mut positions = set(&[(Servo::Jaw, 1000), (Servo::EyesX, 1400)]);
        positions.clear(&BTreeSet::from([Servo::Jaw, Servo::EyesX]));
        assert!(positions.is_empty());
    }
}
