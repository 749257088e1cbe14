//! Phoneme to mouth-shape mapping.
//!
//! Shapes follow the Preston Blair phoneme set as produced by Papagayo
//! lip-sync exports. Raw values predate the current limit table and are
//! clamped when the map is built.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use super::limits::ServoLimits;
use super::map::Servo;
use super::positions::{PositionEntry, ServoPositions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phoneme {
    Rest,
    Ai,
    Etc,
    E,
    O,
    U,
    L,
    Fv,
    Mbp,
    Wq,
    Closed,
}

impl FromStr for Phoneme {
    type Err = UnknownPhoneme;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_uppercase().as_str() {
            "REST" => Ok(Phoneme::Rest),
            "AI" => Ok(Phoneme::Ai),
            "ETC" => Ok(Phoneme::Etc),
            "E" => Ok(Phoneme::E),
            "O" => Ok(Phoneme::O),
            "U" => Ok(Phoneme::U),
            "L" => Ok(Phoneme::L),
            "FV" => Ok(Phoneme::Fv),
            "MBP" => Ok(Phoneme::Mbp),
            "WQ" => Ok(Phoneme::Wq),
            "CLOSED" => Ok(Phoneme::Closed),
            _ => Err(UnknownPhoneme(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phoneme {0:?}")]
pub struct UnknownPhoneme(pub String);

/// Phoneme → clamped mouth positions.
#[derive(Debug, Clone)]
pub struct PhonemeMap {
    shapes: HashMap<Phoneme, ServoPositions>,
}

impl PhonemeMap {
    pub fn new(limits: &ServoLimits) -> Self {
        let mut shapes = HashMap::new();
        let mut shape = |phoneme, jaw, lips_upper, lips_lower, lips_left, lips_right| {
            let raw = BTreeMap::from([
                (Servo::Jaw, PositionEntry::new(jaw)),
                (Servo::LipsUpper, PositionEntry::new(lips_upper)),
                (Servo::LipsLower, PositionEntry::new(lips_lower)),
                (Servo::LipsLeft, PositionEntry::new(lips_left)),
                (Servo::LipsRight, PositionEntry::new(lips_right)),
            ]);
            shapes.insert(phoneme, ServoPositions::new(raw, limits));
        };
        shape(Phoneme::Closed, 2200, 1363, 1363, 800, 2200);
        shape(Phoneme::Rest, 2200, 1363, 1363, 800, 2200);
        shape(Phoneme::Ai, 1000, 2199, 2199, 800, 2200);
        shape(Phoneme::Etc, 1832, 2196, 2196, 800, 2200);
        shape(Phoneme::E, 1832, 2196, 2196, 800, 2200);
        shape(Phoneme::O, 1000, 2130, 2130, 1916, 1083);
        shape(Phoneme::U, 1859, 1024, 1024, 2112, 887);
        shape(Phoneme::L, 1190, 2105, 2105, 1014, 1985);
        shape(Phoneme::Fv, 1663, 1260, 1260, 817, 2182);
        shape(Phoneme::Mbp, 2200, 933, 933, 1039, 1960);
        shape(Phoneme::Wq, 2200, 1151, 1151, 2199, 800);
        Self { shapes }
    }

    pub fn get(&self, phoneme: Phoneme) -> Option<&ServoPositions> {
        self.shapes.get(&phoneme)
    }

    /// Resolves a phoneme name straight to positions.
    pub fn lookup(&self, name: &str) -> Result<&ServoPositions, UnknownPhoneme> {
        let phoneme = Phoneme::from_str(name)?;
        self.shapes
            .get(&phoneme)
            .ok_or_else(|| UnknownPhoneme(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phoneme_is_mapped() {
        let map = PhonemeMap::new(&ServoLimits::default());
        for phoneme in [
            Phoneme::Rest,
            Phoneme::Ai,
            Phoneme::Etc,
            Phoneme::E,
            Phoneme::O,
            Phoneme::U,
            Phoneme::L,
            Phoneme::Fv,
            Phoneme::Mbp,
            Phoneme::Wq,
            Phoneme::Closed,
        ] {
            let positions = map.get(phoneme).expect("unmapped phoneme");
            assert_eq!(positions.len(), 5);
        }
    }

    #[test]
    fn shapes_are_clamped() {
        let limits = ServoLimits::default();
        let map = PhonemeMap::new(&limits);
        let rest = map.get(Phoneme::Rest).unwrap();
        // Raw jaw value 2200 exceeds the jaw's travel.
        assert_eq!(rest.get(Servo::Jaw).unwrap().position, 1600);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let map = PhonemeMap::new(&ServoLimits::default());
        assert!(map.lookup("rest").is_ok());
        assert!(map.lookup("MBP").is_ok());
        assert!(map.lookup("XYZZY").is_err());
    }
}
