// Pitch classes: the twelve chromatic steps under mod-12 arithmetic.
//
// Every root, bass note, guide tone and key in the crate is a `PitchClass`.
// The value is normalized into [0, 12) at construction, so transposition by
// any signed amount (including multiples of 12) is total and never needs a
// range check downstream.
//
// Consumed by chord.rs (roots, bass, pitch-class sets), grammar.rs (key
// contexts), and voice_leading.rs (guide-tone distances).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sharp spellings indexed by pitch-class value.
const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Flat spellings indexed by pitch-class value.
const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Every accepted spelling, including the enharmonic oddities (B#, Fb, E#, Cb).
const NAME_TABLE: [(&str, u8); 21] = [
    ("C", 0),
    ("B#", 0),
    ("C#", 1),
    ("Db", 1),
    ("D", 2),
    ("D#", 3),
    ("Eb", 3),
    ("E", 4),
    ("Fb", 4),
    ("F", 5),
    ("E#", 5),
    ("F#", 6),
    ("Gb", 6),
    ("G", 7),
    ("G#", 8),
    ("Ab", 8),
    ("A", 9),
    ("A#", 10),
    ("Bb", 10),
    ("B", 11),
    ("Cb", 11),
];

/// A pitch class in [0, 12). C = 0, C#/Db = 1, ..., B = 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub struct PitchClass(u8);

pub const C: PitchClass = PitchClass(0);
pub const DB: PitchClass = PitchClass(1);
pub const D: PitchClass = PitchClass(2);
pub const EB: PitchClass = PitchClass(3);
pub const E: PitchClass = PitchClass(4);
pub const F: PitchClass = PitchClass(5);
pub const GB: PitchClass = PitchClass(6);
pub const G: PitchClass = PitchClass(7);
pub const AB: PitchClass = PitchClass(8);
pub const A: PitchClass = PitchClass(9);
pub const BB: PitchClass = PitchClass(10);
pub const B: PitchClass = PitchClass(11);

impl PitchClass {
    /// Build from any integer; the value wraps into [0, 12).
    pub fn new(value: i32) -> Self {
        PitchClass(value.rem_euclid(12) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Look up a note name such as "C", "F#", "Bb", or "Cb".
    /// Returns `None` for anything outside the spelling table.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        NAME_TABLE
            .iter()
            .find(|(spelling, _)| *spelling == name)
            .map(|&(_, value)| PitchClass(value))
    }

    /// Spelling of this pitch class, flat or sharp.
    pub fn name(self, prefer_flat: bool) -> &'static str {
        if prefer_flat {
            FLAT_NAMES[self.0 as usize]
        } else {
            SHARP_NAMES[self.0 as usize]
        }
    }

    /// Move by a signed number of semitones. Any offset is accepted.
    pub fn transpose(self, semitones: i32) -> Self {
        PitchClass::new(self.0 as i32 + semitones.rem_euclid(12))
    }

    /// Ascending distance to `other`, in [0, 12).
    pub fn interval_to(self, other: PitchClass) -> u8 {
        (other.0 + 12 - self.0) % 12
    }

    /// Shortest distance in either direction, in [0, 6].
    pub fn min_distance(self, other: PitchClass) -> u8 {
        let up = self.interval_to(other);
        up.min(12 - up)
    }

    /// Equal-tempered frequency in Hz with A4 = 440.
    pub fn frequency(self, octave: i32) -> f64 {
        let midi = (octave + 1) * 12 + self.0 as i32;
        440.0 * 2f64.powf((midi - 69) as f64 / 12.0)
    }
}

impl From<u8> for PitchClass {
    fn from(value: u8) -> Self {
        PitchClass(value % 12)
    }
}

impl From<PitchClass> for u8 {
    fn from(pc: PitchClass) -> Self {
        pc.0
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_stays_in_range() {
        for start in 0..12 {
            let pc = PitchClass::new(start);
            for n in -40..40 {
                assert!(pc.transpose(n).value() < 12);
            }
            for n in [i32::MAX, i32::MIN, i32::MAX - 11, i32::MIN + 1] {
                assert!(pc.transpose(n).value() < 12);
            }
        }
        // i32::MAX is 7 mod 12, i32::MIN is 4 mod 12.
        assert_eq!(B.transpose(i32::MAX), GB);
        assert_eq!(B.transpose(i32::MIN), EB);
    }

    #[test]
    fn test_transpose_by_octave_is_identity() {
        for start in 0..12 {
            let pc = PitchClass::new(start);
            assert_eq!(pc.transpose(12), pc);
            assert_eq!(pc.transpose(-12), pc);
        }
    }

    #[test]
    fn test_negative_values_wrap() {
        assert_eq!(PitchClass::new(-1), B);
        assert_eq!(PitchClass::new(-13), B);
        assert_eq!(PitchClass::new(25), DB);
    }

    #[test]
    fn test_interval_to_is_ascending() {
        assert_eq!(C.interval_to(G), 7);
        assert_eq!(G.interval_to(C), 5);
        assert_eq!(E.interval_to(E), 0);
    }

    #[test]
    fn test_min_distance() {
        assert_eq!(C.min_distance(B), 1);
        assert_eq!(C.min_distance(GB), 6);
        assert_eq!(F.min_distance(E), 1);
    }

    #[test]
    fn test_name_lookup_both_ways() {
        assert_eq!(PitchClass::from_name("Bb"), Some(BB));
        assert_eq!(PitchClass::from_name("A#"), Some(BB));
        assert_eq!(PitchClass::from_name("Cb"), Some(B));
        assert_eq!(PitchClass::from_name("E#"), Some(F));
        assert_eq!(PitchClass::from_name("H"), None);
        assert_eq!(BB.name(true), "Bb");
        assert_eq!(BB.name(false), "A#");
        for v in 0..12 {
            let pc = PitchClass::new(v);
            assert_eq!(PitchClass::from_name(pc.name(true)), Some(pc));
            assert_eq!(PitchClass::from_name(pc.name(false)), Some(pc));
        }
    }

    #[test]
    fn test_frequency_a440() {
        assert!((A.frequency(4) - 440.0).abs() < 1e-9);
        assert!((C.frequency(4) - 261.6256).abs() < 1e-3);
    }
}
