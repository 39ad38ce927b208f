// Chord qualities and chord symbols.
//
// A `ChordSymbol` is the unit the whole pipeline trades in: the derivation
// engine produces them from grammar leaves, the substitution rules rewrite
// them, the voice-leading model reads their guide tones, and the CLI prints
// them. This module provides:
// - The 11 chord qualities with their interval tables and display suffixes
// - Derived queries (third, fifth, seventh, pitch-class set, MIDI notes)
// - Canonical text encoding and a total parser (bad input yields C maj7)
// - Roman-numeral analysis relative to a key
// - Pitch-set chord recognition by template matching
//
// Chord text uses flat spellings throughout ("Bb7", "Ebmaj7", "Db7/F").

use crate::pitch::PitchClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of chord qualities the grammar and substitution rules use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChordQuality {
    Maj7,
    Min7,
    Dom7,
    /// Half-diminished, written m7b5.
    HalfDim7,
    Dim7,
    Aug,
    MinMaj7,
    Maj6,
    Min6,
    Sus4,
    Sus2,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 11] = [
        ChordQuality::Maj7,
        ChordQuality::Min7,
        ChordQuality::Dom7,
        ChordQuality::HalfDim7,
        ChordQuality::Dim7,
        ChordQuality::Aug,
        ChordQuality::MinMaj7,
        ChordQuality::Maj6,
        ChordQuality::Min6,
        ChordQuality::Sus4,
        ChordQuality::Sus2,
    ];

    /// Semitone offsets from the root, lowest first. Augmented is the only
    /// three-note quality.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Maj7 => &[0, 4, 7, 11],
            ChordQuality::Min7 => &[0, 3, 7, 10],
            ChordQuality::Dom7 => &[0, 4, 7, 10],
            ChordQuality::HalfDim7 => &[0, 3, 6, 10],
            ChordQuality::Dim7 => &[0, 3, 6, 9],
            ChordQuality::Aug => &[0, 4, 8],
            ChordQuality::MinMaj7 => &[0, 3, 7, 11],
            ChordQuality::Maj6 => &[0, 4, 7, 9],
            ChordQuality::Min6 => &[0, 3, 7, 9],
            ChordQuality::Sus4 => &[0, 5, 7, 10],
            ChordQuality::Sus2 => &[0, 2, 7, 10],
        }
    }

    /// Canonical display suffix ("maj7", "m7", "7", ...).
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Maj7 => "maj7",
            ChordQuality::Min7 => "m7",
            ChordQuality::Dom7 => "7",
            ChordQuality::HalfDim7 => "m7b5",
            ChordQuality::Dim7 => "dim7",
            ChordQuality::Aug => "aug",
            ChordQuality::MinMaj7 => "mMaj7",
            ChordQuality::Maj6 => "6",
            ChordQuality::Min6 => "m6",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Sus2 => "sus2",
        }
    }

    pub fn is_minor(self) -> bool {
        matches!(
            self,
            ChordQuality::Min7 | ChordQuality::HalfDim7 | ChordQuality::Min6 | ChordQuality::MinMaj7
        )
    }

    /// Tonic-function qualities a dominant can resolve to.
    pub fn is_tonic(self) -> bool {
        matches!(self, ChordQuality::Maj7 | ChordQuality::Maj6)
    }
}

/// Quality tokens accepted by the parser, most specific first. The first
/// token that prefixes the text after the root wins.
const QUALITY_TOKENS: [(&str, ChordQuality); 23] = [
    ("maj7", ChordQuality::Maj7),
    ("Maj7", ChordQuality::Maj7),
    ("M7", ChordQuality::Maj7),
    ("Δ7", ChordQuality::Maj7),
    ("Δ", ChordQuality::Maj7),
    ("mMaj7", ChordQuality::MinMaj7),
    ("m7b5", ChordQuality::HalfDim7),
    ("m7-5", ChordQuality::HalfDim7),
    ("ø7", ChordQuality::HalfDim7),
    ("ø", ChordQuality::HalfDim7),
    ("dim7", ChordQuality::Dim7),
    ("o7", ChordQuality::Dim7),
    ("min7", ChordQuality::Min7),
    ("m7", ChordQuality::Min7),
    ("-7", ChordQuality::Min7),
    ("min6", ChordQuality::Min6),
    ("m6", ChordQuality::Min6),
    ("6", ChordQuality::Maj6),
    ("aug", ChordQuality::Aug),
    ("+", ChordQuality::Aug),
    ("sus4", ChordQuality::Sus4),
    ("sus2", ChordQuality::Sus2),
    ("7", ChordQuality::Dom7),
];

pub const MIN_DURATION: f64 = 0.5;
pub const MAX_DURATION: f64 = 8.0;
pub const DEFAULT_DURATION: f64 = 2.0;

/// A jazz chord symbol: root, quality, optional tensions, optional slash bass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSymbol {
    pub root: PitchClass,
    pub quality: ChordQuality,
    /// Tension degrees from {9, 11, 13}, in the order they were added.
    extensions: Vec<u8>,
    /// Degree -> -1 (flat) or +1 (sharp). Unaltered degrees are absent.
    alterations: BTreeMap<u8, i8>,
    bass: Option<PitchClass>,
    /// Length in beats, kept within [MIN_DURATION, MAX_DURATION].
    duration: f64,
}

impl ChordSymbol {
    pub fn new(root: PitchClass, quality: ChordQuality) -> Self {
        ChordSymbol {
            root,
            quality,
            extensions: Vec::new(),
            alterations: BTreeMap::new(),
            bass: None,
            duration: DEFAULT_DURATION,
        }
    }

    pub fn extensions(&self) -> &[u8] {
        &self.extensions
    }

    pub fn alterations(&self) -> &BTreeMap<u8, i8> {
        &self.alterations
    }

    pub fn alteration(&self, degree: u8) -> i8 {
        self.alterations.get(&degree).copied().unwrap_or(0)
    }

    pub fn bass(&self) -> Option<PitchClass> {
        self.bass
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Add a tension. Degrees other than 9, 11, 13 and repeats are ignored.
    pub fn add_extension(&mut self, degree: u8) {
        if matches!(degree, 9 | 11 | 13) && !self.extensions.contains(&degree) {
            self.extensions.push(degree);
        }
    }

    /// Set a degree's alteration. The sign is all that matters; zero clears it.
    /// Altering 9, 11 or 13 also adds that tension.
    pub fn set_alteration(&mut self, degree: u8, alteration: i8) {
        match alteration.signum() {
            0 => {
                self.alterations.remove(&degree);
            }
            s => {
                self.add_extension(degree);
                self.alterations.insert(degree, s);
            }
        }
    }

    pub fn set_bass(&mut self, bass: Option<PitchClass>) {
        self.bass = bass;
    }

    pub fn set_duration(&mut self, beats: f64) {
        self.duration = if beats.is_nan() {
            DEFAULT_DURATION
        } else {
            beats.clamp(MIN_DURATION, MAX_DURATION)
        };
    }

    pub fn with_duration(mut self, beats: f64) -> Self {
        self.set_duration(beats);
        self
    }

    pub fn third(&self) -> PitchClass {
        let iv = self.quality.intervals();
        self.root.transpose(iv.get(1).copied().unwrap_or(4) as i32)
    }

    /// Fifth including any b5/#5 alteration.
    pub fn fifth(&self) -> PitchClass {
        let iv = self.quality.intervals();
        let base = iv.get(2).copied().unwrap_or(7) as i32;
        self.root.transpose(base + self.alteration(5) as i32)
    }

    /// Seventh, or a minor seventh above the root for triads.
    pub fn seventh(&self) -> PitchClass {
        let iv = self.quality.intervals();
        self.root.transpose(iv.get(3).copied().unwrap_or(10) as i32)
    }

    /// Guide tones (third, seventh).
    pub fn guide_tones(&self) -> (PitchClass, PitchClass) {
        (self.third(), self.seventh())
    }

    /// Chord tones followed by tensions (9 -> 2, 11 -> 5, 13 -> 9 semitones,
    /// each shifted by its alteration).
    pub fn pitch_classes(&self) -> Vec<PitchClass> {
        let mut out: Vec<PitchClass> = self
            .quality
            .intervals()
            .iter()
            .map(|&i| self.root.transpose(i as i32))
            .collect();
        for &ext in &self.extensions {
            let base = match ext {
                9 => 2,
                11 => 5,
                13 => 9,
                _ => continue,
            };
            out.push(self.root.transpose(base + self.alteration(ext) as i32));
        }
        out
    }

    /// Close-position MIDI notes of the basic chord, root in `base_octave`
    /// (octave 3 puts C at MIDI 48).
    pub fn midi_notes(&self, base_octave: i32) -> Vec<i32> {
        let base = (base_octave + 1) * 12 + self.root.value() as i32;
        self.quality
            .intervals()
            .iter()
            .map(|&i| base + i as i32)
            .collect()
    }

    /// Shift root and bass together.
    pub fn transpose(&self, semitones: i32) -> ChordSymbol {
        let mut out = self.clone();
        out.root = self.root.transpose(semitones);
        out.bass = self.bass.map(|b| b.transpose(semitones));
        out
    }

    /// Same chord a tritone away. Guide tones are preserved (swapped) for
    /// dominants. The slash bass is dropped.
    pub fn tritone_substitute(&self) -> ChordSymbol {
        let mut out = self.clone();
        out.root = self.root.transpose(6);
        out.bass = None;
        out
    }

    /// Roman-numeral analysis against `key`, e.g. "ii" + "m7" for Dm7 in C.
    pub fn roman_numeral(&self, key: PitchClass) -> String {
        const NUMERALS: [&str; 12] = [
            "I", "bII", "II", "bIII", "III", "IV", "#IV", "V", "bVI", "VI", "bVII", "VII",
        ];
        let base = NUMERALS[key.interval_to(self.root) as usize];
        let numeral = if self.quality.is_minor() {
            base.to_lowercase()
        } else {
            base.to_string()
        };
        format!("{numeral}{}", self.quality.suffix())
    }

    /// Total parser. Anything without a leading root letter yields C maj7;
    /// a root with no recognised quality token is a dominant seventh.
    pub fn parse(text: &str) -> ChordSymbol {
        let text = text.trim();
        let Some((root, rest)) = split_root(text) else {
            return ChordSymbol::default();
        };

        let (body, bass) = match rest.split_once('/') {
            Some((body, bass)) => (body, PitchClass::from_name(bass)),
            None => (rest, None),
        };

        let (quality, remainder) = QUALITY_TOKENS
            .iter()
            .find_map(|&(token, q)| body.strip_prefix(token).map(|r| (q, r)))
            .unwrap_or((ChordQuality::Dom7, body));

        let mut chord = ChordSymbol::new(root, quality);
        chord.bass = bass;

        for (alteration, degree) in scan_tensions(remainder) {
            chord.add_extension(degree);
            if alteration != 0 {
                chord.set_alteration(degree, alteration);
            }
        }

        if remainder.contains("b5") {
            chord.set_alteration(5, -1);
        } else if remainder.contains("#5") {
            chord.set_alteration(5, 1);
        }

        chord
    }
}

impl Default for ChordSymbol {
    /// C maj7, two beats.
    fn default() -> Self {
        ChordSymbol::new(PitchClass::default(), ChordQuality::Maj7)
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.suffix())?;
        // Altered fifths first, then tensions in the order they were added.
        for (&degree, &alt) in &self.alterations {
            if !self.extensions.contains(&degree) {
                write!(f, "{}{degree}", alteration_sign(alt))?;
            }
        }
        for &ext in &self.extensions {
            match self.alterations.get(&ext) {
                Some(&alt) => write!(f, "{}{ext}", alteration_sign(alt))?,
                None => write!(f, "({ext})")?,
            }
        }
        match self.bass {
            Some(bass) if bass != self.root => write!(f, "/{bass}"),
            _ => Ok(()),
        }
    }
}

fn alteration_sign(alt: i8) -> &'static str {
    if alt < 0 { "b" } else { "#" }
}

/// Split "Bb7/D" into (Bb, "7/D"). The root is a letter A-G plus an optional
/// '#' or 'b'.
fn split_root(text: &str) -> Option<(PitchClass, &str)> {
    let first = text.chars().next()?;
    if !('A'..='G').contains(&first) {
        return None;
    }
    let len = match text[1..].chars().next() {
        Some('#') | Some('b') => 2,
        _ => 1,
    };
    let root = PitchClass::from_name(&text[..len])?;
    Some((root, &text[len..]))
}

/// Leftmost, non-overlapping matches of an optional 'b'/'#' followed by
/// 9, 11 or 13. Returns (alteration, degree) pairs.
fn scan_tensions(text: &str) -> Vec<(i8, u8)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let sign = match bytes[i] {
            b'b' => -1,
            b'#' => 1,
            _ => 0,
        };
        let signed = if sign != 0 {
            degree_at(&bytes[i + 1..])
        } else {
            None
        };
        if let Some((degree, len)) = signed {
            found.push((sign, degree));
            i += 1 + len;
        } else if let Some((degree, len)) = degree_at(&bytes[i..]) {
            found.push((0, degree));
            i += len;
        } else {
            i += 1;
        }
    }
    found
}

fn degree_at(bytes: &[u8]) -> Option<(u8, usize)> {
    if bytes.starts_with(b"9") {
        Some((9, 1))
    } else if bytes.starts_with(b"11") {
        Some((11, 2))
    } else if bytes.starts_with(b"13") {
        Some((13, 2))
    } else {
        None
    }
}

/// Template for pitch-set recognition: quality plus a preference bonus.
/// Dominant sevenths get the largest bonus.
const RECOGNITION_TEMPLATES: [(ChordQuality, i32); 11] = [
    (ChordQuality::Maj7, 10),
    (ChordQuality::Min7, 10),
    (ChordQuality::Dom7, 12),
    (ChordQuality::HalfDim7, 8),
    (ChordQuality::Dim7, 6),
    (ChordQuality::MinMaj7, 5),
    (ChordQuality::Aug, 4),
    (ChordQuality::Maj6, 7),
    (ChordQuality::Min6, 7),
    (ChordQuality::Sus4, 6),
    (ChordQuality::Sus2, 6),
];

/// Best-fit chord for an unordered set of MIDI notes.
///
/// Every root and template is tried; score is 10 per matched interval plus
/// the template bonus, plus 5 when the root is the lowest sounding note.
/// Four-note templates need at least three matches and triads need all
/// three. Ties keep the earlier (root, template) pair. Empty input gives
/// C maj7; a set no template accepts gives a dominant seventh on the bass.
pub fn recognize_chord(midi_notes: &[u8]) -> ChordSymbol {
    let Some(&lowest) = midi_notes.iter().min() else {
        return ChordSymbol::default();
    };
    let bass = lowest % 12;
    let mut present = [false; 12];
    for &n in midi_notes {
        present[(n % 12) as usize] = true;
    }

    let mut best = (bass, ChordQuality::Dom7);
    let mut best_score = -1;
    for root in 0..12u8 {
        for &(quality, bonus) in &RECOGNITION_TEMPLATES {
            let intervals = quality.intervals();
            let matches = intervals
                .iter()
                .filter(|&&iv| present[((root + iv) % 12) as usize])
                .count();
            let mut score = matches as i32 * 10 + bonus;
            if root == bass {
                score += 5;
            }
            let acceptable = if intervals.len() >= 4 {
                matches >= 3
            } else {
                matches == intervals.len()
            };
            if acceptable && score > best_score {
                best_score = score;
                best = (root, quality);
            }
        }
    }
    ChordSymbol::new(PitchClass::from(best.0), best.1)
}

/// Lay chords out as lead-sheet lines, `bars_per_line` chords per line,
/// separated by " | ".
pub fn format_progression(chords: &[ChordSymbol], bars_per_line: usize) -> String {
    let per_line = bars_per_line.max(1);
    chords
        .chunks(per_line)
        .map(|line| {
            line.iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
