// Pattern-based reharmonization over a finished chord sequence.
//
// Three rewrites, each scanning the input left to right and comparing every
// chord with the one after it in the *input* (never with an already
// rewritten chord):
// - Backdoor: V7 -> I becomes bVII7 -> I.
// - Tritone: a dominant resolving by fourth or fifth moves its root six
//   semitones, keeping the guide tones.
// - Coltrane: ii-V-I expands into the major-thirds cycle
//   ii, V7/III, IIImaj7, V7/bVI, bVImaj7, V7, Imaj7.
//
// A probability is drawn only where a pattern matches, from the caller's
// `SeedRng`. `apply_substitutions` runs the three in fixed order (backdoor,
// tritone, Coltrane), each behind its own style threshold.

use crate::chord::{ChordQuality, ChordSymbol};
use crate::pitch::PitchClass;
use crate::style::StyleVector;
use jazz_architect_prng::SeedRng;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstitutionKind {
    Backdoor,
    Tritone,
    Coltrane,
}

impl fmt::Display for SubstitutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubstitutionKind::Backdoor => "backdoor",
            SubstitutionKind::Tritone => "tritone",
            SubstitutionKind::Coltrane => "coltrane",
        })
    }
}

/// Output of one rewrite pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub chords: Vec<ChordSymbol>,
    /// How many times the pattern fired.
    pub applied: usize,
}

// ---------------------------------------------------------------------------
// Backdoor dominant
// ---------------------------------------------------------------------------

/// bVII7 of a tonic.
pub fn backdoor_dominant(tonic_root: PitchClass) -> ChordSymbol {
    ChordSymbol::new(tonic_root.transpose(10), ChordQuality::Dom7)
}

/// `chord` is V7 of `next` and `next` is a major tonic.
pub fn can_apply_backdoor(chord: &ChordSymbol, next: &ChordSymbol) -> bool {
    chord.quality == ChordQuality::Dom7
        && chord.root == next.root.transpose(7)
        && next.quality.is_tonic()
}

pub fn apply_backdoor(chords: &[ChordSymbol], probability: f64, rng: &mut SeedRng) -> Rewrite {
    let mut out = Vec::with_capacity(chords.len());
    let mut applied = 0;
    for (i, chord) in chords.iter().enumerate() {
        let eligible = chords
            .get(i + 1)
            .filter(|next| can_apply_backdoor(chord, next));
        match eligible {
            Some(next) if rng.random_bool(probability) => {
                out.push(backdoor_dominant(next.root).with_duration(chord.duration()));
                applied += 1;
            }
            _ => out.push(chord.clone()),
        }
    }
    Rewrite { chords: out, applied }
}

// ---------------------------------------------------------------------------
// Tritone substitution
// ---------------------------------------------------------------------------

/// A dominant whose successor lies a fourth above or a fifth above (i.e.
/// resolves down a fifth or up a fourth).
pub fn resolves_by_fifth(chord: &ChordSymbol, next: &ChordSymbol) -> bool {
    chord.quality == ChordQuality::Dom7 && matches!(chord.root.interval_to(next.root), 5 | 7)
}

pub fn apply_tritone(chords: &[ChordSymbol], probability: f64, rng: &mut SeedRng) -> Rewrite {
    let mut out = Vec::with_capacity(chords.len());
    let mut applied = 0;
    for (i, chord) in chords.iter().enumerate() {
        let eligible = chords
            .get(i + 1)
            .is_some_and(|next| resolves_by_fifth(chord, next));
        if eligible && rng.random_bool(probability) {
            out.push(chord.tritone_substitute());
            applied += 1;
        } else {
            out.push(chord.clone());
        }
    }
    Rewrite { chords: out, applied }
}

// ---------------------------------------------------------------------------
// Coltrane changes
// ---------------------------------------------------------------------------

/// ii min7, V7, and I (maj7 or 6) all in the same key.
pub fn is_ii_v_i(ii: &ChordSymbol, v: &ChordSymbol, i: &ChordSymbol) -> bool {
    ii.quality == ChordQuality::Min7
        && v.quality == ChordQuality::Dom7
        && i.quality.is_tonic()
        && ii.root == i.root.transpose(2)
        && v.root == i.root.transpose(7)
}

/// The three-tonic cycle resolving to `tonic_root`:
/// V7/III, IIImaj7, V7/bVI, bVImaj7, V7, Imaj7.
pub fn coltrane_cycle(tonic_root: PitchClass) -> Vec<ChordSymbol> {
    let third = tonic_root.transpose(4);
    let flat_sixth = tonic_root.transpose(8);
    vec![
        ChordSymbol::new(third.transpose(7), ChordQuality::Dom7),
        ChordSymbol::new(third, ChordQuality::Maj7),
        ChordSymbol::new(flat_sixth.transpose(7), ChordQuality::Dom7),
        ChordSymbol::new(flat_sixth, ChordQuality::Maj7),
        ChordSymbol::new(tonic_root.transpose(7), ChordQuality::Dom7),
        ChordSymbol::new(tonic_root, ChordQuality::Maj7),
    ]
}

/// Expand a ii-V-I into seven chords, keeping the original ii, V and I.
pub fn coltrane_over_ii_v_i(ii: &ChordSymbol, v: &ChordSymbol, i: &ChordSymbol) -> Vec<ChordSymbol> {
    let mut out = vec![ii.clone()];
    out.extend(coltrane_cycle(i.root).into_iter().take(4));
    out.push(v.clone());
    out.push(i.clone());
    out
}

pub fn apply_coltrane(chords: &[ChordSymbol], probability: f64, rng: &mut SeedRng) -> Rewrite {
    let mut out = Vec::with_capacity(chords.len());
    let mut applied = 0;
    let mut i = 0;
    while i < chords.len() {
        let expansion = match &chords[i..] {
            [ii, v, tonic, ..] if is_ii_v_i(ii, v, tonic) && rng.random_bool(probability) => {
                Some(coltrane_over_ii_v_i(ii, v, tonic))
            }
            _ => None,
        };
        match expansion {
            Some(seven) => {
                out.extend(seven);
                applied += 1;
                i += 3;
            }
            None => {
                out.push(chords[i].clone());
                i += 1;
            }
        }
    }
    Rewrite { chords: out, applied }
}

// ---------------------------------------------------------------------------
// Style-gated pipeline
// ---------------------------------------------------------------------------

/// Run backdoor, tritone and Coltrane in that order. Each stage only runs
/// when its style threshold is met:
/// - backdoor when `modal_interchange > 0.2`, at `modal_interchange * 0.3`
/// - tritone when `tritone_sub_prob > 0.1`, at `tritone_sub_prob`
/// - Coltrane when `dominant_chain_depth >= 4` and `chromatic_approach > 0.4`,
///   at `chromatic_approach * 0.15`
///
/// Returns the rewritten sequence and the stages that fired, with counts.
pub fn apply_substitutions(
    chords: &[ChordSymbol],
    style: &StyleVector,
    rng: &mut SeedRng,
) -> (Vec<ChordSymbol>, Vec<(SubstitutionKind, usize)>) {
    let s = style.clone().clamped();
    let mut current = chords.to_vec();
    let mut fired = Vec::new();

    let mut record = |kind: SubstitutionKind, rewrite: Rewrite, current: &mut Vec<ChordSymbol>| {
        if rewrite.applied > 0 {
            tracing::debug!(%kind, count = rewrite.applied, "substitution applied");
            fired.push((kind, rewrite.applied));
        }
        *current = rewrite.chords;
    };

    if s.modal_interchange > 0.2 {
        let r = apply_backdoor(&current, s.modal_interchange * 0.3, rng);
        record(SubstitutionKind::Backdoor, r, &mut current);
    }
    if s.tritone_sub_prob > 0.1 {
        let r = apply_tritone(&current, s.tritone_sub_prob, rng);
        record(SubstitutionKind::Tritone, r, &mut current);
    }
    if s.dominant_chain_depth >= 4 && s.chromatic_approach > 0.4 {
        let r = apply_coltrane(&current, s.chromatic_approach * 0.15, rng);
        record(SubstitutionKind::Coltrane, r, &mut current);
    }

    (current, fired)
}
