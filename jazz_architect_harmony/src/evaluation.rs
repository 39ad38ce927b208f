// Quality metrics for finished progressions.
//
// These are harmony adaptations of the usual symbolic-music evaluation
// measures: entropies over roots, root movements, and chord bigrams; an
// irregularity score against the common jazz root motions; a structureness
// indicator that rewards repeated subsequences; and a functional-coherence
// ratio counting idiomatic moves (V-I, ii-V, plagal arrival and a few
// more). Voice-leading terms come from voice_leading.rs. All entropies
// are base 2.
//
// The aggregate scores are fixed linear blends of the raw metrics, each
// clipped into 0..=1 first, so `overall_score` also lands in 0..=1.

use crate::chord::{ChordQuality, ChordSymbol};
use crate::pitch::PitchClass;
use crate::voice_leading::{average_cost, is_smooth};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Entropy of the chord roots.
    pub pitch_class_entropy: f64,
    /// Entropy of root movements between consecutive chords.
    pub root_entropy: f64,
    pub irregularity: f64,
    pub bigram_entropy: f64,
    pub structureness: f64,
    pub functional_coherence: f64,
    pub voice_leading_cost: f64,
    pub smooth_ratio: f64,
    pub variety: f64,
    pub coherence: f64,
}

impl Evaluation {
    fn empty() -> Self {
        Self {
            pitch_class_entropy: 0.0,
            root_entropy: 0.0,
            irregularity: 0.0,
            bigram_entropy: 0.0,
            structureness: 0.0,
            functional_coherence: 0.0,
            voice_leading_cost: 0.0,
            smooth_ratio: 0.0,
            variety: 0.0,
            coherence: 0.0,
        }
    }

    pub fn overall_score(&self) -> f64 {
        0.2 * self.variety
            + 0.3 * self.coherence
            + 0.2 * (self.pitch_class_entropy / 3.0).min(1.0)
            + 0.15 * (1.0 - (self.voice_leading_cost / 4.0).min(1.0))
            + 0.15 * self.smooth_ratio
    }

    /// Named metric values, in report order.
    pub fn metrics(&self) -> [(&'static str, f64); 11] {
        [
            ("pitch_class_entropy", self.pitch_class_entropy),
            ("root_entropy", self.root_entropy),
            ("cpi", self.irregularity),
            ("bigram_entropy", self.bigram_entropy),
            ("structureness", self.structureness),
            ("functional_coherence", self.functional_coherence),
            ("voice_leading_cost", self.voice_leading_cost),
            ("smooth_ratio", self.smooth_ratio),
            ("variety", self.variety),
            ("coherence", self.coherence),
            ("overall", self.overall_score()),
        ]
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pitch Class Entropy:            {:.3}", self.pitch_class_entropy)?;
        writeln!(f, "Root Movement Entropy:          {:.3}", self.root_entropy)?;
        writeln!(f, "Chord Progression Irregularity: {:.3}", self.irregularity)?;
        writeln!(f, "Bigram Entropy:                 {:.3}", self.bigram_entropy)?;
        writeln!(f, "Structureness Indicator:        {:.3}", self.structureness)?;
        writeln!(f, "Functional Coherence:           {:.3}", self.functional_coherence)?;
        writeln!(f, "Voice Leading Cost:             {:.3}", self.voice_leading_cost)?;
        writeln!(f, "Smooth Transition Ratio:        {:.3}", self.smooth_ratio)?;
        writeln!(f, "---")?;
        writeln!(f, "Variety Score:                  {:.3}", self.variety)?;
        writeln!(f, "Coherence Score:                {:.3}", self.coherence)?;
        write!(f, "Overall Score:                  {:.3}", self.overall_score())
    }
}

// ---------------------------------------------------------------------------
// Raw metrics
// ---------------------------------------------------------------------------

fn entropy<T: Ord>(items: impl IntoIterator<Item = T>) -> f64 {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    let mut total = 0usize;
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

fn movements(chords: &[ChordSymbol]) -> impl Iterator<Item = u8> + '_ {
    chords.windows(2).map(|w| w[0].root.interval_to(w[1].root))
}

pub fn pitch_class_entropy(chords: &[ChordSymbol]) -> f64 {
    entropy(chords.iter().map(|c| c.root))
}

pub fn root_movement_entropy(chords: &[ChordSymbol]) -> f64 {
    entropy(movements(chords))
}

/// Entropy over (root interval, first quality, second quality) triples.
pub fn bigram_entropy(chords: &[ChordSymbol]) -> f64 {
    entropy(
        chords
            .windows(2)
            .map(|w| (w[0].root.interval_to(w[1].root), w[0].quality, w[1].quality)),
    )
}

fn regularity(interval: u8) -> f64 {
    match interval {
        5 => 1.0,
        7 => 0.9,
        2 => 0.8,
        10 => 0.7,
        3 => 0.6,
        4 => 0.5,
        _ => 0.3,
    }
}

/// Mean of (1 - regularity) over root movements; 0 with fewer than two
/// chords.
pub fn progression_irregularity(chords: &[ChordSymbol]) -> f64 {
    if chords.len() < 2 {
        return 0.0;
    }
    let sum: f64 = movements(chords).map(|m| 1.0 - regularity(m)).sum();
    sum / (chords.len() - 1) as f64
}

/// Repetition of (root, quality) subsequences of length 2, 4 and 8, capped at
/// one. Lengths that cannot occur twice are skipped; under four chords the
/// score is 0.
pub fn structureness(chords: &[ChordSymbol]) -> f64 {
    let n = chords.len();
    if n < 4 {
        return 0.0;
    }
    let pattern: Vec<(PitchClass, ChordQuality)> =
        chords.iter().map(|c| (c.root, c.quality)).collect();
    let mut score = 0.0;
    for len in [2usize, 4, 8] {
        if n < len * 2 {
            continue;
        }
        let mut counts: BTreeMap<&[(PitchClass, ChordQuality)], usize> = BTreeMap::new();
        for window in pattern.windows(len) {
            *counts.entry(window).or_insert(0) += 1;
        }
        for &count in counts.values() {
            if count > 1 {
                score += (count - 1) as f64 * len as f64 / n as f64;
            }
        }
    }
    score.min(1.0)
}

fn is_functional_move(a: &ChordSymbol, b: &ChordSymbol, key: PitchClass) -> bool {
    let interval = a.root.interval_to(b.root);
    match (a.quality, b.quality, interval) {
        // Dominant resolving down a fifth.
        (ChordQuality::Dom7, _, 5) => true,
        // ii -> V and vi -> ii.
        (ChordQuality::Min7, ChordQuality::Dom7 | ChordQuality::Min7, 5) => true,
        // Dominant slipping up a half step.
        (ChordQuality::Dom7, _, 1) => true,
        // Plagal arrival on the key.
        (_, _, 7) if b.root == key => true,
        // Tonic to relative minor.
        (_, _, 9) if a.root == key => true,
        _ => false,
    }
}

/// Share of transitions that follow an idiomatic functional move; 1 with
/// fewer than two chords.
pub fn functional_coherence(chords: &[ChordSymbol], key: PitchClass) -> f64 {
    if chords.len() < 2 {
        return 1.0;
    }
    let coherent = chords
        .windows(2)
        .filter(|w| is_functional_move(&w[0], &w[1], key))
        .count();
    coherent as f64 / (chords.len() - 1) as f64
}

/// 0 for a single quality, 1 for five or more.
pub fn quality_variety(chords: &[ChordSymbol]) -> f64 {
    if chords.is_empty() {
        return 0.0;
    }
    let distinct: BTreeSet<ChordQuality> = chords.iter().map(|c| c.quality).collect();
    ((distinct.len() - 1) as f64 / 4.0).min(1.0)
}

/// Share of transitions with guide-tone cost at most 2; 1 with fewer than
/// two chords.
pub fn smooth_ratio(chords: &[ChordSymbol]) -> f64 {
    if chords.len() < 2 {
        return 1.0;
    }
    let smooth = chords.windows(2).filter(|w| is_smooth(&w[0], &w[1])).count();
    smooth as f64 / (chords.len() - 1) as f64
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Evaluate a progression. `key` defaults to the first chord's root.
pub fn evaluate_progression(chords: &[ChordSymbol], key: Option<PitchClass>) -> Evaluation {
    let Some(first) = chords.first() else {
        return Evaluation::empty();
    };
    let key = key.unwrap_or(first.root);

    let h = pitch_class_entropy(chords);
    let bigram_h = bigram_entropy(chords);
    let cpi = progression_irregularity(chords);
    let si = structureness(chords);
    let fc = functional_coherence(chords, key);

    let variety = 0.4 * (h / 2.5).min(1.0)
        + 0.3 * quality_variety(chords)
        + 0.3 * (bigram_h / 3.0).min(1.0);
    let coherence = 0.5 * fc + 0.3 * (1.0 - cpi) + 0.2 * si;

    Evaluation {
        pitch_class_entropy: h,
        root_entropy: root_movement_entropy(chords),
        irregularity: cpi,
        bigram_entropy: bigram_h,
        structureness: si,
        functional_coherence: fc,
        voice_leading_cost: average_cost(chords),
        smooth_ratio: smooth_ratio(chords),
        variety,
        coherence,
    }
}

/// Evaluate two progressions side by side: (metric, first, second).
pub fn compare_progressions(
    a: &[ChordSymbol],
    b: &[ChordSymbol],
    key: Option<PitchClass>,
) -> Vec<(&'static str, f64, f64)> {
    let ea = evaluate_progression(a, key);
    let eb = evaluate_progression(b, key);
    ea.metrics()
        .iter()
        .zip(eb.metrics().iter())
        .map(|(&(name, x), &(_, y))| (name, x, y))
        .collect()
}
