// Style engine: the top-level generation pipeline.
//
// A `StyleEngine` owns the active style vector, the grammar derived from it,
// and a generator for every post-derivation decision. `generate` runs the
// stages in a fixed order:
//
// 1. Derive one tree from the style's grammar, depth min(6, length/2 + 2).
// 2. Cut or pad to the target length. Each padding slot draws once: below
//    `turnaround_prob` (and with room for two chords) it appends ii-V,
//    otherwise the tonic maj7.
// 3. Run the substitution pass (backdoor, tritone, Coltrane).
// 4. Above `extension_level` 0.5, run the voice-leading optimizer.
// 5. Truncate to exactly `length` (Coltrane expansion can overshoot).
//
// Two generators are involved. The grammar's drives rule sampling; the
// engine's drives padding, substitution gating, and the turnaround and blues
// variations. Both are seeded from the same user seed, the engine's through
// a fixed xor so the two streams differ. Rebuilding the grammar after a
// parameter change carries the grammar generator across, so a style tweak
// mid-session does not rewind the stream. Treebank statistics, when set, are
// multiplied into every rebuilt grammar after the style weighting.
//
// See also: style.rs for `style_to_pcfg`, substitution.rs for the rewrite
// pass, voice_leading.rs for the optimizer, treebank.rs for learned weights.

use crate::chord::{ChordQuality, ChordSymbol, format_progression};
use crate::derivation::Deriver;
use crate::error::{HarmonyError, Result};
use crate::grammar::Pcfg;
use crate::pitch::PitchClass;
use crate::style::{StylePreset, StyleVector, style_to_pcfg};
use crate::substitution::{SubstitutionKind, apply_substitutions};
use crate::treebank::TreebankStats;
use crate::voice_leading::{OptimizeResult, optimize};
use jazz_architect_prng::SeedRng;
use std::fmt;

/// Xored into the user seed for the engine's own generator.
const ENGINE_STREAM: u64 = 0x6a09_e667_f3bc_c909;

/// `extension_level` above this runs the optimizer.
const OPTIMIZE_THRESHOLD: f64 = 0.5;

const OPTIMIZER_ITERATIONS: usize = 50;

/// Parse a key name ("C", "F#", "Bb", ...).
pub fn key_from_name(name: &str) -> Result<PitchClass> {
    PitchClass::from_name(name).ok_or_else(|| HarmonyError::UnknownKey(name.to_string()))
}

/// A generated progression with a record of how it was made.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledProgression {
    pub chords: Vec<ChordSymbol>,
    pub key: PitchClass,
    pub style: StyleVector,
    /// Substitution stages that fired, with how often.
    pub substitutions: Vec<(SubstitutionKind, usize)>,
    /// Chords the derivation produced before length adjustment.
    pub leaf_count: usize,
    /// Present when the optimizer ran.
    pub optimization: Option<OptimizeResult>,
}

impl StyledProgression {
    pub fn substitution_count(&self) -> usize {
        self.substitutions.iter().map(|&(_, n)| n).sum()
    }
}

impl fmt::Display for StyledProgression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Key: {}", self.key)?;
        write!(f, "{}", format_progression(&self.chords, 4))
    }
}

pub struct StyleEngine {
    style: StyleVector,
    grammar: Pcfg,
    rng: SeedRng,
    treebank: Option<TreebankStats>,
}

impl StyleEngine {
    pub fn new(style: StyleVector, seed: u64) -> Self {
        let style = style.clamped();
        let grammar = style_to_pcfg(&style, seed);
        StyleEngine {
            style,
            grammar,
            rng: SeedRng::new(seed ^ ENGINE_STREAM),
            treebank: None,
        }
    }

    pub fn from_preset(preset: StylePreset, seed: u64) -> Self {
        Self::new(preset.style(), seed)
    }

    pub fn style(&self) -> &StyleVector {
        &self.style
    }

    pub fn grammar(&self) -> &Pcfg {
        &self.grammar
    }

    // -- Configuration --

    pub fn set_style(&mut self, style: StyleVector) {
        self.style = style.clamped();
        self.rebuild_grammar();
    }

    pub fn set_preset(&mut self, preset: StylePreset) {
        self.set_style(preset.style());
    }

    /// Restart both generators from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.grammar.reseed(seed);
        self.rng.reseed(seed ^ ENGINE_STREAM);
    }

    pub fn set_tritone_sub_prob(&mut self, p: f64) {
        self.style.tritone_sub_prob = p;
        self.style.clamp();
        self.rebuild_grammar();
    }

    pub fn set_ii_v_preference(&mut self, p: f64) {
        self.style.ii_v_preference = p;
        self.style.clamp();
        self.rebuild_grammar();
    }

    pub fn set_modal_interchange(&mut self, p: f64) {
        self.style.modal_interchange = p;
        self.style.clamp();
        self.rebuild_grammar();
    }

    /// Reweight the grammar from treebank counts, now and on every rebuild.
    pub fn set_treebank(&mut self, stats: TreebankStats) {
        stats.apply_to(&mut self.grammar);
        self.treebank = Some(stats);
    }

    /// Only gates the optimizer, so the grammar is left alone.
    pub fn set_extension_level(&mut self, level: f64) {
        self.style.extension_level = level;
        self.style.clamp();
    }

    fn rebuild_grammar(&mut self) {
        let rng = self.grammar.rng().clone();
        self.grammar = style_to_pcfg(&self.style, 0);
        self.grammar.set_rng(rng);
        if let Some(stats) = &self.treebank {
            stats.apply_to(&mut self.grammar);
        }
    }

    // -- Generation --

    /// Exactly `length` chords in `key`.
    pub fn generate(&mut self, length: usize, key: PitchClass) -> Vec<ChordSymbol> {
        self.generate_detailed(length, key).chords
    }

    pub fn generate_detailed(&mut self, length: usize, key: PitchClass) -> StyledProgression {
        let mut out = StyledProgression {
            chords: Vec::new(),
            key,
            style: self.style.clone(),
            substitutions: Vec::new(),
            leaf_count: 0,
            optimization: None,
        };
        if length == 0 {
            return out;
        }

        let max_depth = (length / 2 + 2).min(6);
        let tree = Deriver::new(&mut self.grammar, max_depth).derive_tree(key);
        let mut chords = tree.chords();
        out.leaf_count = chords.len();

        self.adjust_length(&mut chords, length, key);

        let (mut chords, substitutions) = apply_substitutions(&chords, &self.style, &mut self.rng);
        out.substitutions = substitutions;

        if self.style.extension_level > OPTIMIZE_THRESHOLD {
            let result = optimize(&chords, OPTIMIZER_ITERATIONS);
            chords.clone_from(&result.chords);
            out.optimization = Some(result);
        }

        chords.truncate(length);
        tracing::debug!(
            length,
            %key,
            leaves = out.leaf_count,
            substitutions = out.substitution_count(),
            "progression generated"
        );
        out.chords = chords;
        out
    }

    fn adjust_length(&mut self, chords: &mut Vec<ChordSymbol>, target: usize, key: PitchClass) {
        if chords.len() >= target {
            chords.truncate(target);
            return;
        }
        let tonic = ChordSymbol::new(key, ChordQuality::Maj7);
        while chords.len() < target {
            let turnaround = self.rng.random_bool(self.style.turnaround_prob);
            if turnaround && chords.len() < target - 1 {
                chords.push(ChordSymbol::new(key.transpose(2), ChordQuality::Min7));
                chords.push(ChordSymbol::new(key.transpose(7), ChordQuality::Dom7));
            } else {
                chords.push(tonic.clone());
            }
        }
    }

    /// I-vi-ii-V. The V may become its tritone substitute, and a chromatic
    /// bVI7 may be slipped in before the last chord.
    pub fn generate_turnaround(&mut self, key: PitchClass) -> Vec<ChordSymbol> {
        let mut chords = vec![
            ChordSymbol::new(key, ChordQuality::Maj7),
            ChordSymbol::new(key.transpose(9), ChordQuality::Min7),
            ChordSymbol::new(key.transpose(2), ChordQuality::Min7),
            ChordSymbol::new(key.transpose(7), ChordQuality::Dom7),
        ];
        if self.rng.random_bool(self.style.tritone_sub_prob) {
            chords[3] = chords[3].tritone_substitute();
        }
        if self.rng.random_bool(self.style.chromatic_approach) {
            chords.insert(3, ChordSymbol::new(key.transpose(8), ChordQuality::Dom7));
        }
        chords
    }

    /// Dominant blues. Twelve bars use the standard form; any other length
    /// is I7 throughout. Each bar may take a tritone substitute, failing
    /// that each IV7 may turn minor.
    pub fn generate_blues_changes(&mut self, key: PitchClass, bars: usize) -> Vec<ChordSymbol> {
        let one = ChordSymbol::new(key, ChordQuality::Dom7);
        let four = ChordSymbol::new(key.transpose(5), ChordQuality::Dom7);
        let five = ChordSymbol::new(key.transpose(7), ChordQuality::Dom7);

        let form = if bars == 12 {
            vec![
                &one, &four, &one, &one, //
                &four, &four, &one, &one, //
                &five, &four, &one, &five,
            ]
        } else {
            vec![&one; bars]
        };

        form.into_iter()
            .map(|chord| {
                if self.rng.random_bool(self.style.tritone_sub_prob)
                    && chord.quality == ChordQuality::Dom7
                {
                    chord.tritone_substitute()
                } else if self.rng.random_bool(self.style.minor_iv_prob) && chord.root == four.root {
                    ChordSymbol::new(four.root, ChordQuality::Min7)
                } else {
                    chord.clone()
                }
            })
            .collect()
    }
}

/// One-shot generation with a fresh engine.
pub fn generate(length: usize, key: PitchClass, style: &StyleVector, seed: u64) -> Vec<ChordSymbol> {
    StyleEngine::new(style.clone(), seed).generate(length, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarRule;
    use crate::pitch::{C, F};
    use crate::voice_leading::progression_cost;

    fn names(chords: &[ChordSymbol]) -> Vec<String> {
        chords.iter().map(|c| c.to_string()).collect()
    }

    fn quiet() -> StyleVector {
        StyleVector {
            tritone_sub_prob: 0.0,
            chromatic_approach: 0.0,
            minor_iv_prob: 0.0,
            ..StyleVector::default()
        }
    }

    #[test]
    fn test_bebop_golden() {
        let chords = generate(8, C, &StyleVector::bebop(), 42);
        assert_eq!(
            names(&chords),
            vec!["Db7", "Fm7", "Fmaj7", "Fmaj7", "Cmaj7", "Cmaj7", "Fmaj7", "Dm7"]
        );
    }

    #[test]
    fn test_bebop_golden_with_tritone() {
        let mut engine = StyleEngine::from_preset(StylePreset::Bebop, 42);
        let out = engine.generate_detailed(12, F);
        assert_eq!(
            names(&out.chords),
            vec![
                "Gb7", "Bbm7", "Bbmaj7", "Bbmaj7", "Fmaj7", "Fmaj7", "Bbmaj7", "Gm7", "Gb7",
                "Gm7", "C7", "Am7"
            ]
        );
        assert_eq!(out.leaf_count, 14);
        assert_eq!(out.substitutions, vec![(SubstitutionKind::Tritone, 1)]);
        assert!(out.optimization.is_none());
    }

    #[test]
    fn test_bebop_golden_padding() {
        let chords = generate(12, C, &StyleVector::bebop(), 7);
        assert_eq!(
            names(&chords),
            vec![
                "Cmaj7", "Dm7", "G7", "Dm7", "G7", "Dm7", "G7", "Cmaj7", "Dm7", "G7", "Cmaj7",
                "Cmaj7"
            ]
        );
    }

    #[test]
    fn test_exact_length_for_every_preset() {
        for preset in StylePreset::ALL {
            for seed in 0..20 {
                for length in 1..=16 {
                    let chords = generate(length, F, &preset.style(), seed);
                    assert_eq!(chords.len(), length, "{preset} seed {seed}");
                }
            }
        }
    }

    #[test]
    fn test_zero_length_is_empty() {
        let mut engine = StyleEngine::from_preset(StylePreset::PostBop, 3);
        let out = engine.generate_detailed(0, C);
        assert!(out.chords.is_empty());
        assert_eq!(out.leaf_count, 0);
    }

    #[test]
    fn test_same_seed_same_session() {
        let mut a = StyleEngine::from_preset(StylePreset::HardBop, 11);
        let mut b = StyleEngine::from_preset(StylePreset::HardBop, 11);
        for _ in 0..5 {
            assert_eq!(a.generate(8, C), b.generate(8, C));
        }
    }

    #[test]
    fn test_set_seed_restarts() {
        let mut engine = StyleEngine::from_preset(StylePreset::Bebop, 42);
        let first = engine.generate(8, C);
        engine.generate(8, C);
        engine.set_seed(42);
        assert_eq!(engine.generate(8, C), first);
    }

    #[test]
    fn test_rebuild_keeps_grammar_stream() {
        let mut a = StyleEngine::from_preset(StylePreset::Bebop, 5);
        let mut b = StyleEngine::from_preset(StylePreset::Bebop, 5);
        a.generate(8, C);
        b.generate(8, C);
        // Same value: grammar is rebuilt identically and must not rewind.
        a.set_tritone_sub_prob(0.3);
        assert_eq!(a.generate(8, C), b.generate(8, C));
    }

    #[test]
    fn test_treebank_weights_survive_rebuild() {
        let weight = |e: &StyleEngine| {
            e.grammar()
                .rule("authentic_cadence")
                .map(GrammarRule::weight)
                .unwrap_or(0.0)
        };
        let mut engine = StyleEngine::from_preset(StylePreset::Bebop, 3);
        let plain = weight(&engine);

        let mut stats = TreebankStats::default();
        stats.rule_counts.insert("authentic_cadence", 10);
        engine.set_treebank(stats);
        let learned = weight(&engine);
        assert!(learned > plain, "{learned} <= {plain}");

        let tritone = engine.style().tritone_sub_prob;
        engine.set_tritone_sub_prob(tritone);
        assert!((weight(&engine) - learned).abs() < 1e-12);
        assert_eq!(engine.generate(8, C).len(), 8);
    }

    #[test]
    fn test_setters_clamp_and_reweight() {
        let mut engine = StyleEngine::from_preset(StylePreset::Bebop, 0);
        engine.set_tritone_sub_prob(0.0);
        let low = engine.grammar().rule("tritone_sub").map(GrammarRule::weight);
        engine.set_tritone_sub_prob(4.0);
        assert_eq!(engine.style().tritone_sub_prob, 1.0);
        let high = engine.grammar().rule("tritone_sub").map(GrammarRule::weight);
        assert!(high > low);

        engine.set_ii_v_preference(-1.0);
        assert_eq!(engine.style().ii_v_preference, 0.0);
        engine.set_modal_interchange(0.75);
        assert_eq!(engine.style().modal_interchange, 0.75);
    }

    #[test]
    fn test_extension_level_gates_optimizer() {
        let mut engine = StyleEngine::new(StyleVector::default(), 9);
        engine.set_extension_level(2.0);
        assert_eq!(engine.style().extension_level, 1.0);
        let out = engine.generate_detailed(8, C);
        let opt = out.optimization.expect("optimizer should run");
        assert!(opt.final_cost <= opt.initial_cost);

        engine.set_extension_level(0.5);
        assert!(engine.generate_detailed(8, C).optimization.is_none());
    }

    #[test]
    fn test_optimized_output_not_costlier() {
        let style = StyleVector {
            extension_level: 0.9,
            ..StyleVector::post_bop()
        };
        for seed in 0..20 {
            let out = StyleEngine::new(style.clone(), seed).generate_detailed(8, C);
            let opt = out.optimization.expect("optimizer should run");
            assert!(progression_cost(&opt.chords) <= opt.initial_cost);
        }
    }

    #[test]
    fn test_turnaround_plain_and_decorated() {
        let mut plain = StyleEngine::new(quiet(), 1);
        assert_eq!(names(&plain.generate_turnaround(C)), vec!["Cmaj7", "Am7", "Dm7", "G7"]);

        let busy = StyleVector {
            tritone_sub_prob: 1.0,
            chromatic_approach: 1.0,
            ..StyleVector::default()
        };
        let mut engine = StyleEngine::new(busy, 1);
        assert_eq!(
            names(&engine.generate_turnaround(C)),
            vec!["Cmaj7", "Am7", "Dm7", "Ab7", "Db7"]
        );
    }

    #[test]
    fn test_blues_form() {
        let mut engine = StyleEngine::new(quiet(), 2);
        assert_eq!(
            names(&engine.generate_blues_changes(F, 12)),
            vec![
                "F7", "Bb7", "F7", "F7", "Bb7", "Bb7", "F7", "F7", "C7", "Bb7", "F7", "C7"
            ]
        );
        assert_eq!(names(&engine.generate_blues_changes(C, 4)), vec!["C7"; 4]);
        assert!(engine.generate_blues_changes(C, 0).is_empty());
    }

    #[test]
    fn test_blues_variations() {
        let minor_iv = StyleVector {
            minor_iv_prob: 1.0,
            ..quiet()
        };
        let blues = StyleEngine::new(minor_iv, 3).generate_blues_changes(C, 12);
        assert_eq!(names(&blues[..6]), vec!["C7", "Fm7", "C7", "C7", "Fm7", "Fm7"]);

        let tritone = StyleVector {
            tritone_sub_prob: 1.0,
            ..quiet()
        };
        let blues = StyleEngine::new(tritone, 3).generate_blues_changes(C, 12);
        assert_eq!(names(&blues[..4]), vec!["Gb7", "B7", "Gb7", "Gb7"]);
    }

    #[test]
    fn test_key_from_name() {
        assert_eq!(key_from_name("Bb").ok(), Some(crate::pitch::BB));
        assert!(matches!(key_from_name("H"), Err(HarmonyError::UnknownKey(_))));
    }

    #[test]
    fn test_display() {
        let mut engine = StyleEngine::new(quiet(), 2);
        let chords = engine.generate_blues_changes(C, 4);
        let out = StyledProgression {
            chords,
            key: C,
            style: quiet(),
            substitutions: vec![(SubstitutionKind::Tritone, 2), (SubstitutionKind::Coltrane, 1)],
            leaf_count: 4,
            optimization: None,
        };
        assert_eq!(out.substitution_count(), 3);
        assert_eq!(out.to_string(), "Key: C\nC7 | C7 | C7 | C7");
    }
}
