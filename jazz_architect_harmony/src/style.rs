// Style vectors, named era presets, and the style-to-grammar mapping.
//
// A `StyleVector` is 15 independent knobs: 13 probabilities in [0, 1] and two
// integer depth controls. Every consumer clamps before reading, and the
// vector deserializes with `#[serde(default)]` so a JSON file can set any
// subset of fields and inherit the rest from the default vector.
//
// `style_to_pcfg` is a pure function: it starts from the base grammar,
// rescales a handful of named rules from the style's knobs, and renormalizes.
// The substitution knobs (tritone, backdoor, Coltrane) gate the rewrite pass
// in substitution.rs rather than grammar weights, and `extension_level` only
// decides whether the voice-leading optimizer runs.
//
// See also: engine.rs, which owns the active style and rebuilds its grammar
// through `style_to_pcfg` on every parameter change.

use crate::error::{HarmonyError, Result};
use crate::grammar::{NonTerminal, Pcfg, base_grammar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Style vector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleVector {
    /// Chance a V7 resolving down a fifth becomes bII7.
    pub tritone_sub_prob: f64,
    pub backdoor_prob: f64,
    pub coltrane_prob: f64,
    /// How strongly dominants are prepared by a ii chord.
    pub ii_v_preference: f64,
    pub secondary_dom_prob: f64,
    /// Borrowing from the parallel minor. Also gates backdoor dominants.
    pub modal_interchange: f64,
    pub minor_iv_prob: f64,
    /// Chromatic approach chords. Also gates Coltrane cycles.
    pub chromatic_approach: f64,
    pub diminished_approach: f64,
    /// Longest chain of preparations before a dominant. At least 1.
    pub dominant_chain_depth: i32,
    /// At least 0.
    pub prolongation_depth: i32,
    pub rhythm_density: f64,
    /// Chance each padding slot becomes a ii-V instead of the tonic.
    pub turnaround_prob: f64,
    /// Above 0.5 the voice-leading optimizer runs.
    pub extension_level: f64,
    pub alteration_prob: f64,
}

impl Default for StyleVector {
    fn default() -> Self {
        StyleVector {
            tritone_sub_prob: 0.3,
            backdoor_prob: 0.15,
            coltrane_prob: 0.1,
            ii_v_preference: 0.8,
            secondary_dom_prob: 0.3,
            modal_interchange: 0.2,
            minor_iv_prob: 0.15,
            chromatic_approach: 0.2,
            diminished_approach: 0.1,
            dominant_chain_depth: 3,
            prolongation_depth: 2,
            rhythm_density: 0.5,
            turnaround_prob: 0.4,
            extension_level: 0.5,
            alteration_prob: 0.2,
        }
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

impl StyleVector {
    /// Pull every field into range: probabilities into [0, 1], chain depth
    /// to at least 1, prolongation depth to at least 0.
    pub fn clamp(&mut self) {
        for p in [
            &mut self.tritone_sub_prob,
            &mut self.backdoor_prob,
            &mut self.coltrane_prob,
            &mut self.ii_v_preference,
            &mut self.secondary_dom_prob,
            &mut self.modal_interchange,
            &mut self.minor_iv_prob,
            &mut self.chromatic_approach,
            &mut self.diminished_approach,
            &mut self.rhythm_density,
            &mut self.turnaround_prob,
            &mut self.extension_level,
            &mut self.alteration_prob,
        ] {
            *p = unit(*p);
        }
        self.dominant_chain_depth = self.dominant_chain_depth.max(1);
        self.prolongation_depth = self.prolongation_depth.max(0);
    }

    pub fn clamped(mut self) -> Self {
        self.clamp();
        self
    }

    /// Parse a JSON object. Missing fields take their default values and the
    /// result is clamped.
    pub fn from_json(text: &str) -> Result<Self> {
        let style: StyleVector = serde_json::from_str(text)?;
        Ok(style.clamped())
    }

    /// Load a style from a JSON file. See `from_json`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Linear mix: `weight` 0 keeps `self`, 1 gives `other`. Integer depths
    /// are truncated toward zero.
    pub fn blend(&self, other: &StyleVector, weight: f64) -> StyleVector {
        let w2 = unit(weight);
        let w1 = 1.0 - w2;
        let mix = |a: f64, b: f64| w1 * a + w2 * b;
        let mix_int = |a: i32, b: i32| (w1 * a as f64 + w2 * b as f64) as i32;
        StyleVector {
            tritone_sub_prob: mix(self.tritone_sub_prob, other.tritone_sub_prob),
            backdoor_prob: mix(self.backdoor_prob, other.backdoor_prob),
            coltrane_prob: mix(self.coltrane_prob, other.coltrane_prob),
            ii_v_preference: mix(self.ii_v_preference, other.ii_v_preference),
            secondary_dom_prob: mix(self.secondary_dom_prob, other.secondary_dom_prob),
            modal_interchange: mix(self.modal_interchange, other.modal_interchange),
            minor_iv_prob: mix(self.minor_iv_prob, other.minor_iv_prob),
            chromatic_approach: mix(self.chromatic_approach, other.chromatic_approach),
            diminished_approach: mix(self.diminished_approach, other.diminished_approach),
            dominant_chain_depth: mix_int(self.dominant_chain_depth, other.dominant_chain_depth),
            prolongation_depth: mix_int(self.prolongation_depth, other.prolongation_depth),
            rhythm_density: mix(self.rhythm_density, other.rhythm_density),
            turnaround_prob: mix(self.turnaround_prob, other.turnaround_prob),
            extension_level: mix(self.extension_level, other.extension_level),
            alteration_prob: mix(self.alteration_prob, other.alteration_prob),
        }
        .clamped()
    }

    /// Short prose summary of the style's most distinctive traits.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.tritone_sub_prob > 0.4 {
            parts.push("heavy tritone substitution");
        } else if self.tritone_sub_prob > 0.2 {
            parts.push("moderate tritone subs");
        }
        if self.ii_v_preference > 0.7 {
            parts.push("strong ii-V preference");
        }
        if self.coltrane_prob > 0.15 {
            parts.push("Coltrane-influenced");
        }
        if self.modal_interchange > 0.4 {
            parts.push("modal borrowing");
        }
        if self.rhythm_density > 0.7 {
            parts.push("dense harmonic rhythm");
        } else if self.rhythm_density < 0.3 {
            parts.push("sparse changes");
        }
        if self.extension_level > 0.6 {
            parts.push("extended harmonies");
        }
        if self.alteration_prob > 0.3 {
            parts.push("altered dominants");
        }
        if parts.is_empty() {
            "standard jazz harmony".to_string()
        } else {
            parts.join(", ")
        }
    }

    // -- Era presets. Field order follows the struct. --

    pub fn swing() -> Self {
        preset([0.1, 0.1, 0.0, 0.7, 0.2, 0.1, 0.1, 0.1, 0.15], (2, 1), [0.4, 0.5, 0.3, 0.1])
    }

    pub fn bebop() -> Self {
        preset([0.3, 0.15, 0.05, 0.9, 0.4, 0.2, 0.15, 0.4, 0.2], (4, 2), [0.8, 0.6, 0.5, 0.3])
    }

    pub fn cool() -> Self {
        preset([0.2, 0.1, 0.0, 0.7, 0.25, 0.3, 0.2, 0.2, 0.1], (3, 2), [0.5, 0.4, 0.4, 0.15])
    }

    pub fn hard_bop() -> Self {
        preset([0.25, 0.2, 0.1, 0.85, 0.35, 0.25, 0.2, 0.35, 0.15], (4, 2), [0.7, 0.5, 0.55, 0.25])
    }

    pub fn modal() -> Self {
        preset([0.1, 0.05, 0.15, 0.3, 0.1, 0.6, 0.3, 0.1, 0.05], (2, 3), [0.3, 0.2, 0.6, 0.1])
    }

    pub fn post_bop() -> Self {
        preset([0.4, 0.25, 0.25, 0.6, 0.45, 0.5, 0.3, 0.5, 0.2], (5, 3), [0.6, 0.4, 0.7, 0.4])
    }

    pub fn fusion() -> Self {
        preset([0.35, 0.2, 0.1, 0.5, 0.3, 0.6, 0.35, 0.4, 0.15], (3, 2), [0.65, 0.3, 0.75, 0.35])
    }

    pub fn contemporary() -> Self {
        preset([0.35, 0.2, 0.15, 0.65, 0.35, 0.45, 0.25, 0.35, 0.15], (4, 2), [0.55, 0.35, 0.65, 0.3])
    }

    pub fn blues() -> Self {
        preset([0.15, 0.25, 0.0, 0.5, 0.2, 0.4, 0.4, 0.2, 0.1], (2, 1), [0.4, 0.6, 0.4, 0.2])
    }
}

/// Build a vector from the nine leading probabilities, the two depths, and
/// the four trailing probabilities.
fn preset(head: [f64; 9], depths: (i32, i32), tail: [f64; 4]) -> StyleVector {
    StyleVector {
        tritone_sub_prob: head[0],
        backdoor_prob: head[1],
        coltrane_prob: head[2],
        ii_v_preference: head[3],
        secondary_dom_prob: head[4],
        modal_interchange: head[5],
        minor_iv_prob: head[6],
        chromatic_approach: head[7],
        diminished_approach: head[8],
        dominant_chain_depth: depths.0,
        prolongation_depth: depths.1,
        rhythm_density: tail[0],
        turnaround_prob: tail[1],
        extension_level: tail[2],
        alteration_prob: tail[3],
    }
}

// ---------------------------------------------------------------------------
// Named presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StylePreset {
    #[default]
    Bebop,
    Cool,
    Modal,
    HardBop,
    PostBop,
    Swing,
    Fusion,
    Contemporary,
    Blues,
}

impl StylePreset {
    pub const ALL: [StylePreset; 9] = [
        StylePreset::Bebop,
        StylePreset::Cool,
        StylePreset::Modal,
        StylePreset::HardBop,
        StylePreset::PostBop,
        StylePreset::Swing,
        StylePreset::Fusion,
        StylePreset::Contemporary,
        StylePreset::Blues,
    ];

    /// Stable numeric id, 1 through 9.
    pub fn id(self) -> u8 {
        match self {
            StylePreset::Bebop => 1,
            StylePreset::Cool => 2,
            StylePreset::Modal => 3,
            StylePreset::HardBop => 4,
            StylePreset::PostBop => 5,
            StylePreset::Swing => 6,
            StylePreset::Fusion => 7,
            StylePreset::Contemporary => 8,
            StylePreset::Blues => 9,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            StylePreset::Bebop => "Bebop",
            StylePreset::Cool => "Cool",
            StylePreset::Modal => "Modal",
            StylePreset::HardBop => "Hard Bop",
            StylePreset::PostBop => "Post-Bop",
            StylePreset::Swing => "Swing",
            StylePreset::Fusion => "Fusion",
            StylePreset::Contemporary => "Contemporary",
            StylePreset::Blues => "Blues",
        }
    }

    /// Lenient lookup: case, spaces, dashes and underscores are ignored, and
    /// a few nicknames ("bop", "hard", "post", "coltrane", "modern") resolve.
    pub fn from_name(name: &str) -> Result<Self> {
        let folded: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let preset = match folded.as_str() {
            "bebop" | "bop" => StylePreset::Bebop,
            "cool" => StylePreset::Cool,
            "modal" => StylePreset::Modal,
            "hardbop" | "hard" => StylePreset::HardBop,
            "postbop" | "post" | "coltrane" => StylePreset::PostBop,
            "swing" => StylePreset::Swing,
            "fusion" => StylePreset::Fusion,
            "contemporary" | "modern" => StylePreset::Contemporary,
            "blues" => StylePreset::Blues,
            _ => return Err(HarmonyError::UnknownStyle(name.to_string())),
        };
        Ok(preset)
    }

    pub fn style(self) -> StyleVector {
        match self {
            StylePreset::Bebop => StyleVector::bebop(),
            StylePreset::Cool => StyleVector::cool(),
            StylePreset::Modal => StyleVector::modal(),
            StylePreset::HardBop => StyleVector::hard_bop(),
            StylePreset::PostBop => StyleVector::post_bop(),
            StylePreset::Swing => StyleVector::swing(),
            StylePreset::Fusion => StyleVector::fusion(),
            StylePreset::Contemporary => StyleVector::contemporary(),
            StylePreset::Blues => StyleVector::blues(),
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Style -> grammar
// ---------------------------------------------------------------------------

/// Base grammar reweighted for `style`, then renormalized. The grammar's
/// generator is seeded with `seed`.
pub fn style_to_pcfg(style: &StyleVector, seed: u64) -> Pcfg {
    let s = style.clone().clamped();
    let mut g = base_grammar(seed);

    for rule in g.rules_mut(NonTerminal::Dominant) {
        match rule.name.as_str() {
            "ii_v" => rule.set_weight(0.4 * s.ii_v_preference),
            "d_terminal" => rule.set_weight(0.4 * (1.0 - 0.3 * s.ii_v_preference)),
            "tritone_sub" => rule.set_weight(0.15 * s.tritone_sub_prob),
            _ => {}
        }
    }

    let prolong = 0.1 * (1.0 + 0.2 * s.prolongation_depth as f64);
    for rule in g.rules_mut(NonTerminal::Tonic) {
        if rule.name.contains("prolong") {
            rule.set_weight(prolong);
        } else if rule.name == "authentic_cadence" {
            rule.set_weight(0.35 * s.ii_v_preference);
        } else if rule.name == "plagal_cadence" {
            rule.set_weight(0.15 * (1.0 + 0.5 * s.modal_interchange));
        }
    }

    for rule in g.rules_mut(NonTerminal::Preparation) {
        match rule.name.as_str() {
            "prep_chain" => {
                let chain = (s.dominant_chain_depth as f64 / 4.0).min(1.0);
                rule.set_weight(0.15 * chain);
            }
            "prep_secondary_dom" => rule.set_weight(0.15 * s.secondary_dom_prob),
            _ => {}
        }
    }

    for rule in g.rules_mut(NonTerminal::Subdominant) {
        if rule.name == "sd_borrowed_iv" {
            rule.set_weight(0.2 * (1.0 + s.modal_interchange));
        }
    }

    g.normalize();
    tracing::debug!(rules = g.rule_count(), "grammar rebuilt from style");
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarRule;

    fn weight(g: &Pcfg, name: &str) -> f64 {
        g.rule(name).map(GrammarRule::weight).unwrap_or(f64::NAN)
    }

    #[test]
    fn test_defaults() {
        let s = StyleVector::default();
        assert_eq!(s.tritone_sub_prob, 0.3);
        assert_eq!(s.dominant_chain_depth, 3);
        assert_eq!(s.extension_level, 0.5);
    }

    #[test]
    fn test_clamp() {
        let mut s = StyleVector {
            tritone_sub_prob: 1.7,
            modal_interchange: -0.2,
            extension_level: f64::NAN,
            dominant_chain_depth: 0,
            prolongation_depth: -3,
            ..StyleVector::default()
        };
        s.clamp();
        assert_eq!(s.tritone_sub_prob, 1.0);
        assert_eq!(s.modal_interchange, 0.0);
        assert_eq!(s.extension_level, 0.0);
        assert_eq!(s.dominant_chain_depth, 1);
        assert_eq!(s.prolongation_depth, 0);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let s = StyleVector::from_json(r#"{"tritone_sub_prob": 0.9, "dominant_chain_depth": 5}"#)
            .unwrap();
        assert_eq!(s.tritone_sub_prob, 0.9);
        assert_eq!(s.dominant_chain_depth, 5);
        assert_eq!(s.ii_v_preference, StyleVector::default().ii_v_preference);
    }

    #[test]
    fn test_json_is_clamped() {
        let s = StyleVector::from_json(r#"{"turnaround_prob": 4.0}"#).unwrap();
        assert_eq!(s.turnaround_prob, 1.0);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(matches!(
            StyleVector::from_json("{not json"),
            Err(HarmonyError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = StyleVector::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(err, Err(HarmonyError::Io(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let s = StyleVector::post_bop();
        let text = serde_json::to_string(&s).unwrap();
        assert_eq!(StyleVector::from_json(&text).unwrap(), s);
    }

    #[test]
    fn test_blend_endpoints_and_midpoint() {
        let a = StyleVector::swing();
        let b = StyleVector::post_bop();
        assert_eq!(a.blend(&b, 0.0), a);
        assert_eq!(a.blend(&b, 1.0), b);
        let mid = a.blend(&b, 0.5);
        assert!((mid.tritone_sub_prob - 0.25).abs() < 1e-12);
        // (2 + 5) / 2 truncates.
        assert_eq!(mid.dominant_chain_depth, 3);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            StyleVector::bebop().describe(),
            "moderate tritone subs, strong ii-V preference, dense harmonic rhythm"
        );
        let plain = StyleVector {
            tritone_sub_prob: 0.0,
            ii_v_preference: 0.5,
            ..StyleVector::default()
        };
        assert_eq!(plain.describe(), "standard jazz harmony");
    }

    #[test]
    fn test_preset_ids_and_names() {
        for (i, p) in StylePreset::ALL.iter().enumerate() {
            assert_eq!(p.id() as usize, i + 1);
            assert_eq!(StylePreset::from_id(p.id()), Some(*p));
            assert_eq!(StylePreset::from_name(p.name()).unwrap(), *p);
        }
        assert_eq!(StylePreset::from_id(0), None);
        assert_eq!(StylePreset::default(), StylePreset::Bebop);
    }

    #[test]
    fn test_preset_aliases() {
        assert_eq!(StylePreset::from_name("BOP").unwrap(), StylePreset::Bebop);
        assert_eq!(StylePreset::from_name("hard_bop").unwrap(), StylePreset::HardBop);
        assert_eq!(StylePreset::from_name("Coltrane").unwrap(), StylePreset::PostBop);
        assert_eq!(StylePreset::from_name("modern").unwrap(), StylePreset::Contemporary);
        assert!(matches!(
            StylePreset::from_name("polka"),
            Err(HarmonyError::UnknownStyle(_))
        ));
    }

    #[test]
    fn test_presets_within_range() {
        for p in StylePreset::ALL {
            let s = p.style();
            assert_eq!(s.clone().clamped(), s, "{p} preset out of range");
        }
    }

    #[test]
    fn test_style_to_pcfg_is_normalized() {
        for p in StylePreset::ALL {
            let g = style_to_pcfg(&p.style(), 0);
            for nt in [
                NonTerminal::Start,
                NonTerminal::Tonic,
                NonTerminal::Dominant,
                NonTerminal::Subdominant,
                NonTerminal::Prolongation,
                NonTerminal::Preparation,
            ] {
                let total: f64 = g.rules(nt).iter().map(GrammarRule::weight).sum();
                assert!((total - 1.0).abs() < 1e-6, "{p}: {nt} sums to {total}");
            }
        }
    }

    #[test]
    fn test_ii_v_preference_shifts_dominant_weights() {
        let low = style_to_pcfg(
            &StyleVector {
                ii_v_preference: 0.1,
                ..StyleVector::default()
            },
            0,
        );
        let high = style_to_pcfg(
            &StyleVector {
                ii_v_preference: 1.0,
                ..StyleVector::default()
            },
            0,
        );
        assert!(weight(&high, "ii_v") > weight(&low, "ii_v"));
        assert!(weight(&high, "d_terminal") < weight(&low, "d_terminal"));
    }

    #[test]
    fn test_tritone_sub_rule_follows_probability() {
        let none = style_to_pcfg(
            &StyleVector {
                tritone_sub_prob: 0.0,
                ..StyleVector::default()
            },
            0,
        );
        assert_eq!(weight(&none, "tritone_sub"), 0.0);
    }

    #[test]
    fn test_modal_interchange_raises_borrowed_iv() {
        let base = style_to_pcfg(
            &StyleVector {
                modal_interchange: 0.0,
                ..StyleVector::default()
            },
            0,
        );
        let modal = style_to_pcfg(
            &StyleVector {
                modal_interchange: 1.0,
                ..StyleVector::default()
            },
            0,
        );
        assert!(weight(&modal, "sd_borrowed_iv") > weight(&base, "sd_borrowed_iv"));
        assert!(weight(&modal, "plagal_cadence") > weight(&base, "plagal_cadence"));
    }
}
