// Probabilistic context-free grammar of jazz harmonic function.
//
// Non-terminals name harmonic functions (tonic, dominant, subdominant,
// preparation, prolongation); terminals name a chord by scale degree and
// quality relative to the current key. Each non-terminal owns an ordered list
// of weighted productions. Sampling draws once from the grammar's own
// `SeedRng` and walks the cumulative weights in insertion order, so a fixed
// seed always selects the same rules.
//
// The base grammar built by `base_grammar()` is the starting point for every
// style: style.rs rescales named rules and renormalizes.
//
// Consumed by derivation.rs (rule sampling, forced terminals, degree lookup)
// and style.rs (weight overrides).

use crate::chord::ChordQuality;
use crate::pitch::PitchClass;
use jazz_architect_prng::SeedRng;
use std::collections::BTreeMap;
use std::fmt;

/// Harmonic-function categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NonTerminal {
    /// Whole piece.
    Start,
    Tonic,
    Dominant,
    Subdominant,
    Prolongation,
    Preparation,
    Phrase,
}

impl NonTerminal {
    pub fn short_name(self) -> &'static str {
        match self {
            NonTerminal::Start => "S",
            NonTerminal::Tonic => "T",
            NonTerminal::Dominant => "D",
            NonTerminal::Subdominant => "SD",
            NonTerminal::Prolongation => "Prol",
            NonTerminal::Preparation => "Prep",
            NonTerminal::Phrase => "Ph",
        }
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// X -> X Y, extends a function in time.
    Prolongation,
    /// X -> Prep X, approaches a function.
    Preparation,
    Substitution,
    /// X -> chord.
    Terminal,
    /// S -> T D T and other top-level forms.
    Structural,
}

/// A chord function: scale degree ("ii", "bII", "V/V") plus quality string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSymbol {
    pub degree: String,
    pub quality: String,
    pub key_relative: bool,
}

impl TerminalSymbol {
    pub fn new(degree: &str, quality: &str) -> Self {
        TerminalSymbol {
            degree: degree.to_string(),
            quality: quality.to_string(),
            key_relative: true,
        }
    }

    /// The target of a secondary dominant ("ii" for "V/ii"), if this is one.
    pub fn secondary_target(&self) -> Option<&str> {
        self.degree.split_once("V/").map(|(_, target)| target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// A function to expand. `key: None` inherits the parent's key.
    NonTerminal {
        nt: NonTerminal,
        key: Option<PitchClass>,
    },
    Terminal(TerminalSymbol),
}

impl Symbol {
    pub fn nt(nt: NonTerminal) -> Self {
        Symbol::NonTerminal { nt, key: None }
    }

    pub fn terminal(degree: &str, quality: &str) -> Self {
        Symbol::Terminal(TerminalSymbol::new(degree, quality))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::NonTerminal { nt, key: Some(k) } => write!(f, "{nt}[{}]", k.value()),
            Symbol::NonTerminal { nt, key: None } => write!(f, "{nt}"),
            Symbol::Terminal(t) => write!(f, "{}{}", t.degree, t.quality),
        }
    }
}

/// One production `lhs -> rhs` with a weight in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarRule {
    pub lhs: NonTerminal,
    pub rhs: Vec<Symbol>,
    weight: f64,
    pub rule_type: RuleType,
    pub name: String,
}

impl GrammarRule {
    pub fn new(
        lhs: NonTerminal,
        rhs: Vec<Symbol>,
        weight: f64,
        rule_type: RuleType,
        name: &str,
    ) -> Self {
        GrammarRule {
            lhs,
            rhs,
            weight: clamp_weight(weight),
            rule_type,
            name: name.to_string(),
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = clamp_weight(weight);
    }
}

impl fmt::Display for GrammarRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", self.lhs)?;
        for sym in &self.rhs {
            write!(f, " {sym}")?;
        }
        write!(f, " [{:.4}]", self.weight)
    }
}

fn clamp_weight(w: f64) -> f64 {
    if w.is_nan() { 0.0 } else { w.clamp(0.0, 1.0) }
}

/// Weighted production rules per non-terminal, plus the generator that
/// samples them.
#[derive(Debug, Clone)]
pub struct Pcfg {
    pub start: NonTerminal,
    rules: BTreeMap<NonTerminal, Vec<GrammarRule>>,
    rng: SeedRng,
}

impl Pcfg {
    pub fn new(start: NonTerminal, seed: u64) -> Self {
        Pcfg {
            start,
            rules: BTreeMap::new(),
            rng: SeedRng::new(seed),
        }
    }

    /// Append a rule; it goes after any existing rules for the same
    /// non-terminal, which matters for sampling order.
    pub fn add_rule(&mut self, rule: GrammarRule) {
        self.rules.entry(rule.lhs).or_default().push(rule);
    }

    pub fn rules(&self, nt: NonTerminal) -> &[GrammarRule] {
        self.rules.get(&nt).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rules_mut(&mut self, nt: NonTerminal) -> &mut [GrammarRule] {
        self.rules
            .get_mut(&nt)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn rule(&self, name: &str) -> Option<&GrammarRule> {
        self.rules.values().flatten().find(|r| r.name == name)
    }

    pub fn rule_mut(&mut self, name: &str) -> Option<&mut GrammarRule> {
        self.rules.values_mut().flatten().find(|r| r.name == name)
    }

    /// Set a named rule's weight (clamped). Returns false if no rule has
    /// that name.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> bool {
        match self.rule_mut(name) {
            Some(rule) => {
                rule.set_weight(weight);
                true
            }
            None => false,
        }
    }

    /// Rescale each non-terminal's weights to sum to 1. Sets whose total is
    /// zero are left alone.
    pub fn normalize(&mut self) {
        for list in self.rules.values_mut() {
            let total: f64 = list.iter().map(|r| r.weight).sum();
            if total > 0.0 {
                for rule in list.iter_mut() {
                    rule.weight /= total;
                }
            }
        }
    }

    /// Weighted draw among the rules for `nt`. All-zero weights fall back to
    /// a uniform choice. `None` only when `nt` has no rules.
    pub fn sample_rule(&mut self, nt: NonTerminal) -> Option<&GrammarRule> {
        let list = self.rules.get(&nt)?;
        if list.is_empty() {
            return None;
        }
        let total: f64 = list.iter().map(|r| r.weight).sum();
        if total <= 0.0 {
            return list.get(self.rng.range_usize(0, list.len()));
        }

        let target = self.rng.next_f64() * total;
        let mut cumulative = 0.0;
        for rule in list {
            cumulative += rule.weight;
            if cumulative >= target {
                return Some(rule);
            }
        }
        list.last()
    }

    /// Uniform choice among the terminal-type rules for `nt`, ignoring
    /// weights. Used to cut derivation off at the depth limit.
    pub fn sample_terminal_rule(&mut self, nt: NonTerminal) -> Option<&GrammarRule> {
        let terminals: Vec<&GrammarRule> = self
            .rules
            .get(&nt)?
            .iter()
            .filter(|r| r.rule_type == RuleType::Terminal)
            .collect();
        if terminals.is_empty() {
            return None;
        }
        let pick = self.rng.range_usize(0, terminals.len());
        Some(terminals[pick])
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng.reseed(seed);
    }

    pub fn rng(&self) -> &SeedRng {
        &self.rng
    }

    /// Replace the sampling generator, e.g. to carry its state across a
    /// rebuilt grammar.
    pub fn set_rng(&mut self, rng: SeedRng) {
        self.rng = rng;
    }
}

impl fmt::Display for Pcfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in self.rules.values().flatten() {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

/// The functional jazz grammar every style starts from, normalized.
pub fn base_grammar(seed: u64) -> Pcfg {
    use NonTerminal::*;
    use RuleType as R;

    let nt = Symbol::nt;
    let term = Symbol::terminal;
    let mut g = Pcfg::new(Start, seed);
    let mut add = |lhs, rhs, w, ty, name: &str| g.add_rule(GrammarRule::new(lhs, rhs, w, ty, name));

    add(Start, vec![nt(Tonic)], 0.3, R::Structural, "single_phrase");
    add(Start, vec![nt(Tonic), nt(Dominant), nt(Tonic)], 0.5, R::Structural, "tdt_form");
    add(Start, vec![nt(Tonic), nt(Tonic)], 0.2, R::Structural, "tt_form");

    add(Tonic, vec![term("I", "maj7")], 0.3, R::Terminal, "t_terminal");
    add(Tonic, vec![nt(Dominant), nt(Tonic)], 0.35, R::Preparation, "authentic_cadence");
    add(Tonic, vec![nt(Subdominant), nt(Tonic)], 0.15, R::Preparation, "plagal_cadence");
    add(Tonic, vec![nt(Tonic), nt(Prolongation)], 0.1, R::Prolongation, "t_right_prolong");
    add(Tonic, vec![nt(Prolongation), nt(Tonic)], 0.1, R::Prolongation, "t_left_prolong");

    add(Dominant, vec![term("V", "7")], 0.4, R::Terminal, "d_terminal");
    add(Dominant, vec![nt(Preparation), nt(Dominant)], 0.4, R::Preparation, "ii_v");
    add(Dominant, vec![nt(Dominant), nt(Prolongation)], 0.1, R::Prolongation, "d_prolong");
    add(Dominant, vec![term("bII", "7")], 0.1, R::Substitution, "tritone_sub");

    add(Subdominant, vec![term("IV", "maj7")], 0.5, R::Terminal, "sd_iv");
    add(Subdominant, vec![term("ii", "min7")], 0.3, R::Terminal, "sd_ii");
    add(Subdominant, vec![term("iv", "min7")], 0.2, R::Terminal, "sd_borrowed_iv");

    add(Preparation, vec![term("ii", "min7")], 0.5, R::Terminal, "prep_ii");
    add(Preparation, vec![term("IV", "maj7")], 0.2, R::Terminal, "prep_iv");
    add(Preparation, vec![term("V/V", "7")], 0.15, R::Terminal, "prep_secondary_dom");
    add(Preparation, vec![nt(Preparation), nt(Preparation)], 0.15, R::Prolongation, "prep_chain");

    add(Prolongation, vec![term("iii", "min7")], 0.3, R::Terminal, "prol_iii");
    add(Prolongation, vec![term("vi", "min7")], 0.4, R::Terminal, "prol_vi");
    add(Prolongation, vec![term("I", "maj7")], 0.3, R::Terminal, "prol_i");

    g.normalize();
    g
}

/// Semitones above the key for a scale-degree string. Only three secondary
/// dominants are known ("V/V", "V/ii", "V/IV"); anything unrecognised is 0.
pub fn degree_to_semitones(degree: &str) -> i32 {
    match degree {
        "I" | "i" => 0,
        "bII" => 1,
        "II" | "ii" => 2,
        "bIII" => 3,
        "III" | "iii" => 4,
        "IV" | "iv" => 5,
        "#IV" => 6,
        "V" | "v" => 7,
        "bVI" => 8,
        "VI" | "vi" => 9,
        "bVII" => 10,
        "VII" | "vii" => 11,
        "V/V" => 2,
        "V/ii" => 9,
        "V/IV" => 0,
        _ => 0,
    }
}

/// Chord quality for a terminal's quality string. Unknown strings are maj7.
pub fn quality_from_str(quality: &str) -> ChordQuality {
    match quality {
        "maj7" | "Maj7" => ChordQuality::Maj7,
        "min7" | "m7" => ChordQuality::Min7,
        "7" | "dom7" => ChordQuality::Dom7,
        "m7b5" | "hdim7" => ChordQuality::HalfDim7,
        "dim7" => ChordQuality::Dim7,
        "aug" => ChordQuality::Aug,
        "mMaj7" => ChordQuality::MinMaj7,
        "maj6" | "6" => ChordQuality::Maj6,
        "min6" | "m6" => ChordQuality::Min6,
        "sus4" => ChordQuality::Sus4,
        "sus2" => ChordQuality::Sus2,
        _ => ChordQuality::Maj7,
    }
}
