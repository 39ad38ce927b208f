// Treebank statistics: learn grammar weights from analysed jazz standards.
//
// A treebank file is a JSON array of pieces. Each piece carries its key, its
// chord sequence and zero or more constituent trees whose nodes are labelled
// with chord symbols in treebank notation ("C^7", "Dm7", "F%7", "Bo7").
// A trailing '*' marks a node the annotator inferred rather than read off the
// lead sheet.
//
// `analyze` walks every tree and classifies each node by harmonic function
// (tonic, dominant, subdominant) relative to the piece's key. Binary nodes,
// unary nodes, leaves, leaf-to-leaf progressions and cadences in the flat
// chord sequence are all counted. Patterns that correspond to a rule of the
// base grammar are also counted under that rule's name.
//
// `TreebankStats::apply_to` turns the per-rule counts into add-one smoothed
// relative frequencies, multiplies them into the grammar's current weights
// and renormalizes. Non-terminals with no observations are left alone, so a
// small treebank shapes the style weighting rather than replacing it.
//
// See also: grammar.rs for the rule names, engine.rs which reapplies the
// statistics every time it rebuilds its grammar.

use crate::error::Result;
use crate::grammar::{NonTerminal, Pcfg};
use crate::pitch::PitchClass;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    label: String,
    #[serde(default)]
    children: Vec<RawNode>,
}

/// One node of a constituent tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawNode")]
pub struct TreeNode {
    pub label: String,
    pub children: Vec<TreeNode>,
    /// Label carried a trailing '*'; the marker is stripped from `label`.
    pub implicit: bool,
}

impl From<RawNode> for TreeNode {
    fn from(raw: RawNode) -> Self {
        let (label, implicit) = match raw.label.strip_suffix('*') {
            Some(stripped) => (stripped.to_string(), true),
            None => (raw.label, false),
        };
        TreeNode {
            label,
            children: raw.children.into_iter().map(TreeNode::from).collect(),
            implicit,
        }
    }
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Zero for a leaf.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Leaf labels, left to right.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.is_leaf() {
            out.push(&self.label);
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisTree {
    #[serde(default)]
    pub open_constituent_tree: Option<TreeNode>,
}

/// One analysed piece.
#[derive(Debug, Clone, Deserialize)]
pub struct TreebankEntry {
    #[serde(default)]
    pub title: Option<String>,
    /// Key name such as "C" or "Eb-"; only the root is read.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub chords: Vec<String>,
    #[serde(default)]
    pub trees: Vec<AnalysisTree>,
}

impl TreebankEntry {
    /// Root of the piece's key, C when missing or unreadable.
    pub fn key_root(&self) -> PitchClass {
        self.key
            .as_deref()
            .and_then(split_root)
            .map(|(root, _)| root)
            .unwrap_or_default()
    }
}

pub fn parse_treebank(json: &str) -> Result<Vec<TreebankEntry>> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_treebank(path: &Path) -> Result<Vec<TreebankEntry>> {
    let text = std::fs::read_to_string(path)?;
    parse_treebank(&text)
}

// ---------------------------------------------------------------------------
// Chord labels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HarmonicFunction {
    Tonic,
    Dominant,
    Subdominant,
    /// Unclassified, including labels with no readable root.
    Other,
}

impl fmt::Display for HarmonicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            HarmonicFunction::Tonic => "T",
            HarmonicFunction::Dominant => "D",
            HarmonicFunction::Subdominant => "SD",
            HarmonicFunction::Other => "other",
        })
    }
}

/// "Bb^7" -> (Bb, "^7"). A 'b' right after the letter is always a flat.
fn split_root(label: &str) -> Option<(PitchClass, &str)> {
    let first = label.chars().next()?;
    if !('A'..='G').contains(&first) {
        return None;
    }
    let len = match label.as_bytes().get(1) {
        Some(b'#' | b'b') => 2,
        _ => 1,
    };
    Some((PitchClass::from_name(&label[..len])?, &label[len..]))
}

/// Treebank quality suffix to a quality name. Unknown suffixes pass through.
fn normalize_quality(suffix: &str) -> &str {
    match suffix {
        "" => "maj",
        "^7" | "^" => "maj7",
        "7" => "dom7",
        "m7" => "min7",
        "m" => "min",
        "m7b5" | "%7" | "%" => "hdim7",
        "o7" => "dim7",
        "o" => "dim",
        "+" => "aug",
        "sus" | "sus7" => "sus4",
        "6" => "maj6",
        "m6" => "min6",
        other => other,
    }
}

/// Quality name of a treebank chord label, or the label itself when it has
/// no root.
pub fn chord_type(label: &str) -> &str {
    match split_root(label) {
        Some((_, suffix)) => normalize_quality(suffix),
        None => label,
    }
}

/// Harmonic function of a chord label in `key`.
pub fn classify_function(label: &str, key: PitchClass) -> HarmonicFunction {
    use HarmonicFunction::*;

    let Some((root, suffix)) = split_root(label) else {
        return Other;
    };
    let quality = normalize_quality(suffix);
    match (key.interval_to(root), quality) {
        (0, "maj" | "maj7" | "maj6") => Tonic,
        (7, "dom7" | "sus4") => Dominant,
        (2, "min7" | "min") => Subdominant,
        (5, "maj" | "maj7") => Subdominant,
        (9, "min7" | "min") => Tonic,
        (4, "min7" | "min") => Tonic,
        (11, "hdim7" | "dim7") => Dominant,
        // Secondary dominants.
        (_, "dom7") => Dominant,
        _ => Other,
    }
}

/// Base-grammar terminal rules that emit this chord in `key`. Some chords
/// are produced by more than one rule and credit all of them.
fn terminal_rule_names(label: &str, key: PitchClass) -> &'static [&'static str] {
    let Some((root, suffix)) = split_root(label) else {
        return &[];
    };
    match (key.interval_to(root), normalize_quality(suffix)) {
        (0, "maj" | "maj7" | "maj6") => &["t_terminal", "prol_i"],
        (7, "dom7") => &["d_terminal"],
        (1, "dom7") => &["tritone_sub"],
        (2, "dom7") => &["prep_secondary_dom"],
        (2, "min" | "min7") => &["sd_ii", "prep_ii"],
        (5, "maj" | "maj7" | "maj6") => &["sd_iv", "prep_iv"],
        (5, "min" | "min7" | "min6") => &["sd_borrowed_iv"],
        (4, "min" | "min7") => &["prol_iii"],
        (9, "min" | "min7") => &["prol_vi"],
        _ => &[],
    }
}

/// Base-grammar binary rule matching a (parent, left, right) pattern.
fn binary_rule_name(
    parent: HarmonicFunction,
    left: HarmonicFunction,
    right: HarmonicFunction,
) -> Option<&'static str> {
    use HarmonicFunction::*;

    match (parent, left, right) {
        (Tonic, Dominant, Tonic) => Some("authentic_cadence"),
        (Tonic, Subdominant, Tonic) => Some("plagal_cadence"),
        (Tonic, Tonic, _) => Some("t_right_prolong"),
        (Tonic, _, Tonic) => Some("t_left_prolong"),
        (Dominant, Subdominant, Dominant) => Some("ii_v"),
        (Dominant, Dominant, _) => Some("d_prolong"),
        (Subdominant, Subdominant, Subdominant) => Some("prep_chain"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Cadences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cadence {
    TwoFiveOne,
    FiveOne,
    FourOne,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Cadence::TwoFiveOne => "ii-V-I",
            Cadence::FiveOne => "V-I",
            Cadence::FourOne => "IV-I",
        })
    }
}

/// Dominant-to-tonic and subdominant-to-tonic motions in a chord sequence.
/// A dominant-to-tonic step preceded by a subdominant counts as ii-V-I.
pub fn detect_cadences<S: AsRef<str>>(chords: &[S], key: PitchClass) -> Vec<Cadence> {
    use HarmonicFunction::*;

    let functions: Vec<HarmonicFunction> = chords
        .iter()
        .map(|c| classify_function(c.as_ref(), key))
        .collect();
    let mut found = Vec::new();
    for (i, pair) in functions.windows(2).enumerate() {
        let before = i.checked_sub(1).map(|j| functions[j]);
        match (pair[0], pair[1]) {
            (Dominant, Tonic) if before == Some(Subdominant) => found.push(Cadence::TwoFiveOne),
            (Dominant, Tonic) => found.push(Cadence::FiveOne),
            (Subdominant, Tonic) => found.push(Cadence::FourOne),
            _ => {}
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

type FunctionTriple = (HarmonicFunction, HarmonicFunction, HarmonicFunction);

/// Counts gathered from a treebank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreebankStats {
    /// (parent, left, right) function patterns of binary nodes.
    pub binary: BTreeMap<FunctionTriple, usize>,
    /// (parent, child) function patterns of unary nodes.
    pub unary: BTreeMap<(HarmonicFunction, HarmonicFunction), usize>,
    /// Leaf chord types.
    pub terminals: BTreeMap<String, usize>,
    /// Chord types across each binary split: last leaf on the left, first
    /// on the right.
    pub progressions: BTreeMap<(String, String), usize>,
    pub cadences: BTreeMap<Cadence, usize>,
    /// Observations credited to base-grammar rules, by rule name.
    pub rule_counts: BTreeMap<&'static str, usize>,
    /// Trees walked.
    pub trees: usize,
}

impl TreebankStats {
    pub fn rule_count(&self, name: &str) -> usize {
        self.rule_counts.get(name).copied().unwrap_or(0)
    }

    pub fn terminal_probabilities(&self) -> BTreeMap<String, f64> {
        relative(&self.terminals)
    }

    pub fn cadence_probabilities(&self) -> BTreeMap<Cadence, f64> {
        relative(&self.cadences)
    }

    /// The `n` most frequent progressions, most frequent first. Ties keep
    /// key order.
    pub fn top_progressions(&self, n: usize) -> Vec<(&(String, String), usize)> {
        let mut list: Vec<_> = self.progressions.iter().map(|(k, &v)| (k, v)).collect();
        list.sort_by_key(|&(_, n)| std::cmp::Reverse(n));
        list.truncate(n);
        list
    }

    /// Reweight `grammar` from the per-rule counts and renormalize. Each
    /// rule's weight is multiplied by `(count + 1) / (observed + rules)`
    /// for its non-terminal. Returns how many non-terminals were touched.
    pub fn apply_to(&self, grammar: &mut Pcfg) -> usize {
        const REWEIGHTED: [NonTerminal; 5] = [
            NonTerminal::Tonic,
            NonTerminal::Dominant,
            NonTerminal::Subdominant,
            NonTerminal::Preparation,
            NonTerminal::Prolongation,
        ];

        let mut touched = 0;
        for nt in REWEIGHTED {
            let rules = grammar.rules_mut(nt);
            let observed: usize = rules.iter().map(|r| self.rule_count(&r.name)).sum();
            if observed == 0 {
                continue;
            }
            let denominator = (observed + rules.len()) as f64;
            for rule in rules.iter_mut() {
                let share = (self.rule_count(&rule.name) + 1) as f64 / denominator;
                rule.set_weight(rule.weight() * share);
            }
            touched += 1;
        }
        grammar.normalize();
        tracing::debug!(touched, "grammar reweighted from treebank");
        touched
    }

    fn record_tree(&mut self, node: &TreeNode, key: PitchClass) {
        if node.is_leaf() {
            *self
                .terminals
                .entry(chord_type(&node.label).to_string())
                .or_insert(0) += 1;
            for &name in terminal_rule_names(&node.label, key) {
                *self.rule_counts.entry(name).or_insert(0) += 1;
            }
            return;
        }

        let parent = classify_function(&node.label, key);
        match node.children.as_slice() {
            [left, right] => {
                let pattern = (
                    parent,
                    classify_function(&left.label, key),
                    classify_function(&right.label, key),
                );
                *self.binary.entry(pattern).or_insert(0) += 1;
                if let Some(name) = binary_rule_name(pattern.0, pattern.1, pattern.2) {
                    *self.rule_counts.entry(name).or_insert(0) += 1;
                }

                let left_leaves = left.leaves();
                let right_leaves = right.leaves();
                if let (Some(last), Some(first)) = (left_leaves.last(), right_leaves.first()) {
                    let step = (chord_type(last).to_string(), chord_type(first).to_string());
                    *self.progressions.entry(step).or_insert(0) += 1;
                }

                self.record_tree(left, key);
                self.record_tree(right, key);
            }
            [child] => {
                let pattern = (parent, classify_function(&child.label, key));
                *self.unary.entry(pattern).or_insert(0) += 1;
                self.record_tree(child, key);
            }
            // Wider nodes are not part of the binary analysis.
            _ => {}
        }
    }
}

fn relative<K: Clone + Ord>(counts: &BTreeMap<K, usize>) -> BTreeMap<K, f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(k, &v)| (k.clone(), v as f64 / total as f64))
        .collect()
}

/// Count every tree and cadence in `entries`. Pieces without trees are
/// skipped entirely.
pub fn analyze(entries: &[TreebankEntry]) -> TreebankStats {
    let mut stats = TreebankStats::default();
    for entry in entries {
        if entry.trees.is_empty() {
            continue;
        }
        let key = entry.key_root();
        for tree in entry.trees.iter().filter_map(|t| t.open_constituent_tree.as_ref()) {
            stats.record_tree(tree, key);
            stats.trees += 1;
        }
        for cadence in detect_cadences(&entry.chords, key) {
            *stats.cadences.entry(cadence).or_insert(0) += 1;
        }
    }
    tracing::info!(
        trees = stats.trees,
        pieces = entries.len(),
        "treebank analyzed"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarRule, base_grammar};
    use crate::pitch::{C, EB, F};

    /// ii-V-I in C, analysed as ((Dm7 G7) C^7).
    const TWO_FIVE_ONE: &str = r#"[
        {
            "title": "Cadence",
            "key": "C",
            "chords": ["Dm7", "G7", "C^7"],
            "trees": [
                {
                    "open_constituent_tree": {
                        "label": "C^7",
                        "children": [
                            {
                                "label": "G7",
                                "children": [
                                    {"label": "Dm7", "children": []},
                                    {"label": "G7", "children": []}
                                ]
                            },
                            {"label": "C^7", "children": []}
                        ]
                    }
                }
            ]
        },
        {"title": "No analysis", "key": "F", "chords": ["C7", "F^7"], "trees": []}
    ]"#;

    fn weight(g: &Pcfg, name: &str) -> f64 {
        g.rule(name).map(GrammarRule::weight).unwrap_or(f64::NAN)
    }

    #[test]
    fn test_tree_from_json() {
        let node: TreeNode =
            serde_json::from_str(r#"{"label": "G7*", "children": [{"label": "Dm7"}]}"#).unwrap();
        assert_eq!(node.label, "G7");
        assert!(node.implicit);
        assert!(!node.children[0].implicit);
        assert_eq!(node.depth(), 1);
        assert_eq!(node.leaves(), vec!["Dm7"]);
    }

    #[test]
    fn test_chord_labels() {
        assert_eq!(chord_type("Bb^7"), "maj7");
        assert_eq!(chord_type("F%7"), "hdim7");
        assert_eq!(chord_type("C"), "maj");
        assert_eq!(chord_type("E7alt"), "7alt");
        assert_eq!(chord_type("NC"), "NC");

        assert_eq!(classify_function("C^7", C), HarmonicFunction::Tonic);
        assert_eq!(classify_function("G7", C), HarmonicFunction::Dominant);
        assert_eq!(classify_function("Dm7", C), HarmonicFunction::Subdominant);
        assert_eq!(classify_function("Am7", C), HarmonicFunction::Tonic);
        assert_eq!(classify_function("Bo7", C), HarmonicFunction::Dominant);
        assert_eq!(classify_function("A7", C), HarmonicFunction::Dominant);
        assert_eq!(classify_function("Ebm7", C), HarmonicFunction::Other);
        assert_eq!(classify_function("x", C), HarmonicFunction::Other);
        // Relative to the key, not to C.
        assert_eq!(classify_function("Bb7", EB), HarmonicFunction::Dominant);
        assert_eq!(classify_function("Bb^7", F), HarmonicFunction::Subdominant);
    }

    #[test]
    fn test_key_root() {
        let entries = parse_treebank(
            r#"[{"key": "Eb-"}, {"key": "nonsense"}, {}]"#,
        )
        .unwrap();
        let roots: Vec<PitchClass> = entries.iter().map(TreebankEntry::key_root).collect();
        assert_eq!(roots, vec![EB, C, C]);
    }

    #[test]
    fn test_detect_cadences() {
        let chords = ["Dm7", "G7", "C^7", "F^7", "C^7", "G7", "C"];
        assert_eq!(
            detect_cadences(&chords, C),
            vec![Cadence::TwoFiveOne, Cadence::FourOne, Cadence::FiveOne]
        );
        assert!(detect_cadences::<&str>(&[], C).is_empty());
        assert!(detect_cadences(&["G7"], C).is_empty());
    }

    #[test]
    fn test_analyze_counts() {
        let stats = analyze(&parse_treebank(TWO_FIVE_ONE).unwrap());
        assert_eq!(stats.trees, 1);

        use HarmonicFunction::*;
        assert_eq!(stats.binary.get(&(Tonic, Dominant, Tonic)), Some(&1));
        assert_eq!(stats.binary.get(&(Dominant, Subdominant, Dominant)), Some(&1));
        assert!(stats.unary.is_empty());

        assert_eq!(stats.terminals.get("min7"), Some(&1));
        assert_eq!(stats.terminals.get("dom7"), Some(&1));
        assert_eq!(stats.terminals.get("maj7"), Some(&1));
        let p = stats.terminal_probabilities();
        assert!((p["maj7"] - 1.0 / 3.0).abs() < 1e-12);

        let dom_to_maj = ("dom7".to_string(), "maj7".to_string());
        assert_eq!(stats.progressions.get(&dom_to_maj), Some(&1));
        assert_eq!(stats.top_progressions(1).len(), 1);

        // The piece without trees contributes no cadence either.
        assert_eq!(stats.cadences.get(&Cadence::TwoFiveOne), Some(&1));
        assert_eq!(stats.cadences.len(), 1);
        assert_eq!(stats.cadence_probabilities()[&Cadence::TwoFiveOne], 1.0);

        for name in ["authentic_cadence", "ii_v", "sd_ii", "prep_ii", "d_terminal", "t_terminal"] {
            assert_eq!(stats.rule_count(name), 1, "{name}");
        }
        assert_eq!(stats.rule_count("plagal_cadence"), 0);
    }

    #[test]
    fn test_apply_reweights_observed_rules() {
        let stats = analyze(&parse_treebank(TWO_FIVE_ONE).unwrap());
        let before = base_grammar(0);
        let mut after = base_grammar(0);
        assert_eq!(stats.apply_to(&mut after), 5);

        // Tonic: 0.35 * 2/7 against 1.65/7 in total.
        assert!((weight(&after, "authentic_cadence") - 0.7 / 1.65).abs() < 1e-9);
        assert!(weight(&after, "plagal_cadence") < weight(&before, "plagal_cadence"));
        assert!(weight(&after, "prol_i") > weight(&before, "prol_i"));

        // No observations for the start symbol.
        for rule in before.rules(NonTerminal::Start) {
            assert!((weight(&after, &rule.name) - rule.weight()).abs() < 1e-12);
        }
        for nt in [NonTerminal::Tonic, NonTerminal::Dominant, NonTerminal::Prolongation] {
            let total: f64 = after.rules(nt).iter().map(GrammarRule::weight).sum();
            assert!((total - 1.0).abs() < 1e-9, "{nt}");
        }
    }

    #[test]
    fn test_empty_stats_leave_grammar_alone() {
        let mut g = base_grammar(0);
        assert_eq!(TreebankStats::default().apply_to(&mut g), 0);
        assert!((weight(&g, "ii_v") - weight(&base_grammar(0), "ii_v")).abs() < 1e-12);
        assert!(TreebankStats::default().terminal_probabilities().is_empty());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_treebank("{not json").is_err());
        assert!(parse_treebank(r#"{"key": "C"}"#).is_err());
    }
}
