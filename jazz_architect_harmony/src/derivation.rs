// Top-down stochastic derivation of a grammar into a chord sequence.
//
// Starting from the grammar's start symbol in the requested key, each
// non-terminal is expanded by a sampled rule until only terminals remain.
// The result is a `DerivationTree` stored as an arena of nodes addressed by
// `NodeId`; nodes are pushed in pre-order, so the arena never holds cycles
// and child lists point strictly forward.
//
// Termination is guaranteed by the depth limit: a non-terminal reached at
// `max_depth` is forced to one of its terminal-type rules (chosen uniformly),
// and a category with no terminal rules gets a fixed default chord. The same
// default covers a category that has no rules at all.
//
// Key context flows down the tree. A child takes its own explicit key if it
// has one, else its parent's. A secondary-dominant terminal ("V/ii") moves
// the key of its own leaf to the target degree, so "V/ii" in C yields A7.
//
// Consumed by engine.rs, which derives once per `generate` call.

use crate::chord::{ChordQuality, ChordSymbol};
use crate::grammar::{
    GrammarRule, NonTerminal, Pcfg, Symbol, TerminalSymbol, degree_to_semitones,
    quality_from_str,
};
use crate::pitch::PitchClass;

/// Index of a node inside a `DerivationTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct DerivationNode {
    pub symbol: Symbol,
    /// Key in force at this node after inheritance and modulation.
    pub key: PitchClass,
    pub children: Vec<NodeId>,
    /// The production applied here. `None` for leaves and for synthesized
    /// default terminals.
    pub rule: Option<GrammarRule>,
}

/// A finished derivation. Node 0 is the root.
#[derive(Debug, Clone, Default)]
pub struct DerivationTree {
    nodes: Vec<DerivationNode>,
}

impl DerivationTree {
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn node(&self, id: NodeId) -> &DerivationNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, symbol: Symbol, key: PitchClass) -> NodeId {
        self.nodes.push(DerivationNode {
            symbol,
            key,
            children: Vec::new(),
            rule: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Terminal leaves in left-to-right order, each with its resolved key.
    pub fn leaves(&self) -> Vec<(&TerminalSymbol, PitchClass)> {
        let mut out = Vec::new();
        let Some(root) = self.root() else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if let Symbol::Terminal(term) = &node.symbol {
                out.push((term, node.key));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Longest root-to-leaf path in edges. A lone root has depth 0.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 0)];
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            for &child in &self.node(id).children {
                stack.push((child, d + 1));
            }
        }
        deepest
    }

    /// Map every leaf to a concrete chord.
    pub fn chords(&self) -> Vec<ChordSymbol> {
        self.leaves()
            .into_iter()
            .map(|(term, key)| terminal_to_chord(term, key))
            .collect()
    }

    /// Indented dump, one node per line: symbol, key, and the rule applied.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let Some(root) = self.root() else {
            return out;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((id, indent)) = stack.pop() {
            let node = self.node(id);
            out.push_str(&"  ".repeat(indent));
            out.push_str(&format!("{} @{}", node.symbol, node.key));
            if let Some(rule) = &node.rule {
                out.push_str(&format!(" <- {}", rule.name));
            }
            out.push('\n');
            for &child in node.children.iter().rev() {
                stack.push((child, indent + 1));
            }
        }
        out
    }
}

/// Concrete chord for a leaf. Secondary-dominant degrees read as "V" because
/// the leaf's key has already been moved to the target.
pub fn terminal_to_chord(term: &TerminalSymbol, key: PitchClass) -> ChordSymbol {
    let degree = if term.degree.contains('/') {
        "V"
    } else {
        term.degree.as_str()
    };
    ChordSymbol::new(
        key.transpose(degree_to_semitones(degree)),
        quality_from_str(&term.quality),
    )
}

/// Fallback chord per category when no rule can be used.
pub fn default_terminal(nt: NonTerminal) -> TerminalSymbol {
    match nt {
        NonTerminal::Tonic => TerminalSymbol::new("I", "maj7"),
        NonTerminal::Dominant => TerminalSymbol::new("V", "7"),
        NonTerminal::Subdominant => TerminalSymbol::new("IV", "maj7"),
        NonTerminal::Preparation => TerminalSymbol::new("ii", "min7"),
        NonTerminal::Prolongation => TerminalSymbol::new("vi", "min7"),
        NonTerminal::Start | NonTerminal::Phrase => TerminalSymbol::new("I", "maj7"),
    }
}

/// Expands a grammar from its start symbol. Borrows the grammar mutably
/// because every sampled rule advances the grammar's generator.
pub struct Deriver<'g> {
    grammar: &'g mut Pcfg,
    max_depth: usize,
}

impl<'g> Deriver<'g> {
    /// `max_depth` below 1 is raised to 1.
    pub fn new(grammar: &'g mut Pcfg, max_depth: usize) -> Self {
        Deriver {
            grammar,
            max_depth: max_depth.max(1),
        }
    }

    /// Derive one tree from the start symbol in `key`.
    pub fn derive_tree(&mut self, key: PitchClass) -> DerivationTree {
        let mut tree = DerivationTree::default();
        let start = Symbol::NonTerminal {
            nt: self.grammar.start,
            key: Some(key),
        };
        self.derive(&mut tree, start, 0, key);
        tracing::debug!(
            nodes = tree.len(),
            depth = tree.depth(),
            max_depth = self.max_depth,
            "derivation complete"
        );
        tree
    }

    fn derive(
        &mut self,
        tree: &mut DerivationTree,
        symbol: Symbol,
        depth: usize,
        inherited: PitchClass,
    ) -> NodeId {
        let (nt, current_key) = match symbol {
            Symbol::Terminal(_) => return tree.push(symbol, inherited),
            Symbol::NonTerminal { nt, key } => (nt, key.unwrap_or(inherited)),
        };
        let id = tree.push(symbol, current_key);

        let rule = if depth >= self.max_depth {
            let forced = self.grammar.sample_terminal_rule(nt).cloned();
            if forced.is_some() {
                tracing::trace!(%nt, depth, "forcing terminal at depth limit");
            }
            forced
        } else {
            self.grammar.sample_rule(nt).cloned()
        };

        let Some(rule) = rule else {
            tracing::trace!(%nt, depth, "no usable rule, synthesizing default terminal");
            let leaf = tree.push(Symbol::Terminal(default_terminal(nt)), current_key);
            tree.nodes[id.0].children.push(leaf);
            return id;
        };

        for child in &rule.rhs {
            let (child_symbol, child_key) = match child {
                Symbol::NonTerminal { nt, key } => {
                    let k = key.unwrap_or(current_key);
                    (
                        Symbol::NonTerminal {
                            nt: *nt,
                            key: Some(k),
                        },
                        k,
                    )
                }
                Symbol::Terminal(term) => {
                    let k = match term.secondary_target() {
                        Some(target) => current_key.transpose(degree_to_semitones(target)),
                        None => current_key,
                    };
                    (child.clone(), k)
                }
            };
            let child_id = self.derive(tree, child_symbol, depth + 1, child_key);
            tree.nodes[id.0].children.push(child_id);
        }
        tree.nodes[id.0].rule = Some(rule);
        id
    }
}

/// Reseed `grammar`, derive once in `key`, and return the chords with the
/// tree they came from.
pub fn derive_progression(
    grammar: &mut Pcfg,
    key: PitchClass,
    max_depth: usize,
    seed: u64,
) -> (Vec<ChordSymbol>, DerivationTree) {
    grammar.reseed(seed);
    let tree = Deriver::new(grammar, max_depth).derive_tree(key);
    (tree.chords(), tree)
}

/// Plain grammar output with no style applied: base grammar, depth scaled
/// to the length, then cut or padded with the tonic to exactly `length`.
pub fn generate_progression(length: usize, key: PitchClass, seed: u64) -> Vec<ChordSymbol> {
    let mut grammar = crate::grammar::base_grammar(seed);
    let max_depth = (length / 2 + 2).min(6);
    let (mut chords, _) = derive_progression(&mut grammar, key, max_depth, seed);
    chords.resize(length, ChordSymbol::new(key, ChordQuality::Maj7));
    chords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{RuleType, base_grammar};
    use crate::pitch::{A, C, D, F, G};

    #[test]
    fn test_derivation_terminates_at_every_depth() {
        for depth in 0..8 {
            for seed in 0..50 {
                let mut g = base_grammar(seed);
                let (chords, tree) = derive_progression(&mut g, C, depth, seed);
                assert!(!chords.is_empty(), "depth {depth} seed {seed}");
                assert!(tree.depth() <= depth.max(1) + 1, "tree too deep");
            }
        }
    }

    #[test]
    fn test_same_seed_same_tree() {
        let mut a = base_grammar(0);
        let mut b = base_grammar(0);
        let (ca, ta) = derive_progression(&mut a, G, 5, 42);
        let (cb, tb) = derive_progression(&mut b, G, 5, 42);
        assert_eq!(ca, cb);
        assert_eq!(ta.render(), tb.render());
    }

    #[test]
    fn test_leaves_match_chords() {
        let mut g = base_grammar(11);
        let (chords, tree) = derive_progression(&mut g, D, 4, 11);
        assert_eq!(tree.leaves().len(), chords.len());
    }

    #[test]
    fn test_secondary_dominant_modulates() {
        let mut g = Pcfg::new(NonTerminal::Start, 0);
        g.add_rule(GrammarRule::new(
            NonTerminal::Start,
            vec![
                Symbol::terminal("V/V", "7"),
                Symbol::terminal("V/ii", "7"),
                Symbol::terminal("V", "7"),
                Symbol::terminal("I", "maj7"),
            ],
            1.0,
            RuleType::Structural,
            "secondaries",
        ));
        let (chords, tree) = derive_progression(&mut g, C, 3, 0);
        let roots: Vec<PitchClass> = chords.iter().map(|c| c.root).collect();
        assert_eq!(roots, vec![D, A, G, C]);
        // The modulation is local to the secondary dominant's own leaf.
        let keys: Vec<PitchClass> = tree.leaves().iter().map(|&(_, k)| k).collect();
        assert_eq!(keys, vec![G, D, C, C]);
    }

    #[test]
    fn test_explicit_child_key_overrides_parent() {
        let mut g = Pcfg::new(NonTerminal::Start, 0);
        g.add_rule(GrammarRule::new(
            NonTerminal::Start,
            vec![
                Symbol::NonTerminal {
                    nt: NonTerminal::Tonic,
                    key: Some(F),
                },
                Symbol::nt(NonTerminal::Tonic),
            ],
            1.0,
            RuleType::Structural,
            "two_keys",
        ));
        g.add_rule(GrammarRule::new(
            NonTerminal::Tonic,
            vec![Symbol::terminal("I", "maj7")],
            1.0,
            RuleType::Terminal,
            "t",
        ));
        let (chords, _) = derive_progression(&mut g, C, 4, 0);
        assert_eq!(chords.iter().map(|c| c.root).collect::<Vec<_>>(), vec![F, C]);
    }

    #[test]
    fn test_default_terminal_for_ruleless_category() {
        let mut g = Pcfg::new(NonTerminal::Start, 0);
        g.add_rule(GrammarRule::new(
            NonTerminal::Start,
            vec![
                Symbol::nt(NonTerminal::Preparation),
                Symbol::nt(NonTerminal::Dominant),
                Symbol::nt(NonTerminal::Prolongation),
            ],
            1.0,
            RuleType::Structural,
            "no_children",
        ));
        let (chords, tree) = derive_progression(&mut g, C, 6, 0);
        let text: Vec<String> = chords.iter().map(|c| c.to_string()).collect();
        assert_eq!(text, vec!["Dm7", "G7", "Am7"]);
        // Synthesized defaults record no rule on their parent.
        let root = tree.root().map(|r| tree.node(r));
        let first_child = root.map(|r| tree.node(r.children[0]));
        assert!(first_child.is_some_and(|n| n.rule.is_none()));
    }

    #[test]
    fn test_depth_limit_forces_terminal_rules() {
        let mut g = base_grammar(3);
        let (chords, tree) = derive_progression(&mut g, C, 1, 3);
        // S expands once; every child is cut off at depth 1.
        assert!(tree.depth() <= 2);
        assert!(chords.len() <= 3);
        for c in &chords {
            assert!(matches!(c.quality, ChordQuality::Maj7 | ChordQuality::Dom7));
        }
    }

    #[test]
    fn test_depth_limit_ignores_terminal_weights() {
        // Weighted sampling would always recurse; only the forced path can
        // reach the zero-weight terminals.
        use NonTerminal::{Start, Tonic};

        let mut g = Pcfg::new(Start, 0);
        let mut add = |lhs, rhs, w, ty, name: &str| g.add_rule(GrammarRule::new(lhs, rhs, w, ty, name));
        add(Start, vec![Symbol::nt(Tonic)], 1.0, RuleType::Structural, "s");
        add(Tonic, vec![Symbol::nt(Tonic), Symbol::nt(Tonic)], 1.0, RuleType::Prolongation, "tt");
        add(Tonic, vec![Symbol::terminal("I", "maj7")], 0.0, RuleType::Terminal, "i");
        add(Tonic, vec![Symbol::terminal("vi", "min7")], 0.0, RuleType::Terminal, "vi");

        let mut seen = std::collections::BTreeSet::new();
        for seed in 0..64 {
            g.reseed(seed);
            let tree = Deriver::new(&mut g, 1).derive_tree(C);
            assert_eq!(tree.depth(), 2, "seed {seed}");
            let chords = tree.chords();
            assert_eq!(chords.len(), 1);
            seen.insert((chords[0].root, chords[0].quality));
        }
        let expected: std::collections::BTreeSet<_> =
            [(C, ChordQuality::Maj7), (A, ChordQuality::Min7)].into_iter().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_render_lists_every_node() {
        let mut g = base_grammar(8);
        let (_, tree) = derive_progression(&mut g, C, 4, 8);
        let text = tree.render();
        assert_eq!(text.lines().count(), tree.len());
        assert!(text.starts_with("S[0] @C"));
    }

    #[test]
    fn test_generate_progression_exact_length() {
        for length in [1, 2, 5, 8, 16, 32] {
            assert_eq!(generate_progression(length, C, 42).len(), length);
        }
        assert!(generate_progression(0, C, 42).is_empty());
    }
}
