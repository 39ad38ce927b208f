// Jazz Architect harmony generator
//
// Generates jazz chord progressions from a probabilistic context-free grammar
// of harmonic function (tonic, dominant, subdominant, preparation,
// prolongation). A 15-parameter style vector reweights the grammar and gates
// a rewrite pass of idiomatic substitutions; a guide-tone voice-leading model
// scores the result and can optionally smooth it.
//
// Architecture:
// - pitch.rs: Pitch classes, spelling, transposition, intervals
// - chord.rs: Chord qualities and symbols, text encoding and parsing, roman
//   numerals, pitch-set chord recognition
// - grammar.rs: Grammar symbols, weighted rules, the PCFG and its base rules
// - derivation.rs: Arena derivation tree, key propagation, depth-limited
//   expansion with forced termination
// - style.rs: StyleVector, era presets, style -> grammar mapping
// - substitution.rs: Backdoor, tritone and Coltrane rewrites and the
//   style-gated pass that runs them
// - voice_leading.rs: Guide-tone cost, transition analysis, optimizer,
//   passing-chord suggestions
// - evaluation.rs: Entropy, irregularity, structure and coherence metrics
// - engine.rs: StyleEngine, the full generate pipeline, turnarounds and
//   blues changes
// - treebank.rs: Treebank loading, rule and cadence counts, learned grammar
//   weights
// - error.rs: Error type for the I/O and user-input boundary
//
// Generation is deterministic given a seed. All randomness comes from
// `jazz_architect_prng::SeedRng` instances owned by the grammar and the
// engine.

pub mod chord;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod grammar;
pub mod pitch;
pub mod style;
pub mod substitution;
pub mod treebank;
pub mod voice_leading;

pub use engine::{StyleEngine, StyledProgression, generate};
pub use error::{HarmonyError, Result};
