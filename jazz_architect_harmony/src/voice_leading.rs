// Guide-tone voice-leading cost and a greedy optimizer built on it.
//
// The guide tones of a chord are its third and seventh. Moving from chord A
// to chord B, the two guide-tone voices either go straight across (third to
// third, seventh to seventh) or cross over (third to seventh, seventh to
// third); the cost of the move is whichever of the two is cheaper, each voice
// counted by its shortest circular distance in semitones (0..=6). That keeps
// every pairwise cost within 0..=12.
//
// The optimizer is first-improvement hill climbing: scan left to right for a
// dominant seventh whose tritone substitute strictly lowers the total cost,
// apply it, restart. It stops when a full pass finds nothing or the pass cap
// is reached. No randomness is involved.
//
// `suggest_connecting_chord` and `insert_passing_chords` are advisory tools
// for the CLI; the generation pipeline in engine.rs only calls `optimize`.

use crate::chord::{ChordQuality, ChordSymbol};
use crate::pitch::PitchClass;

/// Coarse size of a single voice's move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    CommonTone,
    /// 1-2 semitones.
    Step,
    /// 3-4 semitones.
    Skip,
    /// 5 or more.
    Leap,
}

impl Motion {
    pub fn classify(interval: u8) -> Motion {
        match interval {
            0 => Motion::CommonTone,
            1..=2 => Motion::Step,
            3..=4 => Motion::Skip,
            _ => Motion::Leap,
        }
    }
}

/// Shortest distance between two pitch classes, 0..=6.
pub fn min_interval(a: PitchClass, b: PitchClass) -> u8 {
    a.min_distance(b)
}

/// Cost of moving from `a`'s guide tones to `b`'s, 0..=12.
pub fn guide_tone_cost(a: &ChordSymbol, b: &ChordSymbol) -> u32 {
    let (a3, a7) = a.guide_tones();
    let (b3, b7) = b.guide_tones();
    let direct = min_interval(a3, b3) as u32 + min_interval(a7, b7) as u32;
    let exchange = min_interval(a3, b7) as u32 + min_interval(a7, b3) as u32;
    direct.min(exchange)
}

/// Sum of `guide_tone_cost` over consecutive pairs.
pub fn progression_cost(chords: &[ChordSymbol]) -> u32 {
    chords.windows(2).map(|w| guide_tone_cost(&w[0], &w[1])).sum()
}

/// Mean cost per transition; 0 with fewer than two chords.
pub fn average_cost(chords: &[ChordSymbol]) -> f64 {
    if chords.len() < 2 {
        return 0.0;
    }
    progression_cost(chords) as f64 / (chords.len() - 1) as f64
}

/// 100 for perfectly smooth voice leading, falling by 16.67 per unit of
/// average cost, floored at 0.
pub fn quality_score(chords: &[ChordSymbol]) -> f64 {
    if chords.len() < 2 {
        return 100.0;
    }
    (100.0 - average_cost(chords) * 16.67).max(0.0)
}

pub fn is_smooth(a: &ChordSymbol, b: &ChordSymbol) -> bool {
    guide_tone_cost(a, b) <= 2
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// One guide tone of the first chord heading for one guide tone of the second.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub from: PitchClass,
    pub to: PitchClass,
    pub from_third: bool,
    pub to_third: bool,
    pub interval: u8,
    pub motion: Motion,
    /// Interval, weighted 1.5x for skips and leaps.
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Four connections per transition (3->3, 3->7, 7->3, 7->7).
    pub connections: Vec<[Connection; 4]>,
    pub total_cost: u32,
    pub average_cost: f64,
    /// Transitions costing at most 2.
    pub smooth_transitions: usize,
    /// Transitions costing more than 4.
    pub rough_transitions: usize,
}

fn connect(from: PitchClass, from_third: bool, to: PitchClass, to_third: bool) -> Connection {
    let interval = min_interval(from, to);
    let motion = Motion::classify(interval);
    let weight = match motion {
        Motion::Skip | Motion::Leap => 1.5,
        Motion::CommonTone | Motion::Step => 1.0,
    };
    Connection {
        from,
        to,
        from_third,
        to_third,
        interval,
        motion,
        cost: interval as f64 * weight,
    }
}

pub fn analyze_progression(chords: &[ChordSymbol]) -> Analysis {
    let mut connections = Vec::new();
    let mut smooth = 0;
    let mut rough = 0;
    for w in chords.windows(2) {
        let (a3, a7) = w[0].guide_tones();
        let (b3, b7) = w[1].guide_tones();
        connections.push([
            connect(a3, true, b3, true),
            connect(a3, true, b7, false),
            connect(a7, false, b3, true),
            connect(a7, false, b7, false),
        ]);
        let cost = guide_tone_cost(&w[0], &w[1]);
        if cost <= 2 {
            smooth += 1;
        } else if cost > 4 {
            rough += 1;
        }
    }
    Analysis {
        connections,
        total_cost: progression_cost(chords),
        average_cost: average_cost(chords),
        smooth_transitions: smooth,
        rough_transitions: rough,
    }
}

/// Order `chord`'s guide tones so each follows the nearer of the previous
/// pair. Returns (voice following previous third, voice following previous
/// seventh). Ties keep the direct ordering.
pub fn smoothest_voicing(
    chord: &ChordSymbol,
    previous: (PitchClass, PitchClass),
) -> (PitchClass, PitchClass) {
    let (third, seventh) = chord.guide_tones();
    let (p3, p7) = previous;
    let direct = min_interval(p3, third) + min_interval(p7, seventh);
    let exchange = min_interval(p3, seventh) + min_interval(p7, third);
    if direct <= exchange {
        (third, seventh)
    } else {
        (seventh, third)
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    pub chords: Vec<ChordSymbol>,
    /// Passes run, including the final pass that found nothing.
    pub iterations: usize,
    pub initial_cost: u32,
    pub final_cost: u32,
    pub substitutions: usize,
}

/// Greedy tritone-substitution search. Never returns a costlier sequence
/// than it was given.
pub fn optimize(chords: &[ChordSymbol], max_iterations: usize) -> OptimizeResult {
    let mut current = chords.to_vec();
    let initial_cost = progression_cost(&current);
    let mut cost = initial_cost;
    let mut iterations = 0;
    let mut substitutions = 0;

    while iterations < max_iterations {
        iterations += 1;
        let mut improved = false;
        for i in 0..current.len() {
            if current[i].quality != ChordQuality::Dom7 {
                continue;
            }
            let substitute = current[i].tritone_substitute();
            let original = std::mem::replace(&mut current[i], substitute);
            let candidate = progression_cost(&current);
            if candidate < cost {
                cost = candidate;
                substitutions += 1;
                improved = true;
                break;
            }
            current[i] = original;
        }
        if !improved {
            break;
        }
    }

    tracing::debug!(
        iterations,
        substitutions,
        initial_cost,
        final_cost = cost,
        "voice-leading optimization finished"
    );
    OptimizeResult {
        chords: current,
        iterations,
        initial_cost,
        final_cost: cost,
        substitutions,
    }
}

// ---------------------------------------------------------------------------
// Passing chords
// ---------------------------------------------------------------------------

/// A single chord to place between `a` and `b` that beats their direct cost,
/// if any. Candidates, in order: diminished seventh a half step above `a`,
/// V7 of `b`, ii of `b`. The first of the cheapest wins. Already-smooth
/// pairs (cost <= 2) get nothing.
pub fn suggest_connecting_chord(a: &ChordSymbol, b: &ChordSymbol) -> Option<ChordSymbol> {
    let direct = guide_tone_cost(a, b);
    if direct <= 2 {
        return None;
    }
    let candidates = [
        ChordSymbol::new(a.root.transpose(1), ChordQuality::Dim7),
        ChordSymbol::new(b.root.transpose(7), ChordQuality::Dom7),
        ChordSymbol::new(b.root.transpose(2), ChordQuality::Min7),
    ];
    let mut best: Option<(u32, ChordSymbol)> = None;
    for candidate in candidates {
        let cost = guide_tone_cost(a, &candidate) + guide_tone_cost(&candidate, b);
        if cost >= direct {
            continue;
        }
        if best.as_ref().is_none_or(|(c, _)| cost < *c) {
            best = Some((cost, candidate));
        }
    }
    best.map(|(_, chord)| chord)
}

/// Insert a suggested connecting chord into every rough pair.
pub fn insert_passing_chords(chords: &[ChordSymbol]) -> Vec<ChordSymbol> {
    let mut out = Vec::with_capacity(chords.len() * 2);
    for (i, chord) in chords.iter().enumerate() {
        out.push(chord.clone());
        if let Some(next) = chords.get(i + 1) {
            out.extend(suggest_connecting_chord(chord, next));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prog(text: &str) -> Vec<ChordSymbol> {
        text.split_whitespace().map(ChordSymbol::parse).collect()
    }

    #[test]
    fn test_motion_classes() {
        assert_eq!(Motion::classify(0), Motion::CommonTone);
        assert_eq!(Motion::classify(2), Motion::Step);
        assert_eq!(Motion::classify(3), Motion::Skip);
        assert_eq!(Motion::classify(5), Motion::Leap);
    }

    #[test]
    fn test_ii_v_i_is_smooth() {
        let chords = prog("Dm7 G7 Cmaj7");
        // Dm7 (F, C) -> G7 (B, F): exchange gives 0 + 1.
        assert_eq!(guide_tone_cost(&chords[0], &chords[1]), 1);
        // G7 (B, F) -> Cmaj7 (E, B): exchange gives 0 + 1.
        assert_eq!(guide_tone_cost(&chords[1], &chords[2]), 1);
        assert_eq!(progression_cost(&chords), 2);
        assert!((average_cost(&chords) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cost_bounds_and_symmetry() {
        let mut all = Vec::new();
        for q in ChordQuality::ALL {
            for r in 0..12 {
                all.push(ChordSymbol::new(PitchClass::new(r), q));
            }
        }
        for a in &all {
            for b in &all {
                let c = guide_tone_cost(a, b);
                assert!(c <= 12);
                assert_eq!(c, guide_tone_cost(b, a));
            }
            assert_eq!(guide_tone_cost(a, a), 0);
        }
    }

    #[test]
    fn test_tritone_sub_has_same_guide_tones() {
        for r in 0..12 {
            let dom = ChordSymbol::new(PitchClass::new(r), ChordQuality::Dom7);
            assert_eq!(guide_tone_cost(&dom, &dom.tritone_substitute()), 0);
        }
    }

    #[test]
    fn test_quality_score() {
        assert_eq!(quality_score(&prog("Cmaj7")), 100.0);
        let smooth = quality_score(&prog("Dm7 G7 Cmaj7"));
        assert!((smooth - 83.33).abs() < 1e-9);
        // Many large jumps bottom out at zero.
        let rough = prog("Cmaj7 F#maj7 Cmaj7 F#maj7");
        assert!(quality_score(&rough) >= 0.0);
    }

    #[test]
    fn test_analysis_counts() {
        let chords = prog("Dm7 G7 Cmaj7 F#maj7");
        let a = analyze_progression(&chords);
        assert_eq!(a.connections.len(), 3);
        assert_eq!(a.smooth_transitions, 3);
        // Cmaj7 (E, B) -> F#maj7 (A#, F): 6 + 6 direct, 1 + 1 exchange.
        assert_eq!(guide_tone_cost(&chords[2], &chords[3]), 2);
        assert_eq!(a.total_cost, progression_cost(&chords));
        // Dm7's third F against G7's third B is a tritone.
        let first = &a.connections[0][0];
        assert_eq!((first.interval, first.motion), (6, Motion::Leap));
        assert!((first.cost - 9.0).abs() < 1e-12);
        let common = &a.connections[0][1];
        assert_eq!((common.interval, common.motion), (0, Motion::CommonTone));
    }

    #[test]
    fn test_rough_transition_counted() {
        // Cmaj7 (E, B) -> Ebmaj7 (G, D): 3 + 3 either way.
        let a = analyze_progression(&prog("Cmaj7 Ebmaj7"));
        assert_eq!(a.total_cost, 6);
        assert_eq!(a.rough_transitions, 1);
        assert_eq!(a.smooth_transitions, 0);
    }

    #[test]
    fn test_smoothest_voicing() {
        let g7 = ChordSymbol::parse("G7");
        // From Dm7's (F, C): F stays on F (the seventh), C moves to B (the third).
        assert_eq!(
            smoothest_voicing(&g7, (PitchClass::new(5), PitchClass::new(0))),
            (PitchClass::new(5), PitchClass::new(11))
        );
    }

    #[test]
    fn test_optimize_never_regresses() {
        for text in [
            "Dm7 G7 Cmaj7",
            "Cmaj7 A7 Dm7 G7 Cmaj7",
            "C7 F7 Bb7 Eb7 Ab7",
            "Cmaj7 F#7 Bmaj7 E7 Am7",
        ] {
            let chords = prog(text);
            let result = optimize(&chords, 50);
            assert!(result.final_cost <= result.initial_cost, "{text}");
            assert_eq!(result.final_cost, progression_cost(&result.chords));
            assert_eq!(result.chords.len(), chords.len());
            assert!(result.iterations <= 50);
        }
    }

    #[test]
    fn test_optimize_zero_iterations_is_identity() {
        let chords = prog("Dm7 G7 Cmaj7");
        let result = optimize(&chords, 0);
        assert_eq!(result.chords, chords);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_suggestions_only_beat_direct_cost() {
        let mut all = Vec::new();
        for q in [ChordQuality::Maj7, ChordQuality::Min7, ChordQuality::Dom7, ChordQuality::Aug] {
            for r in 0..12 {
                all.push(ChordSymbol::new(PitchClass::new(r), q));
            }
        }
        for a in &all {
            for b in &all {
                let direct = guide_tone_cost(a, b);
                if let Some(via) = suggest_connecting_chord(a, b) {
                    assert!(direct > 2);
                    assert!(guide_tone_cost(a, &via) + guide_tone_cost(&via, b) < direct);
                }
            }
        }
    }

    #[test]
    fn test_smooth_pairs_get_no_suggestion() {
        let chords = prog("Dm7 G7 Cmaj7");
        assert!(suggest_connecting_chord(&chords[0], &chords[1]).is_none());
        assert!(suggest_connecting_chord(&chords[1], &chords[2]).is_none());
        assert_eq!(insert_passing_chords(&chords), chords);
    }

    #[test]
    fn test_guide_tone_cost_triangle_inequality() {
        // A detour through one extra chord never undercuts the direct move.
        let chords = prog("Cmaj7 Ebmaj7 F#7 Am7 Bdim7 Db7");
        for a in &chords {
            for b in &chords {
                for c in &chords {
                    assert!(guide_tone_cost(a, c) <= guide_tone_cost(a, b) + guide_tone_cost(b, c));
                }
            }
        }
        assert!(suggest_connecting_chord(&chords[0], &chords[1]).is_none());
    }
}
