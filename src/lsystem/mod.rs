//! L-System grammar
//!
//! Owns the axiom, the structural and model rule tables, the ignore set,
//! the six turn quaternions and the seeded PRNG. Derivation is resumable:
//! [`Grammar::derive`] works through a bounded chunk of the parent
//! generation and reports where to pick up next time.

pub mod rule;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::formula::Formula;
use crate::prng::Xorshift;
use crate::quaternion::{Quaternion, Vector3};
pub use rule::{parse_rule, Production, RuleKind};

/// Symbols with a fixed meaning to the turtle
pub const TURN_SYMBOLS: [char; 6] = ['+', '-', '&', '^', '\\', '/'];

/// Everything needed to rebuild a grammar, exactly as the user wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarState {
    pub axiom: String,
    pub rules: Vec<String>,
    /// Turning angle in degrees
    pub angle: String,
    pub seed: u32,
    pub ignore: String,
    pub tropism: String,
}

impl Default for GrammarState {
    fn default() -> Self {
        Self {
            axiom: "F".to_string(),
            rules: Vec::new(),
            angle: "90".to_string(),
            seed: 0,
            ignore: String::new(),
            tropism: "0".to_string(),
        }
    }
}

/// Where a derivation call stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumable {
    /// The whole parent sequence has been rewritten
    Complete,
    /// Budget ran out; call again starting at `resume_index`
    Paused { resume_index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub produced: Vec<char>,
    pub progress: Resumable,
}

pub struct Grammar {
    state: GrammarState,
    axiom: Vec<char>,
    rules: BTreeMap<char, Production>,
    models: BTreeMap<char, Production>,
    ignore: HashSet<char>,
    rotations: BTreeMap<char, Quaternion>,
    tropism: f64,
    rng: Xorshift,
    model_rng: Xorshift,
}

/// Formulas here are constants in practice; evaluate at level 0 and keep going on errors.
fn evaluate_or_zero(label: &str, source: &str) -> f64 {
    match Formula::parse(source) {
        Ok(f) => f.evaluate(0),
        Err(e) => {
            warn!("Invalid {} formula \"{}\": {}; using 0", label, source, e);
            0.0
        }
    }
}

fn turn_table(angle_degrees: f64) -> BTreeMap<char, Quaternion> {
    let a = angle_degrees.to_radians();
    [
        ('+', Vector3::Z, a),
        ('-', Vector3::Z, -a),
        ('&', Vector3::Y, a),
        ('^', Vector3::Y, -a),
        ('\\', Vector3::X, a),
        ('/', Vector3::X, -a),
    ]
    .into_iter()
    .map(|(symbol, axis, angle)| (symbol, Quaternion::from_axis_angle(axis, angle)))
    .collect()
}

impl Grammar {
    /// Build a grammar. Malformed rules are logged and skipped.
    pub fn new(state: GrammarState) -> Self {
        let mut rules = BTreeMap::new();
        let mut models = BTreeMap::new();

        for line in &state.rules {
            match parse_rule(line) {
                Ok(Some(rule)) => {
                    let table = match rule.kind {
                        RuleKind::Structural => &mut rules,
                        RuleKind::Model => &mut models,
                    };
                    if table.insert(rule.symbol, rule.production).is_some() {
                        warn!("Rule for '{}' defined twice; keeping the later one", rule.symbol);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping rule: {}", e),
            }
        }

        let angle = evaluate_or_zero("angle", &state.angle);
        let tropism = evaluate_or_zero("tropism", &state.tropism);
        debug!(
            "Grammar built: {} rules, {} models, angle={}, tropism={}",
            rules.len(),
            models.len(),
            angle,
            tropism
        );

        Self {
            axiom: state.axiom.chars().filter(|c| !c.is_whitespace()).collect(),
            ignore: state.ignore.chars().filter(|c| !c.is_whitespace()).collect(),
            rotations: turn_table(angle),
            rng: Xorshift::new(state.seed),
            model_rng: Xorshift::new(state.seed),
            rules,
            models,
            tropism,
            state,
        }
    }

    pub fn state(&self) -> &GrammarState {
        &self.state
    }

    pub fn axiom(&self) -> &[char] {
        &self.axiom
    }

    pub fn seed(&self) -> u32 {
        self.state.seed
    }

    /// Change the seed and restart both random streams. Generations derived
    /// under the old seed are stale afterwards.
    pub fn set_seed(&mut self, seed: u32) {
        self.state.seed = seed;
        self.rng = Xorshift::new(seed);
        self.model_rng = Xorshift::new(seed);
    }

    /// Restart the stream that picks model derivations.
    pub fn reset_models(&mut self) {
        self.model_rng = Xorshift::new(self.state.seed);
    }

    pub fn rotation(&self, symbol: char) -> Option<Quaternion> {
        self.rotations.get(&symbol).copied()
    }

    pub fn tropism(&self) -> f64 {
        self.tropism
    }

    pub fn ignores(&self, symbol: char) -> bool {
        self.ignore.contains(&symbol)
    }

    pub fn has_model(&self, symbol: char) -> bool {
        self.models.contains_key(&symbol)
    }

    pub fn rules(&self) -> impl Iterator<Item = (char, &Production)> {
        self.rules.iter().map(|(s, p)| (*s, p))
    }

    pub fn models(&self) -> impl Iterator<Item = (char, &Production)> {
        self.models.iter().map(|(s, p)| (*s, p))
    }

    /// Expansion drawn in place of `~symbol`
    pub fn model(&mut self, symbol: char) -> Option<Vec<char>> {
        let production = self.models.get(&symbol)?;
        Some(production.select(&mut self.model_rng, self.state.seed).to_vec())
    }

    /// Rewrite `sequence` from `start` onward.
    ///
    /// Stops once more than `budget` symbols have been produced, always after
    /// consuming at least one input symbol. `%` drops the rest of its branch
    /// and keeps only the closing bracket; `~` markers are dropped so a model
    /// reference lives for exactly one generation.
    pub fn derive(&mut self, sequence: &[char], start: usize, budget: usize) -> Derivation {
        let seed = self.state.seed;
        let mut produced = Vec::new();
        let mut i = start;

        while i < sequence.len() {
            if produced.len() > budget {
                return Derivation {
                    produced,
                    progress: Resumable::Paused { resume_index: i },
                };
            }

            match sequence[i] {
                '%' => {
                    let mut depth = 0i32;
                    i += 1;
                    while i < sequence.len() {
                        match sequence[i] {
                            '[' => depth += 1,
                            ']' => {
                                depth -= 1;
                                if depth < 0 {
                                    produced.push(']');
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
                '~' => {}
                symbol => match self.rules.get(&symbol) {
                    Some(production) => {
                        produced.extend_from_slice(production.select(&mut self.rng, seed))
                    }
                    None => produced.push(symbol),
                },
            }
            i += 1;
        }

        Derivation {
            produced,
            progress: Resumable::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn text(c: &[char]) -> String {
        c.iter().collect()
    }

    fn grammar(axiom: &str, rules: &[&str], seed: u32) -> Grammar {
        Grammar::new(GrammarState {
            axiom: axiom.to_string(),
            rules: rules.iter().map(|r| r.to_string()).collect(),
            angle: "30".to_string(),
            seed,
            ..Default::default()
        })
    }

    /// Rewrite one full generation, one budget-sized chunk at a time.
    fn derive_chunked(g: &mut Grammar, seq: &[char], budget: usize) -> Vec<char> {
        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let d = g.derive(seq, start, budget);
            out.extend(d.produced);
            match d.progress {
                Resumable::Complete => return out,
                Resumable::Paused { resume_index } => {
                    assert!(resume_index > start);
                    start = resume_index;
                }
            }
        }
    }

    fn is_balanced(seq: &[char]) -> bool {
        let mut depth = 0i32;
        for &c in seq {
            match c {
                '[' => depth += 1,
                ']' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    #[test]
    fn test_plant_first_generation() {
        let mut g = grammar("X", &["F=FF", "X=F[+X][-X]FX"], 0);
        let axiom = g.axiom().to_vec();
        let gen1 = g.derive(&axiom, 0, usize::MAX);
        assert_eq!(gen1.progress, Resumable::Complete);
        assert_eq!(text(&gen1.produced), "F[+X][-X]FX");

        let gen2 = g.derive(&gen1.produced, 0, usize::MAX);
        assert_eq!(
            text(&gen2.produced),
            "FF[+F[+X][-X]FX][-F[+X][-X]FX]FFF[+X][-X]FX"
        );
    }

    #[test]
    fn test_budget_pauses_and_resumes() {
        let mut g = grammar("FFFF", &["F=FF"], 0);
        let axiom = g.axiom().to_vec();
        let d = g.derive(&axiom, 0, 3);
        assert_eq!(text(&d.produced), "FFFF");
        assert_eq!(d.progress, Resumable::Paused { resume_index: 2 });
        let rest = g.derive(&axiom, 2, 3);
        assert_eq!(text(&rest.produced), "FFFF");
        assert_eq!(rest.progress, Resumable::Complete);
    }

    #[test]
    fn test_zero_budget_still_progresses() {
        let mut g = grammar("AB", &[], 0);
        let axiom = g.axiom().to_vec();
        assert_eq!(text(&derive_chunked(&mut g, &axiom, 0)), "AB");
    }

    #[test]
    fn test_seed_zero_is_deterministic() {
        let mut g = grammar("XXXX", &["X=A,B"], 0);
        let rng_before = g.rng.clone();
        let axiom = g.axiom().to_vec();
        assert_eq!(text(&g.derive(&axiom, 0, usize::MAX).produced), "AAAA");
        assert_eq!(g.rng, rng_before);
    }

    #[test]
    fn test_seeded_choice_follows_prng_trace() {
        let mut g = grammar("XXXXXXXX", &["X=A,B"], 12345);
        let axiom = g.axiom().to_vec();
        let produced = text(&g.derive(&axiom, 0, usize::MAX).produced);

        let mut rng = Xorshift::new(12345);
        let expected: String = (0..8)
            .map(|_| *rng.choice(&['A', 'B']).unwrap())
            .collect();
        assert_eq!(produced, expected);

        let mut again = grammar("XXXXXXXX", &["X=A,B"], 12345);
        assert_eq!(text(&again.derive(&axiom, 0, usize::MAX).produced), produced);
    }

    #[test]
    fn test_set_seed_restarts_stream() {
        let mut g = grammar("XXXXXX", &["X=A,B"], 99);
        let axiom = g.axiom().to_vec();
        let first = g.derive(&axiom, 0, usize::MAX).produced;
        g.set_seed(99);
        assert_eq!(g.derive(&axiom, 0, usize::MAX).produced, first);
        assert_eq!(g.state().seed, 99);
    }

    #[test]
    fn test_prune_keeps_closing_bracket() {
        let mut g = grammar("A[B%CD[E]F]G", &["G=GG"], 0);
        let axiom = g.axiom().to_vec();
        assert_eq!(text(&g.derive(&axiom, 0, usize::MAX).produced), "A[B]GG");
    }

    #[test]
    fn test_prune_at_top_level_drops_tail() {
        let mut g = grammar("AB%C[D]E", &[], 0);
        let axiom = g.axiom().to_vec();
        assert_eq!(text(&g.derive(&axiom, 0, usize::MAX).produced), "AB");
    }

    #[test]
    fn test_tilde_is_dropped() {
        let mut g = grammar("F~LF", &["~L=[+F]", "F=F"], 0);
        let axiom = g.axiom().to_vec();
        assert_eq!(text(&g.derive(&axiom, 0, usize::MAX).produced), "FLF");
        assert!(g.has_model('L'));
        assert!(g.rules().all(|(s, _)| s != 'L'));
        assert_eq!(g.model('L'), Some(chars("[+F]")));
        assert_eq!(g.model('F'), None);
    }

    #[test]
    fn test_malformed_rules_are_skipped() {
        let g = grammar("X", &["F", "FF=F", "", "=X", "  X = F F "], 0);
        let rules: Vec<_> = g.rules().collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].0, 'X');
        assert_eq!(rules[0].1, &Production::Deterministic(chars("FF")));
    }

    #[test]
    fn test_turn_table_and_formulas() {
        let g = Grammar::new(GrammarState {
            angle: "45 * 2".to_string(),
            tropism: "0.5/2".to_string(),
            ignore: "X Y".to_string(),
            ..Default::default()
        });
        for symbol in TURN_SYMBOLS {
            assert!(g.rotation(symbol).unwrap().is_unit(1e-12));
        }
        let left = g.rotation('+').unwrap() * Quaternion::IDENTITY;
        assert!(left.heading().distance(Vector3::Y) < 1e-12);
        assert_eq!(g.tropism(), 0.25);
        assert!(g.ignores('X') && g.ignores('Y') && !g.ignores(' '));
    }

    #[test]
    fn test_bad_formula_falls_back_to_zero() {
        let g = Grammar::new(GrammarState {
            angle: "90 +".to_string(),
            ..Default::default()
        });
        assert_eq!(g.rotation('+'), Some(Quaternion::new(-1.0, 0.0, 0.0, 0.0)));
        assert_eq!(g.state().angle, "90 +");
    }

    #[test]
    fn test_state_round_trip() {
        let state = GrammarState {
            axiom: "X".to_string(),
            rules: vec!["X=F[+X],F[-X]".to_string(), "~F=F".to_string()],
            angle: "22.5".to_string(),
            seed: 4242,
            ignore: "X".to_string(),
            tropism: "0.1 * 2".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: GrammarState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        let a = Grammar::new(state);
        let b = Grammar::new(back);
        assert_eq!(a.tropism(), b.tropism());
        assert_eq!(a.rotation('&'), b.rotation('&'));
    }

    /// Builds a bracket-balanced string out of arbitrary bytes.
    fn balanced_from(bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut depth = 0;
        for b in bytes {
            match b % 8 {
                0 => {
                    out.push('[');
                    depth += 1;
                }
                1 if depth > 0 => {
                    out.push(']');
                    depth -= 1;
                }
                2 => out.push('%'),
                3 => out.push('+'),
                4 | 5 => out.push('F'),
                _ => out.push('X'),
            }
        }
        out.extend(std::iter::repeat(']').take(depth));
        out
    }

    proptest! {
        #[test]
        fn prop_chunking_is_transparent(
            axiom in "[FX+\\-\\[\\]]{1,12}",
            seed in any::<u32>(),
            budget in 0usize..24,
            generations in 1usize..4,
        ) {
            let rules = ["X=F[+X]FX,F[-X]X,FX", "F=FF,F"];
            let mut whole = grammar(&axiom, &rules, seed);
            let mut chunked = grammar(&axiom, &rules, seed);

            let mut a = whole.axiom().to_vec();
            let mut b = a.clone();
            for _ in 0..generations {
                a = whole.derive(&a, 0, usize::MAX).produced;
                b = derive_chunked(&mut chunked, &b, budget);
                prop_assert_eq!(&a, &b);
            }
        }

        #[test]
        fn prop_balanced_in_balanced_out(
            axiom in prop::collection::vec(any::<u8>(), 0..30),
            rule_x in prop::collection::vec(any::<u8>(), 0..12),
            rule_f in prop::collection::vec(any::<u8>(), 0..12),
            seed in 0u32..5,
        ) {
            let axiom = balanced_from(&axiom);
            let rx = format!("X={},{}", balanced_from(&rule_x), balanced_from(&rule_f));
            let rf = format!("F={}", balanced_from(&rule_f));
            let mut g = grammar(&axiom, &[&rx, &rf], seed);
            let mut seq = g.axiom().to_vec();
            prop_assert!(is_balanced(&seq));
            for _ in 0..3 {
                seq = g.derive(&seq, 0, usize::MAX).produced;
                prop_assert!(is_balanced(&seq), "unbalanced: {}", text(&seq));
            }
        }
    }
}
