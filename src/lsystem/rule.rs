//! Production rule text
//!
//! `X=DERIVATION[,DERIVATION...]` rewrites `X` every generation.
//! `~X=DERIVATION[,DERIVATION...]` registers a model for `X` instead.
//! Several comma-separated derivations make a rule stochastic.

use thiserror::Error;

use crate::prng::Xorshift;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("missing '=' in rule \"{0}\"")]
    MissingEquals(String),
    #[error("rule symbol must be a single character, got \"{0}\"")]
    BadSymbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Production {
    Deterministic(Vec<char>),
    Stochastic(Vec<Vec<char>>),
}

impl Production {
    /// Pick the derivation for one occurrence of the symbol.
    ///
    /// Stochastic productions take exactly one draw, unless `seed` is 0,
    /// in which case the first alternative wins and nothing is drawn.
    pub fn select(&self, rng: &mut Xorshift, seed: u32) -> &[char] {
        match self {
            Production::Deterministic(d) => d,
            Production::Stochastic(choices) if seed == 0 => &choices[0],
            Production::Stochastic(choices) => rng.choice(choices).map(|c| c.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn alternatives(&self) -> usize {
        match self {
            Production::Deterministic(_) => 1,
            Production::Stochastic(choices) => choices.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Structural,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub symbol: char,
    pub kind: RuleKind,
    pub production: Production,
}

/// Parse one rule line. Blank lines yield `Ok(None)`.
pub fn parse_rule(line: &str) -> Result<Option<Rule>, RuleError> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(None);
    }

    let (lhs, rhs) = compact
        .split_once('=')
        .ok_or_else(|| RuleError::MissingEquals(compact.clone()))?;

    let mut lhs_chars = lhs.chars();
    let (kind, symbol) = match (lhs_chars.next(), lhs_chars.next(), lhs_chars.next()) {
        (Some('~'), Some(s), None) if s != '~' => (RuleKind::Model, s),
        (Some(s), None, None) if s != '~' => (RuleKind::Structural, s),
        _ => return Err(RuleError::BadSymbol(lhs.to_string())),
    };

    let mut derivations: Vec<Vec<char>> = rhs.split(',').map(|d| d.chars().collect()).collect();
    let production = if derivations.len() == 1 {
        Production::Deterministic(derivations.remove(0))
    } else {
        Production::Stochastic(derivations)
    };

    Ok(Some(Rule {
        symbol,
        kind,
        production,
    }))
}
