//! Level cache
//!
//! Generations are derived lazily, in budget-sized chunks, and kept for
//! the life of the grammar. Generation N is only ever derived once; a
//! partially built generation remembers where in generation N-1 to resume.

use tracing::{debug, info};

use crate::lsystem::{Grammar, Resumable};

/// Whether a requested generation can be drawn yet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelStatus {
    Ready,
    /// Fraction of the way from the last cached generation to the target
    Loading { progress: f64 },
}

#[derive(Debug, Clone, Default)]
struct Pending {
    produced: Vec<char>,
    resume_index: usize,
}

#[derive(Debug, Clone)]
pub struct LevelCache {
    levels: Vec<Vec<char>>,
    pending: Option<Pending>,
}

impl LevelCache {
    pub fn new(axiom: &[char]) -> Self {
        Self {
            levels: vec![axiom.to_vec()],
            pending: None,
        }
    }

    /// Drop every derived generation and start again from the axiom.
    /// The grammar's PRNG must be restarted alongside, or stochastic
    /// generations will differ from a fresh build.
    pub fn reset(&mut self, axiom: &[char]) {
        self.levels.clear();
        self.levels.push(axiom.to_vec());
        self.pending = None;
    }

    /// Number of fully derived generations, the axiom included
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn get(&self, level: usize) -> Option<&[char]> {
        self.levels.get(level).map(|l| l.as_slice())
    }

    /// Fraction of the next generation built so far, 0 when idle
    pub fn partial_progress(&self) -> f64 {
        match (&self.pending, self.levels.last()) {
            (Some(p), Some(parent)) if !parent.is_empty() => {
                p.resume_index as f64 / parent.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Extend the cache toward `level` using at most `calls` derive calls of
    /// `chars_per_call` characters each.
    pub fn request(
        &mut self,
        grammar: &mut Grammar,
        level: usize,
        chars_per_call: usize,
        calls: usize,
    ) -> LevelStatus {
        let mut calls_left = calls.max(1);

        while self.levels.len() <= level {
            if calls_left == 0 {
                return LevelStatus::Loading {
                    progress: self.load_progress(level),
                };
            }
            calls_left -= 1;

            let parent = match self.levels.last() {
                Some(p) => p,
                None => return LevelStatus::Loading { progress: 0.0 },
            };
            let mut pending = self.pending.take().unwrap_or_default();
            let derivation = grammar.derive(parent, pending.resume_index, chars_per_call);
            pending.produced.extend(derivation.produced);

            match derivation.progress {
                Resumable::Paused { resume_index } => {
                    debug!(
                        "Level {} paused at {}/{} ({} symbols so far)",
                        self.levels.len(),
                        resume_index,
                        parent.len(),
                        pending.produced.len()
                    );
                    pending.resume_index = resume_index;
                    self.pending = Some(pending);
                }
                Resumable::Complete => {
                    info!(
                        "Level {} derived: {} symbols",
                        self.levels.len(),
                        pending.produced.len()
                    );
                    self.levels.push(pending.produced);
                }
            }
        }

        LevelStatus::Ready
    }

    /// Overall progress toward `level`, counting whole generations plus the
    /// partial one.
    pub fn load_progress(&self, level: usize) -> f64 {
        let done = self.levels.len().saturating_sub(1);
        if level == 0 || done >= level {
            return 1.0;
        }
        (done as f64 + self.partial_progress()) / level as f64
    }
}
