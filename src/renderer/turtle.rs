//! Turtle interpreter
//!
//! Walks a generation symbol by symbol. Each call to [`Turtle::step`] runs a
//! couple of dispatches and stops at the first visible move, so a long
//! generation unfolds over many host ticks. Models referenced with `~X` are
//! interpreted on a small frame stack with the same dispatch table.

use tracing::{trace, warn};

use super::RendererSettings;
use crate::lsystem::Grammar;
use crate::quaternion::{Quaternion, Vector3};

/// Dispatches per step before extensions for finished models
const STEP_DISPATCHES: usize = 2;

/// Symbols after which a straight run of draws is considered broken
const BREAK_SYMBOLS: &[char] = &['+', '-', '&', '^', '\\', '/', '|', '$', 'T', '[', ']'];

/// What a symbol tells the turtle to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Rotate by the grammar's quaternion for this symbol (`+ - & ^ \ /`)
    Turn(char),
    /// Turn around (`|`)
    Reverse,
    /// Roll so up points as close to +y as possible (`$`)
    AlignVertical,
    /// Bend toward gravity (`T`)
    Tropism,
    /// Save state (`[`)
    Push,
    /// Restore state, one frame per step until the group closes (`]`)
    Pop,
    /// Consumed by derivation; a no-op if it reaches the turtle (`%`)
    Prune,
    PolygonBegin,
    PolygonEnd,
    /// Record the current position as a polygon vertex (`.`)
    Vertex,
    /// Model reference marker (`~`)
    Model,
    /// Any other symbol moves forward one unit
    Draw(char),
}

impl Command {
    pub fn decode(symbol: char) -> Self {
        match symbol {
            '+' | '-' | '&' | '^' | '\\' | '/' => Command::Turn(symbol),
            '|' => Command::Reverse,
            '$' => Command::AlignVertical,
            'T' => Command::Tropism,
            '[' => Command::Push,
            ']' => Command::Pop,
            '%' => Command::Prune,
            '{' => Command::PolygonBegin,
            '}' => Command::PolygonEnd,
            '.' => Command::Vertex,
            '~' => Command::Model,
            other => Command::Draw(other),
        }
    }
}

fn breaks_run(next: Option<char>) -> bool {
    next.map_or(true, |c| BREAK_SYMBOLS.contains(&c))
}

/// Position and orientation, the unit saved by `[`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurtleState {
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl TurtleState {
    pub fn home(upright: bool) -> Self {
        Self {
            position: Vector3::ZERO,
            orientation: if upright {
                Quaternion::upright()
            } else {
                Quaternion::IDENTITY
            },
        }
    }
}

/// A model expansion being interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFrame {
    pub symbol: char,
    pub symbols: Vec<char>,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Vector3>,
}

/// Result of one draw step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurtleStep {
    /// A cooldown or hesitation consumed this step
    Paused,
    Moved,
    ModelEntered,
    /// Dispatch budget spent without moving the cursor
    Idle,
    /// The top-level sequence is exhausted
    Finished,
}

enum Dispatch {
    Continue,
    /// Moved the cursor as part of a straight run; keep dispatching
    Drawn,
    Yield(TurtleStep),
}

pub struct Turtle {
    home: TurtleState,
    state: TurtleState,
    index: usize,
    stack: Vec<TurtleState>,
    depth_markers: Vec<usize>,
    models: Vec<ModelFrame>,
    cooldown: u32,
    open_polygons: Vec<Vec<Vector3>>,
    polygons: Vec<Polygon>,
    max_model_depth: usize,
}

impl Turtle {
    pub fn new(upright: bool, max_model_depth: usize) -> Self {
        let home = TurtleState::home(upright);
        Self {
            home,
            state: home,
            index: 0,
            stack: Vec::new(),
            depth_markers: Vec::new(),
            models: Vec::new(),
            cooldown: 0,
            open_polygons: Vec::new(),
            polygons: Vec::new(),
            max_model_depth,
        }
    }

    /// Back to the start of the sequence with empty stacks.
    pub fn reset(&mut self, upright: bool) {
        self.home = TurtleState::home(upright);
        self.state = self.home;
        self.index = 0;
        self.stack.clear();
        self.depth_markers.clear();
        self.models.clear();
        self.cooldown = 0;
        self.open_polygons.clear();
        self.polygons.clear();
    }

    pub fn position(&self) -> Vector3 {
        self.state.position
    }

    pub fn orientation(&self) -> Quaternion {
        self.state.orientation
    }

    /// Index into the top-level sequence
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    fn model_applies(&self, symbol: char, grammar: &Grammar, settings: &RendererSettings) -> bool {
        settings.load_models && grammar.has_model(symbol) && self.models.len() < self.max_model_depth
    }

    /// (previous, current, next) symbols of the innermost active sequence
    fn window(&self, sequence: &[char]) -> (Option<char>, Option<char>, Option<char>) {
        let (symbols, i) = match self.models.last() {
            Some(frame) => (frame.symbols.as_slice(), frame.index),
            None => (sequence, self.index),
        };
        (
            i.checked_sub(1).and_then(|p| symbols.get(p)).copied(),
            symbols.get(i).copied(),
            symbols.get(i + 1).copied(),
        )
    }

    fn advance(&mut self) {
        match self.models.last_mut() {
            Some(frame) => frame.index += 1,
            None => self.index += 1,
        }
    }

    fn push_vertex(&mut self, vertex: Vector3) {
        if let Some(buffer) = self.open_polygons.last_mut() {
            if buffer.last() != Some(&vertex) {
                buffer.push(vertex);
            }
        }
    }

    /// Run one draw step over `sequence`.
    pub fn step(
        &mut self,
        sequence: &[char],
        grammar: &mut Grammar,
        settings: &RendererSettings,
    ) -> TurtleStep {
        if self.cooldown > 0 && self.open_polygons.is_empty() {
            self.cooldown -= 1;
            return TurtleStep::Paused;
        }

        let mut limit = STEP_DISPATCHES;
        let mut dispatched = 0;
        let mut moved = false;
        while dispatched < limit {
            if let Some(frame) = self.models.last() {
                if frame.index >= frame.symbols.len() {
                    trace!("Model '{}' finished", frame.symbol);
                    self.models.pop();
                    limit += 1;
                    continue;
                }
            }
            dispatched += 1;

            match self.dispatch(sequence, grammar, settings) {
                Dispatch::Continue => {}
                Dispatch::Drawn => moved = true,
                Dispatch::Yield(outcome) => return outcome,
            }
        }
        if moved {
            TurtleStep::Moved
        } else {
            TurtleStep::Idle
        }
    }

    fn dispatch(
        &mut self,
        sequence: &[char],
        grammar: &mut Grammar,
        settings: &RendererSettings,
    ) -> Dispatch {
        debug_assert!(self.state.orientation.is_unit(1e-6), "orientation drifted off unit length");
        let (prev, current, next) = self.window(sequence);
        let symbol = match current {
            Some(s) => s,
            None => return self.tail_end(settings),
        };
        let command = Command::decode(symbol);
        trace!("{:?} at {}", command, self.index);

        match command {
            Command::Turn(s) => {
                if let Some(rotation) = grammar.rotation(s) {
                    self.state.orientation = (rotation * self.state.orientation).normalize();
                }
                self.advance();
            }
            Command::Reverse => {
                self.state.orientation = (Quaternion::REVERSE * self.state.orientation).normalize();
                self.advance();
            }
            Command::AlignVertical => {
                self.state.orientation = self.state.orientation.align_to_vertical();
                self.advance();
            }
            Command::Tropism => {
                self.state.orientation = self.state.orientation.apply_tropism(grammar.tropism());
                self.advance();
            }
            Command::Push => {
                self.depth_markers.push(self.stack.len());
                self.stack.push(self.state);
                self.advance();
            }
            Command::Pop => return self.pop(settings),
            Command::Prune => self.advance(),
            Command::PolygonBegin => {
                self.open_polygons.push(Vec::new());
                self.advance();
            }
            Command::PolygonEnd => {
                match self.open_polygons.pop() {
                    Some(vertices) if !vertices.is_empty() => {
                        self.polygons.push(Polygon { vertices })
                    }
                    Some(_) => {}
                    None => warn!("'}}' with no open polygon at {}", self.index),
                }
                self.advance();
            }
            Command::Vertex => {
                if self.open_polygons.is_empty() {
                    warn!("Vertex mark outside a polygon at {}", self.index);
                } else {
                    self.push_vertex(self.state.position);
                }
                self.advance();
            }
            Command::Model => return self.enter_model(next, grammar, settings),
            Command::Draw(s) => {
                let shadowed = prev == Some('~') && self.model_applies(s, grammar, settings);
                if shadowed || grammar.ignores(s) {
                    self.advance();
                    return Dispatch::Continue;
                }
                return self.draw(next, settings);
            }
        }
        Dispatch::Continue
    }

    fn draw(&mut self, next: Option<char>, settings: &RendererSettings) -> Dispatch {
        if !self.open_polygons.is_empty() {
            self.state.position += self.state.orientation.heading();
            self.push_vertex(self.state.position);
            self.advance();
            return Dispatch::Continue;
        }

        let break_ahead = breaks_run(next);
        if !(settings.quick_backtrack && !break_ahead) {
            self.stack.push(self.state);
        }
        self.state.position += self.state.orientation.heading();
        self.advance();

        if settings.hesitate_apex && matches!(next, None | Some(']')) {
            self.cooldown = 1;
        }
        if settings.quick_draw {
            if !break_ahead {
                return Dispatch::Drawn;
            }
            self.cooldown = self.cooldown.max(1);
        }
        Dispatch::Yield(TurtleStep::Moved)
    }

    /// `]` pops one frame per dispatch and only moves past the bracket once
    /// the whole group opened by the matching `[` has been unwound.
    fn pop(&mut self, settings: &RendererSettings) -> Dispatch {
        let marker = match self.depth_markers.last() {
            Some(&m) => m,
            None => {
                warn!("Unmatched ']' at {}; skipping", self.index);
                self.advance();
                return Dispatch::Continue;
            }
        };
        let restored = match self.stack.pop() {
            Some(s) => s,
            None => {
                warn!("Branch stack empty at ']' {}; dropping marker", self.index);
                self.depth_markers.pop();
                self.advance();
                return Dispatch::Continue;
            }
        };

        let moved = restored.position != self.state.position;
        self.state = restored;
        let closed = self.stack.len() <= marker;
        if closed {
            self.depth_markers.pop();
            self.advance();
        }

        if !self.open_polygons.is_empty() {
            return Dispatch::Continue;
        }
        if !closed {
            return if moved {
                Dispatch::Yield(TurtleStep::Moved)
            } else {
                Dispatch::Continue
            };
        }

        let pause = u32::from(moved) + u32::from(settings.hesitate_fork);
        if moved {
            self.cooldown = pause;
            Dispatch::Yield(TurtleStep::Moved)
        } else if pause > 0 {
            self.cooldown = pause - 1;
            Dispatch::Yield(TurtleStep::Paused)
        } else {
            Dispatch::Continue
        }
    }

    fn enter_model(
        &mut self,
        next: Option<char>,
        grammar: &mut Grammar,
        settings: &RendererSettings,
    ) -> Dispatch {
        self.advance();
        let symbol = match next {
            Some(s) => s,
            None => return Dispatch::Continue,
        };
        if !settings.load_models || !grammar.has_model(symbol) {
            return Dispatch::Continue;
        }
        if self.models.len() >= self.max_model_depth {
            warn!(
                "Model '{}' nested deeper than {}; drawing it as a symbol",
                symbol, self.max_model_depth
            );
            return Dispatch::Continue;
        }
        match grammar.model(symbol) {
            Some(symbols) => {
                trace!("Entering model '{}' ({} symbols)", symbol, symbols.len());
                self.models.push(ModelFrame {
                    symbol,
                    symbols,
                    index: 0,
                });
                Dispatch::Yield(TurtleStep::ModelEntered)
            }
            None => Dispatch::Continue,
        }
    }

    /// End of the top-level sequence. Optionally walks the remaining
    /// branch stack back to the start, one visible move per step.
    fn tail_end(&mut self, settings: &RendererSettings) -> Dispatch {
        if settings.draw_tail_end {
            if let Some(restored) = self.stack.pop() {
                let depth = self.stack.len();
                self.depth_markers.retain(|&m| m < depth);
                let moved = restored.position != self.state.position;
                self.state = restored;
                return if moved {
                    Dispatch::Yield(TurtleStep::Moved)
                } else {
                    Dispatch::Continue
                };
            }
        }
        Dispatch::Yield(TurtleStep::Finished)
    }
}

#[cfg(test)]
impl Turtle {
    fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn depth_markers(&self) -> &[usize] {
        &self.depth_markers
    }

    fn model_depth(&self) -> usize {
        self.models.len()
    }

    fn polygon_depth(&self) -> usize {
        self.open_polygons.len()
    }
}
