//! Incremental renderer
//!
//! Drives everything from a host clock: each tick builds a little more of
//! the requested generation, then advances the turtle one visible move per
//! `tick_length` of elapsed time and feeds the camera-relative cursor to a
//! [`GraphSink`].

pub mod camera;
pub mod turtle;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

pub use camera::{Camera, CameraMode};
pub use turtle::{Polygon, Turtle, TurtleStep};

use crate::config::Tuning;
use crate::levels::{LevelCache, LevelStatus};
use crate::lsystem::{Grammar, GrammarState};
use crate::quaternion::Vector3;

/// Maximum draw steps per tick to prevent a spiral after a stall
pub const MAX_SUBSTEPS: u32 = 8;

/// What happens when the turtle reaches the end of a generation. Persisted as 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LoopMode {
    #[default]
    Off,
    /// Redraw the same generation
    Level,
    /// Move on to the next generation, wrapping after the last
    Playlist,
}

impl TryFrom<u8> for LoopMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LoopMode::Off),
            1 => Ok(LoopMode::Level),
            2 => Ok(LoopMode::Playlist),
            other => Err(format!("loop mode must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<LoopMode> for u8 {
    fn from(mode: LoopMode) -> Self {
        match mode {
            LoopMode::Off => 0,
            LoopMode::Level => 1,
            LoopMode::Playlist => 2,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::Off => "off",
            LoopMode::Level => "level",
            LoopMode::Playlist => "playlist",
        };
        f.write_str(name)
    }
}

/// Persisted interpreter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Formula of `lv`; turtle units per view unit
    pub figure_scale: String,
    pub camera_mode: CameraMode,
    /// Fixed-mode camera target, one formula per axis
    pub camera_centre: [String; 3],
    pub follow_factor: f64,
    pub loop_mode: LoopMode,
    /// Start heading +y instead of +x
    pub upright: bool,
    pub quick_draw: bool,
    pub quick_backtrack: bool,
    pub load_models: bool,
    pub draw_tail_end: bool,
    pub hesitate_apex: bool,
    pub hesitate_fork: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            figure_scale: "1".to_string(),
            camera_mode: CameraMode::Linear,
            camera_centre: ["0".to_string(), "0".to_string(), "0".to_string()],
            follow_factor: 0.2,
            loop_mode: LoopMode::Off,
            upright: true,
            quick_draw: false,
            quick_backtrack: true,
            load_models: true,
            draw_tail_end: false,
            hesitate_apex: false,
            hesitate_fork: false,
        }
    }
}

/// Receives the camera-relative cursor after every draw step
pub trait GraphSink {
    fn plot(&mut self, point: Vector3);
    fn clear(&mut self);
}

impl GraphSink for Vec<Vector3> {
    fn plot(&mut self, point: Vector3) {
        self.push(point);
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}

/// What one draw step did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The generation is still being derived
    Loading { progress: f64 },
    Paused,
    Moved,
    ModelEntered,
    Idle,
    Restarted,
    Advanced { level: usize },
    Halted,
}

/// Lifecycle notifications for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    LevelDerived { level: usize, symbols: usize },
    LevelRestarted { level: usize },
    LevelAdvanced { from: usize, to: usize },
    Halted { level: usize },
}

pub struct Renderer {
    grammar: Grammar,
    cache: LevelCache,
    turtle: Turtle,
    camera: Camera,
    settings: RendererSettings,
    tuning: Tuning,
    level: usize,
    accumulator: f64,
    halted: bool,
    needs_clear: bool,
    events: Vec<RenderEvent>,
}

impl Renderer {
    pub fn new(grammar: GrammarState, settings: RendererSettings, tuning: Tuning, level: usize) -> Self {
        let grammar = Grammar::new(grammar);
        let cache = LevelCache::new(grammar.axiom());
        let level = clamp_level(level, &tuning);
        Self {
            turtle: Turtle::new(settings.upright, tuning.max_model_depth),
            camera: Camera::new(&settings, level),
            grammar,
            cache,
            settings,
            tuning,
            level,
            accumulator: 0.0,
            halted: false,
            needs_clear: true,
            events: Vec::new(),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Generation currently drawn, if it has been derived
    pub fn sequence(&self) -> Option<&[char]> {
        self.cache.get(self.level)
    }

    /// Clear transient drawing state. The level cache is kept.
    pub fn reset(&mut self) {
        debug!("Renderer reset at level {}", self.level);
        self.turtle.reset(self.settings.upright);
        self.camera.reset();
        self.grammar.reset_models();
        self.halted = false;
        self.needs_clear = true;
    }

    /// Replace the grammar; every cached generation is discarded.
    pub fn set_grammar(&mut self, state: GrammarState) {
        info!("New grammar: axiom \"{}\", {} rule(s)", state.axiom, state.rules.len());
        self.grammar = Grammar::new(state);
        self.cache.reset(self.grammar.axiom());
        self.reset();
    }

    pub fn set_seed(&mut self, seed: u32) {
        info!("Seed changed to {}", seed);
        self.grammar.set_seed(seed);
        self.cache.reset(self.grammar.axiom());
        self.reset();
    }

    pub fn configure(&mut self, settings: RendererSettings) {
        self.camera = Camera::new(&settings, self.level);
        self.settings = settings;
        self.reset();
    }

    pub fn set_level(&mut self, level: usize) {
        self.level = clamp_level(level, &self.tuning);
        self.camera.set_level(self.level);
        self.reset();
    }

    /// Turtle position in view units
    pub fn cursor(&self) -> Vector3 {
        self.turtle.position() / self.camera.scale()
    }

    pub fn camera(&self) -> Vector3 {
        self.camera.position()
    }

    pub fn relative_cursor(&self) -> Vector3 {
        self.cursor() - self.camera()
    }

    /// Fraction of the current generation the turtle has walked
    pub fn progress(&self) -> f64 {
        match self.cache.get(self.level) {
            Some(seq) if !seq.is_empty() => (self.turtle.index() as f64 / seq.len() as f64).min(1.0),
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    /// Fraction of the current generation derived so far
    pub fn load_progress(&self) -> f64 {
        self.cache.load_progress(self.level)
    }

    pub fn orientation_string(&self) -> String {
        self.turtle.orientation().to_string()
    }

    pub fn polygons(&self) -> &[Polygon] {
        self.turtle.polygons()
    }

    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.events)
    }

    /// Feed elapsed host time; runs one draw step per `tick_length`.
    pub fn tick<S: GraphSink>(&mut self, elapsed: f64, sink: &mut S) -> Vec<StepOutcome> {
        let tick_length = self.tuning.tick_length;
        if tick_length <= 0.0 || !tick_length.is_finite() {
            return vec![self.step(sink)];
        }

        self.accumulator += elapsed.max(0.0);
        let mut outcomes = Vec::new();
        let mut substeps = 0;
        while self.accumulator >= tick_length && substeps < MAX_SUBSTEPS {
            outcomes.push(self.step(sink));
            self.accumulator -= tick_length;
            substeps += 1;
        }
        if self.accumulator >= tick_length {
            debug!("Dropping {:.3}s of backlog", self.accumulator - tick_length);
            self.accumulator %= tick_length;
        }
        outcomes
    }

    /// One draw step: extend the level cache if needed, then advance the turtle.
    pub fn step<S: GraphSink>(&mut self, sink: &mut S) -> StepOutcome {
        if std::mem::take(&mut self.needs_clear) {
            sink.clear();
        }
        if self.halted {
            return StepOutcome::Halted;
        }

        let derived_before = self.cache.len();
        let status = self.cache.request(
            &mut self.grammar,
            self.level,
            self.tuning.chars_per_call,
            self.tuning.calls_per_tick,
        );
        for level in derived_before..self.cache.len() {
            let symbols = self.cache.get(level).map_or(0, |s| s.len());
            self.events.push(RenderEvent::LevelDerived { level, symbols });
        }
        if let LevelStatus::Loading { progress } = status {
            return StepOutcome::Loading { progress };
        }

        let sequence = match self.cache.get(self.level) {
            Some(seq) => seq,
            None => return StepOutcome::Loading { progress: 0.0 },
        };
        let outcome = match self.turtle.step(sequence, &mut self.grammar, &self.settings) {
            TurtleStep::Paused => StepOutcome::Paused,
            TurtleStep::Moved => StepOutcome::Moved,
            TurtleStep::ModelEntered => StepOutcome::ModelEntered,
            TurtleStep::Idle => StepOutcome::Idle,
            TurtleStep::Finished => return self.finish(),
        };

        let cursor = self.cursor();
        let camera = self.camera.update(cursor);
        sink.plot(cursor - camera);
        outcome
    }

    fn finish(&mut self) -> StepOutcome {
        match self.settings.loop_mode {
            LoopMode::Off => {
                info!("Level {} finished", self.level);
                self.halted = true;
                self.events.push(RenderEvent::Halted { level: self.level });
                StepOutcome::Halted
            }
            LoopMode::Level => {
                info!("Level {} finished; restarting", self.level);
                self.events.push(RenderEvent::LevelRestarted { level: self.level });
                self.reset();
                StepOutcome::Restarted
            }
            LoopMode::Playlist => {
                let from = self.level;
                let to = if from >= self.tuning.max_level { 0 } else { from + 1 };
                info!("Level {} finished; advancing to {}", from, to);
                self.events.push(RenderEvent::LevelAdvanced { from, to });
                self.set_level(to);
                StepOutcome::Advanced { level: to }
            }
        }
    }
}

fn clamp_level(level: usize, tuning: &Tuning) -> usize {
    if level > tuning.max_level {
        warn!("Level {} above max level {}; clamping", level, tuning.max_level);
        tuning.max_level
    } else {
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant() -> GrammarState {
        GrammarState {
            axiom: "X".to_string(),
            rules: vec!["F=FF".to_string(), "X=F[+X][-X]FX".to_string()],
            angle: "25".to_string(),
            ..Default::default()
        }
    }

    fn square() -> GrammarState {
        GrammarState {
            axiom: "F+F+F+F".to_string(),
            angle: "90".to_string(),
            ..Default::default()
        }
    }

    fn snap_settings(loop_mode: LoopMode) -> RendererSettings {
        RendererSettings {
            camera_mode: CameraMode::Fixed,
            loop_mode,
            upright: false,
            quick_backtrack: false,
            ..Default::default()
        }
    }

    fn run_until_halt(r: &mut Renderer, sink: &mut Vec<Vector3>) -> Vec<StepOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..100_000 {
            let outcome = r.step(sink);
            outcomes.push(outcome);
            if outcome == StepOutcome::Halted {
                return outcomes;
            }
        }
        panic!("renderer never halted");
    }

    #[test]
    fn test_draws_level_and_halts() {
        let mut r = Renderer::new(plant(), RendererSettings::default(), Tuning::default(), 3);
        let mut sink = Vec::new();
        run_until_halt(&mut r, &mut sink);

        assert!(r.is_halted());
        assert_eq!(r.progress(), 1.0);
        assert!(!sink.is_empty());
        let events = r.drain_events();
        assert_eq!(
            events.iter().filter(|e| matches!(e, RenderEvent::LevelDerived { .. })).count(),
            3
        );
        assert_eq!(events.last(), Some(&RenderEvent::Halted { level: 3 }));
        assert!(r.drain_events().is_empty());
        assert_eq!(r.step(&mut sink), StepOutcome::Halted);
    }

    #[test]
    fn test_loading_spreads_over_steps() {
        let tuning = Tuning {
            chars_per_call: 8,
            calls_per_tick: 1,
            ..Tuning::default()
        };
        let mut r = Renderer::new(plant(), RendererSettings::default(), tuning, 4);
        let mut sink = Vec::new();
        let mut last = 0.0;
        let mut loading_steps = 0;
        while let StepOutcome::Loading { progress } = r.step(&mut sink) {
            assert!(progress >= last && progress < 1.0);
            last = progress;
            loading_steps += 1;
        }
        assert!(loading_steps > 4);
        assert!(sink.len() <= 1);
        assert_eq!(r.load_progress(), 1.0);
    }

    #[test]
    fn test_square_path_in_sink() {
        let mut r = Renderer::new(square(), snap_settings(LoopMode::Off), Tuning::default(), 0);
        let mut sink = Vec::new();
        run_until_halt(&mut r, &mut sink);
        let expected = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        ];
        assert_eq!(sink.len(), expected.len());
        for (got, want) in sink.iter().zip(expected) {
            assert!(got.distance(want) < 1e-9, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_level_loop_redraws_identically() {
        let mut r = Renderer::new(square(), snap_settings(LoopMode::Level), Tuning::default(), 0);
        let mut sink = Vec::new();
        let mut first = Vec::new();
        for _ in 0..50 {
            if r.step(&mut sink) == StepOutcome::Restarted {
                first = sink.clone();
                break;
            }
        }
        assert_eq!(first.len(), 4);
        // The sink is cleared on the next step and the path replays
        for _ in 0..4 {
            r.step(&mut sink);
        }
        assert_eq!(sink, first);
        assert_eq!(r.drain_events(), vec![RenderEvent::LevelRestarted { level: 0 }]);
    }

    #[test]
    fn test_playlist_wraps_past_max_level() {
        let tuning = Tuning {
            max_level: 1,
            ..Tuning::default()
        };
        let mut r = Renderer::new(square(), snap_settings(LoopMode::Playlist), tuning, 1);
        let mut sink = Vec::new();
        let mut advanced = None;
        for _ in 0..100 {
            if let StepOutcome::Advanced { level } = r.step(&mut sink) {
                advanced = Some(level);
                break;
            }
        }
        assert_eq!(advanced, Some(0));
        assert_eq!(r.level(), 0);
        assert!(r
            .drain_events()
            .contains(&RenderEvent::LevelAdvanced { from: 1, to: 0 }));
    }

    #[test]
    fn test_tick_accumulates_and_caps() {
        let mut r = Renderer::new(plant(), RendererSettings::default(), Tuning::default(), 5);
        let mut sink = Vec::new();
        assert!(r.tick(0.05, &mut sink).is_empty());
        assert_eq!(r.tick(0.06, &mut sink).len(), 1);
        assert_eq!(r.tick(100.0, &mut sink).len(), MAX_SUBSTEPS as usize);
        // Backlog beyond the cap is dropped
        assert!(r.tick(0.0, &mut sink).len() <= 1);
    }

    #[test]
    fn test_reset_keeps_cache_and_replays() {
        let mut state = plant();
        state.rules = vec!["X=F[+X]F[-X]X,F[-X]FX,FX".to_string(), "F=FF".to_string()];
        state.seed = 4242;
        let mut r = Renderer::new(state, snap_settings(LoopMode::Off), Tuning::default(), 3);
        let mut a = Vec::new();
        run_until_halt(&mut r, &mut a);
        r.drain_events();

        r.reset();
        let mut b = Vec::new();
        run_until_halt(&mut r, &mut b);
        assert_eq!(a, b);
        // No level was derived a second time
        assert!(!r
            .drain_events()
            .iter()
            .any(|e| matches!(e, RenderEvent::LevelDerived { .. })));

        r.set_seed(4242);
        let mut c = Vec::new();
        run_until_halt(&mut r, &mut c);
        assert_eq!(a, c);
    }

    #[test]
    fn test_new_grammar_discards_cache() {
        let mut r = Renderer::new(plant(), snap_settings(LoopMode::Off), Tuning::default(), 1);
        let mut sink = Vec::new();
        run_until_halt(&mut r, &mut sink);
        r.drain_events();

        r.set_grammar(GrammarState {
            axiom: "F+F".to_string(),
            angle: "90".to_string(),
            ..Default::default()
        });
        assert!(!r.is_halted());
        assert_eq!(r.sequence(), None);
        assert_eq!(r.step(&mut sink), StepOutcome::Moved);
        assert_eq!(r.sequence(), Some(&['F', '+', 'F'][..]));
        assert_eq!(r.drain_events(), vec![RenderEvent::LevelDerived { level: 1, symbols: 3 }]);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_configure_restarts_turtle() {
        let mut r = Renderer::new(square(), snap_settings(LoopMode::Off), Tuning::default(), 0);
        let mut sink = Vec::new();
        r.step(&mut sink);
        r.step(&mut sink);
        assert!(r.progress() > 0.0);

        r.configure(RendererSettings {
            upright: true,
            ..snap_settings(LoopMode::Off)
        });
        assert_eq!(r.progress(), 0.0);
        assert_eq!(r.cursor(), Vector3::ZERO);
        assert_eq!(r.step(&mut sink), StepOutcome::Moved);
        assert!(r.cursor().distance(Vector3::Y) < 1e-9);
        assert_eq!(sink.len(), 1);
        assert!(r.settings().upright);
    }

    #[test]
    fn test_figure_scale_and_camera_offset() {
        let settings = RendererSettings {
            figure_scale: "2".to_string(),
            camera_mode: CameraMode::Fixed,
            camera_centre: ["1".to_string(), "0".to_string(), "0".to_string()],
            upright: false,
            ..Default::default()
        };
        let state = GrammarState {
            axiom: "FF".to_string(),
            ..Default::default()
        };
        let mut r = Renderer::new(state, settings, Tuning::default(), 0);
        let mut sink = Vec::new();
        assert_eq!(r.step(&mut sink), StepOutcome::Moved);
        assert!(r.cursor().distance(Vector3::new(0.5, 0.0, 0.0)) < 1e-9);
        assert!(r.camera().distance(Vector3::X) < 1e-9);
        assert!(sink[0].distance(Vector3::new(-0.5, 0.0, 0.0)) < 1e-9);
        assert_eq!(r.relative_cursor(), sink[0]);
        assert!(!r.orientation_string().is_empty());
    }

    #[test]
    fn test_settings_round_trip() {
        let settings = RendererSettings {
            figure_scale: "2^lv".to_string(),
            camera_mode: CameraMode::Quadratic,
            loop_mode: LoopMode::Playlist,
            hesitate_fork: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["camera_mode"], 2);
        assert_eq!(json["loop_mode"], 2);
        let back: RendererSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }
}
