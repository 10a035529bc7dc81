//! Camera follow model
//!
//! Fixed mode pins the view to a formula of the level. Linear mode is plain
//! exponential smoothing toward the cursor. Quadratic mode keeps some of the
//! camera's own momentum so it glides instead of snapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::RendererSettings;
use crate::formula::Formula;
use crate::quaternion::Vector3;

/// Persisted as 0, 1, 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CameraMode {
    Fixed,
    #[default]
    Linear,
    Quadratic,
}

impl TryFrom<u8> for CameraMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CameraMode::Fixed),
            1 => Ok(CameraMode::Linear),
            2 => Ok(CameraMode::Quadratic),
            other => Err(format!("camera mode must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<CameraMode> for u8 {
    fn from(mode: CameraMode) -> Self {
        match mode {
            CameraMode::Fixed => 0,
            CameraMode::Linear => 1,
            CameraMode::Quadratic => 2,
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraMode::Fixed => "fixed",
            CameraMode::Linear => "linear",
            CameraMode::Quadratic => "quadratic",
        };
        f.write_str(name)
    }
}

/// Parse a settings formula, logging and substituting `fallback` on error.
fn formula_or(label: &str, source: &str, fallback: f64) -> Formula {
    Formula::parse(source).unwrap_or_else(|e| {
        warn!("Invalid {} formula \"{}\": {}; using {}", label, source, e, fallback);
        Formula::constant(fallback)
    })
}

pub struct Camera {
    mode: CameraMode,
    factor: f64,
    scale_formula: Formula,
    centre_formulas: [Formula; 3],
    scale: f64,
    centre: Vector3,
    position: Vector3,
    velocity: Vector3,
}

impl Camera {
    pub fn new(settings: &RendererSettings, level: usize) -> Self {
        let factor = if (0.0..=1.0).contains(&settings.follow_factor) {
            settings.follow_factor
        } else {
            warn!(
                "Follow factor {} outside [0, 1]; clamping",
                settings.follow_factor
            );
            settings.follow_factor.clamp(0.0, 1.0)
        };
        let [cx, cy, cz] = &settings.camera_centre;
        let mut camera = Self {
            mode: settings.camera_mode,
            factor: if factor.is_nan() { 0.0 } else { factor },
            scale_formula: formula_or("figure scale", &settings.figure_scale, 1.0),
            centre_formulas: [
                formula_or("camera x", cx, 0.0),
                formula_or("camera y", cy, 0.0),
                formula_or("camera z", cz, 0.0),
            ],
            scale: 1.0,
            centre: Vector3::ZERO,
            position: Vector3::ZERO,
            velocity: Vector3::ZERO,
        };
        camera.set_level(level);
        camera
    }

    /// Re-evaluate the level formulas and snap to the start of the drawing.
    pub fn set_level(&mut self, level: usize) {
        let scale = self.scale_formula.evaluate(level);
        self.scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            warn!(
                "Figure scale \"{}\" is {} at level {}; using 1",
                self.scale_formula, scale, level
            );
            1.0
        };
        let [x, y, z] = &self.centre_formulas;
        self.centre = Vector3::new(x.evaluate(level), y.evaluate(level), z.evaluate(level));
        self.reset();
    }

    pub fn reset(&mut self) {
        self.position = match self.mode {
            CameraMode::Fixed => self.centre,
            _ => Vector3::ZERO,
        };
        self.velocity = Vector3::ZERO;
    }

    /// Divisor from turtle units to view units for the current level
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    /// Take one sample following `cursor` (already scaled).
    pub fn update(&mut self, cursor: Vector3) -> Vector3 {
        let f = self.factor;
        let next = match self.mode {
            CameraMode::Fixed => self.centre,
            CameraMode::Linear => cursor * f + self.position * (1.0 - f),
            CameraMode::Quadratic => {
                let damp = 1.0 - f;
                self.position + (cursor - self.position) * (f * f) + self.velocity * (damp * damp)
            }
        };
        self.velocity = next - self.position;
        self.position = next;
        next
    }
}
