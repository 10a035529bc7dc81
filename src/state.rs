//! Session state - what gets saved and restored
//!
//! A session is the grammar, the renderer settings and the level being
//! drawn. The level cache and turtle are rebuilt from these on load; the
//! seeded PRNG makes the rebuilt generations identical.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{System, Tuning};
use crate::lsystem::GrammarState;
use crate::renderer::{Renderer, RendererSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub grammar: GrammarState,
    #[serde(default)]
    pub settings: RendererSettings,
    #[serde(default)]
    pub level: usize,
}

impl Session {
    pub fn from_system(system: &System, level: usize) -> Self {
        Self {
            grammar: system.grammar.clone(),
            settings: system.settings(),
            level,
        }
    }

    /// Capture a running renderer
    pub fn capture(renderer: &Renderer) -> Self {
        Self {
            grammar: renderer.grammar().state().clone(),
            settings: renderer.settings().clone(),
            level: renderer.level(),
        }
    }

    pub fn into_renderer(self, tuning: Tuning) -> Renderer {
        Renderer::new(self.grammar, self.settings, tuning, self.level)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session {}", path.display()))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session {}", path.display()))?;
        tracing::debug!("Session loaded from {}", path.display());
        Ok(session)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session {}", path.display()))?;
        tracing::info!("Session saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::Preset;
    use crate::renderer::{CameraMode, LoopMode};

    fn sample() -> Session {
        let mut session = Session::from_system(&System::from(Preset::Flower), 3);
        session.settings.camera_mode = CameraMode::Fixed;
        session.settings.camera_centre = ["lv".into(), "0.5*lv".into(), "0".into()];
        session.settings.loop_mode = LoopMode::Playlist;
        session.settings.draw_tail_end = true;
        session
    }

    #[test]
    fn test_json_round_trip() {
        let session = sample();
        let json = serde_json::to_string_pretty(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.grammar.axiom, "F~L");
        assert_eq!(back.grammar.seed, 7);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("lsys_walker_session_{}", std::process::id()));
        let path = dir.join("nested").join("session.json");
        let session = sample();
        session.save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), session);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_capture_restores_renderer() {
        let session = sample();
        let renderer = session.clone().into_renderer(Tuning::default());
        assert_eq!(Session::capture(&renderer), session);
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = r#"{ "grammar": { "axiom": "F", "rules": ["F=F+F"] } }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.level, 0);
        assert_eq!(session.grammar.angle, "90");
        assert_eq!(session.settings, RendererSettings::default());
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(Session::load("/nonexistent/session.json").is_err());
    }
}
