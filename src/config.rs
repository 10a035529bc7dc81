//! Configuration loader - YAML manifest + .env environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::lsystem::GrammarState;
use crate::presets::Preset;
use crate::renderer::RendererSettings;

/// Host cadence and work budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Seconds of host time per draw step
    pub tick_length: f64,
    /// Characters produced per derive call before it pauses
    pub chars_per_call: usize,
    /// Derive calls allowed per draw step
    pub calls_per_tick: usize,
    /// Highest generation; playlist mode wraps back to 0 after it
    pub max_level: usize,
    pub max_model_depth: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            tick_length: 0.1,
            chars_per_call: 500,
            calls_per_tick: 16,
            max_level: 8,
            max_model_depth: 32,
        }
    }
}

/// Main configuration loaded from systems.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub systems: Vec<System>,
}

/// A named L-system with optional renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub grammar: GrammarState,
    #[serde(default)]
    pub settings: Option<RendererSettings>,
}

impl System {
    pub fn settings(&self) -> RendererSettings {
        self.settings.clone().unwrap_or_default()
    }
}

impl From<Preset> for System {
    fn from(preset: Preset) -> Self {
        Self {
            id: preset.id().to_string(),
            name: preset.name().to_string(),
            grammar: preset.grammar(),
            settings: Some(preset.settings()),
        }
    }
}

/// Environment loaded from .env
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub log_dir: String,
    pub output_dir: String,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path`, or fall back to the built-in presets if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("No config at {}, using built-in systems", path.display());
            Ok(Self::builtin())
        }
    }

    pub fn builtin() -> Self {
        Self {
            tuning: Tuning::default(),
            systems: Preset::ALL.into_iter().map(System::from).collect(),
        }
    }

    /// Get system by ID
    pub fn get_system(&self, id: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.id == id)
    }

    pub fn system_ids(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.id.as_str()).collect()
    }
}

impl Environment {
    /// Load environment from .env file
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Environment {
            log_dir: std::env::var("LSYS_LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            output_dir: std::env::var("LSYS_OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()),
        }
    }
}
