use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub visualizer: VisualizerConfig,
    pub view: ViewConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Transport defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub initial_volume: f32,
    /// Volume change applied by the up/down shortcuts.
    pub volume_step: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.1,
            volume_step: 0.1,
        }
    }
}

/// Analyser and draw loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Transform size; the analyser exposes half as many bins.
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub frame_interval_ms: u64,
    pub canvas_width: f32,
    pub canvas_height: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            frame_interval_ms: 50,
            canvas_width: 400.0,
            canvas_height: 200.0,
        }
    }
}

impl VisualizerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub shake_ms: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self { shake_ms: 300 }
    }
}

impl ViewConfig {
    pub fn shake_duration(&self) -> Duration {
        Duration::from_millis(self.shake_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            AppConfig::from_json_str(r#"{ "player": { "initial_volume": 0.5 } }"#).unwrap();

        assert_eq!(config.player.initial_volume, 0.5);
        assert_eq!(config.player.volume_step, 0.1);
        assert_eq!(config.visualizer.fft_size, 256);
        assert_eq!(config.view.shake_duration(), Duration::from_millis(300));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = AppConfig::from_json_str("{ player: ").unwrap_err();
        assert!(matches!(err, crate::PlayerError::Json(_)));
    }
}
