//! Tunables for the mapping and hosting flow, loaded from a [ron] file.
//!
//! Every field has a default, so a config file only needs to name the values
//! it changes:
//!
//! ```text
//! (quality_threshold: 0.8, estimate_interval_ms: 250)
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

/// An RGBA colour with channels in `0..=255`.
pub type Rgba = [f32; 4];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not write config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Bar colours, one per quality level.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityColors {
    pub unknown: Rgba,
    pub low: Rgba,
    pub medium: Rgba,
    pub high: Rgba,
}

impl Default for QualityColors {
    fn default() -> Self {
        Self {
            unknown: [218.0, 220.0, 240.0, 255.0],
            low: [234.0, 67.0, 53.0, 255.0],
            medium: [250.0, 187.0, 5.0, 255.0],
            high: [52.0, 168.0, 82.0, 255.0],
        }
    }
}

/// Narrowest bar the ring may be split into. Caps the ring at 360 bars.
pub const MIN_SPACING_DEGREES: f64 = 0.5;

/// Shape of the quality ring drawn around an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityUiConfig {
    /// Angle covered by one bar.
    pub spacing_degrees: f64,
    /// Distance of the bars from the anchor, in meters.
    pub radius: f32,
    pub bar_scale: f32,
    pub colors: QualityColors,
}

impl Default for QualityUiConfig {
    fn default() -> Self {
        Self {
            spacing_degrees: 7.5,
            radius: 0.2,
            bar_scale: 0.3,
            colors: QualityColors::default(),
        }
    }
}

impl QualityUiConfig {
    pub fn spacing_radians(&self) -> f64 {
        self.spacing_degrees.to_radians()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Closer than this the user is asked to step back.
    pub min_distance: f64,
    /// Further than this the user is asked to come closer.
    pub max_distance: f64,
    /// Overall ring quality at which hosting starts on its own.
    pub quality_threshold: f32,
    /// Minimum time between two quality estimates.
    pub estimate_interval_ms: u64,
    /// How long hosted anchors stay resolvable.
    pub ttl_days: u32,
    /// Stored anchors older than this are no longer listed.
    pub max_anchor_age_minutes: u64,
    pub quality_ui: QualityUiConfig,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.2,
            max_distance: 10.0,
            quality_threshold: 0.6,
            estimate_interval_ms: 500,
            ttl_days: 1,
            max_anchor_age_minutes: 24 * 60,
            quality_ui: QualityUiConfig::default(),
        }
    }
}

impl GhostConfig {
    /// Reads a config from `path`. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SPACING_DEGREES..=180.0).contains(&self.quality_ui.spacing_degrees) {
            return Err(ConfigError::Invalid("spacing_degrees must be in [0.5, 180]"));
        }
        if self.min_distance > self.max_distance {
            return Err(ConfigError::Invalid("min_distance exceeds max_distance"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::Invalid("quality_threshold must be in [0, 1]"));
        }
        if self.ttl_days == 0 || self.ttl_days > 365 {
            return Err(ConfigError::Invalid("ttl_days must be in [1, 365]"));
        }
        Ok(())
    }
}
