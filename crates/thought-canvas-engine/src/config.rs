//! Engine configuration.
//!
//! Every section has defaults, so a TOML file only needs the keys it wants
//! to override:
//!
//! ```toml
//! layout = "deterministic"
//!
//! [resolver]
//! min_gap = 260.0
//!
//! [expansion]
//! desired_children = 3
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thought_canvas_layout::{ForceConfig, LayoutMode, PlacementConfig, ResolverConfig};

use crate::error::ConfigError;

/// Camera settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub initial_zoom: f32,
    /// Visible width in screen pixels.
    pub width: f32,
    /// Visible height in screen pixels.
    pub height: f32,
    /// World-space buffer added around the visible rectangle when culling.
    pub cull_margin: f32,
    /// Exponential approach rate (per second) of animated transitions.
    pub transition_rate: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.05,
            max_zoom: 3.0,
            initial_zoom: 1.0,
            width: 1280.0,
            height: 800.0,
            cull_margin: 300.0,
            transition_rate: 8.0,
        }
    }
}

/// How expansions are requested and presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Number of children asked for per expansion.
    pub desired_children: usize,
    /// Description shown while a node's first response is pending.
    pub loading_placeholder: String,
    /// Description substituted when that first response fails.
    pub fallback_description: String,
    /// Seconds a freshly attached node keeps its `is_new` flag.
    pub new_flag_secs: f32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            desired_children: 4,
            loading_placeholder: "Gathering insight...".to_string(),
            fallback_description: "Details for this topic could not be loaded.".to_string(),
            new_flag_secs: 1.5,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal side length of the square world canvas.
    pub canvas_size: f32,
    /// Side length of the square minimap box.
    pub minimap_size: f32,
    /// Animation ticks per second.
    pub frame_rate: u32,
    pub layout: LayoutMode,
    pub placement: PlacementConfig,
    pub resolver: ResolverConfig,
    pub force: ForceConfig,
    pub viewport: ViewportConfig,
    pub expansion: ExpansionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas_size: 5000.0,
            minimap_size: 200.0,
            frame_rate: 60,
            layout: LayoutMode::default(),
            placement: PlacementConfig::default(),
            resolver: ResolverConfig::default(),
            force: ForceConfig::default(),
            viewport: ViewportConfig::default(),
            expansion: ExpansionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Force settings with the values shared with other sections filled in.
    pub fn force_config(&self) -> ForceConfig {
        ForceConfig {
            ideal_length: self.placement.level_spacing,
            canvas_size: self.canvas_size,
            ..self.force
        }
    }

    /// Reject values no layout or camera could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.canvas_size > 0.0) {
            return Err(invalid("canvas_size must be positive"));
        }
        if !(self.minimap_size > 0.0) {
            return Err(invalid("minimap_size must be positive"));
        }
        if self.frame_rate == 0 {
            return Err(invalid("frame_rate must be at least 1"));
        }
        self.placement.validate()?;
        self.resolver.validate()?;
        self.force_config().validate()?;

        let vp = &self.viewport;
        if !(vp.min_zoom > 0.0) || !(vp.max_zoom > 0.0) {
            return Err(invalid("zoom bounds must be positive"));
        }
        if vp.min_zoom > vp.max_zoom {
            return Err(invalid(format!(
                "min_zoom {} exceeds max_zoom {}",
                vp.min_zoom, vp.max_zoom
            )));
        }
        if vp.initial_zoom < vp.min_zoom || vp.initial_zoom > vp.max_zoom {
            return Err(invalid("initial_zoom must lie within the zoom bounds"));
        }
        if !(vp.width > 0.0) || !(vp.height > 0.0) {
            return Err(invalid("viewport size must be positive"));
        }
        if !(vp.cull_margin >= 0.0) {
            return Err(invalid("cull_margin must be non-negative"));
        }
        if !(vp.transition_rate > 0.0) {
            return Err(invalid("transition_rate must be positive"));
        }

        if self.expansion.desired_children == 0 {
            return Err(invalid("desired_children must be at least 1"));
        }
        if !(self.expansion.new_flag_secs >= 0.0) {
            return Err(invalid("new_flag_secs must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
