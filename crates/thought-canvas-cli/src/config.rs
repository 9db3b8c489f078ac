//! CLI configuration management.
//!
//! Engine settings are resolved with increasing precedence from built-in
//! defaults, a TOML config file, environment variables and finally
//! command-line flags (applied by the caller).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use thought_canvas_engine::{EngineConfig, LlmResolver};
use thought_canvas_layout::LayoutMode;
use tracing::debug;

/// Resolved settings plus where they came from.
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    /// Config file that was read, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `explicit` or the default config file, then
    /// apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file if present (silently ignore if missing)
        let _ = dotenvy::dotenv();

        let (mut engine, source) = match explicit {
            Some(path) => (read_file(path)?, Some(path.to_path_buf())),
            None => match Self::config_file_path().filter(|p| p.exists()) {
                Some(path) => (read_file(&path)?, Some(path)),
                None => (EngineConfig::default(), None),
            },
        };

        apply_env(&mut engine, |key| std::env::var(key).ok())?;
        engine
            .validate()
            .context("Configuration rejected after environment overrides")?;
        debug!(source = ?source, layout = %engine.layout, "config_loaded");
        Ok(Self { engine, source })
    }

    /// Get the path to the config file.
    pub fn config_file_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Optional list of LLM endpoints, one `[[resolvers]]` table each.
    pub fn resolvers_file_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("resolvers.toml"))
    }

    /// Endpoints from the resolvers file when it exists, else from the
    /// environment.
    pub fn llm_resolvers() -> Result<Vec<LlmResolver>> {
        match Self::resolvers_file_path().filter(|p| p.exists()) {
            Some(path) => LlmResolver::load_from_toml(&path)
                .with_context(|| format!("Failed to load resolvers from {}", path.display())),
            None => Ok(vec![LlmResolver::from_env()]),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "thought-canvas", "tc")
}

fn read_file(path: &Path) -> Result<EngineConfig> {
    EngineConfig::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Apply `TC_*` overrides. `lookup` is injectable so tests never touch the
/// process environment.
fn apply_env(engine: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(layout) = lookup("TC_LAYOUT") {
        engine.layout = layout
            .parse::<LayoutMode>()
            .map_err(anyhow::Error::msg)
            .context("Invalid TC_LAYOUT")?;
    }
    if let Some(count) = lookup("TC_DESIRED_CHILDREN") {
        engine.expansion.desired_children = count
            .trim()
            .parse()
            .with_context(|| format!("Invalid TC_DESIRED_CHILDREN: {count}"))?;
    }
    if let Some(size) = lookup("TC_CANVAS_SIZE") {
        engine.canvas_size = size
            .trim()
            .parse()
            .with_context(|| format!("Invalid TC_CANVAS_SIZE: {size}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut engine = EngineConfig::from_toml_str("layout = \"force\"\ncanvas_size = 4000.0").unwrap();
        apply_env(
            &mut engine,
            env(&[("TC_LAYOUT", "deterministic"), ("TC_DESIRED_CHILDREN", " 6 ")]),
        )
        .unwrap();
        assert_eq!(engine.layout, LayoutMode::Deterministic);
        assert_eq!(engine.expansion.desired_children, 6);
        assert_eq!(engine.canvas_size, 4000.0);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut engine = EngineConfig::default();
        let err = apply_env(&mut engine, env(&[("TC_CANVAS_SIZE", "huge")])).unwrap_err();
        assert!(format!("{err:#}").contains("TC_CANVAS_SIZE"));
    }

    #[test]
    fn explicit_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tc.toml");
        std::fs::write(&path, "[expansion]\ndesired_children = 2\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }
}
