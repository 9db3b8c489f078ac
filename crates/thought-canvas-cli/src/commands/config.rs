//! Config command implementation.
//!
//! Shows the resolved engine configuration and where it is read from.

use anyhow::Result;

use crate::config::Config;

/// Print the effective configuration as TOML.
pub fn show(config: &Config) -> Result<()> {
    match &config.source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# built-in defaults (no config file found)"),
    }
    print!("{}", config.engine.to_toml_string()?);
    Ok(())
}

/// Print the default config file location.
pub fn path() {
    match Config::config_file_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("(no config file path available)"),
    }
}
