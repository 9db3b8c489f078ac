//! Error types for layout operations.

use thiserror::Error;

/// Errors that can occur when configuring a layout strategy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// A configuration value is out of its valid range.
    #[error("invalid layout config: {0}")]
    InvalidConfig(String),
}
