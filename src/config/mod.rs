//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in defaults (one-hour freshness TTL)
//! 2. **Configuration file** – `.colloquy.toml` in the current directory,
//!    home directory, or XDG config directory
//! 3. **Environment variables** – `COLLOQUY_FRESHNESS_TTL_SECONDS`,
//!    `COLLOQUY_REVIEW_STORE_DIR`, `COLLOQUY_GRAPH_FAMILY`
//! 4. **Command-line arguments** – when embedded in a CLI host

use camino::Utf8Path;
use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::GraphFamily;
use crate::store::DEFAULT_FRESHNESS_TTL_SECONDS;

/// Errors surfaced while resolving configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No review-store directory was configured.
    #[error(
        "review store directory is required (use review_store_dir or COLLOQUY_REVIEW_STORE_DIR)"
    )]
    MissingReviewStoreDir,

    /// The configured graph family is not one of the known values.
    #[error("graph family must be \"timeline\" or \"discussion\", got {value}")]
    UnknownGraphFamily {
        /// The offending configured value.
        value: String,
    },
}

/// Replication configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `COLLOQUY_FRESHNESS_TTL_SECONDS`: seconds before a cached conversation
///   is considered stale (default 3600)
/// - `COLLOQUY_REVIEW_STORE_DIR`: directory holding staged review files
/// - `COLLOQUY_GRAPH_FAMILY`: `timeline` or `discussion`
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "COLLOQUY",
    discovery(
        dotfile_name = ".colloquy.toml",
        config_file_name = "colloquy.toml",
        app_name = "colloquy"
    )
)]
pub struct ColloquyConfig {
    /// Seconds before a cached conversation is considered stale.
    pub freshness_ttl_seconds: Option<u64>,

    /// Directory holding staged pending-review files.
    pub review_store_dir: Option<String>,

    /// Graph family used by the configured provider (`timeline` or
    /// `discussion`).
    pub graph_family: Option<String>,
}

impl ColloquyConfig {
    /// Resolves the freshness TTL, falling back to the one-hour default.
    #[must_use]
    pub fn resolve_ttl(&self) -> TimeDelta {
        let seconds = self
            .freshness_ttl_seconds
            .map_or(DEFAULT_FRESHNESS_TTL_SECONDS, |configured| {
                i64::try_from(configured).unwrap_or(i64::MAX)
            });
        TimeDelta::seconds(seconds)
    }

    /// Returns the configured review-store directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingReviewStoreDir`] when none is
    /// configured.
    pub fn require_review_store_dir(&self) -> Result<&Utf8Path, ConfigurationError> {
        self.review_store_dir
            .as_deref()
            .map(Utf8Path::new)
            .ok_or(ConfigurationError::MissingReviewStoreDir)
    }

    /// Resolves the configured graph family, when one is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownGraphFamily`] for values other
    /// than `timeline` or `discussion`.
    pub fn resolve_graph_family(&self) -> Result<Option<GraphFamily>, ConfigurationError> {
        self.graph_family
            .as_deref()
            .map(|value| match value {
                "timeline" => Ok(GraphFamily::Timeline),
                "discussion" => Ok(GraphFamily::Discussion),
                other => Err(ConfigurationError::UnknownGraphFamily {
                    value: other.to_owned(),
                }),
            })
            .transpose()
    }
}
