//! User configuration.
//!
//! A single JSON document at `<data>/config.json` with camelCase keys.
//! A malformed or unreadable file is never fatal: loading falls back to
//! defaults so a typo in the config cannot brick the CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Complete tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Pass `--dangerously-skip-permissions` to the agent.
    pub skip_permissions: bool,
    /// Cap on review rounds per plan.
    pub max_review_rounds: u32,
    pub usage_limits: UsageLimits,
    pub worktree: WorktreeConfig,
    pub otel: OtelConfig,
}

/// Quota pre-flight configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageLimits {
    pub enabled: bool,
    pub min_available_input_tokens: u64,
    pub min_available_requests: u64,
    pub max_cost_per_session: f64,
    pub max_wait_minutes: u64,
    /// 1..=4; unset means auto-detect from the service response.
    pub organization_tier: Option<u8>,
    /// Quota service URL. Unset means the pre-flight has no data source and
    /// passes with a warning.
    pub endpoint: Option<String>,
}

/// Worktree isolation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorktreeConfig {
    pub enabled: bool,
    pub copy_gitignored: bool,
    pub auto_cleanup_on_complete: bool,
}

/// OpenTelemetry pass-through for the agent subprocess environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OtelConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            min_available_input_tokens: 10_000,
            min_available_requests: 5,
            max_cost_per_session: 1.0,
            max_wait_minutes: 10,
            organization_tier: None,
            endpoint: None,
        }
    }
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            copy_gitignored: true,
            auto_cleanup_on_complete: false,
        }
    }
}

impl Config {
    /// Built-in default with the documented review-round cap.
    pub fn with_defaults() -> Self {
        Self {
            max_review_rounds: 5,
            ..Self::default()
        }
    }

    /// Load from `path`, silently substituting defaults on any failure.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Self>(&text) {
                Ok(mut config) => {
                    if config.max_review_rounds == 0 {
                        config.max_review_rounds = Self::with_defaults().max_review_rounds;
                    }
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                    Self::with_defaults()
                }
            },
            Err(_) => Self::with_defaults(),
        }
    }

    /// Persist to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Read a dotted key (`usageLimits.enabled`) as a JSON value.
    pub fn get_key(&self, key: &str) -> Result<serde_json::Value> {
        let root = serde_json::to_value(self)?;
        let mut cursor = &root;
        for segment in key.split('.') {
            cursor = cursor
                .get(segment)
                .ok_or_else(|| Error::Input(format!("unknown config key: {key}")))?;
        }
        Ok(cursor.clone())
    }

    /// Set a dotted key from a raw string value, inferring the JSON type.
    pub fn set_key(&mut self, key: &str, raw: &str) -> Result<()> {
        let value: serde_json::Value =
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.into()));

        let mut root = serde_json::to_value(&*self)?;
        {
            let mut cursor = &mut root;
            let segments: Vec<&str> = key.split('.').collect();
            let (last, parents) = segments
                .split_last()
                .ok_or_else(|| Error::Input("empty config key".into()))?;
            for segment in parents {
                cursor = cursor
                    .get_mut(*segment)
                    .ok_or_else(|| Error::Input(format!("unknown config key: {key}")))?;
            }
            let slot = cursor
                .get_mut(*last)
                .ok_or_else(|| Error::Input(format!("unknown config key: {key}")))?;
            *slot = value;
        }

        *self = serde_json::from_value(root)
            .map_err(|e| Error::Input(format!("invalid value for {key}: {e}")))?;
        Ok(())
    }
}
