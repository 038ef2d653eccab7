use std::{fs, path::Path};

use anyhow::{Context, Result};
use dfa_core::DfaConfig;
use serde::Deserialize;

/// The contents of a `dfa.toml` file.
///
/// ```toml
/// [dfa]
/// max_iterations = 100
/// report_missing_intrinsics = false
/// ```
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub dfa: DfaConfig,
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
