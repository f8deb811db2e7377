use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use elig_core::study::{PipelineOptions, SelectionPolicy};
use elig_core::EligError;

/// On-disk configuration: resource locations plus optional branch-selection
/// overrides. Relative resource paths resolve against the config file's
/// directory.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub variable_file: PathBuf,
    pub unit_file: PathBuf,
    #[serde(default)]
    pub inclusion_policy: Option<SelectionPolicy>,
    #[serde(default)]
    pub exclusion_policy: Option<SelectionPolicy>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, EligError> {
        let data = fs::read_to_string(path).map_err(|e| EligError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config: Config = serde_json::from_str(&data).map_err(|e| EligError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            config.variable_file = resolve(base, &config.variable_file);
            config.unit_file = resolve(base, &config.unit_file);
        }
        Ok(config)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            inclusion_policy: self.inclusion_policy.unwrap_or(defaults.inclusion_policy),
            exclusion_policy: self.exclusion_policy.unwrap_or(defaults.exclusion_policy),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
