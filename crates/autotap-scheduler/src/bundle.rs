//! JSON export/import of a configuration with its click points.

use std::path::Path;

use autotap_core::config::PointLimits;
use autotap_core::error::{AutoTapError, Result};
use autotap_core::types::validate_points;
use autotap_core::{ClickPoint, Configuration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bundle format version written by this build.
pub const BUNDLE_VERSION: u32 = 1;

const MAX_FILE_STEM: usize = 50;

/// One configuration and its points, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationBundle {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub configuration: Configuration,
    pub click_points: Vec<ClickPoint>,
}

impl ConfigurationBundle {
    pub fn new(configuration: Configuration, click_points: Vec<ClickPoint>) -> Self {
        Self {
            version: BUNDLE_VERSION,
            timestamp: Utc::now(),
            configuration,
            click_points,
        }
    }

    /// Check version and contents.
    pub fn validate(&self, limits: &PointLimits) -> Result<()> {
        if self.version > BUNDLE_VERSION {
            return Err(AutoTapError::UnsupportedBundleVersion(self.version));
        }
        self.configuration.validate()?;
        validate_points(&self.click_points, limits)
    }
}

/// Write a configuration and its points as a pretty JSON bundle.
/// The file is replaced atomically.
pub fn export_bundle(
    configuration: &Configuration,
    points: &[ClickPoint],
    path: &Path,
) -> Result<ConfigurationBundle> {
    let bundle = ConfigurationBundle::new(configuration.clone(), points.to_vec());
    let json = serde_json::to_string_pretty(&bundle)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    tracing::info!(
        "📦 Exported '{}' ({} points) to {}",
        bundle.configuration.name,
        bundle.click_points.len(),
        path.display()
    );
    Ok(bundle)
}

/// Read and validate a bundle.
pub fn import_bundle(path: &Path, limits: &PointLimits) -> Result<ConfigurationBundle> {
    let content = std::fs::read_to_string(path)?;
    let bundle: ConfigurationBundle = serde_json::from_str(&content)
        .map_err(|e| AutoTapError::Bundle(format!("{}: {e}", path.display())))?;
    bundle.validate(limits)?;
    Ok(bundle)
}

/// `autotap_<name>_<yyyyMMdd_HHmmss>.json`, with the name reduced to a safe
/// file-name stem.
pub fn export_file_name(name: &str, at: DateTime<Utc>) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_STEM)
        .collect();
    let stem = sanitized.trim_matches('_');
    let stem = if stem.is_empty() { "configuration" } else { stem };
    format!("autotap_{stem}_{}.json", at.format("%Y%m%d_%H%M%S"))
}
