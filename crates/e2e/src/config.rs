//! Harness configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::LoadConfig;
use crate::coverage::{CoverageFilter, CoverageOptions};
use crate::error::E2eResult;
use crate::playwright::PlaywrightConfig;
use crate::server::AppConfig;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Browser suites
    pub e2e: RunnerConfig,

    /// REST load scenario
    pub load: LoadConfig,
}

impl HarnessConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub app: AppConfig,
    pub playwright: PlaywrightConfig,
    pub coverage: CoverageConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            playwright: PlaywrightConfig::default(),
            coverage: CoverageConfig::default(),
            specs_dir: PathBuf::from("crates/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Coverage settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub enabled: bool,
    pub reset_on_navigation: bool,
    pub report_anonymous_scripts: bool,

    /// Where artifacts and the merged report go
    pub dir: PathBuf,

    pub filter: CoverageFilter,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_on_navigation: true,
            report_anonymous_scripts: true,
            dir: PathBuf::from("crates/e2e/coverage"),
            filter: CoverageFilter::default(),
        }
    }
}

impl CoverageConfig {
    /// Apply the `COVERAGE` toggle from the process environment
    pub fn apply_env(&mut self) {
        self.apply_options(&CoverageOptions::from_env());
    }

    /// `"true"` switches collection on; anything else leaves the file setting
    pub fn apply_toggle(&mut self, value: Option<&str>) {
        self.apply_options(&CoverageOptions::from_toggle(value));
    }

    fn apply_options(&mut self, options: &CoverageOptions) {
        if options.enabled {
            self.enabled = true;
        }
    }

    pub fn options(&self) -> CoverageOptions {
        CoverageOptions {
            enabled: self.enabled,
            reset_on_navigation: Some(self.reset_on_navigation),
            report_anonymous_scripts: Some(self.report_anonymous_scripts),
        }
    }
}
