//! JavaScript coverage collection for browser tests
//!
//! The collector wraps a page's coverage capability with start/stop/merge
//! operations that are safe to call from every test's setup and teardown,
//! whether or not collection is enabled for the process.
//!
//! ```text
//! start_coverage(page)            page.start_js_coverage(options)
//! stop_coverage(page, name)  ->   page.stop_js_coverage()
//!                                   -> CoverageFilter::apply
//!                                   -> <dir>/<sanitized name>_coverage.json
//! generate_report()          ->   <dir>/*_coverage.json -> merged-coverage.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::E2eResult;

/// Environment variable that switches collection on (`COVERAGE=true`)
pub const COVERAGE_ENV: &str = "COVERAGE";

/// Suffix shared by every per-test artifact
pub const ARTIFACT_SUFFIX: &str = "_coverage.json";

/// File name of the merged report inside the coverage directory
pub const MERGED_REPORT: &str = "merged-coverage.json";

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^A-Za-z0-9]").expect("static regex"));

/// One script's coverage as reported by the browser.
///
/// Only `url` is inspected; the rest of the payload (functions, ranges,
/// source) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub url: String,

    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl CoverageEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: serde_json::Map::new(),
        }
    }
}

/// Options forwarded to `startJSCoverage`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsCoverageOptions {
    pub reset_on_navigation: bool,
    pub report_anonymous_scripts: bool,
}

/// Per-page JS coverage capability.
///
/// Mirrors Playwright's `page.coverage.startJSCoverage` /
/// `page.coverage.stopJSCoverage`.
#[async_trait]
pub trait JsCoverage: Send {
    async fn start_js_coverage(&mut self, options: JsCoverageOptions) -> E2eResult<()>;

    async fn stop_js_coverage(&mut self) -> E2eResult<Vec<CoverageEntry>>;
}

/// Coverage configuration, resolved once per process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageOptions {
    /// Gates every collector operation
    #[serde(default)]
    pub enabled: bool,

    /// Clear accumulated samples on navigation (default: true)
    #[serde(default)]
    pub reset_on_navigation: Option<bool>,

    /// Include anonymous / eval'd scripts (default: true)
    #[serde(default)]
    pub report_anonymous_scripts: Option<bool>,
}

impl CoverageOptions {
    /// Resolve options from the `COVERAGE` environment toggle
    pub fn from_env() -> Self {
        Self::from_toggle(std::env::var(COVERAGE_ENV).ok().as_deref())
    }

    /// Only the exact value `"true"` enables collection.
    pub fn from_toggle(value: Option<&str>) -> Self {
        Self {
            enabled: value == Some("true"),
            reset_on_navigation: Some(true),
            report_anonymous_scripts: Some(true),
        }
    }

    pub fn js_options(&self) -> JsCoverageOptions {
        JsCoverageOptions {
            reset_on_navigation: self.reset_on_navigation.unwrap_or(true),
            report_anonymous_scripts: self.report_anonymous_scripts.unwrap_or(true),
        }
    }
}

/// Decides which coverage entries belong to the application under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageFilter {
    /// URL must contain one of these (empty = any host)
    pub host_markers: Vec<String>,

    /// URL must contain none of these
    pub exclude: Vec<String>,

    /// Accepted file extensions
    pub extensions: Vec<String>,

    /// URL fragments accepted regardless of extension
    pub path_markers: Vec<String>,
}

impl Default for CoverageFilter {
    fn default() -> Self {
        Self {
            host_markers: vec!["localhost:3000".to_string()],
            exclude: strings(&["node_modules", "test", "spec", "coverage", "playwright"]),
            extensions: strings(&[".js", ".ts", ".tsx", ".jsx"]),
            path_markers: Vec::new(),
        }
    }
}

impl CoverageFilter {
    /// Filter for a deployed build served from `host`, where bundles live
    /// under `assets/` with hashed names.
    pub fn hosted(host: impl Into<String>) -> Self {
        Self {
            host_markers: vec![host.into()],
            exclude: strings(&["node_modules", "test", "spec"]),
            extensions: strings(&[".js"]),
            path_markers: strings(&["assets/"]),
        }
    }

    pub fn accepts(&self, url: &str) -> bool {
        let host = self.host_markers.is_empty()
            || self.host_markers.iter().any(|m| url.contains(m.as_str()));
        let excluded = self.exclude.iter().any(|m| url.contains(m.as_str()));
        let kind = self.extensions.iter().any(|ext| url.ends_with(ext.as_str()))
            || self.path_markers.iter().any(|m| url.contains(m.as_str()));

        host && !excluded && kind
    }

    /// Keep application entries, preserving their order
    pub fn apply(&self, entries: Vec<CoverageEntry>) -> Vec<CoverageEntry> {
        entries.into_iter().filter(|e| self.accepts(&e.url)).collect()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Artifact file name for a test: non-alphanumerics become `_`.
pub fn artifact_file_name(test_name: &str) -> String {
    format!("{}{}", NON_ALPHANUMERIC.replace_all(test_name, "_"), ARTIFACT_SUFFIX)
}

/// Collects per-test coverage artifacts and merges them
#[derive(Debug, Clone)]
pub struct CoverageCollector {
    options: CoverageOptions,
    filter: CoverageFilter,
    coverage_dir: PathBuf,
}

impl CoverageCollector {
    pub fn new(options: CoverageOptions, filter: CoverageFilter, coverage_dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            filter,
            coverage_dir: coverage_dir.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn coverage_dir(&self) -> &Path {
        &self.coverage_dir
    }

    pub fn artifact_path(&self, test_name: &str) -> PathBuf {
        self.coverage_dir.join(artifact_file_name(test_name))
    }

    pub fn merged_report_path(&self) -> PathBuf {
        self.coverage_dir.join(MERGED_REPORT)
    }

    /// Create the coverage directory when collection is enabled
    pub fn init(&self) -> E2eResult<()> {
        if !self.options.enabled {
            return Ok(());
        }

        std::fs::create_dir_all(&self.coverage_dir)?;
        Ok(())
    }

    /// Begin capture on `page`
    pub async fn start_coverage<P>(&self, page: &mut P) -> E2eResult<()>
    where
        P: JsCoverage + ?Sized,
    {
        if !self.options.enabled {
            return Ok(());
        }

        page.start_js_coverage(self.options.js_options()).await
    }

    /// Stop capture and persist the application's entries.
    ///
    /// Returns the artifact path, or `None` when disabled or when nothing
    /// survived filtering.
    pub async fn stop_coverage<P>(&self, page: &mut P, test_name: &str) -> E2eResult<Option<PathBuf>>
    where
        P: JsCoverage + ?Sized,
    {
        if !self.options.enabled {
            return Ok(None);
        }

        let raw = page.stop_js_coverage().await?;
        let total = raw.len();
        let entries = self.filter.apply(raw);

        if entries.is_empty() {
            debug!("No application coverage for '{}' ({} raw entries)", test_name, total);
            return Ok(None);
        }

        let path = self.artifact_path(test_name);
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)?;

        info!("Coverage data saved to: {}", path.display());
        Ok(Some(path))
    }

    /// Merge every artifact in the coverage directory into one report.
    ///
    /// The report is rebuilt from scratch and overwrites the previous one.
    pub fn generate_report(&self) -> E2eResult<Option<PathBuf>> {
        if !self.options.enabled {
            return Ok(None);
        }

        let mut artifacts = Vec::new();
        for entry in std::fs::read_dir(&self.coverage_dir)? {
            let entry = entry?;
            let is_artifact = entry.file_name().to_string_lossy().ends_with(ARTIFACT_SUFFIX);
            if is_artifact && entry.file_type()?.is_file() {
                artifacts.push(entry.path());
            }
        }

        if artifacts.is_empty() {
            info!("No coverage data found");
            return Ok(None);
        }

        // Artifacts are concatenated as-is; entries need not carry a url.
        let mut merged: Vec<serde_json::Value> = Vec::new();
        for path in &artifacts {
            let content = std::fs::read_to_string(path)?;
            let entries: Vec<serde_json::Value> = serde_json::from_str(&content)?;
            merged.extend(entries);
        }

        let path = self.merged_report_path();
        std::fs::write(&path, serde_json::to_string_pretty(&merged)?)?;

        info!("Merged coverage data saved to: {}", path.display());
        info!("Total coverage entries: {}", merged.len());
        Ok(Some(path))
    }
}
