//! Test runner that orchestrates the application, Playwright and coverage

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::coverage::CoverageCollector;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{Page, PageFactory, PlaywrightConfig, PlaywrightPages};
use crate::server::{AppConfig, AppHandle};
use crate::spec::{Suite, TestCase};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub suite: String,
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,

    /// Per-test coverage artifact, when one was written
    pub coverage: Option<PathBuf>,
}

/// Result of one suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub tests: Vec<TestResult>,
}

/// Result of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteResult>,

    /// Merged coverage report, when collection was enabled and produced data
    pub merged_coverage: Option<PathBuf>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    app_config: AppConfig,
    playwright_config: PlaywrightConfig,
    collector: CoverageCollector,
    pages: Box<dyn PageFactory>,

    /// Running application handle (if any)
    app: Option<AppHandle>,

    specs_dir: PathBuf,
    output_dir: PathBuf,
}

impl TestRunner {
    pub fn with_config(config: RunnerConfig) -> Self {
        Self::with_pages(config, PlaywrightPages)
    }

    /// Runner whose tests run on pages from `pages`
    pub fn with_pages(config: RunnerConfig, pages: impl PageFactory + 'static) -> Self {
        let collector = CoverageCollector::new(
            config.coverage.options(),
            config.coverage.filter.clone(),
            config.coverage.dir.clone(),
        );

        Self {
            app_config: config.app,
            playwright_config: config.playwright,
            collector,
            pages: Box::new(pages),
            app: None,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
        }
    }

    pub fn collector(&self) -> &CoverageCollector {
        &self.collector
    }

    /// Start (or attach to) the application
    pub async fn start_app(&mut self) -> E2eResult<()> {
        if self.app.is_some() {
            return Ok(());
        }

        let app = AppHandle::start(&self.app_config).await?;
        if !app.is_owned() {
            info!("Attached to running application at {}", app.base_url());
        }
        self.playwright_config.base_url = app.base_url().to_string();
        self.app = Some(app);
        Ok(())
    }

    pub fn stop_app(&mut self) -> E2eResult<()> {
        if let Some(mut app) = self.app.take() {
            app.stop()?;
        }
        Ok(())
    }

    /// Run every suite in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<RunResult> {
        let suites = Suite::load_all(&self.specs_dir)?;
        self.run_suites(&suites).await
    }

    /// Run suites and tests carrying `tag`
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<RunResult> {
        let suites = Suite::load_all(&self.specs_dir)?;
        let filtered = Suite::filter_by_tag(&suites, tag);
        self.run_suites(&filtered).await
    }

    /// Run one test, addressed as `<suite>/<test>` or by test name alone
    pub async fn run_test(&mut self, name: &str) -> E2eResult<RunResult> {
        let suites = Suite::load_all(&self.specs_dir)?;
        let (suite_name, test_name) = match name.split_once('/') {
            Some((suite, test)) => (Some(suite), test),
            None => (None, name),
        };

        let selected = suites
            .iter()
            .filter(|s| suite_name.map_or(true, |n| s.name == n))
            .find_map(|s| {
                s.find_test(test_name).map(|t| Suite {
                    tests: vec![t.clone()],
                    ..s.clone()
                })
            })
            .ok_or_else(|| E2eError::TestNotFound(name.to_string()))?;

        self.run_suites(std::slice::from_ref(&selected)).await
    }

    /// Run suites sequentially, then merge coverage
    pub async fn run_suites(&mut self, suites: &[Suite]) -> E2eResult<RunResult> {
        let start = Instant::now();

        self.collector.init()?;
        self.start_app().await?;

        let total: usize = suites.iter().map(|s| s.tests.len()).sum();
        info!("Running {} test(s) in {} suite(s)...", total, suites.len());
        if self.collector.is_enabled() {
            info!("Coverage collection enabled ({})", self.collector.coverage_dir().display());
        }

        let mut result = RunResult {
            total,
            ..Default::default()
        };

        for suite in suites {
            let suite_result = self.run_suite(suite).await;
            result.passed += suite_result.passed;
            result.failed += suite_result.failed;
            result.suites.push(suite_result);
        }

        result.merged_coverage = self.collector.generate_report()?;
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            result.passed, result.failed, result.duration_ms
        );

        Ok(result)
    }

    async fn run_suite(&mut self, suite: &Suite) -> SuiteResult {
        let start = Instant::now();
        info!("{}", suite.name);

        let mut tests = Vec::with_capacity(suite.tests.len());
        for test in &suite.tests {
            let result = match self.run_case(suite, test).await {
                Ok(result) => result,
                Err(e) => TestResult {
                    suite: suite.name.clone(),
                    name: test.name.clone(),
                    success: false,
                    duration_ms: 0,
                    error: Some(e.to_string()),
                    coverage: None,
                },
            };

            if result.success {
                info!("  ✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "  ✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            tests.push(result);
        }

        let passed = tests.iter().filter(|t| t.success).count();
        SuiteResult {
            name: suite.name.clone(),
            passed,
            failed: tests.len() - passed,
            duration_ms: start.elapsed().as_millis() as u64,
            tests,
        }
    }

    async fn run_case(&self, suite: &Suite, test: &TestCase) -> E2eResult<TestResult> {
        let start = Instant::now();
        let coverage_name = suite.coverage_name(test);
        debug!("Running test: {}", coverage_name);

        let steps = suite.plan(test)?;
        let mut page = self
            .pages
            .open(&self.playwright_config, suite.viewport.unwrap_or_default())?;

        self.collector.start_coverage(page.as_mut()).await?;
        let outcome = page.run(&steps).await;

        // Stop even when the script failed so the page is left clean.
        let coverage = self.collector.stop_coverage(page.as_mut(), &coverage_name).await;

        let outcome = outcome?;
        let mut error = outcome.error;
        let coverage = match coverage {
            Ok(path) => path,
            Err(e) => {
                warn!("Coverage for '{}' failed: {}", coverage_name, e);
                error.get_or_insert_with(|| format!("Coverage collection failed: {}", e));
                None
            }
        };

        Ok(TestResult {
            suite: suite.name.clone(),
            name: test.name.clone(),
            success: outcome.success && error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            coverage,
        })
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &RunResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_app();
    }
}
