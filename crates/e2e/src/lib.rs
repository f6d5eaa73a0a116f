//! Todo E2E Harness
//!
//! Rust-controlled end-to-end testing for the to-do web application:
//! - Starts (or attaches to) the application and waits for it to be healthy
//! - Drives Playwright through generated Node scripts
//! - Parses declarative YAML suites
//! - Collects browser JavaScript coverage per test and merges it into one report
//! - Runs a REST load scenario against the to-do API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   todo-e2e (Rust)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── AppHandle::start() -> health-checked application     │
//! │    ├── per test: PageFactory::open() -> Page (Playwright)   │
//! │    │     ├── CoverageCollector::start_coverage(page)        │
//! │    │     ├── page.run(steps)                                │
//! │    │     └── CoverageCollector::stop_coverage(page, name)   │
//! │    │           -> coverage/<name>_coverage.json             │
//! │    └── CoverageCollector::generate_report()                 │
//! │          -> coverage/merged-coverage.json                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite (YAML): name, tags, viewport, setup, tests[steps]    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_load(LoadConfig) -> LoadReport  (REST scenario)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coverage;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod spec;

pub use api::{run_load, LoadConfig, LoadReport, TodoApiClient};
pub use config::{CoverageConfig, HarnessConfig, RunnerConfig};
pub use coverage::{CoverageCollector, CoverageEntry, CoverageFilter, CoverageOptions, JsCoverage};
pub use error::{E2eError, E2eResult};
pub use playwright::{Page, PageFactory, PlaywrightPages};
pub use runner::{RunResult, TestRunner};
pub use spec::{Suite, TestStep};
