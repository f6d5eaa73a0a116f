//! Playwright browser automation
//!
//! Each test is rendered into one Node script that launches the browser,
//! runs every step against a single page and exits. JS coverage hooks are
//! woven into the script when the page's coverage has been started.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::coverage::{CoverageEntry, JsCoverage, JsCoverageOptions};
use crate::error::{E2eError, E2eResult};
use crate::spec::{expand, AttributeAssertion, TestStep, Vars, Viewport};

const COVERAGE_DUMP: &str = "coverage-dump.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,

    /// Directory whose `node_modules` provides `playwright` and `@playwright/test`
    pub project_dir: PathBuf,

    /// Upper bound for one test script
    #[serde(with = "duration_secs")]
    pub test_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            browser: Browser::Chromium,
            headless: true,
            project_dir: PathBuf::from("."),
            test_timeout: Duration::from_secs(120),
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Outcome of running one test script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Deserialize)]
struct ScriptFailure {
    error: String,
}

/// A browser page the runner drives for one test
#[async_trait]
pub trait Page: JsCoverage {
    async fn run(&mut self, steps: &[TestStep]) -> E2eResult<ScriptOutcome>;
}

/// Opens a fresh page for every test
pub trait PageFactory: Send + Sync {
    fn open(&self, config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Box<dyn Page>>;
}

/// Pages backed by generated Playwright scripts
pub struct PlaywrightPages;

impl PageFactory for PlaywrightPages {
    fn open(&self, config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Box<dyn Page>> {
        Ok(Box::new(PlaywrightHandle::new(config, viewport)?))
    }
}

/// One browser page, backed by a script run per test
pub struct PlaywrightHandle {
    base_url: String,
    browser: Browser,
    headless: bool,
    viewport: Viewport,
    project_dir: PathBuf,
    test_timeout: Duration,

    /// Holds the rendered script and the coverage dump
    work_dir: tempfile::TempDir,

    /// Set between start_js_coverage and stop_js_coverage
    coverage: Option<JsCoverageOptions>,

    /// Whether a script ran with coverage hooks since the last start
    coverage_ran: bool,
}

impl PlaywrightHandle {
    pub fn new(config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            browser: config.browser,
            headless: config.headless,
            viewport,
            project_dir: config.project_dir.clone(),
            test_timeout: config.test_timeout,
            work_dir: tempfile::tempdir()?,
            coverage: None,
            coverage_ran: false,
        })
    }

    /// Check if Playwright is installed
    pub fn check_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    fn coverage_dump(&self) -> PathBuf {
        self.work_dir.path().join(COVERAGE_DUMP)
    }

    /// Build the Playwright script for a set of steps
    pub fn build_script(&self, steps: &[TestStep]) -> E2eResult<String> {
        // Steps normally arrive expanded; this covers direct callers.
        let steps = expand(steps, &Vars::default())?;
        let mut script = String::new();

        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');
const {{ expect }} = require('@playwright/test');
const fs = require('fs');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }},
    baseURL: {base_url}
  }});
  const page = await context.newPage();
  const vars = {{}};
  let coverageStarted = false;

  try {{
"#,
            browser = self.browser.as_str(),
            headless = self.headless,
            width = self.viewport.width,
            height = self.viewport.height,
            base_url = js(&self.base_url),
        ));

        if let Some(options) = &self.coverage {
            script.push_str(&format!(
                "    await page.coverage.startJSCoverage({});\n    coverageStarted = true;\n",
                serde_json::to_string(options)?
            ));
        }

        let mut counter = 0;
        render_steps(&steps, 2, &mut counter, &mut script);

        script.push_str(&format!(
            r#"
    console.log(JSON.stringify({{ success: true }}));
  }} catch (error) {{
    console.error(JSON.stringify({{ success: false, error: error.message, stack: error.stack }}));
    process.exitCode = 1;
  }} finally {{
    if (coverageStarted) {{
      try {{
        const coverage = await page.coverage.stopJSCoverage();
        fs.writeFileSync({dump}, JSON.stringify(coverage));
      }} catch (error) {{
        console.error(JSON.stringify({{ coverageError: error.message }}));
      }}
    }}
    await browser.close();
  }}
}})();
"#,
            dump = js(&self.coverage_dump().to_string_lossy()),
        ));

        Ok(script)
    }
}

#[async_trait]
impl JsCoverage for PlaywrightHandle {
    async fn start_js_coverage(&mut self, options: JsCoverageOptions) -> E2eResult<()> {
        if self.coverage.is_some() {
            return Err(E2eError::Playwright("JSCoverage is already enabled".to_string()));
        }
        self.coverage = Some(options);
        self.coverage_ran = false;
        Ok(())
    }

    async fn stop_js_coverage(&mut self) -> E2eResult<Vec<CoverageEntry>> {
        if self.coverage.take().is_none() {
            return Err(E2eError::Playwright("JSCoverage is not enabled".to_string()));
        }

        let dump = self.coverage_dump();
        if !dump.exists() {
            if std::mem::take(&mut self.coverage_ran) {
                return Err(E2eError::Playwright(format!(
                    "coverage was started but no data was written to {}",
                    dump.display()
                )));
            }
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&dump)?;
        std::fs::remove_file(&dump)?;
        self.coverage_ran = false;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl Page for PlaywrightHandle {
    /// Run one test's steps in a fresh browser
    async fn run(&mut self, steps: &[TestStep]) -> E2eResult<ScriptOutcome> {
        let script = self.build_script(steps)?;
        let script_path = self.work_dir.path().join("test.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let start = Instant::now();
        let child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&self.project_dir)
            .env("NODE_PATH", node_path(&self.project_dir))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        self.coverage_ran = self.coverage.is_some();

        let output = match tokio::time::timeout(self.test_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Script exceeded {:?}, killed", self.test_timeout);
                return Ok(ScriptOutcome {
                    success: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(format!("Timed out after {}s", self.test_timeout.as_secs())),
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let success = output.status.success();
        let error = if success {
            None
        } else {
            Some(failure_message(&stderr).unwrap_or_else(|| {
                format!("Script failed:\nstdout: {}\nstderr: {}", stdout, stderr)
            }))
        };

        Ok(ScriptOutcome {
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            stdout,
            stderr,
        })
    }
}

fn node_path(project_dir: &Path) -> PathBuf {
    project_dir.join("node_modules")
}

/// Pull the error message out of the script's JSON failure line
fn failure_message(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .filter(|line| line.trim_start().starts_with('{'))
        .find_map(|line| serde_json::from_str::<ScriptFailure>(line).ok())
        .map(|f| f.error)
}

/// JS string literal
fn js(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn locator(selector: &str) -> String {
    format!("page.locator({})", js(selector))
}

/// Options object, or nothing when empty
fn opts(map: Map<String, Value>) -> String {
    if map.is_empty() {
        String::new()
    } else {
        Value::Object(map).to_string()
    }
}

fn timeout_opts(timeout_ms: Option<u64>) -> String {
    let mut map = Map::new();
    if let Some(t) = timeout_ms {
        map.insert("timeout".to_string(), json!(t));
    }
    opts(map)
}

/// `args` followed by an options object when there is one
fn call_args(args: &[String], options: &str) -> String {
    let mut all: Vec<&str> = args.iter().map(String::as_str).collect();
    if !options.is_empty() {
        all.push(options);
    }
    all.join(", ")
}

/// Text safe inside a `//` comment: JS line terminators become spaces
fn comment_text(text: &str) -> String {
    text.replace(['\n', '\r', '\u{2028}', '\u{2029}'], " ")
}

fn render_steps(steps: &[TestStep], depth: usize, counter: &mut usize, out: &mut String) {
    let pad = "  ".repeat(depth);

    for step in steps {
        *counter += 1;
        out.push_str(&format!("\n{}// Step {}: {}\n", pad, counter, comment_text(&step.label())));

        match step {
            TestStep::IfVisible { selector, then, otherwise } => {
                out.push_str(&format!(
                    "{}if (await {}.first().isVisible()) {{\n",
                    pad,
                    locator(selector)
                ));
                render_steps(then, depth + 1, counter, out);
                if otherwise.is_empty() {
                    out.push_str(&format!("{}}}\n", pad));
                } else {
                    out.push_str(&format!("{}}} else {{\n", pad));
                    render_steps(otherwise, depth + 1, counter, out);
                    out.push_str(&format!("{}}}\n", pad));
                }
            }
            other => {
                for line in step_to_js(other).lines() {
                    out.push_str(&pad);
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }
}

/// Convert a step to JavaScript code
fn step_to_js(step: &TestStep) -> String {
    match step {
        TestStep::Navigate { url, from_var, wait_until, wait_for_selector } => {
            let target = match from_var {
                Some(var) => format!("vars[{}]", js(var)),
                None => js(url),
            };
            let mut map = Map::new();
            if let Some(state) = wait_until {
                map.insert("waitUntil".to_string(), json!(state.as_str()));
            }
            let mut code = format!("await page.goto({});", call_args(&[target], &opts(map)));
            if let Some(sel) = wait_for_selector {
                code.push_str(&format!("\nawait page.waitForSelector({});", js(sel)));
            }
            code
        }
        TestStep::Reload { wait_until } => {
            let mut map = Map::new();
            if let Some(state) = wait_until {
                map.insert("waitUntil".to_string(), json!(state.as_str()));
            }
            format!("await page.reload({});", opts(map))
        }
        TestStep::GoBack => "await page.goBack();".to_string(),
        TestStep::GoForward => "await page.goForward();".to_string(),
        TestStep::WaitForUrl { pattern, timeout_ms } => {
            format!(
                "await page.waitForURL({});",
                call_args(&[js(pattern)], &timeout_opts(*timeout_ms))
            )
        }
        TestStep::AssertUrl { contains } => {
            format!("expect(page.url()).toContain({});", js(contains))
        }
        TestStep::StoreUrl { var } => format!("vars[{}] = page.url();", js(var)),
        TestStep::Click { selector, timeout_ms, button, double } => {
            let mut map = Map::new();
            if *button != crate::spec::MouseButton::Left {
                map.insert("button".to_string(), json!(button.as_str()));
            }
            if let Some(t) = timeout_ms {
                map.insert("timeout".to_string(), json!(t));
            }
            let method = if *double { "dblclick" } else { "click" };
            format!("await {}.{}({});", locator(selector), method, opts(map))
        }
        TestStep::Fill { selector, value, clear_first } => {
            let fill = format!("await {}.fill({});", locator(selector), js(value));
            if *clear_first {
                format!("await {}.fill('');\n{}", locator(selector), fill)
            } else {
                fill
            }
        }
        TestStep::Type { selector, text, delay_ms } => {
            format!(
                "await page.type({}, {}, {{ delay: {} }});",
                js(selector),
                js(text),
                delay_ms.unwrap_or(50)
            )
        }
        TestStep::Press { selector, key } => match selector {
            Some(sel) => format!("await {}.press({});", locator(sel), js(key)),
            None => format!("await page.keyboard.press({});", js(key)),
        },
        TestStep::Hover { selector } => format!("await {}.hover();", locator(selector)),
        TestStep::Focus { selector } => format!("await {}.focus();", locator(selector)),
        TestStep::Check { selector } => format!("await {}.check();", locator(selector)),
        TestStep::Uncheck { selector } => format!("await {}.uncheck();", locator(selector)),
        TestStep::Select { selector, value } => {
            format!("await {}.selectOption({});", locator(selector), js(value))
        }
        TestStep::Wait { selector, timeout_ms, state } => {
            format!(
                "await page.waitForSelector({}, {{ state: {}, timeout: {} }});",
                js(selector),
                js(state.as_str()),
                timeout_ms
            )
        }
        TestStep::Sleep { ms } => format!("await page.waitForTimeout({});", ms),
        TestStep::SetViewport { width, height } => {
            format!("await page.setViewportSize({{ width: {}, height: {} }});", width, height)
        }
        TestStep::Assert {
            selector,
            visible,
            text,
            text_contains,
            attribute,
            count,
            focused,
            enabled,
            timeout_ms,
        } => assert_to_js(
            selector,
            *visible,
            text.as_deref(),
            text_contains.as_deref(),
            attribute.as_ref(),
            *count,
            *focused,
            *enabled,
            *timeout_ms,
        ),
        TestStep::AssertAccessibleNames { selector, limit } => {
            format!(
                r#"{{
  const candidates = {loc};
  const total = Math.min(await candidates.count(), {limit});
  for (let i = 0; i < total; i++) {{
    const el = candidates.nth(i);
    if (await el.isVisible()) {{
      const label = await el.getAttribute('aria-label');
      const text = ((await el.textContent()) || '').trim();
      expect(label || text, `element ${{i}} of ` + {sel} + ` has no accessible name`).toBeTruthy();
    }}
  }}
}}"#,
                loc = locator(selector),
                limit = limit,
                sel = js(selector),
            )
        }
        TestStep::Evaluate { script, expected } => match expected {
            Some(value) => format!(
                "{{\n  const result = await page.evaluate(() => {{ {} }});\n  expect(result).toEqual({});\n}}",
                script, value
            ),
            None => format!("await page.evaluate(() => {{ {} }});", script),
        },
        TestStep::Log { message } => {
            format!("console.log({});", js(&format!("[TEST] {}", message)))
        }
        // Structural steps are expanded or rendered by render_steps.
        TestStep::IfVisible { .. } | TestStep::ForEach { .. } | TestStep::Repeat { .. } => {
            String::new()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn assert_to_js(
    selector: &str,
    visible: Option<bool>,
    text: Option<&str>,
    text_contains: Option<&str>,
    attribute: Option<&AttributeAssertion>,
    count: Option<usize>,
    focused: Option<bool>,
    enabled: Option<bool>,
    timeout_ms: Option<u64>,
) -> String {
    let target = format!("expect({})", locator(selector));
    let timeout = timeout_opts(timeout_ms);
    let mut assertions = Vec::new();

    if let Some(vis) = visible {
        let matcher = if vis { "toBeVisible" } else { "toBeHidden" };
        assertions.push(format!("await {}.{}({});", target, matcher, timeout));
    }

    if let Some(t) = text {
        assertions.push(format!("await {}.toHaveText({});", target, call_args(&[js(t)], &timeout)));
    }

    if let Some(tc) = text_contains {
        assertions.push(format!(
            "await {}.toContainText({});",
            target,
            call_args(&[js(tc)], &timeout)
        ));
    }

    if let Some(attr) = attribute {
        match (&attr.value, &attr.contains) {
            (Some(val), _) => assertions.push(format!(
                "await {}.toHaveAttribute({});",
                target,
                call_args(&[js(&attr.name), js(val)], &timeout)
            )),
            (None, Some(part)) => assertions.push(format!(
                "expect(await {}.getAttribute({})).toContain({});",
                locator(selector),
                js(&attr.name),
                js(part)
            )),
            (None, None) => assertions.push(format!(
                "await {}.toHaveAttribute({});",
                target,
                call_args(&[js(&attr.name)], &timeout)
            )),
        }
    }

    if let Some(c) = count {
        assertions.push(format!(
            "await {}.toHaveCount({});",
            target,
            call_args(&[c.to_string()], &timeout)
        ));
    }

    if let Some(f) = focused {
        let negate = if f { "" } else { "not." };
        assertions.push(format!("await {}.{}toBeFocused({});", target, negate, timeout));
    }

    if let Some(e) = enabled {
        let matcher = if e { "toBeEnabled" } else { "toBeDisabled" };
        assertions.push(format!("await {}.{}({});", target, matcher, timeout));
    }

    assertions.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageCollector;
    use crate::coverage::{CoverageFilter, CoverageOptions};
    use crate::spec::{LoadState, MouseButton};

    fn handle() -> PlaywrightHandle {
        PlaywrightHandle::new(&PlaywrightConfig::default(), Viewport::default()).unwrap()
    }

    #[test]
    fn test_script_without_coverage_has_no_hooks() {
        let script = handle().build_script(&[TestStep::GoBack]).unwrap();
        assert!(!script.contains("startJSCoverage({"));
        assert!(script.contains("baseURL: \"http://localhost:3000\""));
        assert!(script.contains("await page.goBack();"));
    }

    #[tokio::test]
    async fn test_started_coverage_adds_hooks() {
        let mut page = handle();
        page.start_js_coverage(JsCoverageOptions {
            reset_on_navigation: false,
            report_anonymous_scripts: true,
        })
        .await
        .unwrap();

        let script = page.build_script(&[TestStep::GoBack]).unwrap();

        assert!(script.contains(
            r#"await page.coverage.startJSCoverage({"resetOnNavigation":false,"reportAnonymousScripts":true});"#
        ));
        assert!(script.contains("page.coverage.stopJSCoverage()"));
        assert!(script.contains(COVERAGE_DUMP));
        let start = script.find("startJSCoverage").unwrap();
        let step = script.find("goBack").unwrap();
        assert!(start < step);
    }

    #[tokio::test]
    async fn test_coverage_lifecycle_errors() {
        let mut page = handle();
        assert!(page.stop_js_coverage().await.is_err());

        let options = CoverageOptions::from_toggle(Some("true")).js_options();
        page.start_js_coverage(options).await.unwrap();
        assert!(page.start_js_coverage(options).await.is_err());

        // No script ran, so there is nothing to report
        assert!(page.stop_js_coverage().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_reads_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let collector = CoverageCollector::new(
            CoverageOptions::from_toggle(Some("true")),
            CoverageFilter::default(),
            tmp.path(),
        );
        let mut page = handle();

        collector.start_coverage(&mut page).await.unwrap();
        std::fs::write(
            page.coverage_dump(),
            r#"[{"url":"http://localhost:3000/app.js","functions":[]},
                {"url":"http://localhost:3000/node_modules/x.js","functions":[]}]"#,
        )
        .unwrap();
        let artifact = collector.stop_coverage(&mut page, "ui-Keyboard navigation").await.unwrap();

        assert_eq!(artifact, Some(tmp.path().join("ui_Keyboard_navigation_coverage.json")));
        assert!(!page.coverage_dump().exists());
    }

    #[test]
    fn test_strings_are_escaped() {
        let step = TestStep::Fill {
            selector: r#"input[placeholder*="list"] >> nth=0"#.to_string(),
            value: "Item with special chars: '\"\\ 🚀".to_string(),
            clear_first: false,
        };
        assert_eq!(
            step_to_js(&step),
            r#"await page.locator("input[placeholder*=\"list\"] >> nth=0").fill("Item with special chars: '\"\\ 🚀");"#
        );
    }

    #[test]
    fn test_click_options() {
        let right = TestStep::Click {
            selector: "text=Milk".to_string(),
            timeout_ms: None,
            button: MouseButton::Right,
            double: false,
        };
        assert_eq!(step_to_js(&right), r#"await page.locator("text=Milk").click({"button":"right"});"#);

        let dbl = TestStep::Click {
            selector: "text=Milk".to_string(),
            timeout_ms: None,
            button: MouseButton::Left,
            double: true,
        };
        assert_eq!(step_to_js(&dbl), r#"await page.locator("text=Milk").dblclick();"#);
    }

    #[test]
    fn test_navigate_variants() {
        let to_root = TestStep::Navigate {
            url: "/".to_string(),
            from_var: None,
            wait_until: Some(LoadState::NetworkIdle),
            wait_for_selector: None,
        };
        assert_eq!(step_to_js(&to_root), r#"await page.goto("/", {"waitUntil":"networkidle"});"#);

        let stored = TestStep::Navigate {
            url: "/".to_string(),
            from_var: Some("list_url".to_string()),
            wait_until: None,
            wait_for_selector: None,
        };
        assert_eq!(step_to_js(&stored), r#"await page.goto(vars["list_url"]);"#);
    }

    #[test]
    fn test_assert_combines_matchers() {
        let step = TestStep::Assert {
            selector: "text=This list is empty.".to_string(),
            visible: Some(false),
            text: None,
            text_contains: None,
            attribute: None,
            count: Some(0),
            focused: None,
            enabled: None,
            timeout_ms: Some(10000),
        };
        let code = step_to_js(&step);
        assert_eq!(
            code,
            "await expect(page.locator(\"text=This list is empty.\")).toBeHidden({\"timeout\":10000});\n\
             await expect(page.locator(\"text=This list is empty.\")).toHaveCount(0, {\"timeout\":10000});"
        );
    }

    #[test]
    fn test_if_visible_renders_branches() {
        let step = TestStep::IfVisible {
            selector: "button:has-text(\"Delete\")".to_string(),
            then: vec![TestStep::Click {
                selector: "button:has-text(\"Delete\")".to_string(),
                timeout_ms: None,
                button: MouseButton::Left,
                double: false,
            }],
            otherwise: vec![TestStep::Press { selector: None, key: "Escape".to_string() }],
        };
        let script = handle().build_script(&[step]).unwrap();

        assert!(script.contains("if (await page.locator(\"button:has-text(\\\"Delete\\\")\").first().isVisible()) {"));
        assert!(script.contains("} else {"));
        assert!(script.contains("await page.keyboard.press(\"Escape\");"));
        assert!(script.contains("// Step 3: press:Escape"));
    }

    #[test]
    fn test_line_terminators_stay_inside_step_comment() {
        let steps = vec![
            TestStep::Log { message: "a\rb\u{2028}c\u{2029}d\ne".to_string() },
            TestStep::Hover { selector: "text=x\r\u{2028}throw 1".to_string() },
        ];
        let script = handle().build_script(&steps).unwrap();

        assert!(script.contains("// Step 1: log:a b c d e\n"));
        assert!(script.contains("// Step 2: hover:text=x  throw 1\n"));
        assert!(!script.contains('\r'));
    }

    #[test]
    fn test_failure_message() {
        let stderr = "some warning\n{\"success\":false,\"error\":\"Timeout 5000ms exceeded\",\"stack\":\"...\"}\n";
        assert_eq!(failure_message(stderr).as_deref(), Some("Timeout 5000ms exceeded"));
        assert_eq!(failure_message("plain crash"), None);
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("webkit".parse::<Browser>().unwrap(), Browser::Webkit);
        assert!("netscape".parse::<Browser>().is_err());
    }
}
