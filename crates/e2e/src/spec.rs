//! Declarative YAML test suites

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

static VAR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"));

/// A group of tests sharing setup steps, parsed from one YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name, also the prefix of each test's coverage artifact
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags applied to every test in the suite
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Steps run before every test
    #[serde(default)]
    pub setup: Vec<TestStep>,

    pub tests: Vec<TestCase>,
}

/// A single test inside a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Template variables; `{uuid}` inside a value becomes a fresh UUID
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to the base URL) or to a stored URL
    Navigate {
        #[serde(default = "default_url")]
        url: String,
        #[serde(default)]
        from_var: Option<String>,
        #[serde(default)]
        wait_until: Option<LoadState>,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    Reload {
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    GoBack,

    GoForward,

    /// Wait until the URL matches a glob pattern
    WaitForUrl {
        pattern: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertUrl {
        contains: String,
    },

    /// Remember the current URL under a variable name
    StoreUrl {
        var: String,
    },

    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        double: bool,
    },

    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        clear_first: bool,
    },

    /// Type text with keyboard simulation
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    /// Press a key on an element, or on the page when no selector is given
    Press {
        #[serde(default)]
        selector: Option<String>,
        key: String,
    },

    Hover {
        selector: String,
    },

    Focus {
        selector: String,
    },

    Check {
        selector: String,
    },

    Uncheck {
        selector: String,
    },

    Select {
        selector: String,
        value: String,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    SetViewport {
        width: u32,
        height: u32,
    },

    /// Assert something about an element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        focused: Option<bool>,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Every visible match among the first `limit` has an aria-label or text
    AssertAccessibleNames {
        #[serde(default = "default_accessible_selector")]
        selector: String,
        #[serde(default = "default_accessible_limit")]
        limit: usize,
    },

    /// Execute custom JavaScript in the page
    Evaluate {
        script: String,
        #[serde(default)]
        expected: Option<serde_json::Value>,
    },

    Log {
        message: String,
    },

    /// Run `then` if the element is visible right now, `otherwise` if not
    IfVisible {
        selector: String,
        #[serde(default)]
        then: Vec<TestStep>,
        #[serde(default)]
        otherwise: Vec<TestStep>,
    },

    /// Run `steps` once per value with `{{var}}` bound to it
    ForEach {
        var: String,
        values: Vec<String>,
        steps: Vec<TestStep>,
    },

    /// Run `steps` `count` times with `{{var}}` bound to the index
    Repeat {
        var: String,
        count: usize,
        steps: Vec<TestStep>,
    },
}

fn default_url() -> String {
    "/".to_string()
}

fn default_wait_timeout() -> u64 {
    5000 // 5 seconds default
}

fn default_accessible_selector() -> String {
    "button".to_string()
}

fn default_accessible_limit() -> usize {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
    Commit,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
            LoadState::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl TestStep {
    /// Short human-readable label used in logs and results
    pub fn label(&self) -> String {
        match self {
            TestStep::Navigate { url, from_var, .. } => match from_var {
                Some(var) => format!("navigate:${}", var),
                None => format!("navigate:{}", url),
            },
            TestStep::Reload { .. } => "reload".to_string(),
            TestStep::GoBack => "go_back".to_string(),
            TestStep::GoForward => "go_forward".to_string(),
            TestStep::WaitForUrl { pattern, .. } => format!("wait_for_url:{}", pattern),
            TestStep::AssertUrl { contains } => format!("assert_url:{}", contains),
            TestStep::StoreUrl { var } => format!("store_url:{}", var),
            TestStep::Click { selector, double, .. } => {
                if *double {
                    format!("dblclick:{}", selector)
                } else {
                    format!("click:{}", selector)
                }
            }
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Type { selector, .. } => format!("type:{}", selector),
            TestStep::Press { key, .. } => format!("press:{}", key),
            TestStep::Hover { selector } => format!("hover:{}", selector),
            TestStep::Focus { selector } => format!("focus:{}", selector),
            TestStep::Check { selector } => format!("check:{}", selector),
            TestStep::Uncheck { selector } => format!("uncheck:{}", selector),
            TestStep::Select { selector, .. } => format!("select:{}", selector),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::SetViewport { width, height } => format!("viewport:{}x{}", width, height),
            TestStep::Assert { selector, .. } => format!("assert:{}", selector),
            TestStep::AssertAccessibleNames { selector, .. } => format!("accessible_names:{}", selector),
            TestStep::Evaluate { .. } => "evaluate".to_string(),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
            TestStep::IfVisible { selector, .. } => format!("if_visible:{}", selector),
            TestStep::ForEach { var, values, .. } => format!("for_each:{}[{}]", var, values.len()),
            TestStep::Repeat { var, count, .. } => format!("repeat:{}[{}]", var, count),
        }
    }
}

/// Resolved template variables for one test run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(BTreeMap<String, String>);

impl Vars {
    /// Resolve a test's variables against today's date
    pub fn resolve(defs: &BTreeMap<String, String>) -> Self {
        Self::resolve_on(defs, chrono::Local::now().date_naive())
    }

    /// Resolve with built-in `today`, `tomorrow` and `next_week` dates.
    pub fn resolve_on(defs: &BTreeMap<String, String>, today: NaiveDate) -> Self {
        let mut vars = BTreeMap::new();
        let date = |d: Option<NaiveDate>| d.unwrap_or(today).format("%Y-%m-%d").to_string();
        vars.insert("today".to_string(), date(Some(today)));
        vars.insert("tomorrow".to_string(), date(today.checked_add_days(Days::new(1))));
        vars.insert("next_week".to_string(), date(today.checked_add_days(Days::new(7))));

        for (name, template) in defs {
            let value = template.replace("{uuid}", &uuid::Uuid::new_v4().to_string());
            vars.insert(name.clone(), value);
        }

        Self(vars)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn with(&self, name: &str, value: String) -> Self {
        let mut vars = self.0.clone();
        vars.insert(name.to_string(), value);
        Self(vars)
    }

    /// Substitute `{{name}}` references; unknown names are left as written.
    pub fn render(&self, text: &str) -> String {
        VAR_REF
            .replace_all(text, |caps: &Captures| match self.0.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn render_value(&self, value: &mut serde_json::Value) {
        match value {
            serde_json::Value::String(s) => *s = self.render(s),
            serde_json::Value::Array(items) => items.iter_mut().for_each(|v| self.render_value(v)),
            serde_json::Value::Object(map) => map.values_mut().for_each(|v| self.render_value(v)),
            _ => {}
        }
    }

    fn render_step(&self, step: &TestStep) -> E2eResult<TestStep> {
        let mut value = serde_json::to_value(step)?;
        self.render_value(&mut value);
        Ok(serde_json::from_value(value)?)
    }
}

/// Flatten `for_each`/`repeat` and substitute variables.
///
/// `if_visible` survives as a runtime branch with its children expanded.
pub fn expand(steps: &[TestStep], vars: &Vars) -> E2eResult<Vec<TestStep>> {
    let mut out = Vec::new();

    for step in steps {
        match step {
            TestStep::ForEach { var, values, steps } => {
                for value in values {
                    let scope = vars.with(var, vars.render(value));
                    out.extend(expand(steps, &scope)?);
                }
            }
            TestStep::Repeat { var, count, steps } => {
                for i in 0..*count {
                    let scope = vars.with(var, i.to_string());
                    out.extend(expand(steps, &scope)?);
                }
            }
            TestStep::IfVisible { selector, then, otherwise } => {
                out.push(TestStep::IfVisible {
                    selector: vars.render(selector),
                    then: expand(then, vars)?,
                    otherwise: expand(otherwise, vars)?,
                });
            }
            other => out.push(vars.render_step(other)?),
        }
    }

    Ok(out)
}

impl Suite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, ordered by file name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Keep only tests tagged `tag` (directly or through their suite)
    pub fn filter_by_tag(suites: &[Self], tag: &str) -> Vec<Self> {
        suites
            .iter()
            .filter_map(|suite| {
                let suite_tagged = suite.tags.iter().any(|t| t == tag);
                let tests: Vec<TestCase> = suite
                    .tests
                    .iter()
                    .filter(|t| suite_tagged || t.tags.iter().any(|x| x == tag))
                    .cloned()
                    .collect();
                (!tests.is_empty()).then(|| Suite { tests, ..suite.clone() })
            })
            .collect()
    }

    pub fn find_test(&self, name: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Name under which a test's coverage artifact is stored
    pub fn coverage_name(&self, test: &TestCase) -> String {
        format!("{}-{}", self.name, test.name)
    }

    /// Setup plus test steps, expanded with freshly resolved variables
    pub fn plan(&self, test: &TestCase) -> E2eResult<Vec<TestStep>> {
        let vars = Vars::resolve(&test.vars);
        let mut steps = expand(&self.setup, &vars)?;
        steps.extend(expand(&test.steps, &vars)?);
        Ok(steps)
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("suite name is empty".to_string()));
        }
        if self.tests.is_empty() {
            return Err(E2eError::SpecParse(format!("suite '{}' has no tests", self.name)));
        }

        let mut seen = HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.name.as_str()) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate test '{}' in suite '{}'",
                    test.name, self.name
                )));
            }
            if test.steps.is_empty() {
                return Err(E2eError::SpecParse(format!("test '{}' has no steps", test.name)));
            }
        }

        Ok(())
    }
}
