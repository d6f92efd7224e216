//! Declarative scenario model
//!
//! A [`Suite`] groups scenarios the way a Playwright spec file does: suites
//! run in parallel with each other, scenarios inside a suite run in order.
//! Built-in suites are assembled in Rust (see [`crate::suites`]); extra suites
//! can be loaded from YAML files.
//!
//! Elements are addressed through a [`Target`], which names a semantic
//! [`Role`] from the selector table or, for one-off structural lookups, a raw
//! CSS expression.

use std::path::Path;

use goodbudget_fixtures::{FixtureGenerator, Role, SelectorTable};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Builds a suite, drawing its fixture records from the generator
pub type SuiteBuilder = fn(&FixtureGenerator) -> E2eResult<Suite>;

/// A group of scenarios sharing setup steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Steps run before every scenario of the suite
    #[serde(default)]
    pub before_each: Vec<Step>,

    pub scenarios: Vec<Scenario>,

    /// Rebuilds the suite with fresh records; set for suites that embed
    /// generated fixture data, so every attempt on every project gets its own
    #[serde(skip)]
    pub rebuild: Option<SuiteBuilder>,
}

/// A single end-to-end scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Focus this scenario; rejected when `forbid_only` is set
    #[serde(default)]
    pub only: bool,

    #[serde(default)]
    pub skip: bool,

    /// Issue id of the product defect this scenario probes for, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_defect: Option<String>,

    pub steps: Vec<Step>,
}

/// Element address: a role or raw CSS, optionally narrowed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub struct Target {
    pub base: TargetBase,
    /// Descendant selector chained after the base (e.g. `option`)
    pub descendant: Option<String>,
    /// Pick the n-th match (0-based)
    pub nth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetBase {
    Role(Role),
    Css(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    descendant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nth: Option<usize>,
}

impl TryFrom<RawTarget> for Target {
    type Error = String;

    fn try_from(raw: RawTarget) -> Result<Self, String> {
        let base = match (raw.role, raw.css) {
            (Some(role), None) => TargetBase::Role(role),
            (None, Some(css)) => TargetBase::Css(css),
            (Some(_), Some(_)) => return Err("target takes either `role` or `css`, not both".into()),
            (None, None) => return Err("target needs a `role` or a `css` selector".into()),
        };
        Ok(Target {
            base,
            descendant: raw.descendant,
            nth: raw.nth,
        })
    }
}

impl From<Target> for RawTarget {
    fn from(target: Target) -> Self {
        let (role, css) = match target.base {
            TargetBase::Role(role) => (Some(role), None),
            TargetBase::Css(css) => (None, Some(css)),
        };
        RawTarget {
            role,
            css,
            descendant: target.descendant,
            nth: target.nth,
        }
    }
}

impl Target {
    pub fn role(role: Role) -> Self {
        Self {
            base: TargetBase::Role(role),
            descendant: None,
            nth: None,
        }
    }

    pub fn css(css: impl Into<String>) -> Self {
        Self {
            base: TargetBase::Css(css.into()),
            descendant: None,
            nth: None,
        }
    }

    pub fn nth(mut self, n: usize) -> Self {
        self.nth = Some(n);
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    pub fn descendant(mut self, css: impl Into<String>) -> Self {
        self.descendant = Some(css.into());
        self
    }

    /// `<option>` elements inside this target
    pub fn options(self) -> Self {
        self.descendant("option")
    }

    pub fn referenced_role(&self) -> Option<Role> {
        match self.base {
            TargetBase::Role(role) => Some(role),
            TargetBase::Css(_) => None,
        }
    }

    /// Base selector expression resolved through the table
    pub fn base_expression(&self, selectors: &SelectorTable) -> String {
        match &self.base {
            TargetBase::Role(role) => selectors.expression(*role),
            TargetBase::Css(css) => css.clone(),
        }
    }

    /// Short human label used in step names
    pub fn label(&self) -> String {
        let mut label = match &self.base {
            TargetBase::Role(role) => role.to_string(),
            TargetBase::Css(css) => css.clone(),
        };
        if let Some(desc) = &self.descendant {
            label.push_str(" >> ");
            label.push_str(desc);
        }
        if let Some(n) = self.nth {
            label.push_str(&format!("[{}]", n));
        }
        label
    }
}

impl From<Role> for Target {
    fn from(role: Role) -> Self {
        Target::role(role)
    }
}

/// JavaScript regular expression source and flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub source: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            case_insensitive: false,
        }
    }

    pub fn ignore_case(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            case_insensitive: true,
        }
    }
}

/// Load state awaited after navigation or clicks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// How to choose an `<option>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum OptionChoice {
    Label { label: String },
    Value { value: String },
    Index { index: usize },
}

/// Boolean check evaluated once, at the moment the step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Visible { target: Target },
    CountAtLeast { target: Target, count: usize },
    UrlContains { text: String },
    /// Input value is one of `values`
    ValueIn { target: Target, values: Vec<String> },
    /// Two inputs hold the same value
    SameValue { left: Target, right: Target },
    /// HTML5 constraint validation rejects the element
    Invalid { target: Target },
    Not { condition: Box<Condition> },
    Any { conditions: Vec<Condition> },
    All { conditions: Vec<Condition> },
}

impl Condition {
    pub fn visible(target: impl Into<Target>) -> Self {
        Condition::Visible { target: target.into() }
    }

    pub fn count_at_least(target: impl Into<Target>, count: usize) -> Self {
        Condition::CountAtLeast {
            target: target.into(),
            count,
        }
    }

    pub fn url_contains(text: impl Into<String>) -> Self {
        Condition::UrlContains { text: text.into() }
    }

    pub fn value_in(target: impl Into<Target>, values: &[&str]) -> Self {
        Condition::ValueIn {
            target: target.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn same_value(left: impl Into<Target>, right: impl Into<Target>) -> Self {
        Condition::SameValue {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn invalid(target: impl Into<Target>) -> Self {
        Condition::Invalid { target: target.into() }
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Any {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::All {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not {
            condition: Box::new(self),
        }
    }

    fn targets<'a>(&'a self, out: &mut Vec<&'a Target>) {
        match self {
            Condition::Visible { target }
            | Condition::CountAtLeast { target, .. }
            | Condition::ValueIn { target, .. }
            | Condition::Invalid { target } => out.push(target),
            Condition::SameValue { left, right } => {
                out.push(left);
                out.push(right);
            }
            Condition::UrlContains { .. } => {}
            Condition::Not { condition } => condition.targets(out),
            Condition::Any { conditions } | Condition::All { conditions } => {
                for c in conditions {
                    c.targets(out);
                }
            }
        }
    }
}

/// Auto-retrying expectation, fails after the expect timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Visible { target: Target },
    ContainsText { target: Target, pattern: Pattern },
    HasValue { target: Target, value: String },
    HasCount { target: Target, count: usize },
    HasAttribute { target: Target, name: String, value: String },
    Focused { target: Target },
    Checked { target: Target },
    UrlMatches { pattern: Pattern },
    TitleMatches { pattern: Pattern },
}

impl Expectation {
    pub fn target(&self) -> Option<&Target> {
        match self {
            Expectation::Visible { target }
            | Expectation::ContainsText { target, .. }
            | Expectation::HasValue { target, .. }
            | Expectation::HasCount { target, .. }
            | Expectation::HasAttribute { target, .. }
            | Expectation::Focused { target }
            | Expectation::Checked { target } => Some(target),
            Expectation::UrlMatches { .. } | Expectation::TitleMatches { .. } => None,
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default = "default_wait_until")]
        wait_until: Option<LoadState>,
    },

    Click {
        target: Target,
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    Fill {
        target: Target,
        value: String,
    },

    /// Press a key on an element, or on the page keyboard when no target
    Press {
        #[serde(default)]
        target: Option<Target>,
        key: String,
    },

    Focus {
        target: Target,
    },

    Select {
        target: Target,
        option: OptionChoice,
    },

    Check {
        target: Target,
    },

    WaitForLoad {
        #[serde(default)]
        state: LoadState,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    Expect {
        check: Expectation,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fail with `message` unless the condition holds right now
    Assert {
        condition: Condition,
        message: String,
    },

    /// Run nested steps only when the condition holds
    When {
        condition: Condition,
        steps: Vec<Step>,
    },

    /// Known product defect probe.
    ///
    /// Fails the scenario as "defect reproduced" when the buggy behaviour is
    /// observed. Once the product is fixed the probe passes and the scenario
    /// should be turned into a regular assertion.
    Probe {
        issue: String,
        reproduced_when: Condition,
        /// Input values reported alongside the failure
        #[serde(default)]
        observe: Vec<Target>,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_until() -> Option<LoadState> {
    Some(LoadState::NetworkIdle)
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate {
            url: url.into(),
            wait_until: default_wait_until(),
        }
    }

    pub fn click(target: impl Into<Target>) -> Self {
        Step::Click {
            target: target.into(),
            wait_until: None,
        }
    }

    /// Click and wait for the network to go idle
    pub fn click_and_settle(target: impl Into<Target>) -> Self {
        Step::Click {
            target: target.into(),
            wait_until: Some(LoadState::NetworkIdle),
        }
    }

    pub fn fill(target: impl Into<Target>, value: impl Into<String>) -> Self {
        Step::Fill {
            target: target.into(),
            value: value.into(),
        }
    }

    pub fn press_key(key: impl Into<String>) -> Self {
        Step::Press {
            target: None,
            key: key.into(),
        }
    }

    pub fn focus(target: impl Into<Target>) -> Self {
        Step::Focus { target: target.into() }
    }

    pub fn select_label(target: impl Into<Target>, label: impl Into<String>) -> Self {
        Step::Select {
            target: target.into(),
            option: OptionChoice::Label { label: label.into() },
        }
    }

    pub fn select_index(target: impl Into<Target>, index: usize) -> Self {
        Step::Select {
            target: target.into(),
            option: OptionChoice::Index { index },
        }
    }

    pub fn check(target: impl Into<Target>) -> Self {
        Step::Check { target: target.into() }
    }

    pub fn settle() -> Self {
        Step::WaitForLoad {
            state: LoadState::NetworkIdle,
        }
    }

    pub fn sleep(ms: u64) -> Self {
        Step::Sleep { ms }
    }

    pub fn expect(check: Expectation) -> Self {
        Step::Expect {
            check,
            timeout_ms: None,
        }
    }

    pub fn expect_within(check: Expectation, timeout_ms: u64) -> Self {
        Step::Expect {
            check,
            timeout_ms: Some(timeout_ms),
        }
    }

    pub fn assert(condition: Condition, message: impl Into<String>) -> Self {
        Step::Assert {
            condition,
            message: message.into(),
        }
    }

    pub fn when(condition: Condition, steps: Vec<Step>) -> Self {
        Step::When { condition, steps }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Step::Log {
            message: message.into(),
        }
    }

    /// Short description used in step events and reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Click { target, .. } => format!("click:{}", target.label()),
            Step::Fill { target, .. } => format!("fill:{}", target.label()),
            Step::Press { target: Some(t), key } => format!("press:{}:{}", t.label(), key),
            Step::Press { target: None, key } => format!("press:{}", key),
            Step::Focus { target } => format!("focus:{}", target.label()),
            Step::Select { target, .. } => format!("select:{}", target.label()),
            Step::Check { target } => format!("check:{}", target.label()),
            Step::WaitForLoad { state } => format!("wait:{}", state.as_str()),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Expect { check, .. } => match check.target() {
                Some(t) => format!("expect:{}", t.label()),
                None => "expect:page".to_string(),
            },
            Step::Assert { message, .. } => format!("assert:{}", truncate(message, 40)),
            Step::When { .. } => "when".to_string(),
            Step::Probe { issue, .. } => format!("probe:{}", issue),
            Step::Log { message } => format!("log:{}", truncate(message, 30)),
        }
    }

    /// Every target this step (and nested steps) touches
    pub fn targets(&self) -> Vec<&Target> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a Target>) {
        match self {
            Step::Click { target, .. }
            | Step::Fill { target, .. }
            | Step::Focus { target }
            | Step::Select { target, .. }
            | Step::Check { target } => out.push(target),
            Step::Press { target, .. } => out.extend(target.iter()),
            Step::Expect { check, .. } => out.extend(check.target()),
            Step::Assert { condition, .. } => condition.targets(out),
            Step::When { condition, steps } => {
                condition.targets(out);
                for step in steps {
                    step.collect_targets(out);
                }
            }
            Step::Probe {
                reproduced_when,
                observe,
                ..
            } => {
                reproduced_when.targets(out);
                out.extend(observe.iter());
            }
            Step::Navigate { .. } | Step::WaitForLoad { .. } | Step::Sleep { .. } | Step::Log { .. } => {}
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            only: false,
            skip: false,
            known_defect: None,
            steps,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn probing(mut self, issue: impl Into<String>) -> Self {
        self.known_defect = Some(issue.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl Suite {
    pub fn new(name: impl Into<String>, before_each: Vec<Step>, scenarios: Vec<Scenario>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            before_each,
            scenarios,
            rebuild: None,
        }
    }

    pub fn rebuilt_with(mut self, build: SuiteBuilder) -> Self {
        self.rebuild = Some(build);
        self
    }

    /// A copy of this suite with freshly generated fixture records
    ///
    /// Suites without a builder carry static data and are returned unchanged.
    pub fn regenerate(&self, fixtures: &FixtureGenerator) -> E2eResult<Option<Suite>> {
        self.rebuild.map(|build| build(fixtures)).transpose()
    }

    /// Setup steps followed by the scenario's own steps
    pub fn steps_for(&self, scenario: &Scenario) -> Vec<Step> {
        self.before_each
            .iter()
            .chain(scenario.steps.iter())
            .cloned()
            .collect()
    }

    /// Every role referenced anywhere in the suite
    pub fn referenced_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .before_each
            .iter()
            .chain(self.scenarios.iter().flat_map(|s| s.steps.iter()))
            .flat_map(|step| step.targets())
            .filter_map(Target::referenced_role)
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Suite = serde_yaml::from_str(yaml)?;
        if suite.scenarios.is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "suite '{}' has no scenarios",
                suite.name
            )));
        }
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            suites.push(Self::from_file(&path)?);
        }

        Ok(suites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suite_yaml() {
        let yaml = r#"
name: smoke
before_each:
  - action: navigate
    url: /
scenarios:
  - name: login-form-visible
    tags: [auth, smoke]
    steps:
      - action: navigate
        url: /home
      - action: expect
        check:
          kind: visible
          target: { role: loginForm }
      - action: fill
        target: { role: emailInput }
        value: someone@example.com
      - action: select
        target: { role: envelopeSelect }
        option: { by: label, label: Split into Multiple }
      - action: when
        condition:
          kind: count_at_least
          target: { role: splitAmountInput }
          count: 2
        steps:
          - action: fill
            target: { role: splitAmountInput, nth: 1 }
            value: "40.00"
"#;
        let suite = Suite::from_yaml(yaml).unwrap();
        assert_eq!(suite.name, "smoke");
        assert_eq!(suite.before_each.len(), 1);

        let scenario = &suite.scenarios[0];
        assert!(scenario.has_tag("smoke"));
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(
            scenario.steps[0],
            Step::Navigate {
                url: "/home".into(),
                wait_until: Some(LoadState::NetworkIdle)
            }
        );
        assert_eq!(suite.steps_for(scenario).len(), 6);
        assert_eq!(
            suite.referenced_roles(),
            vec![Role::LoginForm, Role::EmailInput, Role::EnvelopeSelect, Role::SplitAmountInput]
        );
    }

    #[test]
    fn test_target_requires_exactly_one_base() {
        let both = "{ role: payeeInput, css: 'input' }";
        assert!(serde_yaml::from_str::<Target>(both).is_err());
        assert!(serde_yaml::from_str::<Target>("{ nth: 1 }").is_err());

        let css: Target = serde_yaml::from_str("{ css: 'h1, h2', nth: 0 }").unwrap();
        assert_eq!(css, Target::css("h1, h2").first());
    }

    #[test]
    fn test_empty_suite_rejected() {
        let yaml = "name: empty\nscenarios: []\n";
        assert!(matches!(Suite::from_yaml(yaml), Err(E2eError::ScenarioParse(_))));
    }

    #[test]
    fn test_step_names() {
        let step = Step::fill(Target::role(Role::SplitAmountInput).nth(1), "40.00");
        assert_eq!(step.name(), "fill:splitAmountInput[1]");

        let step = Step::when(
            Condition::count_at_least(Target::role(Role::AccountSelect).options(), 2),
            vec![],
        );
        assert_eq!(step.name(), "when");
        assert_eq!(step.targets()[0].label(), "accountSelect >> option");
    }

    #[test]
    fn test_target_resolves_through_table() {
        let table = SelectorTable::standard();
        let target = Target::role(Role::AmountInput);
        assert_eq!(
            target.base_expression(&table),
            r#"input[name="amount"], [data-testid="amount-input"]"#
        );
    }
}
