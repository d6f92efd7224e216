//! Run configuration
//!
//! Layered: built-in defaults (which depend on CI mode), then an optional TOML
//! file, then environment variables, then CLI flags applied by the binary.
//! Later layers win.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use goodbudget_fixtures::{Role, Selector, SelectorTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::Browser;

pub const DEFAULT_BASE_URL: &str = "https://goodbudget.com";
pub const DEFAULT_CONFIG_FILE: &str = "goodbudget-e2e.toml";

/// Complete configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub ci: bool,
    pub retries: u32,
    pub workers: usize,
    /// Reject scenarios marked `only`
    pub forbid_only: bool,
    pub headless: bool,
    /// Check the base URL answers before running anything
    pub probe_site: bool,
    pub timeouts: Timeouts,
    pub viewport: Viewport,
    pub artifacts: ArtifactSettings,
    pub projects: Vec<Project>,
    /// Traces, videos and screenshots
    pub output_dir: PathBuf,
    pub reports: ReportSettings,
    /// Directory holding `node_modules` with `playwright` and `@playwright/test`
    pub node_project_dir: PathBuf,
    /// Extra YAML suites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_server: Option<WebServerConfig>,
    /// Per-role replacements for the standard selector table
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectors: BTreeMap<Role, Selector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub test_ms: u64,
    pub expect_ms: u64,
    pub navigation_ms: u64,
    pub action_ms: u64,
}

impl Timeouts {
    pub fn test(&self) -> Duration {
        Duration::from_millis(self.test_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            test_ms: 30_000,
            expect_ms: 5_000,
            navigation_ms: 15_000,
            action_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// When a diagnostic artifact is recorded and whether it is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPolicy {
    Off,
    On,
    OnlyOnFailure,
    RetainOnFailure,
    OnFirstRetry,
}

impl ArtifactPolicy {
    /// Whether to record during the given attempt (0 = first run)
    pub fn records(&self, attempt: u32) -> bool {
        match self {
            ArtifactPolicy::Off => false,
            ArtifactPolicy::On | ArtifactPolicy::OnlyOnFailure | ArtifactPolicy::RetainOnFailure => true,
            ArtifactPolicy::OnFirstRetry => attempt == 1,
        }
    }

    /// Whether a recorded artifact survives a passing attempt
    pub fn keeps_on_pass(&self) -> bool {
        matches!(self, ArtifactPolicy::On | ArtifactPolicy::OnFirstRetry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    pub trace: ArtifactPolicy,
    pub video: ArtifactPolicy,
    pub screenshot: ArtifactPolicy,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            trace: ArtifactPolicy::OnFirstRetry,
            video: ArtifactPolicy::RetainOnFailure,
            screenshot: ArtifactPolicy::OnlyOnFailure,
        }
    }
}

/// A browser/device combination the suites run against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub browser: Browser,
    /// Playwright device descriptor name, e.g. `Pixel 5`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launch_args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub firefox_user_prefs: BTreeMap<String, serde_json::Value>,
}

impl Project {
    pub fn new(name: impl Into<String>, browser: Browser, device: &str) -> Self {
        Self {
            name: name.into(),
            browser,
            device: Some(device.to_string()),
            launch_args: Vec::new(),
            firefox_user_prefs: BTreeMap::new(),
        }
    }

    /// Desktop Chrome, Firefox and Safari plus two mobile profiles
    pub fn defaults() -> Vec<Project> {
        let mut chromium = Project::new("chromium", Browser::Chromium, "Desktop Chrome");
        chromium.launch_args = vec![
            "--disable-web-security".to_string(),
            "--disable-features=VizDisplayCompositor".to_string(),
        ];

        let mut firefox = Project::new("firefox", Browser::Firefox, "Desktop Firefox");
        firefox
            .firefox_user_prefs
            .insert("dom.webnotifications.enabled".to_string(), serde_json::Value::Bool(false));
        firefox
            .firefox_user_prefs
            .insert("dom.push.enabled".to_string(), serde_json::Value::Bool(false));

        vec![
            chromium,
            firefox,
            Project::new("webkit", Browser::Webkit, "Desktop Safari"),
            Project::new("Mobile Chrome", Browser::Chromium, "Pixel 5"),
            Project::new("Mobile Safari", Browser::Webkit, "iPhone 12"),
        ]
    }

    /// File-system friendly project name
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junit: Option<PathBuf>,
    /// Log one line per scenario
    pub list: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            json: Some(PathBuf::from("test-results/results.json")),
            junit: Some(PathBuf::from("test-results/junit.xml")),
            list: true,
        }
    }
}

/// Local web server started before the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServerConfig {
    /// Shell command that starts the server
    pub command: String,
    pub port: u16,
    /// Use a server already listening on `port` instead of spawning one
    pub reuse_existing_server: bool,
    pub startup_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            command: "npm run start".to_string(),
            port: 3000,
            reuse_existing_server: true,
            startup_timeout_ms: 60_000,
            cwd: None,
        }
    }
}

impl WebServerConfig {
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_environment(false)
    }
}

impl RunConfig {
    /// Defaults for local or CI runs
    pub fn for_environment(ci: bool) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ci,
            retries: if ci { 2 } else { 0 },
            workers: if ci { 1 } else { default_local_workers() },
            forbid_only: ci,
            headless: true,
            probe_site: true,
            timeouts: Timeouts::default(),
            viewport: Viewport::default(),
            artifacts: ArtifactSettings::default(),
            projects: Project::defaults(),
            output_dir: PathBuf::from("test-results/artifacts"),
            reports: ReportSettings::default(),
            node_project_dir: PathBuf::from("."),
            scenarios_dir: None,
            web_server: if ci { None } else { Some(WebServerConfig::default()) },
            selectors: BTreeMap::new(),
        }
    }

    /// Load configuration from the process environment and optional file
    pub fn load(file: Option<&Path>) -> E2eResult<Self> {
        Self::load_with(file, |key| std::env::var(key).ok())
    }

    /// Load configuration reading variables through `env`
    pub fn load_with<F>(file: Option<&Path>, env: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ci = env("CI").map(|v| is_truthy(&v)).unwrap_or(false);
        let mut config = Self::for_environment(ci);

        let file = file.map(Path::to_path_buf).or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });
        if let Some(path) = file {
            debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            config = config.merge_toml(&content)?;
        }

        if let Some(url) = env("BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay a TOML document on top of this configuration
    pub fn merge_toml(&self, content: &str) -> E2eResult<Self> {
        let overlay: toml::Value = toml::from_str(content)?;
        let mut base = toml::Value::try_from(self)?;
        merge_values(&mut base, overlay);
        Ok(base.try_into()?)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".into()));
        }
        if self.projects.is_empty() {
            return Err(E2eError::Config("at least one project is required".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        let mut names: Vec<&str> = self.projects.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.projects.len() {
            return Err(E2eError::Config("project names must be unique".into()));
        }
        Ok(())
    }

    /// Selector table with this configuration's overrides applied
    pub fn selector_table(&self) -> E2eResult<SelectorTable> {
        Ok(SelectorTable::with_overrides(self.selectors.clone())?)
    }

    /// Keep only projects whose name is listed (case-insensitive)
    pub fn restrict_projects(&mut self, names: &[String]) -> E2eResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.projects
            .retain(|p| names.iter().any(|n| n.eq_ignore_ascii_case(&p.name)));
        if self.projects.is_empty() {
            return Err(E2eError::Config(format!(
                "no project matches {}",
                names.join(", ")
            )));
        }
        Ok(())
    }
}

fn default_local_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no")
}

/// Recursive table merge; non-table values in `overlay` replace `base`
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

pub(crate) fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_local_defaults() {
        let config = RunConfig::default();
        assert!(!config.ci);
        assert_eq!(config.retries, 0);
        assert!(config.workers >= 1);
        assert!(!config.forbid_only);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeouts.test_ms, 30_000);
        assert_eq!(config.timeouts.expect_ms, 5_000);
        assert_eq!(config.viewport, Viewport { width: 1280, height: 720 });
        assert_eq!(config.projects.len(), 5);
        assert!(config.web_server.is_some());
    }

    #[test]
    fn test_ci_defaults() {
        let config = RunConfig::load_with(None, env_from(&[("CI", "true")])).unwrap();
        assert!(config.ci);
        assert_eq!(config.retries, 2);
        assert_eq!(config.workers, 1);
        assert!(config.forbid_only);
        assert!(config.web_server.is_none());
    }

    #[test_case("true", true)]
    #[test_case("1", true)]
    #[test_case("false", false)]
    #[test_case("0", false)]
    #[test_case("", false)]
    fn test_ci_flag_parsing(value: &str, expected: bool) {
        let config = RunConfig::load_with(None, env_from(&[("CI", value)])).unwrap();
        assert_eq!(config.ci, expected);
    }

    #[test]
    fn test_base_url_from_env() {
        let config =
            RunConfig::load_with(None, env_from(&[("BASE_URL", "https://staging.example.test")]))
                .unwrap();
        assert_eq!(config.base_url, "https://staging.example.test");
    }

    #[test]
    fn test_file_overrides_keep_ci_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://file.example.test"
workers = 3

[timeouts]
expect_ms = 7000

[artifacts]
video = "on"
"#,
        )
        .unwrap();

        let config = RunConfig::load_with(
            Some(&path),
            env_from(&[("CI", "1"), ("BASE_URL", "https://env.example.test")]),
        )
        .unwrap();

        // env beats file, file beats defaults, untouched CI defaults survive
        assert_eq!(config.base_url, "https://env.example.test");
        assert_eq!(config.workers, 3);
        assert_eq!(config.retries, 2);
        assert_eq!(config.timeouts.expect_ms, 7000);
        assert_eq!(config.timeouts.test_ms, 30_000);
        assert_eq!(config.artifacts.video, ArtifactPolicy::On);
        assert_eq!(config.artifacts.trace, ArtifactPolicy::OnFirstRetry);
    }

    #[test]
    fn test_selector_overrides_from_toml() {
        let config = RunConfig::default()
            .merge_toml(
                r#"
[selectors]
payeeInput = [{ test_id = "payee" }, { css = "input#payee" }]
"#,
            )
            .unwrap();
        let table = config.selector_table().unwrap();
        assert_eq!(
            table.expression(Role::PayeeInput),
            r#"[data-testid="payee"], input#payee"#
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RunConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.base_url = "goodbudget.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restrict_projects() {
        let mut config = RunConfig::default();
        config
            .restrict_projects(&["Chromium".to_string(), "mobile safari".to_string()])
            .unwrap();
        let names: Vec<_> = config.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["chromium", "Mobile Safari"]);

        assert!(config.restrict_projects(&["opera".to_string()]).is_err());
    }

    #[test]
    fn test_artifact_policies() {
        assert!(!ArtifactPolicy::OnFirstRetry.records(0));
        assert!(ArtifactPolicy::OnFirstRetry.records(1));
        assert!(!ArtifactPolicy::OnFirstRetry.records(2));
        assert!(ArtifactPolicy::RetainOnFailure.records(0));
        assert!(!ArtifactPolicy::RetainOnFailure.keeps_on_pass());
        assert!(!ArtifactPolicy::Off.records(1));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Mobile Safari"), "mobile-safari");
        assert_eq!(slugify("should show error for invalid credentials!"), "should-show-error-for-invalid-credentials");
    }
}
