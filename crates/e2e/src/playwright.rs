//! Playwright browser automation
//!
//! Each scenario attempt is compiled into a standalone Node script that drives
//! Playwright, then run in its own process so every attempt gets a fresh
//! browser context. The script reports progress on stdout as JSON lines
//! prefixed with [`EVENT_PREFIX`]; everything else on stdout is page or test
//! logging and is forwarded to `tracing`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use goodbudget_fixtures::SelectorTable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::config::{slugify, ArtifactPolicy, Project, RunConfig};
use crate::error::{E2eError, E2eResult};
use crate::runner::{Artifact, ExecutionRequest, ScenarioExecutor, ScenarioRun, StepRecord, Verdict};
use crate::spec::{Condition, Expectation, OptionChoice, Pattern, Step, Target};

pub const EVENT_PREFIX: &str = "@@e2e ";

/// Extra time the Node process gets beyond the in-script test timeout
const PROCESS_GRACE: Duration = Duration::from_secs(15);

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("static regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Event emitted by a generated script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Step {
        index: usize,
        name: String,
    },
    Artifact {
        kind: String,
        path: PathBuf,
    },
    Done {
        success: bool,
        #[serde(default)]
        step: Option<usize>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        defect: Option<String>,
        /// The browser could not be launched or configured
        #[serde(default)]
        infra: bool,
    },
}

/// Per-attempt inputs for script generation
pub struct ScriptContext<'a> {
    pub project: &'a Project,
    pub steps: &'a [Step],
    pub attempt: u32,
    /// Directory for this attempt's trace, video and screenshot
    pub artifact_dir: PathBuf,
}

/// Compiles scenario steps into Playwright JavaScript
#[derive(Clone)]
pub struct ScriptBuilder {
    selectors: Arc<SelectorTable>,
    config: Arc<RunConfig>,
}

impl ScriptBuilder {
    pub fn new(config: Arc<RunConfig>, selectors: Arc<SelectorTable>) -> Self {
        Self { selectors, config }
    }

    /// Build the complete script for one attempt
    pub fn build_script(&self, ctx: &ScriptContext<'_>) -> String {
        let config = &self.config;
        let artifacts = &config.artifacts;
        let trace = artifacts.trace.records(ctx.attempt);
        let video = artifacts.video.records(ctx.attempt);
        let screenshot = artifacts.screenshot.records(ctx.attempt);

        let trace_path = ctx.artifact_dir.join("trace.zip");
        let screenshot_path = ctx.artifact_dir.join("failure.png");
        let video_dir = ctx.artifact_dir.join("video");

        let mut launch = serde_json::Map::new();
        launch.insert("headless".into(), config.headless.into());
        if !ctx.project.launch_args.is_empty() {
            launch.insert("args".into(), ctx.project.launch_args.clone().into());
        }
        if !ctx.project.firefox_user_prefs.is_empty() {
            let prefs: serde_json::Map<String, serde_json::Value> = ctx
                .project
                .firefox_user_prefs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            launch.insert("firefoxUserPrefs".into(), prefs.into());
        }

        let mut script = String::new();

        // Header
        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit, devices }} = require('playwright');
const {{ expect }} = require('@playwright/test');

const emit = (event) => console.log({prefix} + JSON.stringify(event));
const describe = (error) => String((error && error.message) || error);

class KnownDefect extends Error {{
  constructor(issue, message) {{
    super(message);
    this.issue = issue;
  }}
}}

(async () => {{
  const deviceName = {device};
  const device = deviceName ? devices[deviceName] : {{}};
  if (!device) {{
    emit({{ event: 'done', success: false, infra: true, error: 'Unknown device descriptor: ' + deviceName }});
    process.exit(1);
  }}
  let browser;
  try {{
    browser = await {browser}.launch({launch});
  }} catch (error) {{
    emit({{ event: 'done', success: false, infra: true, error: describe(error) }});
    process.exit(1);
  }}
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }},
    ...device,
    baseURL: {base_url},{record_video}
  }});
  context.setDefaultTimeout({action_ms});
  context.setDefaultNavigationTimeout({navigation_ms});
"#,
            prefix = js_str(EVENT_PREFIX),
            device = ctx
                .project
                .device
                .as_deref()
                .map(js_str)
                .unwrap_or_else(|| "null".to_string()),
            browser = ctx.project.browser.as_str(),
            launch = serde_json::Value::Object(launch),
            width = config.viewport.width,
            height = config.viewport.height,
            base_url = js_str(&config.base_url),
            record_video = if video {
                format!("\n    recordVideo: {{ dir: {} }},", js_path(&video_dir))
            } else {
                String::new()
            },
            action_ms = config.timeouts.action_ms,
            navigation_ms = config.timeouts.navigation_ms,
        ));

        if trace {
            script.push_str(
                "  await context.tracing.start({ screenshots: true, snapshots: true, sources: true });\n",
            );
        }

        script.push_str(&format!(
            r#"  const page = await context.newPage();
  let current = 0;
  let failed = false;
  const testTimer = setTimeout(() => {{
    emit({{ event: 'done', success: false, step: current, error: 'Test timeout of {test_ms}ms exceeded.' }});
    process.exit(1);
  }}, {test_ms});

  try {{
"#,
            test_ms = config.timeouts.test_ms,
        ));

        // Steps
        let mut counter = 0;
        for step in ctx.steps {
            self.push_step(&mut script, step, 2, &mut counter);
        }

        script.push_str(
            r#"
    emit({ event: 'done', success: true });
  } catch (error) {
    failed = true;
    emit({ event: 'done', success: false, step: current, error: describe(error), defect: (error && error.issue) || null });
"#,
        );

        if screenshot {
            script.push_str(&format!(
                "    await page.screenshot({{ path: {path}, fullPage: true }})\n      .then(() => emit({{ event: 'artifact', kind: 'screenshot', path: {path} }}))\n      .catch(() => {{}});\n",
                path = js_path(&screenshot_path),
            ));
        }

        script.push_str("  } finally {\n    clearTimeout(testTimer);\n");

        if screenshot && artifacts.screenshot.keeps_on_pass() {
            script.push_str(&format!(
                "    if (!failed) {{\n      await page.screenshot({{ path: {path}, fullPage: true }})\n        .then(() => emit({{ event: 'artifact', kind: 'screenshot', path: {path} }}))\n        .catch(() => {{}});\n    }}\n",
                path = js_path(&screenshot_path),
            ));
        }

        if trace {
            script.push_str(&format!(
                r#"    if (failed || {keep}) {{
      await context.tracing.stop({{ path: {path} }})
        .then(() => emit({{ event: 'artifact', kind: 'trace', path: {path} }}))
        .catch(() => {{}});
    }} else {{
      await context.tracing.stop().catch(() => {{}});
    }}
"#,
                keep = artifacts.trace.keeps_on_pass(),
                path = js_path(&trace_path),
            ));
        }

        script.push_str("    const video = page.video();\n    await context.close().catch(() => {});\n");

        if video {
            script.push_str(&format!(
                r#"    if (video) {{
      if (failed || {keep}) {{
        emit({{ event: 'artifact', kind: 'video', path: await video.path() }});
      }} else {{
        await video.delete().catch(() => {{}});
      }}
    }}
"#,
                keep = artifacts.video.keeps_on_pass(),
            ));
        }

        // Footer
        script.push_str(
            r#"    await browser.close().catch(() => {});
  }
  process.exit(failed ? 1 : 0);
})();
"#,
        );

        script
    }

    fn push_step(&self, script: &mut String, step: &Step, depth: usize, counter: &mut usize) {
        *counter += 1;
        let pad = "  ".repeat(depth);
        script.push_str(&format!(
            "\n{pad}// Step {n}: {name}\n{pad}current = {n};\n{pad}emit({{ event: 'step', index: {n}, name: {name_js} }});\n",
            pad = pad,
            n = *counter,
            name = step.name().replace('\n', " "),
            name_js = js_str(&step.name()),
        ));

        match step {
            Step::When { condition, steps } => {
                script.push_str(&format!("{}if ({}) {{\n", pad, self.condition_js(condition)));
                for nested in steps {
                    self.push_step(script, nested, depth + 1, counter);
                }
                script.push_str(&format!("{}}}\n", pad));
            }
            other => {
                for line in self.step_to_js(other).lines() {
                    script.push_str(&pad);
                    script.push_str(line);
                    script.push('\n');
                }
            }
        }
    }

    /// Convert a (non-nesting) step to JavaScript statements
    pub fn step_to_js(&self, step: &Step) -> String {
        match step {
            Step::Navigate { url, wait_until } => {
                let mut js = format!("await page.goto({});", js_str(url));
                if let Some(state) = wait_until {
                    js.push_str(&format!("\nawait page.waitForLoadState('{}');", state.as_str()));
                }
                js
            }
            Step::Click { target, wait_until } => {
                let mut js = format!("await {}.click();", self.locator_js(target));
                if let Some(state) = wait_until {
                    js.push_str(&format!("\nawait page.waitForLoadState('{}');", state.as_str()));
                }
                js
            }
            Step::Fill { target, value } => {
                format!("await {}.fill({});", self.locator_js(target), js_str(value))
            }
            Step::Press { target, key } => match target {
                Some(t) => format!("await {}.press({});", self.locator_js(t), js_str(key)),
                None => format!("await page.keyboard.press({});", js_str(key)),
            },
            Step::Focus { target } => format!("await {}.focus();", self.locator_js(target)),
            Step::Select { target, option } => {
                let option = match option {
                    OptionChoice::Label { label } => format!("{{ label: {} }}", js_str(label)),
                    OptionChoice::Value { value } => format!("{{ value: {} }}", js_str(value)),
                    OptionChoice::Index { index } => format!("{{ index: {} }}", index),
                };
                format!("await {}.selectOption({});", self.locator_js(target), option)
            }
            Step::Check { target } => format!("await {}.check();", self.locator_js(target)),
            Step::WaitForLoad { state } => {
                format!("await page.waitForLoadState('{}');", state.as_str())
            }
            Step::Sleep { ms } => format!("await page.waitForTimeout({});", ms),
            Step::Expect { check, timeout_ms } => {
                let timeout = timeout_ms.unwrap_or(self.config.timeouts.expect_ms);
                self.expectation_js(check, timeout)
            }
            Step::Assert { condition, message } => format!(
                "if (!({})) {{\n  throw new Error({});\n}}",
                self.condition_js(condition),
                js_str(message)
            ),
            Step::When { condition, steps } => {
                let mut js = format!("if ({}) {{\n", self.condition_js(condition));
                for nested in steps {
                    for line in self.step_to_js(nested).lines() {
                        js.push_str("  ");
                        js.push_str(line);
                        js.push('\n');
                    }
                }
                js.push('}');
                js
            }
            Step::Probe {
                issue,
                reproduced_when,
                observe,
            } => {
                let observed = observe
                    .iter()
                    .map(|t| format!("await {}.inputValue().catch(() => null)", self.locator_js(t)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "if ({cond}) {{\n  const observed = [{observed}];\n  console.log('[DEFECT] ' + {issue} + ' reproduced, observed: ' + JSON.stringify(observed));\n  throw new KnownDefect({issue}, 'Known defect ' + {issue} + ' reproduced; observed ' + JSON.stringify(observed));\n}}",
                    cond = self.condition_js(reproduced_when),
                    observed = observed,
                    issue = js_str(issue),
                )
            }
            Step::Log { message } => format!("console.log({});", js_str(&format!("[TEST] {}", message))),
        }
    }

    /// JavaScript expression for a locator
    pub fn locator_js(&self, target: &Target) -> String {
        let mut js = format!("page.locator({})", js_str(&target.base_expression(&self.selectors)));
        if let Some(desc) = &target.descendant {
            js.push_str(&format!(".locator({})", js_str(desc)));
        }
        if let Some(n) = target.nth {
            js.push_str(&format!(".nth({})", n));
        }
        js
    }

    /// Boolean JavaScript expression (must run in an async context)
    pub fn condition_js(&self, condition: &Condition) -> String {
        match condition {
            Condition::Visible { target } => {
                let loc = self.locator_js(target);
                let loc = if target.nth.is_none() { format!("{}.first()", loc) } else { loc };
                format!("(await {}.isVisible().catch(() => false))", loc)
            }
            Condition::CountAtLeast { target, count } => {
                format!("((await {}.count()) >= {})", self.locator_js(target), count)
            }
            Condition::UrlContains { text } => format!("page.url().includes({})", js_str(text)),
            Condition::ValueIn { target, values } => format!(
                "{}.includes(await {}.inputValue().catch(() => null))",
                serde_json::Value::from(values.clone()),
                self.locator_js(target)
            ),
            Condition::SameValue { left, right } => format!(
                "((await {}.inputValue()) === (await {}.inputValue()))",
                self.locator_js(left),
                self.locator_js(right)
            ),
            Condition::Invalid { target } => format!(
                "(await {}.evaluate((el) => !el.validity.valid))",
                self.locator_js(target)
            ),
            Condition::Not { condition } => format!("!{}", self.condition_js(condition)),
            Condition::Any { conditions } if conditions.is_empty() => "false".to_string(),
            Condition::All { conditions } if conditions.is_empty() => "true".to_string(),
            Condition::Any { conditions } => join_conditions(self, conditions, " || "),
            Condition::All { conditions } => join_conditions(self, conditions, " && "),
        }
    }

    fn expectation_js(&self, check: &Expectation, timeout: u64) -> String {
        let opts = format!("{{ timeout: {} }}", timeout);
        match check {
            Expectation::Visible { target } => {
                format!("await expect({}).toBeVisible({});", self.locator_js(target), opts)
            }
            Expectation::ContainsText { target, pattern } => format!(
                "await expect({}).toContainText({}, {});",
                self.locator_js(target),
                regex_js(pattern),
                opts
            ),
            Expectation::HasValue { target, value } => format!(
                "await expect({}).toHaveValue({}, {});",
                self.locator_js(target),
                js_str(value),
                opts
            ),
            Expectation::HasCount { target, count } => format!(
                "await expect({}).toHaveCount({}, {});",
                self.locator_js(target),
                count,
                opts
            ),
            Expectation::HasAttribute { target, name, value } => format!(
                "await expect({}).toHaveAttribute({}, {}, {});",
                self.locator_js(target),
                js_str(name),
                js_str(value),
                opts
            ),
            Expectation::Focused { target } => {
                format!("await expect({}).toBeFocused({});", self.locator_js(target), opts)
            }
            Expectation::Checked { target } => {
                format!("await expect({}).toBeChecked({});", self.locator_js(target), opts)
            }
            Expectation::UrlMatches { pattern } => {
                format!("await expect(page).toHaveURL({}, {});", regex_js(pattern), opts)
            }
            Expectation::TitleMatches { pattern } => {
                format!("await expect(page).toHaveTitle({}, {});", regex_js(pattern), opts)
            }
        }
    }
}

fn join_conditions(builder: &ScriptBuilder, conditions: &[Condition], op: &str) -> String {
    let parts: Vec<String> = conditions.iter().map(|c| builder.condition_js(c)).collect();
    format!("({})", parts.join(op))
}

/// JSON string literal, which is also a valid JavaScript string literal
pub fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn js_path(path: &Path) -> String {
    js_str(&path.to_string_lossy())
}

fn regex_js(pattern: &Pattern) -> String {
    format!(
        "new RegExp({}, {})",
        js_str(&pattern.source),
        js_str(if pattern.case_insensitive { "i" } else { "" })
    )
}

/// Strip terminal colour codes Playwright puts into assertion messages
pub fn strip_ansi(s: &str) -> String {
    ANSI_ESCAPE.replace_all(s, "").into_owned()
}

/// Everything a finished script told us
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub verdict: Verdict,
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<Artifact>,
}

/// Interpret the stdout/stderr of a finished script
pub fn interpret_output(stdout: &str, stderr: &str) -> ScriptOutcome {
    let mut steps = Vec::new();
    let mut artifacts = Vec::new();
    let mut verdict = None;

    for line in stdout.lines() {
        let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
            if !line.trim().is_empty() {
                debug!("[script] {}", line);
            }
            continue;
        };

        match serde_json::from_str::<ScriptEvent>(payload) {
            Ok(ScriptEvent::Step { index, name }) => steps.push(StepRecord { index, name }),
            Ok(ScriptEvent::Artifact { kind, path }) => artifacts.push(Artifact { kind, path }),
            Ok(ScriptEvent::Done {
                success,
                step,
                error,
                defect,
                infra,
            }) => {
                // first terminal event wins; a timeout may race the catch block
                if verdict.is_some() {
                    continue;
                }
                let error = strip_ansi(error.as_deref().unwrap_or("unknown error"));
                verdict = Some(if success {
                    Verdict::Passed
                } else if infra {
                    Verdict::InfraError { error }
                } else if let Some(issue) = defect {
                    Verdict::DefectReproduced { issue, error }
                } else {
                    Verdict::Failed { step, error }
                });
            }
            Err(e) => warn!("Unparseable script event '{}': {}", payload, e),
        }
    }

    let verdict = verdict.unwrap_or_else(|| {
        let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Verdict::InfraError {
            error: format!(
                "script exited without a result{}{}",
                if tail.is_empty() { "" } else { ":\n" },
                strip_ansi(&tail.join("\n"))
            ),
        }
    });

    ScriptOutcome {
        verdict,
        steps,
        artifacts,
    }
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    builder: ScriptBuilder,
    config: Arc<RunConfig>,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: Arc<RunConfig>, selectors: Arc<SelectorTable>) -> E2eResult<Self> {
        // Verify playwright is installed
        Self::check_playwright_installed(&config.node_project_dir)?;

        std::fs::create_dir_all(&config.output_dir)?;

        Ok(Self {
            builder: ScriptBuilder::new(config.clone(), selectors),
            config,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(project_dir: &Path) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .current_dir(project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn builder(&self) -> &ScriptBuilder {
        &self.builder
    }

    fn artifact_dir(&self, request: &ExecutionRequest<'_>) -> PathBuf {
        let mut name = format!(
            "{}-{}-{}",
            slugify(&request.suite.name),
            slugify(&request.scenario.name),
            request.project.slug()
        );
        if request.attempt > 0 {
            name.push_str(&format!("-retry{}", request.attempt));
        }
        self.config.output_dir.join(name)
    }

    /// Execute the full script via Node
    pub async fn run_script(&self, script: &str) -> E2eResult<ScriptOutcome> {
        // Write script to temp file
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("scenario.js");
        std::fs::write(&script_path, script)?;

        let project_dir = std::fs::canonicalize(&self.config.node_project_dir)?;
        debug!("Running Playwright script: {}", script_path.display());

        let child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&project_dir)
            .env("NODE_PATH", project_dir.join("node_modules"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let limit = self.config.timeouts.test() + PROCESS_GRACE;
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| E2eError::Timeout(format!("node process after {:?}", limit)))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(interpret_output(&stdout, &stderr))
    }
}

#[async_trait]
impl ScenarioExecutor for PlaywrightHandle {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> E2eResult<ScenarioRun> {
        let start = Instant::now();
        let steps = request.suite.steps_for(request.scenario);
        let artifact_dir = self.artifact_dir(request);

        let script = self.builder.build_script(&ScriptContext {
            project: request.project,
            steps: &steps,
            attempt: request.attempt,
            artifact_dir: artifact_dir.clone(),
        });

        if self.config.artifacts.trace != ArtifactPolicy::Off
            || self.config.artifacts.video != ArtifactPolicy::Off
            || self.config.artifacts.screenshot != ArtifactPolicy::Off
        {
            std::fs::create_dir_all(&artifact_dir)?;
        }

        let outcome = self.run_script(&script).await?;
        for artifact in &outcome.artifacts {
            info!("Saved {} for '{}': {}", artifact.kind, request.scenario.name, artifact.path.display());
        }

        Ok(ScenarioRun {
            verdict: outcome.verdict,
            steps: outcome.steps,
            artifacts: outcome.artifacts,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
