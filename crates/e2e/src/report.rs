//! Result reporters: JSON, JUnit XML and a per-scenario list in the log

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::ReportSettings;
use crate::error::E2eResult;
use crate::runner::{Outcome, ScenarioResult, TestSuiteResult};

/// Write every report enabled in `settings`
pub fn write_reports(settings: &ReportSettings, results: &TestSuiteResult) -> E2eResult<()> {
    if let Some(path) = &settings.json {
        write_json(path, results)?;
    }
    if let Some(path) = &settings.junit {
        write_junit(path, results)?;
    }
    if settings.list {
        log_summary(results);
    }
    Ok(())
}

/// Write test results to a JSON file
pub fn write_json(path: &Path, results: &TestSuiteResult) -> E2eResult<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    info!("Results written to: {}", path.display());
    Ok(())
}

/// Write test results as JUnit XML, one `<testsuite>` per project and suite
pub fn write_junit(path: &Path, results: &TestSuiteResult) -> E2eResult<()> {
    ensure_parent(path)?;
    std::fs::write(path, render_junit(results))?;
    info!("JUnit report written to: {}", path.display());
    Ok(())
}

pub fn render_junit(results: &TestSuiteResult) -> String {
    let mut groups: BTreeMap<(String, String), Vec<&ScenarioResult>> = BTreeMap::new();
    for result in &results.results {
        groups
            .entry((result.project.clone(), result.suite.clone()))
            .or_default()
            .push(result);
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuites name=\"goodbudget-e2e\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{}\">\n",
        results.total,
        results.failed + results.defects,
        results.infra_errors,
        results.skipped,
        seconds(results.duration_ms)
    ));

    for ((project, suite), cases) in &groups {
        let failures = cases
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Failed | Outcome::DefectReproduced { .. }))
            .count();
        let errors = cases.iter().filter(|c| c.outcome == Outcome::InfraError).count();
        let skipped = cases.iter().filter(|c| c.outcome == Outcome::Skipped).count();
        let time: u64 = cases.iter().map(|c| c.duration_ms).sum();

        xml.push_str(&format!(
            "  <testsuite name=\"{}\" hostname=\"{}\" timestamp=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{}\">\n",
            escape_xml(suite),
            escape_xml(project),
            results.started_at.format("%Y-%m-%dT%H:%M:%S"),
            cases.len(),
            failures,
            errors,
            skipped,
            seconds(time)
        ));

        for case in cases {
            xml.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
                escape_xml(&case.scenario),
                escape_xml(&format!("{}.{}", project, suite)),
                seconds(case.duration_ms)
            ));

            let message = case.error.as_deref().unwrap_or("");
            let body = match &case.outcome {
                Outcome::Passed => None,
                Outcome::Flaky => Some(format!(
                    "      <system-out>passed on attempt {}</system-out>\n",
                    case.attempts
                )),
                Outcome::Skipped => Some("      <skipped/>\n".to_string()),
                Outcome::Failed => Some(format!(
                    "      <failure message=\"{}\" type=\"failure\">{}</failure>\n",
                    escape_xml(first_line(message)),
                    escape_xml(&failure_text(case))
                )),
                Outcome::DefectReproduced { issue } => Some(format!(
                    "      <failure message=\"known defect {} reproduced\" type=\"known-defect\">{}</failure>\n",
                    escape_xml(issue),
                    escape_xml(&failure_text(case))
                )),
                Outcome::InfraError => Some(format!(
                    "      <error message=\"{}\" type=\"infrastructure\">{}</error>\n",
                    escape_xml(first_line(message)),
                    escape_xml(message)
                )),
            };

            match body {
                None => xml.push_str("/>\n"),
                Some(body) => {
                    xml.push_str(">\n");
                    xml.push_str(&body);
                    xml.push_str("    </testcase>\n");
                }
            }
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

/// Log one line per scenario, failures last
pub fn log_summary(results: &TestSuiteResult) {
    info!("");
    for result in results.results.iter().filter(|r| r.outcome.is_success()) {
        info!(
            "  {} [{}] {} ({} ms)",
            result.outcome.symbol(),
            result.project,
            result.title(),
            result.duration_ms
        );
    }

    let problems: Vec<&ScenarioResult> = results
        .results
        .iter()
        .filter(|r| !r.outcome.is_success())
        .collect();
    if !problems.is_empty() {
        info!("");
        for result in problems {
            error!(
                "  {} [{}] {}: {}",
                result.outcome.symbol(),
                result.project,
                result.title(),
                failure_text(result).replace('\n', " | ")
            );
            for artifact in &result.artifacts {
                error!("      {}: {}", artifact.kind, artifact.path.display());
            }
        }
    }

    if results.defects > 0 {
        warn!(
            "{} known product defect(s) reproduced against the live site",
            results.defects
        );
    }
    info!(
        "{} passed, {} flaky, {} failed, {} defect(s), {} infra error(s), {} skipped",
        results.passed, results.flaky, results.failed, results.defects, results.infra_errors, results.skipped
    );
}

fn failure_text(result: &ScenarioResult) -> String {
    let error = result.error.as_deref().unwrap_or("unknown error");
    match &result.failed_step {
        Some(step) => format!("at step {}: {}", step, error),
        None => error.to_string(),
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn ensure_parent(path: &Path) -> E2eResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\n' && c != '\t' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}
