use bondlink_core::types::{AgentId, AgentState};
use bondlink_engine::{DiagnosticKind, EngineConfig, IngestOutcome, SyncEngine};
use bondlink_store::MemoryStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[allow(dead_code)]
    description: String,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    Start,
    Stop,
    Clear,
    Reload,
}

/// One replay step: either a frame (structured or raw text) or an action.
#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    frame: Option<serde_json::Value>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    hint: Option<String>,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    agent: Option<String>,
    expect: Expect,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExpectedOutcome {
    Applied,
    Duplicate,
    Unattributed,
}

#[derive(Debug, Deserialize)]
struct Expect {
    #[serde(default)]
    outcome: Option<ExpectedOutcome>,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    state: Option<AgentState>,
    /// Working caption; empty string means none.
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    log_len: Option<usize>,
    #[serde(default)]
    steps: Option<Vec<String>>,
    #[serde(default)]
    diagnostics: BTreeMap<String, usize>,
}

fn scenarios_dir() -> PathBuf {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../fixtures/scenarios")
}

fn load_scenarios() -> Vec<Scenario> {
    let dir = scenarios_dir();
    let mut scenarios = Vec::new();
    if !dir.exists() {
        return scenarios;
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("read scenarios dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();
    for path in paths {
        let content = fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("failed to read scenario {:?}: {}", path, e);
        });
        let scenario: Scenario = serde_json::from_str(&content).unwrap_or_else(|e| {
            panic!("failed to parse scenario {:?}: {}", path, e);
        });
        scenarios.push(scenario);
    }
    scenarios
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid datetime")
}

fn diagnostic_kind(name: &str) -> DiagnosticKind {
    match name {
        "unattributed" => DiagnosticKind::Unattributed,
        "duplicate_dropped" => DiagnosticKind::DuplicateDropped,
        "persist_failed" => DiagnosticKind::PersistFailed,
        "history_load_failed" => DiagnosticKind::HistoryLoadFailed,
        "clear_failed" => DiagnosticKind::ClearFailed,
        other => panic!("unknown diagnostic kind in fixture: {other}"),
    }
}

/// Run one step; returns a list of mismatches.
fn run_step(engine: &mut SyncEngine, step: &Step, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();
    let hint = step.hint.as_deref().map(AgentId::from);
    let target = step.agent.as_deref().map(AgentId::from);

    let outcome = match (&step.action, &step.frame, &step.raw) {
        (Some(action), _, _) => {
            match action {
                Action::Start => {
                    engine.apply_start_succeeded(target.as_ref().expect("start needs agent"), now);
                }
                Action::Stop => {
                    engine.apply_stop_succeeded(target.as_ref().expect("stop needs agent"), now);
                }
                Action::Clear => {
                    engine.clear(target.as_ref().expect("clear needs agent"), now);
                }
                Action::Reload => {
                    let report = engine.load_all_history(&[], now);
                    if !report.failed.is_empty() {
                        errors.push(format!("reload failed for {:?}", report.failed));
                    }
                }
            }
            None
        }
        (None, Some(frame), _) => Some(engine.ingest(&frame.to_string(), hint.as_ref(), now)),
        (None, None, Some(raw)) => Some(engine.ingest(raw, hint.as_ref(), now)),
        (None, None, None) => panic!("step has neither frame, raw nor action"),
    };

    let expect = &step.expect;
    if let Some(expected) = &expect.outcome {
        let ok = match (expected, &outcome) {
            (ExpectedOutcome::Applied, Some(IngestOutcome::Applied { .. })) => true,
            (ExpectedOutcome::Duplicate, Some(IngestOutcome::Duplicate { .. })) => true,
            (ExpectedOutcome::Unattributed, Some(IngestOutcome::Unattributed { .. })) => true,
            _ => false,
        };
        if !ok {
            errors.push(format!("outcome: expected {expected:?}, got {outcome:?}"));
        }
    }

    if let Some(agent) = expect.agent.as_deref().map(AgentId::from) {
        if let Some(state) = expect.state {
            let got = engine.agent_state(&agent);
            if got != state {
                errors.push(format!("{agent} state: expected {state:?}, got {got:?}"));
            }
        }
        if let Some(caption) = &expect.caption {
            let got = engine.caption(&agent).unwrap_or("");
            if got != caption {
                errors.push(format!("{agent} caption: expected {caption:?}, got {got:?}"));
            }
        }
        if let Some(len) = expect.log_len {
            let got = engine.agent_log(&agent).len();
            if got != len {
                errors.push(format!("{agent} log_len: expected {len}, got {got}"));
            }
        }
        if let Some(steps) = &expect.steps {
            let got = engine.step_log(&agent);
            if got != steps.as_slice() {
                errors.push(format!("{agent} steps: expected {steps:?}, got {got:?}"));
            }
        }
    }

    for (name, count) in &expect.diagnostics {
        let got = engine.diagnostics().count(diagnostic_kind(name));
        if got != *count {
            errors.push(format!("diagnostics {name}: expected {count}, got {got}"));
        }
    }

    errors
}

#[test]
fn test_all_scenarios() {
    let scenarios = load_scenarios();
    assert!(
        !scenarios.is_empty(),
        "no scenarios found in {:?}",
        scenarios_dir()
    );

    let mut total_steps = 0;
    let mut passed_steps = 0;
    let mut failed_scenarios = Vec::new();

    for scenario in &scenarios {
        let mut engine = SyncEngine::new(Box::new(MemoryStore::new()), EngineConfig::default());
        let mut scenario_ok = true;

        for (i, step) in scenario.steps.iter().enumerate() {
            let now = t0() + Duration::seconds(i as i64);
            let errors = run_step(&mut engine, step, now);
            total_steps += 1;

            if errors.is_empty() {
                passed_steps += 1;
            } else {
                scenario_ok = false;
                for e in errors {
                    eprintln!("FAIL: scenario '{}' step {}: {}", scenario.name, i, e);
                }
            }
        }

        if !scenario_ok {
            failed_scenarios.push(scenario.name.clone());
        }
    }

    eprintln!(
        "\nReplay results: {}/{} steps passed, {}/{} scenarios passed",
        passed_steps,
        total_steps,
        scenarios.len() - failed_scenarios.len(),
        scenarios.len()
    );

    assert!(
        failed_scenarios.is_empty(),
        "failed scenarios: {:?}",
        failed_scenarios
    );
}
