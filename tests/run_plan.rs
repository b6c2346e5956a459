use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use scribe_agent::{assemble, Assembly, RunLogger};
use scribe_core::config::AppConfig;
use scribe_core::error::ScribeError;
use scribe_core::event::EventBus;
use scribe_core::types::{Context, NodeStatus, PlanStatus};
use scribe_test_utils::ctx;

const CHAIN_PLAN: &str = r#"{
  "title": "Greeting",
  "goal": "say hello twice",
  "nodes": [
    {"id": "c1", "executorName": "Echo", "goal": "first"},
    {"id": "c2", "executorName": "Echo", "goal": "second", "dependencies": ["c1"]}
  ]
}"#;

const SUM_PLAN: &str = r#"{
  "title": "Arithmetic",
  "goal": "add numbers",
  "nodes": [
    {"id": "c1", "executorName": "Calculator", "goal": "add",
     "context": {"tool": "sum", "input": {"operands": [1, 2, 3]}}},
    {"id": "c2", "executorName": "Calculator", "goal": "add badly",
     "context": {"tool": "sum", "input": {"operands": ["one", "two"]}}},
    {"id": "c3", "executorName": "Echo", "goal": "report", "dependencies": ["c1"]}
  ]
}"#;

const XML_PLAN: &str = r#"```xml
<chronicle>
  <title>Greeting</title>
  <goal>say hello</goal>
  <chapters>
    <chapter id="c1"><targetAgent>Echo</targetAgent><goal>hello</goal></chapter>
    <chapter id="c2">
      <targetAgent>Echo</targetAgent>
      <goal>again</goal>
      <dependencies><dependency>c1</dependency></dependencies>
    </chapter>
  </chapters>
</chronicle>
```"#;

/// Writes `plans` into `dir` and a config with an Echo executor, a Calculator
/// tool executor, and one planner executor per plan.
fn setup(dir: &Path, plans: &[(&str, &str)], extra: &str) -> AppConfig {
    let mut toml_text = String::from(
        r#"
[[executors]]
id = "echo"
name = "Echo"
kind = "echo"

[[executors]]
id = "calc"
name = "Calculator"
kind = "tool"
capabilities = ["sum"]
"#,
    );
    for (name, body) in plans {
        let path = dir.join(format!("{}.plan", name));
        std::fs::write(&path, body).expect("write plan");
        toml_text.push_str(&format!(
            "\n[[executors]]\nid = \"{id}\"\nname = \"{name}\"\nkind = \"planner\"\nplan_file = \"{path}\"\n",
            id = name.to_lowercase(),
            name = name,
            path = path.display()
        ));
    }
    toml_text.push_str(extra);

    let config_path = dir.join("scribe.toml");
    std::fs::write(&config_path, toml_text).expect("write config");
    AppConfig::load(&config_path).expect("load config")
}

async fn build(config: &AppConfig) -> Assembly {
    assemble(config, Arc::new(EventBus::default()), CancellationToken::new())
        .await
        .expect("assemble")
}

#[tokio::test]
async fn test_chain_passes_output_forward() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[("Root", CHAIN_PLAN)], "");
    let assembly = build(&config).await;

    let report = assembly
        .runner
        .run_plan("root", "greet", &Context::new())
        .await
        .unwrap();

    assert_eq!(report.title, "Greeting");
    assert_eq!(report.status, PlanStatus::Complete);
    let c2 = report.node("c2").unwrap().output_context.as_ref().unwrap();
    assert_eq!(c2["goal"], "second");
    assert_eq!(c2["context"]["c1"]["goal"], "first");
    assert_eq!(c2["context"]["c1"]["result"]["goal"], "first");
}

#[tokio::test]
async fn test_capability_outputs_and_isolated_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[("Root", SUM_PLAN)], "");
    let assembly = build(&config).await;

    let report = assembly
        .runner
        .run_plan("root", "add", &Context::new())
        .await
        .unwrap();

    assert_eq!(report.status, PlanStatus::Failed);

    let c1 = report.node("c1").unwrap();
    assert_eq!(c1.status, NodeStatus::Complete);
    assert_eq!(
        c1.output_context.as_ref().unwrap(),
        &ctx(json!({"sum": 6.0, "count": 3}))
    );

    let c2 = report.node("c2").unwrap();
    assert_eq!(c2.status, NodeStatus::Failed);
    assert!(c2.error.as_deref().unwrap().contains("Validation failed for sum input"));

    let c3 = report.node("c3").unwrap();
    assert_eq!(c3.status, NodeStatus::Complete);
    assert_eq!(
        c3.output_context.as_ref().unwrap()["context"]["c1"]["result"]["sum"],
        json!(6.0)
    );
}

#[tokio::test]
async fn test_xml_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[("Root", XML_PLAN)], "");
    let assembly = build(&config).await;

    let report = assembly
        .runner
        .run_plan("root", "greet", &Context::new())
        .await
        .unwrap();
    assert_eq!(report.status, PlanStatus::Complete);
    assert_eq!(report.nodes.len(), 2);
    assert_eq!(report.nodes[1].executor, "Echo");
}

#[tokio::test]
async fn test_nested_planner_reports_inner_outputs() {
    let outer = r#"{
      "title": "Outer",
      "nodes": [
        {"id": "n1", "executorName": "Inner", "goal": "delegate"},
        {"id": "n2", "executorName": "Echo", "goal": "wrap up", "dependencies": ["n1"]}
      ]
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[("Root", outer), ("Inner", CHAIN_PLAN)],
        "\n[runtime]\nroot_executor = \"root\"\n",
    );
    let assembly = build(&config).await;

    let report = assembly
        .runner
        .run_plan("root", "go", &Context::new())
        .await
        .unwrap();

    assert_eq!(report.status, PlanStatus::Complete);
    let n1 = report.node("n1").unwrap().output_context.as_ref().unwrap();
    assert_eq!(n1["c1"]["goal"], "first");
    assert_eq!(n1["c2"]["goal"], "second");
    let n2 = report.node("n2").unwrap().output_context.as_ref().unwrap();
    assert_eq!(n2["context"]["n1"]["result"]["c2"]["goal"], "second");
}

#[tokio::test]
async fn test_deadlock_is_reported_as_error() {
    let plan = r#"{
      "nodes": [
        {"id": "c1", "executorName": "Calculator", "goal": "fail",
         "context": {"tool": "sum", "input": {"operands": [1]}}},
        {"id": "c2", "executorName": "Echo", "dependencies": ["c1"]},
        {"id": "c3", "executorName": "Echo", "dependencies": ["c2"]}
      ]
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), &[("Root", plan)], "");
    let assembly = build(&config).await;

    let err = assembly
        .runner
        .run_plan("root", "go", &Context::new())
        .await
        .unwrap_err();
    match err {
        ScribeError::Deadlock { stuck } => assert_eq!(stuck, vec!["c2", "c3"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_construction_errors_abort_before_scheduling() {
    let too_many = json!({
        "nodes": (0..7)
            .map(|i| json!({"id": format!("c{}", i), "executorName": "Echo"}))
            .collect::<Vec<_>>()
    })
    .to_string();
    let unknown = r#"{"nodes": [{"id": "c1", "executorName": "Ghost"}]}"#;
    let cyclic = r#"{"nodes": [
        {"id": "a", "executorName": "Echo", "dependencies": ["b"]},
        {"id": "b", "executorName": "Echo", "dependencies": ["a"]}
    ]}"#;

    let dir = tempfile::tempdir().unwrap();
    let config = setup(
        dir.path(),
        &[("Big", too_many.as_str()), ("Ghostly", unknown), ("Loop", cyclic)],
        "",
    );
    let assembly = build(&config).await;
    let mut rx = assembly.runner.events().subscribe();

    let err = assembly.runner.run_plan("big", "x", &Context::new()).await.unwrap_err();
    assert!(matches!(err, ScribeError::PlanTooLarge { count: 7, limit: 6 }));

    let err = assembly.runner.run_plan("ghostly", "x", &Context::new()).await.unwrap_err();
    assert!(matches!(err, ScribeError::Reference(_)));

    let err = assembly.runner.run_plan("loop", "x", &Context::new()).await.unwrap_err();
    assert!(matches!(err, ScribeError::Structural(ref m) if m.contains("cycle")));

    // Nothing was scheduled
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_run_log_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let config = setup(dir.path(), &[("Root", CHAIN_PLAN)], "");
    let events = Arc::new(EventBus::default());
    let handle = RunLogger::new(&log_dir).spawn(&events, CancellationToken::new());

    let assembly = assemble(&config, events.clone(), CancellationToken::new())
        .await
        .unwrap();
    assembly
        .runner
        .run_plan("root", "greet", &Context::new())
        .await
        .unwrap();

    let path = handle.await.unwrap().expect("log file");
    assert!(path.starts_with(&log_dir));
    let content = std::fs::read_to_string(path).unwrap();
    let types: Vec<String> = content
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["event_type"]
            .as_str()
            .unwrap()
            .to_string())
        .collect();
    assert_eq!(types.first().map(String::as_str), Some("plan_started"));
    assert_eq!(types.last().map(String::as_str), Some("plan_finished"));
    assert_eq!(types.iter().filter(|t| *t == "node_completed").count(), 2);
}
