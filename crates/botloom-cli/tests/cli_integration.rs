//! Integration tests for the botloom-cli commands.
//!
//! These exercise the same code paths as the binary against in-memory
//! SQLite databases.

use std::io::Write;
use std::sync::Arc;

use botloom_cli::commands;
use botloom_core::state::{EngineState, EngineStateInner};
use botloom_core::{Database, EngineConfig};

const PROGRAM: &str = r#"
# greeter
bot "Greeter"
  description "Says hello"
  on message
    say "hi"
    call memory.set key="topic" value="greetings"
    call memory.append key="log" value="seen"
  end
  on broken
    call missing.tool
  end
end
"#;

fn test_state() -> EngineState {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    Arc::new(EngineStateInner::new(db, EngineConfig::default()))
}

fn program_file(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn path(file: &tempfile::NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

#[test]
fn test_compile_reports_blocks() {
    let file = program_file(PROGRAM);
    let report = commands::compile::compile_file(&path(&file)).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["blocks"][0]["name"], "Greeter");
    assert_eq!(report["blocks"][0]["events"].as_array().unwrap().len(), 2);
}

#[test]
fn test_compile_error_is_reported_not_raised() {
    let file = program_file("bot \"Open\"\n  on message\n");
    let report = commands::compile::compile_file(&path(&file)).unwrap();
    assert_eq!(report["success"], false);
    assert!(report["error"].as_str().unwrap().contains("missing 'end'"));

    let err = commands::compile::validate(&path(&file)).unwrap_err();
    assert!(err.contains("Line"));
}

#[test]
fn test_validate_lists_declared_capabilities() {
    let file = program_file(PROGRAM);
    let summary = commands::compile::validate(&path(&file)).unwrap();
    assert_eq!(summary["valid"], true);
    let caps = &summary["blocks"][0]["capabilities"];
    assert_eq!(
        caps,
        &serde_json::json!(["memory.set", "memory.append", "missing.tool"])
    );
}

#[test]
fn test_missing_file_is_an_error() {
    let err = commands::compile::compile_file("/nonexistent/botloom.bot").unwrap_err();
    assert!(err.contains("Failed to read"));
}

#[tokio::test]
async fn test_bot_create_get_and_list() {
    let state = test_state();
    let file = program_file(PROGRAM);

    let bot = commands::bot::create(&state, &path(&file), "Greeter", Some("greeter"), None)
        .await
        .unwrap();
    assert_eq!(bot["id"], "greeter");
    assert_eq!(bot["name"], "Greeter");
    assert_eq!(bot["capabilities"].as_array().unwrap().len(), 3);

    let fetched = commands::bot::get(&state, "greeter").await.unwrap();
    assert_eq!(fetched["name"], "Greeter");

    let listed = commands::bot::list(&state).await.unwrap();
    assert_eq!(listed["count"], 1);

    assert!(commands::bot::get(&state, "nobody").await.is_err());

    let deleted = commands::bot::delete(&state, "greeter").await.unwrap();
    assert_eq!(deleted["deleted"], "greeter");
    assert!(commands::bot::get(&state, "greeter").await.is_err());
    assert!(commands::bot::delete(&state, "greeter").await.is_err());
    assert!(
        commands::bot::create(&state, &path(&file), "Nope", None, None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_run_event_and_fetch_status() {
    let state = test_state();
    let file = program_file(PROGRAM);
    commands::bot::create(&state, &path(&file), "Greeter", Some("greeter"), None)
        .await
        .unwrap();

    let outcome = commands::run::run(
        &state,
        commands::run::RunArgs {
            bot_id: "greeter",
            file: &path(&file),
            event: "message",
            block: None,
            triggered_by: Some("test"),
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome["status"], "succeeded");
    assert_eq!(outcome["steps"].as_array().unwrap().len(), 2);
    assert!(!commands::run::is_failed(&outcome));

    let run_id = outcome["runId"].as_str().unwrap();
    let status = commands::run::status(&state, run_id).await.unwrap();
    assert_eq!(status["run"]["status"], "succeeded");
    assert_eq!(status["run"]["triggeredBy"], "test");
    assert!(!status["transcript"].as_array().unwrap().is_empty());

    // Second run reuses the compiled program.
    commands::run::run(
        &state,
        commands::run::RunArgs {
            bot_id: "greeter",
            file: &path(&file),
            event: "message",
            block: Some("Greeter"),
            triggered_by: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(state.cache.compile_count(), 1);
}

#[tokio::test]
async fn test_run_with_only_unknown_capabilities_fails() {
    let state = test_state();
    let file = program_file(PROGRAM);
    commands::bot::create(&state, &path(&file), "Greeter", Some("greeter"), None)
        .await
        .unwrap();

    let outcome = commands::run::run(
        &state,
        commands::run::RunArgs {
            bot_id: "greeter",
            file: &path(&file),
            event: "broken",
            block: None,
            triggered_by: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome["status"], "failed");
    assert!(commands::run::is_failed(&outcome));
}

#[tokio::test]
async fn test_run_unknown_event_or_bot() {
    let state = test_state();
    let file = program_file(PROGRAM);
    commands::bot::create(&state, &path(&file), "Greeter", Some("greeter"), None)
        .await
        .unwrap();

    let err = commands::run::run(
        &state,
        commands::run::RunArgs {
            bot_id: "greeter",
            file: &path(&file),
            event: "shutdown",
            block: None,
            triggered_by: None,
        },
    )
    .await
    .unwrap_err();
    assert!(err.contains("no 'shutdown' handler"));

    let err = commands::run::run(
        &state,
        commands::run::RunArgs {
            bot_id: "ghost",
            file: &path(&file),
            event: "message",
            block: None,
            triggered_by: None,
        },
    )
    .await
    .unwrap_err();
    assert!(err.contains("not found"));

    assert!(commands::run::status(&state, "no-such-run").await.is_err());
}

#[tokio::test]
async fn test_workforce_with_scripted_reasoner() {
    let state = test_state();
    let script = program_file(
        r#"[
            {"roles": ["Analyst"], "tasks": {"Analyst": "look at the numbers"}},
            {"final_answer": "numbers look fine"}
        ]"#,
    );

    let outcome = commands::workforce::run(
        &state,
        commands::workforce::WorkforceArgs {
            request: "review the report",
            max_agents: Some(2),
            script: Some(&path(&script)),
            tenant: Some("acme"),
            progress: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["iterations"].as_array().unwrap().len(), 1);
    assert_eq!(outcome["iterations"][0]["roles"][0], "Analyst");
    assert_eq!(
        outcome["iterations"][0]["outputs"][0]["finalAnswer"],
        "numbers look fine"
    );
}

#[tokio::test]
async fn test_workforce_without_reasoner_is_an_error() {
    let state = test_state();
    let err = commands::workforce::run(
        &state,
        commands::workforce::WorkforceArgs {
            request: "anything",
            max_agents: None,
            script: None,
            tenant: None,
            progress: false,
        },
    )
    .await
    .unwrap_err();
    assert!(err.contains("need a reasoner"));
}

#[test]
fn test_capabilities_lists_builtins() {
    let state = test_state();
    let listed = commands::capabilities::list(&state).unwrap();
    assert_eq!(listed["count"], 6);
    let ids: Vec<&str> = listed["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["capabilityId"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"memory.set"));
    assert!(ids.contains(&"bus.request_role"));
}
