//! End-to-end runs through the library: agent, tools, runner and trace file.

use agent_maker::core::redact::{Privacy, Redactor};
use agent_maker::core::types::{PlanStatus, Role, TraceKind};
use agent_maker::io::trace_store::read_trace;
use agent_maker::runner::{RunStop, Runner};
use agent_maker::test_support::{TestWorkspace, scripted_agent};
use serde_json::json;

fn runner(ws: &TestWorkspace, max_steps: u32, privacy: Privacy) -> Runner {
    Runner::new(max_steps, ws.run_dir(), true, Redactor::new(privacy, "***", 2000))
}

#[test]
fn todo_then_final_persists_one_tool_event() {
    let ws = TestWorkspace::new();
    let mut agent = scripted_agent(
        &ws,
        &["todo"],
        &[
            json!({"tool": {"name": "todo", "args": {"op": "add", "text": "buy milk"}}}),
            json!({"final": "done"}),
        ],
    );

    let result = runner(&ws, 2, Privacy::Standard)
        .run(&mut agent, "add buy milk to plan")
        .expect("run");

    assert_eq!(result.output, "done");
    assert_eq!(result.steps, 2);
    let items = agent.state().plan.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "buy milk");
    assert_eq!(items[0].status, PlanStatus::Pending);

    let roles: Vec<_> = agent.state().messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);

    let events = read_trace(&result.trace_path.expect("trace path")).expect("read trace");
    let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            TraceKind::Start,
            TraceKind::ModelOutput,
            TraceKind::Tool,
            TraceKind::ModelOutput,
        ]
    );
    assert_eq!(events[0].data["task"], "add buy milk to plan");
    assert_eq!(events[0].data["run_id"], result.run_id.as_str());
    let last_raw = events[3].data["raw"].as_str().expect("raw output");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(last_raw).expect("json"),
        json!({"final": "done"})
    );
    let count = |kind: TraceKind| events.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(TraceKind::Start), 1);
    assert_eq!(count(TraceKind::Tool), 1);
    assert_eq!(count(TraceKind::ModelOutput), 2);
    let tool = events
        .iter()
        .find(|e| e.kind == TraceKind::Tool)
        .expect("tool event");
    assert_eq!(tool.data["name"], "todo");
    assert_eq!(tool.data["result"]["ok"], true);
}

#[test]
fn fs_tools_round_trip_through_the_workspace() {
    let ws = TestWorkspace::new();
    let mut agent = scripted_agent(
        &ws,
        &["fs"],
        &[
            json!({"tool": {"name": "fs.write", "args": {"path": "notes/a.txt", "content": "hello"}}}),
            json!({"tool": {"name": "fs.read", "args": {"path": "notes/a.txt"}}}),
            json!({"tool": {"name": "fs.read", "args": {"path": "../outside.txt"}}}),
            json!({"final": "read it"}),
        ],
    );

    let result = runner(&ws, 6, Privacy::Standard)
        .run(&mut agent, "write and read")
        .expect("run");
    assert!(result.is_final());
    assert_eq!(
        std::fs::read_to_string(ws.workspace().join("notes/a.txt")).expect("written"),
        "hello"
    );

    let events = read_trace(&result.trace_path.expect("trace path")).expect("read trace");
    let results: Vec<_> = events
        .iter()
        .filter(|e| e.kind == TraceKind::Tool)
        .map(|e| e.data["result"].clone())
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1]["content"], "hello");
    assert_eq!(results[2]["ok"], false);
    assert!(!ws.path().join("outside.txt").exists());
}

#[test]
fn budget_exhaustion_yields_empty_output() {
    let ws = TestWorkspace::new();
    let mut agent = scripted_agent(&ws, &["todo"], &[json!({"thought": "hmm"})]);

    let result = runner(&ws, 1, Privacy::Standard)
        .run(&mut agent, "think forever")
        .expect("run");

    assert_eq!(result.output, "");
    assert_eq!(result.steps, 1);
    assert!(!result.is_final());
    assert!(matches!(result.stop, RunStop::BudgetExhausted { last: Some(_) }));

    let events = read_trace(&result.trace_path.expect("trace path")).expect("read trace");
    let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec![TraceKind::Start, TraceKind::ModelOutput]);
    assert_eq!(events.len(), agent.state().trace().len());
    let raw = events[1].data["raw"].as_str().expect("raw output");
    assert!(raw.contains("hmm"));
}

#[test]
fn strict_privacy_redacts_persisted_trace_only() {
    let ws = TestWorkspace::new();
    let mut agent = scripted_agent(
        &ws,
        &["todo"],
        &[json!({"final": "ok"})],
    );

    let result = runner(&ws, 2, Privacy::Strict)
        .run(&mut agent, "my api_key is abc123")
        .expect("run");

    let events = read_trace(&result.trace_path.expect("trace path")).expect("read trace");
    let start = &events[0];
    assert_eq!(start.kind, TraceKind::Start);
    assert_eq!(start.data["task"], "***");

    let in_memory = &agent.state().trace()[0];
    assert_eq!(in_memory.data["task"], "my api_key is abc123");
}

#[test]
fn disabled_tracing_leaves_run_dir_absent() {
    let ws = TestWorkspace::new();
    let mut agent = scripted_agent(&ws, &[], &[json!({"final": "ok"})]);
    let runner = Runner::new(
        2,
        ws.run_dir(),
        false,
        Redactor::new(Privacy::Standard, "***", 2000),
    );

    let result = runner.run(&mut agent, "quiet").expect("run");
    assert!(result.trace_path.is_none());
    assert!(!ws.run_dir().exists());
}
