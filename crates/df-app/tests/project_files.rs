//! Loading, running and saving project files through the service layer.

use std::path::PathBuf;
use std::sync::Arc;

use df_app::{
    list_functions, load_project, load_session, project_from_session, save_session, MemoryLog,
    RunOutcome, Scheduler,
};
use df_core::MemoryDocument;
use df_eval::Expr;

const PROJECT: &str = r#"
version: 1
name: doubling
functions:
  - name: double
    category: math
    workspace:
      nodes:
        - id: 00000000-0000-0000-0000-00000000000a
          name: n
          kind: { type: Symbol, name: n }
        - id: 00000000-0000-0000-0000-00000000000b
          name: two
          kind: { type: Number, value: 2.0 }
        - id: 00000000-0000-0000-0000-00000000000c
          name: times
          kind: { type: Multiply }
      connectors:
        - { start: 00000000-0000-0000-0000-00000000000a, end: 00000000-0000-0000-0000-00000000000c, end_index: 0 }
        - { start: 00000000-0000-0000-0000-00000000000b, end: 00000000-0000-0000-0000-00000000000c, end_index: 1 }
home:
  nodes:
    - id: 00000000-0000-0000-0000-000000000001
      name: input
      kind: { type: Number, value: 21.0 }
    - id: 00000000-0000-0000-0000-000000000002
      name: result
      kind: { type: Function, symbol: double }
  connectors:
    - { start: 00000000-0000-0000-0000-000000000001, end: 00000000-0000-0000-0000-000000000002, end_index: 0 }
settings:
  transaction_name: Double it
"#;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("df-app-{}-{}", uuid::Uuid::new_v4(), name))
}

#[test]
fn load_run_save_reload() {
    let path = temp_path("doubling.yaml");
    std::fs::write(&path, PROJECT).unwrap();

    let project = load_project(&path).expect("project should load");
    let functions = list_functions(&project);
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].parameters, vec!["n".to_string()]);

    let doc = Arc::new(MemoryDocument::new());
    let session = load_session(&path, doc.clone(), Arc::new(MemoryLog::new())).unwrap();
    let scheduler = Scheduler::new(session).unwrap();

    let reports = scheduler.run_blocking();
    assert_eq!(reports[0].outcome, RunOutcome::Success);
    assert_eq!(reports[0].evaluated.len(), 1);
    assert_eq!(reports[0].evaluated[0].1, Expr::Number(42.0));
    assert_eq!(doc.committed_transactions(), vec!["Double it".to_string()]);

    let saved = temp_path("saved.json");
    scheduler
        .with_session(|session| save_session(&saved, session, "doubling"))
        .unwrap();
    let reloaded = load_project(&saved).unwrap();
    let original = scheduler.with_session(|session| project_from_session(session, "doubling"));
    assert_eq!(reloaded, original);
    assert_eq!(reloaded.settings.transaction_name.as_deref(), Some("Double it"));

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(&saved);
}

#[test]
fn invalid_project_is_rejected() {
    let path = temp_path("broken.yaml");
    std::fs::write(
        &path,
        PROJECT.replace("end_index: 1 }", "end_index: 0 }"),
    )
    .unwrap();

    let err = load_project(&path).unwrap_err();
    assert!(err.to_string().contains("Validation error"));
    let _ = std::fs::remove_file(&path);
}
