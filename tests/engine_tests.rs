//! End-to-end tests for the task execution engine with real modules.
//!
//! Covers the task lifecycle against actual side effects:
//! - conditionals gating execution and registration
//! - loop rendering, ordering, and result registration
//! - register feeding subsequent tasks' templates
//! - file-module idempotence
//! - import_tasks/include_tasks splicing

use statecraft::engine::Engine;
use statecraft::registry::TaskRegistry;
use statecraft::scope::{Scope, Value};
use statecraft::task::{ExecutionContext, Task};
use tempfile::TempDir;

fn task_from_yaml(yaml: &str, registry: &TaskRegistry) -> Task {
    let value: Value = serde_yaml::from_str(yaml).unwrap();
    Task::from_value(&value, registry).unwrap()
}

#[test]
fn loop_with_register_records_ordered_stdout() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();

    let task = task_from_yaml(
        r#"
name: t
loop: [x, y]
register: r
ansible.builtin.command:
  cmd: "echo {{ item }}"
"#,
        &registry,
    );

    engine.run_task(&task, &mut scope).unwrap();

    let registered = scope.get("r").unwrap().as_mapping().unwrap();
    assert_eq!(registered.get("changed"), Some(&Value::Bool(true)));

    let results = registered.get("results").unwrap().as_sequence().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0].as_mapping().unwrap().get("stdout").and_then(Value::as_str),
        Some("x\n")
    );
    assert_eq!(
        results[1].as_mapping().unwrap().get("stdout").and_then(Value::as_str),
        Some("y\n")
    );
}

#[test]
fn registered_result_feeds_later_tasks() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();

    let first = task_from_yaml(
        r#"
command: echo payload
register: out
"#,
        &registry,
    );
    let second = task_from_yaml(
        r#"
command: "echo rc was {{ out.rc }}"
register: echoed
"#,
        &registry,
    );

    engine.run_tasks(&[first, second], &mut scope).unwrap();

    let echoed = scope.get("echoed").unwrap().as_mapping().unwrap();
    assert_eq!(
        echoed.get("stdout").and_then(Value::as_str),
        Some("rc was 0\n")
    );
}

#[test]
fn when_false_skips_without_register() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();

    let task = task_from_yaml(
        r#"
when: "false"
command: echo never
register: r
"#,
        &registry,
    );

    let result = engine.run_task(&task, &mut scope).unwrap();
    assert!(result.is_skipped());
    assert!(!scope.contains("r"));
}

#[test]
fn when_condition_uses_registered_rc() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("ran");

    let tasks = vec![
        task_from_yaml("{command: echo probe, register: probe}", &registry),
        task_from_yaml(
            &format!(
                "{{when: \"probe.rc == 0\", command: \"touch {}\"}}",
                marker.display()
            ),
            &registry,
        ),
    ];

    engine.run_tasks(&tasks, &mut scope).unwrap();
    assert!(marker.exists());
}

#[test]
fn loop_items_render_per_iteration_into_files() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();
    let tmp = TempDir::new().unwrap();
    scope.set(
        "names",
        serde_yaml::from_str("[alpha, beta, gamma]").unwrap(),
    );

    let task = task_from_yaml(
        &format!(
            r#"
loop: "{{{{ names }}}}"
file:
  path: "{}/{{{{ item }}}}"
  state: touch
"#,
            tmp.path().display()
        ),
        &registry,
    );

    engine.run_task(&task, &mut scope).unwrap();
    for name in ["alpha", "beta", "gamma"] {
        assert!(tmp.path().join(name).is_file(), "missing {name}");
    }
}

#[test]
fn file_touch_reports_changed_and_never_fails_on_rerun() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("touched");

    let task = task_from_yaml(
        &format!(
            "{{file: {{path: \"{}\", state: touch, mode: \"0644\"}}, register: r}}",
            path.display()
        ),
        &registry,
    );

    engine.run_task(&task, &mut scope).unwrap();
    let first = scope.get("r").unwrap().as_mapping().unwrap();
    assert_eq!(first.get("changed"), Some(&Value::Bool(true)));
    assert!(path.is_file());

    // Second run re-applies attributes but must not fail
    engine.run_task(&task, &mut scope).unwrap();
    let second = scope.get("r").unwrap().as_mapping().unwrap();
    assert_eq!(second.get("failed"), Some(&Value::Bool(false)));
}

#[test]
fn failed_command_aborts_task_stream() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("after");

    let tasks = vec![
        task_from_yaml("{command: \"false\", register: r}", &registry),
        task_from_yaml(
            &format!("{{command: \"touch {}\"}}", marker.display()),
            &registry,
        ),
    ];

    let err = engine.run_tasks(&tasks, &mut scope).unwrap_err();
    assert!(err.to_string().contains("failed"));
    // The failure is registered before the stream aborts
    let registered = scope.get("r").unwrap().as_mapping().unwrap();
    assert_eq!(registered.get("failed"), Some(&Value::Bool(true)));
    // The subsequent task never ran
    assert!(!marker.exists());
}

#[test]
fn import_tasks_splices_nested_file() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("nested-ran");
    std::fs::write(
        tmp.path().join("nested.yml"),
        format!("- command: \"touch {}\"\n", marker.display()),
    )
    .unwrap();

    let ctx = ExecutionContext {
        base_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    };
    let engine = Engine::new(&registry).with_context(ctx);
    let mut scope = Scope::new();

    let task = task_from_yaml("{import_tasks: nested.yml}", &registry);
    let result = engine.run_task(&task, &mut scope).unwrap();
    assert!(result.is_changed());
    assert!(marker.exists());
}

#[test]
fn include_tasks_respects_condition() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("never");
    std::fs::write(
        tmp.path().join("nested.yml"),
        format!("- command: \"touch {}\"\n", marker.display()),
    )
    .unwrap();

    let ctx = ExecutionContext {
        base_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    };
    let engine = Engine::new(&registry).with_context(ctx);
    let mut scope = Scope::new();

    let task = task_from_yaml(
        "{include_tasks: nested.yml, when: \"false\"}",
        &registry,
    );
    let result = engine.run_task(&task, &mut scope).unwrap();
    assert!(result.is_skipped());
    assert!(!marker.exists());
}

#[test]
fn include_file_name_is_templated() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("templated");
    std::fs::write(
        tmp.path().join("chosen.yml"),
        format!("- command: \"touch {}\"\n", marker.display()),
    )
    .unwrap();

    let ctx = ExecutionContext {
        base_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    };
    let engine = Engine::new(&registry).with_context(ctx);
    let mut scope = Scope::new();
    scope.set("which", Value::String("chosen".to_string()));

    let task = task_from_yaml("{include_tasks: \"{{ which }}.yml\"}", &registry);
    engine.run_task(&task, &mut scope).unwrap();
    assert!(marker.exists());
}

#[test]
fn copy_content_is_idempotent_across_runs() {
    let registry = TaskRegistry::builtin();
    let engine = Engine::new(&registry);
    let mut scope = Scope::new();
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("conf");

    let task = task_from_yaml(
        &format!(
            "{{copy: {{content: \"v=1\\n\", dest: \"{}\"}}, register: r}}",
            dest.display()
        ),
        &registry,
    );

    engine.run_task(&task, &mut scope).unwrap();
    assert_eq!(
        scope.get("r").unwrap().as_mapping().unwrap().get("changed"),
        Some(&Value::Bool(true))
    );

    engine.run_task(&task, &mut scope).unwrap();
    assert_eq!(
        scope.get("r").unwrap().as_mapping().unwrap().get("changed"),
        Some(&Value::Bool(false))
    );
}

#[test]
fn template_content_renders_scope_variables() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("app.conf.j2"), "listen {{ port }}\n").unwrap();
    let dest = tmp.path().join("app.conf");

    let ctx = ExecutionContext {
        base_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    };
    let engine = Engine::new(&registry).with_context(ctx);
    let mut scope = Scope::new();
    scope.set("port", serde_yaml::from_str("8080").unwrap());

    let task = task_from_yaml(
        &format!(
            "{{template: {{src: app.conf.j2, dest: \"{}\"}}}}",
            dest.display()
        ),
        &registry,
    );
    engine.run_task(&task, &mut scope).unwrap();
    assert_eq!(
        std::fs::read_to_string(&dest).unwrap(),
        "listen 8080\n"
    );
}
