//! Playbook wire-format and runner tests.

use statecraft::inventory::Inventory;
use statecraft::playbook::{Playbook, PlaybookRunner, RunOptions};
use statecraft::registry::TaskRegistry;
use statecraft::scope::Scope;
use std::fs;
use tempfile::TempDir;

#[test]
fn unknown_module_key_is_an_error_not_ignored() {
    let registry = TaskRegistry::builtin();
    let err = Playbook::from_yaml(
        r#"
- hosts: all
  tasks:
    - name: bad
      not_a_module:
        x: 1
"#,
        &registry,
    )
    .unwrap_err();
    assert!(err.to_string().contains("not_a_module"));
}

#[test]
fn task_with_two_module_keys_is_rejected() {
    let registry = TaskRegistry::builtin();
    assert!(Playbook::from_yaml(
        r#"
- hosts: all
  tasks:
    - command: echo a
      shell: echo b
"#,
        &registry,
    )
    .is_err());
}

#[test]
fn end_to_end_playbook_run_on_localhost() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out.txt");

    let playbook = Playbook::from_yaml(
        &format!(
            r#"
- name: demo
  hosts: all
  vars:
    message: from the play
  tasks:
    - name: write it
      copy:
        content: "{{{{ message }}}}"
        dest: "{}"
    - name: skipped one
      command: echo never
      when: "false"
"#,
            out.display()
        ),
        &registry,
    )
    .unwrap();

    let runner = PlaybookRunner::new(&registry, Inventory::localhost());
    let recap = runner.run(&playbook).unwrap();

    let tally = recap.get("localhost").unwrap();
    assert_eq!(tally.changed, 1);
    assert_eq!(tally.skipped, 1);
    assert_eq!(tally.failed, 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "from the play");
}

#[test]
fn limit_restricts_hosts() {
    let registry = TaskRegistry::builtin();
    let inventory = Inventory::from_yaml(
        r#"
web:
  hosts:
    a: null
    b: null
"#,
    )
    .unwrap();

    let playbook = Playbook::from_yaml(
        r#"
- hosts: web
  tasks:
    - debug:
        msg: "hi"
"#,
        &registry,
    )
    .unwrap();

    let runner = PlaybookRunner::new(&registry, inventory).with_options(RunOptions {
        limit: Some("a".to_string()),
        ..Default::default()
    });
    let recap = runner.run(&playbook).unwrap();
    assert!(recap.contains_key("a"));
    assert!(!recap.contains_key("b"));
}

#[test]
fn check_mode_reports_without_applying() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("never-written");

    let playbook = Playbook::from_yaml(
        &format!(
            r#"
- hosts: all
  tasks:
    - copy:
        content: "data"
        dest: "{}"
"#,
            out.display()
        ),
        &registry,
    )
    .unwrap();

    let runner = PlaybookRunner::new(&registry, Inventory::localhost()).with_options(RunOptions {
        check_mode: true,
        ..Default::default()
    });
    let recap = runner.run(&playbook).unwrap();
    assert_eq!(recap.get("localhost").unwrap().changed, 1);
    assert!(!out.exists());
}

#[test]
fn inventory_vars_flow_into_tasks() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("who.txt");

    let inventory = Inventory::from_yaml(
        r#"
web:
  vars:
    site: example.org
  hosts:
    localhost: null
"#,
    )
    .unwrap();

    let playbook = Playbook::from_yaml(
        &format!(
            r#"
- hosts: web
  tasks:
    - copy:
        content: "{{{{ site }}}} on {{{{ inventory_hostname }}}}"
        dest: "{}"
"#,
            out.display()
        ),
        &registry,
    )
    .unwrap();

    let runner = PlaybookRunner::new(&registry, inventory);
    runner.run(&playbook).unwrap();
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "example.org on localhost"
    );
}

#[test]
fn extra_vars_override_play_vars() {
    let registry = TaskRegistry::builtin();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("color.txt");

    let playbook = Playbook::from_yaml(
        &format!(
            r#"
- hosts: all
  vars:
    color: play
  tasks:
    - copy:
        content: "{{{{ color }}}}"
        dest: "{}"
"#,
            out.display()
        ),
        &registry,
    )
    .unwrap();

    let mut extra = Scope::new();
    extra.set("color", serde_yaml::from_str("extra").unwrap());
    let runner = PlaybookRunner::new(&registry, Inventory::localhost()).with_options(RunOptions {
        extra_vars: extra,
        ..Default::default()
    });
    runner.run(&playbook).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "extra");
}
