//! Role loading and role-in-play execution tests.

use statecraft::inventory::Inventory;
use statecraft::playbook::{Playbook, PlaybookRunner};
use statecraft::registry::TaskRegistry;
use statecraft::roles;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn main_yml_shadows_main_directory() {
    let tmp = TempDir::new().unwrap();
    write(&tmp.path().join("defaults/main.yml"), "winner: main_yml\n");
    write(
        &tmp.path().join("defaults/main/ignored.yml"),
        "winner: main_dir\nextra: 1\n",
    );

    let vars = roles::load_role_vars(tmp.path()).unwrap();
    assert_eq!(
        vars.defaults.get("winner"),
        Some(&serde_yaml::from_str("main_yml").unwrap())
    );
    assert!(!vars.defaults.contains("extra"));
}

#[test]
fn fallback_chain_order() {
    // main.yaml used when main.yml is absent
    let tmp = TempDir::new().unwrap();
    write(&tmp.path().join("vars/main.yaml"), "src: yaml\n");
    write(&tmp.path().join("vars/main"), "src: plain\n");
    let vars = roles::load_role_vars(tmp.path()).unwrap();
    assert_eq!(
        vars.vars.get("src"),
        Some(&serde_yaml::from_str("yaml").unwrap())
    );

    // plain `main` file used when both yml variants are absent
    let tmp = TempDir::new().unwrap();
    write(&tmp.path().join("vars/main"), "src: plain\n");
    let vars = roles::load_role_vars(tmp.path()).unwrap();
    assert_eq!(
        vars.vars.get("src"),
        Some(&serde_yaml::from_str("plain").unwrap())
    );
}

#[test]
fn role_tasks_run_with_role_relative_paths() {
    let tmp = TempDir::new().unwrap();
    let play_dir = tmp.path().join("site");
    let role = play_dir.join("roles/web");

    write(
        &role.join("tasks/main.yml"),
        "- template:\n    src: conf.j2\n    dest: \"{{ conf_dest }}\"\n",
    );
    write(&role.join("templates/conf.j2"), "port={{ http_port }}\n");
    write(&role.join("defaults/main.yml"), "http_port: 80\n");

    let dest = tmp.path().join("rendered.conf");
    write(
        &play_dir.join("site.yml"),
        &format!(
            "- hosts: all\n  vars:\n    conf_dest: \"{}\"\n  roles:\n    - web\n",
            dest.display()
        ),
    );

    let registry = TaskRegistry::builtin();
    let playbook = Playbook::from_file(&play_dir.join("site.yml"), &registry).unwrap();
    let runner = PlaybookRunner::new(&registry, Inventory::localhost());
    let recap = runner.run(&playbook).unwrap();

    assert_eq!(recap.get("localhost").unwrap().failed, 0);
    assert_eq!(fs::read_to_string(&dest).unwrap(), "port=80\n");
}

#[test]
fn role_vars_override_play_vars_and_defaults() {
    let tmp = TempDir::new().unwrap();
    let play_dir = tmp.path().join("site");
    let role = play_dir.join("roles/app");

    write(&role.join("defaults/main.yml"), "level: defaults\n");
    write(&role.join("vars/main.yml"), "level: role_vars\n");
    write(
        &role.join("tasks/main.yml"),
        "- copy:\n    content: \"{{ level }}\"\n    dest: \"{{ out_file }}\"\n",
    );

    let out = tmp.path().join("level.txt");
    write(
        &play_dir.join("site.yml"),
        &format!(
            "- hosts: all\n  vars:\n    level: play\n    out_file: \"{}\"\n  roles:\n    - app\n",
            out.display()
        ),
    );

    let registry = TaskRegistry::builtin();
    let playbook = Playbook::from_file(&play_dir.join("site.yml"), &registry).unwrap();
    let runner = PlaybookRunner::new(&registry, Inventory::localhost());
    runner.run(&playbook).unwrap();

    assert_eq!(fs::read_to_string(&out).unwrap(), "role_vars");
}

#[test]
fn missing_role_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let play_dir = tmp.path().join("site");
    write(
        &play_dir.join("site.yml"),
        "- hosts: all\n  roles:\n    - ghost\n",
    );

    let registry = TaskRegistry::builtin();
    let playbook = Playbook::from_file(&play_dir.join("site.yml"), &registry).unwrap();
    let runner = PlaybookRunner::new(&registry, Inventory::localhost());
    let recap = runner.run(&playbook).unwrap();
    // The host run fails but the run itself completes with a recap
    assert_eq!(recap.get("localhost").unwrap().failed, 1);
}
