//! Inventory resolution tests: transitive membership and variable
//! precedence across nested and parallel group branches.

use statecraft::inventory::Inventory;
use statecraft::scope::Value;

fn yaml(s: &str) -> Value {
    serde_yaml::from_str(s).unwrap()
}

const NESTED: &str = r#"
europe:
  vars:
    region: europe
    dns: eu.example.com
  children:
    germany:
      vars:
        region: germany
      children:
        berlin:
          hosts:
            web-ber-1:
              rack: b12
            web-ber-2: null
    france:
      hosts:
        web-par-1: null
"#;

#[test]
fn leaf_host_is_member_of_every_ancestor() {
    let inv = Inventory::from_yaml(NESTED).unwrap();
    let groups = inv.find("web-ber-1");
    for expected in ["berlin", "germany", "europe", "all"] {
        assert!(groups.contains(expected), "missing {expected}");
    }
    assert!(!groups.contains("france"));
}

#[test]
fn unknown_host_only_in_all() {
    let inv = Inventory::from_yaml(NESTED).unwrap();
    let groups = inv.find("nowhere");
    assert_eq!(groups.len(), 1);
    assert!(groups.contains("all"));
}

#[test]
fn nearer_group_overrides_farther() {
    let inv = Inventory::from_yaml(NESTED).unwrap();
    let vars = inv.node_vars("web-ber-1");
    assert_eq!(vars.get("region"), Some(&yaml("germany")));
    assert_eq!(vars.get("dns"), Some(&yaml("eu.example.com")));
    assert_eq!(vars.get("rack"), Some(&yaml("b12")));
}

#[test]
fn sibling_branch_vars_do_not_leak() {
    let inv = Inventory::from_yaml(NESTED).unwrap();
    let vars = inv.node_vars("web-par-1");
    assert_eq!(vars.get("region"), Some(&yaml("europe")));
    assert!(!vars.contains("rack"));
}

#[test]
fn spec_precedence_matrix() {
    // Host var x=1; containing group x=2, y=3; parent group x=4, y=5, z=6.
    let inv = Inventory::from_yaml(
        r#"
parent:
  vars:
    x: 4
    y: 5
    z: 6
  children:
    child:
      vars:
        x: 2
        y: 3
      hosts:
        h:
          x: 1
"#,
    )
    .unwrap();

    let vars = inv.node_vars("h");
    assert_eq!(vars.get("x"), Some(&yaml("1")), "host wins");
    assert_eq!(vars.get("y"), Some(&yaml("3")), "nearer group wins");
    assert_eq!(vars.get("z"), Some(&yaml("6")), "inherited from ancestor");
}

#[test]
fn host_claimed_by_parallel_branches_merges_both() {
    let inv = Inventory::from_yaml(
        r#"
webservers:
  vars:
    role_kind: web
  hosts:
    shared: null
monitoring:
  vars:
    monitored: true
  hosts:
    shared: null
"#,
    )
    .unwrap();

    let groups = inv.find("shared");
    assert!(groups.contains("webservers"));
    assert!(groups.contains("monitoring"));

    let vars = inv.node_vars("shared");
    assert_eq!(vars.get("role_kind"), Some(&yaml("web")));
    assert_eq!(vars.get("monitored"), Some(&yaml("true")));
}

#[test]
fn group_pattern_selects_transitive_hosts() {
    let inv = Inventory::from_yaml(NESTED).unwrap();
    assert_eq!(
        inv.hosts_matching("germany"),
        vec!["web-ber-1".to_string(), "web-ber-2".to_string()]
    );
    assert_eq!(
        inv.hosts_matching("europe").len(),
        3,
        "europe contains all three hosts"
    );
}
