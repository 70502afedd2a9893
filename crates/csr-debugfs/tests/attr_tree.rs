//! Integration tests for the attribute tree.

#![allow(clippy::pedantic, clippy::nursery)]

use std::fs;
use std::path::{Path, PathBuf};

use csr_core::state::{CSR_CPUID, CSR_SAVE0};
use csr_core::{DispatchStrategy, Task};
use csr_debugfs::{AttrError, AttrTree, ConfigError, DebugfsConfig};
use log as _;
use rstest::rstest;
use serde as _;
use serde_json as _;
use thiserror as _;

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("probe.json");
    fs::write(&path, content).unwrap();
    path
}

fn default_tree() -> AttrTree {
    AttrTree::from_config(DebugfsConfig::default()).expect("tree")
}

#[test]
fn mask_round_trips_in_fixed_width_hex() {
    let tree = default_tree();
    let task = Task::new(0);
    assert_eq!(tree.read_to_string("mask", &task).unwrap(), "0x0000000000000000\n");

    tree.write("mask", "0xFFFFFFFF00000000\n").unwrap();
    assert_eq!(tree.read_to_string("mask", &task).unwrap(), "0xffffffff00000000\n");

    tree.write("mask", "255").unwrap();
    assert_eq!(tree.read_to_string("mask", &task).unwrap(), "0x00000000000000ff\n");
}

#[test]
fn mask_alias_under_poke_shares_the_operand() {
    let tree = default_tree();
    let task = Task::new(3);
    tree.write("poke/mask", "0xff00").unwrap();
    assert_eq!(tree.read_to_string("mask", &task).unwrap(), "0x000000000000ff00\n");
    assert_eq!(tree.read_to_string("poke/mask", &task).unwrap(), "0x000000000000ff00\n");
    assert_eq!(tree.read_to_string("poke/48", &task).unwrap(), "0x000000000000ff00\n");

    tree.write("mask", "1").unwrap();
    assert_eq!(tree.read_to_string("poke/mask", &task).unwrap(), "0x0000000000000001\n");
}

#[rstest]
#[case("mask", "0xnothex")]
#[case("poke/mask", "mask")]
#[case("mask", "")]
#[case("csr", "0x30")]
#[case("csr", "-4")]
fn unparsable_writes_are_rejected(#[case] path: &str, #[case] text: &str) {
    let tree = default_tree();
    assert!(matches!(
        tree.write(path, text),
        Err(AttrError::InvalidValue { .. })
    ));
}

#[rstest]
#[case("read/32")]
#[case("poke/32")]
#[case("poke-32")]
#[case("global/read/32")]
#[case("csr-read")]
fn read_only_nodes_refuse_writes(#[case] path: &str) {
    let tree = default_tree();
    assert!(matches!(
        tree.write(path, "1"),
        Err(AttrError::PermissionDenied(denied)) if denied == path
    ));
}

#[test]
fn unknown_paths_are_not_found() {
    let tree = default_tree();
    let task = Task::new(0);
    assert!(matches!(tree.open("read/16384", &task), Err(AttrError::NotFound(_))));
    assert!(matches!(tree.write("global", "1"), Err(AttrError::NotFound(_))));
}

#[test]
fn per_id_nodes_run_on_the_callers_unit() {
    let tree = default_tree();
    for unit in 0..4 {
        let task = Task::new(unit);
        assert_eq!(
            tree.read_to_string("read/32", &task).unwrap(),
            format!("0x{unit:016x}\n")
        );
    }
}

#[test]
fn poke_nodes_use_the_mask_and_restore() {
    let tree = default_tree();
    let task = Task::new(1);
    tree.write("mask", "0xf0").unwrap();

    assert_eq!(tree.read_to_string("poke/48", &task).unwrap(), "0x00000000000000f0\n");
    assert_eq!(tree.read_to_string("poke-48", &task).unwrap(), "0x00000000000000f0\n");
    assert_eq!(tree.read_to_string("read/48", &task).unwrap(), "0x0000000000000000\n");
}

#[test]
fn csr_node_retargets_the_patch_buffer() {
    let tree = default_tree();
    let task = Task::new(2);
    assert_eq!(tree.read_to_string("csr", &task).unwrap(), "0\n");
    assert!(matches!(
        tree.open("csr-read", &task),
        Err(AttrError::Probe(_))
    ));

    tree.write("csr", "32\n").unwrap();
    assert_eq!(tree.read_to_string("csr", &task).unwrap(), "32\n");
    assert_eq!(tree.read_to_string("csr-read", &task).unwrap(), "0x0000000000000002\n");

    tree.write("csr", " 48 ").unwrap();
    tree.write("mask", "0x3").unwrap();
    assert_eq!(tree.read_to_string("csr-poke", &task).unwrap(), "0x0000000000000003\n");
    assert_eq!(tree.read_to_string("csr-read", &task).unwrap(), "0x0000000000000000\n");
}

#[test]
fn global_sessions_keep_the_text_seen_at_open() {
    let tree = default_tree();
    let task = Task::new(0);
    let session = tree.open("global/read/48", &task).unwrap();

    for unit in tree.probe().machine().units() {
        unit.lock().csr.write(CSR_SAVE0, 0xAA);
    }

    let mut buf = [0_u8; 7];
    let mut text = Vec::new();
    let mut offset = 0;
    loop {
        let n = session.read_at(&mut buf, offset);
        if n == 0 {
            break;
        }
        text.extend_from_slice(&buf[..n]);
        offset += n;
    }
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "UNIT0: 0x0000000000000000\nUNIT1: 0x0000000000000000\n\
         UNIT2: 0x0000000000000000\nUNIT3: 0x0000000000000000\n"
    );

    let fresh = tree.read_to_string("global/read/48", &task).unwrap();
    assert!(fresh.lines().all(|line| line.ends_with("0x00000000000000aa")));
}

#[test]
fn global_poke_reports_each_units_readback() {
    let tree = default_tree();
    let task = Task::new(0);
    tree.write("mask", "0xffff").unwrap();
    let report = tree.read_to_string("global/poke/0", &task).unwrap();
    // CRMD keeps its hardwired bits: only the low nine bits are writable.
    assert_eq!(report.lines().count(), 4);
    assert!(report.lines().all(|line| line.ends_with(": 0x00000000000001ff")));
    let id = CSR_CPUID.get();
    assert!(tree.contains(&format!("global/poke/{id}")));
}

#[test]
fn configuration_file_drives_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "units": 2,
            "initial_mask": 18446744069414584320,
            "dispatch": "direct",
            "registers": [
                { "id": 12345, "name": "PROBE", "reset": 1311768467463790320,
                  "writable": 18446744069414584320 }
            ],
            "tree": { "legacy_poke_nodes": false }
        }"#,
    );

    let tree = AttrTree::load(&path).unwrap();
    let task = Task::new(1);
    assert_eq!(tree.probe().config().dispatch, DispatchStrategy::Direct);
    assert!(!tree.contains("poke-12345"));
    assert_eq!(tree.read_to_string("mask", &task).unwrap(), "0xffffffff00000000\n");

    assert_eq!(tree.read_to_string("poke/12345", &task).unwrap(), "0xffffffff9abcdef0\n");
    assert_eq!(tree.read_to_string("read/12345", &task).unwrap(), "0x123456789abcdef0\n");

    tree.write("csr", "12345").unwrap();
    assert_eq!(tree.read_to_string("csr-poke", &task).unwrap(), "0xffffffff9abcdef0\n");
    assert_eq!(tree.read_to_string("csr-read", &task).unwrap(), "0x123456789abcdef0\n");

    assert_eq!(
        tree.read_to_string("global/read/12345", &task).unwrap(),
        "UNIT0: 0x123456789abcdef0\nUNIT1: 0x123456789abcdef0\n"
    );
}

#[test]
fn unreadable_configuration_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        AttrTree::load(&missing),
        Err(AttrError::RegisterMap(ConfigError::Io { .. }))
    ));

    let path = write_config(dir.path(), "{ \"units\": \"four\" }");
    let err = AttrTree::load(&path).unwrap_err();
    assert!(matches!(err, AttrError::RegisterMap(ConfigError::Parse { .. })));
    assert!(err.to_string().contains("probe.json"));
}

#[test]
fn empty_machine_exposes_no_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), r#"{ "units": 0 }"#);
    assert!(matches!(AttrTree::load(&path), Err(AttrError::Probe(_))));
}
