//! End-to-end tests for the `rapidkit` binary.

mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

use common::Workspace;

#[test]
fn version_flag_prints_package_version() {
    cargo_bin_cmd!("rapidkit")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_the_command_groups() {
    cargo_bin_cmd!("rapidkit")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn unknown_flag_exits_two() {
    cargo_bin_cmd!("rapidkit")
        .args(["diff", "all", "--bogus"])
        .assert()
        .code(2);
}

#[test]
fn completions_are_generated_without_a_catalog() {
    cargo_bin_cmd!("rapidkit")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rapidkit"));
}

#[test]
fn no_color_env_is_accepted_by_every_command() {
    let ws = Workspace::new();
    for value in ["1", "true", "0", ""] {
        ws.cmd()
            .env("NO_COLOR", value)
            .args(["modules", "summary"])
            .assert()
            .success();
    }
    ws.cmd()
        .env("NO_COLOR", "1")
        .arg("--no-color")
        .args(["config", "get", "snapshots.keep"])
        .assert()
        .success();
}

#[test]
fn config_get_reads_env_overrides() {
    let ws = Workspace::new();
    ws.cmd()
        .env("RAPIDKIT_SNAPSHOTS__KEEP", "3")
        .args(["config", "get", "snapshots.keep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshots.keep = 3"));
}

#[test]
fn config_get_rejects_unknown_keys() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "get", "no.such.key"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn project_config_file_is_picked_up() {
    let ws = Workspace::new();
    fs::write(ws.root().join("rapidkit.toml"), "[renderer]\nengine = \"simple\"\n").unwrap();
    ws.cmd()
        .args(["config", "get", "renderer.engine"])
        .assert()
        .success()
        .stdout(predicate::str::contains("renderer.engine = simple"));
}

#[test]
fn created_project_diffs_clean() {
    let ws = Workspace::new();
    ws.create(&[]);

    assert_eq!(ws.read("README.md"), "# my-api\n");
    assert_eq!(ws.read("src/core.py"), "# core for my-api\n");

    let mut cmd = ws.in_project();
    cmd.args(["diff", "all", "--json"]);
    let report = Workspace::json(cmd);
    let modules = report["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 2);
    for module in modules {
        for file in module["files"].as_array().unwrap() {
            assert_eq!(file["status"], "clean", "{}", file["file"]);
        }
    }
}

#[test]
fn create_into_existing_directory_is_refused() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.cmd()
        .arg("-p")
        .arg(ws.root())
        .args(["create", common::PROJECT])
        .assert()
        .code(1);
}

#[test]
fn commands_outside_a_project_exit_three() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("-p")
        .arg(ws.root())
        .args(["diff", "all"])
        .assert()
        .code(3);
}

#[test]
fn unknown_module_exits_three() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.in_project()
        .args(["add", "module", "free/nowhere/ghost"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("free/nowhere/ghost"));
}

#[test]
fn local_edit_is_reported() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.edit("src/core.py", "# mine\n");

    let mut cmd = ws.in_project();
    cmd.args(["diff", "module", "free/essentials/core", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["files"][0]["file"], "src/core.py");
    assert_eq!(report["files"][0]["status"], "locally_modified");
}

#[test]
fn upgrade_filter_skips_modified_files() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.edit("src/core.py", "# mine\n");

    let mut cmd = ws.in_project();
    cmd.args([
        "upgrade",
        "module",
        "free/essentials/core",
        "--dry-run",
        "--only-statuses=clean",
        "--json",
    ]);
    let report = Workspace::json(cmd);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["applied"], false);
    assert!(report["planned"].as_array().unwrap().is_empty());
    assert_eq!(report["skipped"][0]["file"], "src/core.py");
    assert_eq!(report["skipped"][0]["status"], "locally_modified");
    assert_eq!(ws.read("src/core.py"), "# mine\n");
}

#[test]
fn upgrade_batch_reports_failed_modules() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.in_project()
        .args([
            "upgrade",
            "batch",
            "--modules",
            "free/essentials/core,free/nowhere/ghost",
            "--dry-run",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1 of 2 modules failed"));
}

#[test]
fn merge_prefer_template_restores_clean_state() {
    let ws = Workspace::new();
    ws.create(&[]);
    ws.edit("src/core.py", "# mine\n");

    let mut cmd = ws.in_project();
    cmd.args([
        "merge",
        "module",
        "free/essentials/core",
        "--strategy",
        "prefer-template",
        "--json",
    ]);
    let report = Workspace::json(cmd);
    assert_eq!(report["actions"][0]["decision"], "apply_template");
    assert_eq!(ws.read("src/core.py"), "# core for my-api\n");

    let mut cmd = ws.in_project();
    cmd.args(["diff", "module", "free/essentials/core", "--json"]);
    assert_eq!(Workspace::json(cmd)["files"][0]["status"], "clean");
}

#[test]
fn deferred_snippet_is_applied_by_reconcile() {
    let ws = Workspace::new();
    ws.create(&["install_settings=false"]);
    assert!(!ws.project_dir().join("src/settings.py").exists());

    ws.in_project()
        .args(["add", "module", "free/database/db_postgres"])
        .assert()
        .success();
    ws.in_project()
        .args(["add", "module", "free/essentials/settings"])
        .assert()
        .success();

    let mut cmd = ws.in_project();
    cmd.args(["snippets", "reconcile", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["pending_before"], 1);
    assert_eq!(report["applied"], 1);
    assert_eq!(report["pending_after"], 0);
    assert!(ws
        .read("src/settings.py")
        .contains("DATABASE_URL = \"postgresql://localhost/app\""));

    let mut cmd = ws.in_project();
    cmd.args(["snippets", "reconcile", "--json"]);
    assert_eq!(Workspace::json(cmd)["applied"], 0);
}

#[test]
fn checkpoint_then_rollback_restores_files() {
    let ws = Workspace::new();
    ws.create(&[]);

    let mut cmd = ws.in_project();
    cmd.args(["checkpoint", "--label", "before edit", "--json"]);
    let snapshot = Workspace::json(cmd);
    let id = snapshot["id"].as_str().unwrap().to_string();

    ws.edit("src/core.py", "# broken\n");
    ws.in_project()
        .args(["rollback", "--snapshot", &id])
        .assert()
        .success();
    assert_eq!(ws.read("src/core.py"), "# core for my-api\n");
}

#[test]
fn snapshot_gc_dry_run_keeps_the_newest() {
    let ws = Workspace::new();
    ws.create(&[]);
    let snapshots = ws.project_dir().join(".rapidkit/snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    for n in 1..=5 {
        fs::write(snapshots.join(format!("2024010{n}T000000.000Z")), "").unwrap();
    }

    let mut cmd = ws.in_project();
    cmd.args(["snapshot", "gc", "--keep=2", "--dry-run", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["schema_version"], "snapshot-gc-v1");
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["keep_limit"], 2);
    assert_eq!(report["deleted"], 3);
    assert_eq!(report["kept_entries"][1], "20240105T000000.000Z");
    assert_eq!(fs::read_dir(&snapshots).unwrap().count(), 5);
}

#[test]
fn snapshot_gc_deletes_old_checkpoints() {
    let ws = Workspace::new();
    ws.create(&[]);
    for _ in 0..3 {
        ws.in_project().arg("checkpoint").assert().success();
    }

    ws.in_project()
        .args(["snapshot", "gc", "--keep", "1"])
        .assert()
        .success();

    let mut cmd = ws.in_project();
    cmd.args(["snapshot", "list", "--json"]);
    assert_eq!(Workspace::json(cmd).as_array().unwrap().len(), 1);
}

#[test]
fn signed_catalog_verifies_until_tampered() {
    let ws = Workspace::new();

    let mut cmd = ws.cmd();
    cmd.args(["modules", "keygen", "--json"]);
    let pair = Workspace::json(cmd);
    let key = pair["private_key"].as_str().unwrap().to_string();

    ws.cmd()
        .args(["modules", "sign-all", "--key", &key])
        .assert()
        .success();
    ws.cmd()
        .args(["modules", "verify-all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Errors: 0"));

    let manifest = ws.root().join("modules/free/essentials/core/module.yaml");
    let tampered = fs::read_to_string(&manifest)
        .unwrap()
        .replace("version: 1.0.0", "version: 9.9.9");
    fs::write(&manifest, tampered).unwrap();

    ws.cmd()
        .args(["modules", "verify-all"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("free/essentials/core"));
}

#[test]
fn modules_summary_counts_the_catalog() {
    let ws = Workspace::new();
    let mut cmd = ws.cmd();
    cmd.args(["modules", "summary", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["total"], 4);
    assert_eq!(report["by_tier"]["free"], 4);
}

#[test]
fn doctor_reports_the_project() {
    let ws = Workspace::new();
    ws.create(&[]);

    let mut cmd = ws.in_project();
    cmd.args(["doctor", "check", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["schema_version"], "doctor-check-v1");
    assert!(report["project"].is_null());
    let names: Vec<&str> = report["plugins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"fastapi"));

    let out = ws
        .in_project()
        .args(["doctor", "check", "--workspace", "--json"])
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["project"]["kit"], "fastapi.standard");
    assert_eq!(report["project"]["installed_modules"], 2);
}

#[test]
fn two_producers_land_in_priority_order_and_diff_clean() {
    let ws = Workspace::new();
    ws.create(&[]);
    for slug in ["free/database/db_postgres", "free/cache/redis"] {
        ws.in_project()
            .args(["add", "module", slug])
            .assert()
            .success();
    }

    let settings = ws.read("src/settings.py");
    let redis = settings.find("REDIS_URL").unwrap();
    let database = settings.find("DATABASE_URL").unwrap();
    assert!(redis < database, "{settings}");

    let mut cmd = ws.in_project();
    cmd.args(["diff", "all", "--json"]);
    let report = Workspace::json(cmd);
    assert_eq!(report["modules"].as_array().unwrap().len(), 4);
    for module in report["modules"].as_array().unwrap() {
        for file in module["files"].as_array().unwrap() {
            assert_eq!(file["status"], "clean", "{} {}", module["module"], file["file"]);
        }
    }
}

#[test]
fn forged_signature_is_refused_unless_checks_are_skipped() {
    let ws = Workspace::new();
    ws.create(&[]);
    let manifest = ws.root().join("modules/free/database/db_postgres/module.yaml");
    let mut raw = fs::read_to_string(&manifest).unwrap();
    raw.push_str("signature: Zm9yZ2Vk\n");
    fs::write(&manifest, raw).unwrap();

    ws.in_project()
        .args(["add", "module", "free/database/db_postgres"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("free/database/db_postgres"));
    assert!(!ws.project_dir().join("src/db.py").exists());

    ws.in_project()
        .args(["add", "module", "free/database/db_postgres", "--skip-verify"])
        .assert()
        .success();
    assert_eq!(ws.read("src/db.py"), "DSN = \"postgresql://localhost/app\"\n");
}

#[test]
fn module_without_templates_is_refused_at_create() {
    let ws = Workspace::new();
    fs::remove_dir_all(ws.root().join("modules/free/essentials/core/templates")).unwrap();
    ws.cmd()
        .arg("-p")
        .arg(ws.root())
        .args(["create", common::PROJECT])
        .assert()
        .code(2);
    assert!(!ws.project_dir().join("src/core.py").exists());
}
