use serde_json::json;

mod common;

use common::{parse_json, Repo, BUCKET};

const INDEX: &str = "hotdog/images/index";

fn publish(repo: &Repo, path: &str, checksum: &str) -> assert_cmd::assert::Assert {
    repo.cmd()
        .args([
            "--json",
            "publish",
            "--bucket",
            BUCKET,
            "--index-key",
            INDEX,
            "--timestamp",
            "20240301.120000",
            "--path",
            path,
            "--file",
            "desktop_20240301.120000.img",
            "--checksum",
            checksum,
        ])
        .assert()
}

#[test]
fn publish_creates_index_and_releases_lock() {
    let repo = Repo::new();

    let payload = parse_json(&publish(&repo, "ros2/desktop/focal", "abc").success());
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["lock"], "created");
    assert_eq!(payload["details"]["versions"], 1);

    assert_eq!(
        repo.read_json(INDEX),
        json!({"20240301.120000": {"ros2": {"desktop": {"focal": {
            "file": "desktop_20240301.120000.img",
            "checksum": "abc"
        }}}}})
    );
    assert_eq!(repo.tags(INDEX)["Lock"], "False");
}

#[test]
fn second_publish_merges_sibling_entry() {
    let repo = Repo::new();
    publish(&repo, "ros2/desktop/focal", "abc").success();

    let payload = parse_json(&publish(&repo, "ros2/desktop/jammy", "def").success());
    assert_eq!(payload["details"]["lock"], "acquired");

    let desktop = &repo.read_json(INDEX)["20240301.120000"]["ros2"]["desktop"];
    assert_eq!(desktop["focal"]["checksum"], "abc");
    assert_eq!(desktop["jammy"]["checksum"], "def");
}

#[test]
fn conflicting_checksum_exits_with_user_error() {
    let repo = Repo::new();
    publish(&repo, "ros2/desktop/focal", "abc").success();

    let payload = parse_json(&publish(&repo, "ros2/desktop/focal", "zzz").code(1));
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "merge_conflict");
    assert_eq!(payload["details"]["code"], "TI110");
    assert_eq!(
        repo.read_json(INDEX)["20240301.120000"]["ros2"]["desktop"]["focal"]["checksum"],
        "abc"
    );
    assert_eq!(repo.tags(INDEX)["Lock"], "False");
}

#[test]
fn malformed_timestamp_is_rejected_before_touching_the_store() {
    let repo = Repo::new();
    let assert = repo
        .cmd()
        .args([
            "--json",
            "publish",
            "--bucket",
            BUCKET,
            "--index-key",
            INDEX,
            "--timestamp",
            "2024-03-01",
            "--path",
            "ros2/desktop/focal",
            "--file",
            "a.img",
            "--checksum",
            "abc",
        ])
        .assert()
        .code(1);
    assert_eq!(parse_json(&assert)["details"]["reason"], "invalid_timestamp");
    assert!(!repo.object(INDEX).exists());
}

#[test]
fn human_output_is_prefixed() {
    let repo = Repo::new();
    let assert = repo
        .cmd()
        .args([
            "publish",
            "--apt-repo",
            BUCKET,
            "--index-key",
            INDEX,
            "--timestamp",
            "20240301.120000",
            "--path",
            "ros1/base/bionic",
            "--file",
            "base.img",
            "--checksum",
            "abc",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(
        stdout.starts_with("✔ tailor-image publish: recorded ros1/base/bionic"),
        "unexpected output: {stdout}"
    );
}

#[test]
fn index_show_lists_versions_and_entries() {
    let repo = Repo::new();
    publish(&repo, "ros2/desktop/focal", "abc").success();

    let payload = parse_json(
        &repo
            .cmd()
            .args(["--json", "index", "show", "--bucket", BUCKET, "--index-key", INDEX])
            .assert()
            .success(),
    );
    assert_eq!(payload["details"]["versions"], json!(["20240301.120000"]));

    let payload = parse_json(
        &repo
            .cmd()
            .args([
                "--json",
                "index",
                "show",
                "--bucket",
                BUCKET,
                "--index-key",
                INDEX,
                "--version",
                "20240301.120000",
            ])
            .assert()
            .success(),
    );
    assert_eq!(payload["details"]["entry"]["ros2"]["desktop"]["focal"]["checksum"], "abc");

    repo.cmd()
        .args([
            "--json",
            "index",
            "show",
            "--bucket",
            BUCKET,
            "--index-key",
            "missing/index",
        ])
        .assert()
        .code(1);
}

#[test]
fn lock_status_and_release() {
    let repo = Repo::new();
    publish(&repo, "ros2/desktop/focal", "abc").success();
    common::write_file(
        &repo.temp.path().join(BUCKET).join(".tags").join(format!("{INDEX}.json")),
        br#"{"Lock": "True"}"#,
    );

    let status = |repo: &Repo| {
        parse_json(
            &repo
                .cmd()
                .args(["--json", "lock", "status", "--bucket", BUCKET, "--key", INDEX])
                .assert()
                .success(),
        )
    };
    assert_eq!(status(&repo)["details"]["state"], "locked");

    repo.cmd()
        .args(["--json", "lock", "release", "--bucket", BUCKET, "--key", INDEX])
        .assert()
        .success();
    assert_eq!(status(&repo)["details"]["state"], "unlocked");

    let payload = parse_json(
        &repo
            .cmd()
            .args(["--json", "lock", "status", "--bucket", BUCKET, "--key", "nope"])
            .assert()
            .success(),
    );
    assert_eq!(payload["details"]["state"], "absent");
}

#[test]
fn invalid_lock_configuration_is_a_user_error() {
    let repo = Repo::new();
    let assert = repo
        .cmd()
        .env("TAILOR_LOCK_TIMEOUT_MIN_SECS", "soon")
        .args(["--json", "lock", "status", "--bucket", BUCKET, "--key", INDEX])
        .assert()
        .code(1);
    assert_eq!(parse_json(&assert)["details"]["reason"], "invalid_configuration");
}
