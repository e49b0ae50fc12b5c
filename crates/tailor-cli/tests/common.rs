#![allow(dead_code)]

use std::{fs, path::Path};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use serde_json::Value;
use tempfile::TempDir;

pub const BUCKET: &str = "apt-repo";

/// Store root plus a command wired to it with a lock policy that never sleeps.
pub struct Repo {
    pub temp: TempDir,
}

impl Repo {
    pub fn new() -> Self {
        Self {
            temp: tempfile::Builder::new()
                .prefix("tailor-image")
                .tempdir()
                .expect("tempdir"),
        }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.temp.path().display())
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("tailor-image");
        cmd.env_remove("TAILOR_STORE")
            .env_remove("TAILOR_DISTRIBUTION_ID")
            .env("TAILOR_LOCK_JITTER_SECS", "0")
            .env("TAILOR_LOCK_RETRY_SECS", "0")
            .env("NO_COLOR", "1")
            .args(["--store", &self.url()]);
        cmd
    }

    pub fn object(&self, key: &str) -> std::path::PathBuf {
        self.temp.path().join(BUCKET).join(key)
    }

    pub fn tags(&self, key: &str) -> Value {
        let path = self.temp.path().join(BUCKET).join(".tags").join(format!("{key}.json"));
        serde_json::from_slice(&fs::read(path).expect("tags")).expect("tags json")
    }

    pub fn write(&self, key: &str, body: &[u8]) {
        write_file(&self.object(key), body);
    }

    pub fn read_json(&self, key: &str) -> Value {
        serde_json::from_slice(&fs::read(self.object(key)).expect("object")).expect("json")
    }
}

pub fn write_file(path: &Path, body: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dirs");
    }
    fs::write(path, body).expect("write");
}

pub fn parse_json(assert: &Assert) -> Value {
    let output = assert.get_output();
    serde_json::from_slice(&output.stdout).expect("json response")
}
