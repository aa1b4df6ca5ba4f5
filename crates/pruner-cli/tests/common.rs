#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub const UNREACHABLE_CATALOG: &str = "http://127.0.0.1:9/";

pub fn parse_json(assert: &Assert) -> Value {
    let output = assert.get_output();
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout was not JSON ({err}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// A throwaway machine layout: an `Applications` folder holding `MyApp.app`,
/// a user home base and a volatile root, all inside one temp dir.
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("pruner-cli")
            .tempdir()
            .expect("tempdir");
        let apps = temp.path().join("Applications");
        fs::create_dir_all(apps.join("MyApp.app/Contents")).expect("create app");
        fs::write(apps.join("MyApp.app/Contents/Info.plist"), b"plist").expect("write plist");
        fs::write(apps.join("Other.txt"), b"keep").expect("write other");
        fs::create_dir_all(temp.path().join("volatile")).expect("create volatile");
        fs::create_dir_all(temp.path().join("Users/alice")).expect("create home");
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn apps(&self) -> PathBuf {
        self.root().join("Applications")
    }

    pub fn write_definition(&self) -> PathBuf {
        let path = self.root().join("definition.json");
        let body = serde_json::json!({
            "name": "myapp",
            "version": "1",
            "updated_at": "2025-01-01T00:00:00Z",
            "uninstall": {
                "appName": "MyApp",
                "bundleId": "com.example.myapp",
                "searchFilePaths": [self.apps().display().to_string()],
                "forgetPkg": false,
                "unloadLaunchDaemons": false,
            }
        });
        fs::write(&path, serde_json::to_vec_pretty(&body).expect("encode")).expect("write def");
        path
    }

    /// Points every configurable location at the sandbox.
    pub fn configure(&self, cmd: &mut Command) {
        cmd.env("PRUNER_CACHE_PATH", self.root().join("cache"))
            .env("PRUNER_CATALOG_URL", UNREACHABLE_CATALOG)
            .env("PRUNER_HTTP_TIMEOUT", "2")
            .env("PRUNER_CONSOLE_USER", "alice")
            .env("PRUNER_CONSOLE_UID", "501")
            .env("PRUNER_HOME_BASE", self.root().join("Users"))
            .env("PRUNER_VOLATILE_ROOT", self.root().join("volatile"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
    }
}
