#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TEST_TOKEN: &str = "test-token";

/// Variables that would change behavior if inherited from the developer's shell.
const ISOLATED_VARS: &[&str] = &[
    "HCHB_PAGE_SIZE",
    "HCHB_MAX_PAGES",
    "HCHB_TIMEOUT_SECS",
    "HCHB_ACTIVE",
    "HCHB_OUTPUT_DIR",
    "HCHB_LOG",
    "EXPORT_JSON",
];

/// A mock FHIR server plus an isolated working directory for export files.
pub struct TestEnv {
    pub dir: TempDir,
    pub server: MockServer,
}

impl TestEnv {
    /// Create an environment whose token endpoint hands out `TEST_TOKEN`.
    pub fn new() -> Self {
        let env = Self::without_token_endpoint();
        env.server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .form_urlencoded_tuple("grant_type", "agency_auth")
                .form_urlencoded_tuple("client_id", "test-client");
            then.status(200)
                .json_body(json!({"access_token": TEST_TOKEN, "token_type": "Bearer"}));
        });
        env
    }

    /// Create an environment with no token endpoint mocked.
    pub fn without_token_endpoint() -> Self {
        TestEnv {
            dir: TempDir::new().unwrap(),
            server: MockServer::start(),
        }
    }

    /// Get a Command configured to run hchb-export against the mock server.
    pub fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo_bin_cmd!("hchb-export");
        cmd.current_dir(self.dir.path());
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("HCHB_API_BASE_URL", self.server.base_url());
        cmd.env("HCHB_TOKEN_URL", self.server.url("/token"));
        cmd.env("HCHB_CLIENT_ID", "test-client");
        cmd.env("HCHB_RESOURCE_SECURITY_ID", "test-rsid");
        cmd.env("HCHB_AGENCY_SECRET", "test-secret");
        cmd.env("HCHB_TIMEOUT_SECS", "5");
        // Ensure no color codes pollute test output
        cmd.env("NO_COLOR", "1");
        cmd
    }

    /// Get a Command with --json flag.
    pub fn cmd_json(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--json");
        cmd
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Files in a directory under the working directory (empty if it doesn't exist).
    pub fn files_in(&self, relative: &str) -> Vec<PathBuf> {
        list_files(&self.path(relative))
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut files: Vec<PathBuf> = entries.map(|e| e.unwrap().path()).collect();
            files.sort();
            files
        }
        Err(_) => Vec::new(),
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// A searchset Bundle entry wrapping a Patient.
pub fn patient_entry(id: &str, family: &str) -> Value {
    json!({
        "fullUrl": format!("Patient/{}", id),
        "resource": {
            "resourceType": "Patient",
            "id": id,
            "active": true,
            "name": [{"family": family, "given": ["Test"]}],
            "gender": "female",
            "birthDate": "1950-01-01"
        }
    })
}

pub fn bundle(entries: Vec<Value>, next: Option<&str>) -> Value {
    let mut link = vec![json!({"relation": "self", "url": "self"})];
    if let Some(next) = next {
        link.push(json!({"relation": "next", "url": next}));
    }
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": entries.len(),
        "link": link,
        "entry": entries
    })
}

pub fn ids(values: &Value) -> Vec<String> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect()
}
