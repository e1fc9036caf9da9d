mod common;

use httpmock::prelude::*;
use predicates::prelude::*;

use common::{bundle, ids, patient_entry, read_json, TestEnv, TEST_TOKEN};

#[test]
fn patients_default_search_sends_active_and_count() {
    let env = TestEnv::new();
    let search = env.server.mock(|when, then| {
        when.method(GET)
            .path("/Patient")
            .header("authorization", format!("Bearer {}", TEST_TOKEN))
            .header("accept", "application/fhir+json")
            .query_param("active", "true")
            .query_param("_count", "100");
        then.status(200)
            .json_body(bundle(vec![patient_entry("p1", "Doe")], None));
    });

    env.cmd()
        .args(["patients"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p1 Test Doe female 1950-01-01"))
        .stderr(predicate::str::contains("Retrieved 1 patients"));

    search.assert_calls(1);
}

#[test]
fn patients_exports_timestamped_file_to_samples() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient");
        then.status(200).json_body(bundle(
            vec![patient_entry("p1", "Doe"), patient_entry("p2", "Roe")],
            None,
        ));
    });

    env.cmd().args(["patients"]).assert().success();

    let files = env.files_in("samples");
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("patients_"), "{}", name);
    assert!(name.ends_with(".json"), "{}", name);
    // patients_YYYYmmdd_HHMMSS.json
    assert_eq!(name.len(), "patients_".len() + 15 + ".json".len());

    let exported = read_json(&files[0]);
    assert_eq!(ids(&exported), vec!["p1", "p2"]);
}

#[test]
fn patients_echoes_search_filters() {
    let env = TestEnv::new();
    let search = env.server.mock(|when, then| {
        when.method(GET)
            .path("/Patient")
            .query_param("identifier", "MRN|42")
            .query_param("name", "Doe")
            .query_param("gender", "female")
            .query_param("birthdate", "ge1940-01-01")
            .query_param("address-city", "Baton Rouge")
            .query_param("_lastUpdated", "ge2024-01-01");
        then.status(200)
            .json_body(bundle(vec![patient_entry("p1", "Doe")], None));
    });

    env.cmd_json()
        .args([
            "patients",
            "--identifier",
            "MRN|42",
            "--name",
            "Doe",
            "--gender",
            "female",
            "--birthdate",
            "ge1940-01-01",
            "--address-city",
            "Baton Rouge",
            "--param",
            "_lastUpdated=ge2024-01-01",
            "--no-export",
        ])
        .assert()
        .success();

    search.assert_calls(1);
}

#[test]
fn patients_follows_next_link_up_to_max_pages() {
    let env = TestEnv::new();
    let page2_url = env.server.url("/Patient?page=2");

    let first = env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("_count", "2");
        then.status(200).json_body(bundle(
            vec![patient_entry("a", "A"), patient_entry("b", "B")],
            Some(page2_url.as_str()),
        ));
    });
    let second = env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("page", "2");
        then.status(200).json_body(bundle(
            vec![patient_entry("c", "C"), patient_entry("d", "D")],
            None,
        ));
    });

    let output = env
        .cmd_json()
        .args(["patients", "--page-size", "2", "--max-pages", "2", "--no-export"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let patients: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ids(&patients), vec!["a", "b", "c", "d"]);
    first.assert_calls(1);
    second.assert_calls(1);
}

#[test]
fn patients_stops_at_max_pages_even_with_next_link() {
    let env = TestEnv::new();
    let page2_url = env.server.url("/Patient?page=2");

    env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("_count", "2");
        then.status(200).json_body(bundle(
            vec![patient_entry("a", "A"), patient_entry("b", "B")],
            Some(page2_url.as_str()),
        ));
    });
    let second = env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("page", "2");
        then.status(200)
            .json_body(bundle(vec![patient_entry("c", "C")], None));
    });

    let output = env
        .cmd_json()
        .env("HCHB_PAGE_SIZE", "2")
        .args(["patients", "--no-export"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let patients: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ids(&patients), vec!["a", "b"]);
    second.assert_calls(0);
}

#[test]
fn patients_server_error_writes_no_file() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient");
        then.status(500).json_body(serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "search backend offline"}]
        }));
    });

    env.cmd()
        .args(["patients"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("500"))
        .stderr(predicate::str::contains("search backend offline"));

    assert!(!env.path("samples").exists());
}

#[test]
fn patients_error_on_later_page_writes_no_file() {
    let env = TestEnv::new();
    let page2_url = env.server.url("/Patient?page=2");

    env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("_count", "100");
        then.status(200).json_body(bundle(
            vec![patient_entry("a", "A")],
            Some(page2_url.as_str()),
        ));
    });
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient").query_param("page", "2");
        then.status(503).body("unavailable");
    });

    env.cmd()
        .args(["patients", "--max-pages", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("503"));

    assert!(env.files_in("samples").is_empty());
}

#[test]
fn patients_export_disabled_by_env() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient");
        then.status(200)
            .json_body(bundle(vec![patient_entry("p1", "Doe")], None));
    });

    env.cmd()
        .env("EXPORT_JSON", "false")
        .args(["patients"])
        .assert()
        .success();

    assert!(!env.path("samples").exists());
}

#[test]
fn patients_output_dir_flag() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient");
        then.status(200)
            .json_body(bundle(vec![patient_entry("p1", "Doe")], None));
    });

    env.cmd()
        .args(["patients", "--output-dir", "exports"])
        .assert()
        .success();

    assert_eq!(env.files_in("exports").len(), 1);
    assert!(!env.path("samples").exists());
}

#[test]
fn patients_empty_result_writes_no_file() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient");
        then.status(200).json_body(bundle(vec![], None));
    });

    env.cmd()
        .args(["patients"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No patients retrieved"));

    assert!(!env.path("samples").exists());
}

#[test]
fn patient_by_id_shows_detail() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient/p1");
        then.status(200)
            .json_body(patient_entry("p1", "Doe")["resource"].clone());
    });

    env.cmd()
        .args(["patient", "p1", "--no-export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test Doe"))
        .stdout(predicate::str::contains("1950-01-01"));
}

#[test]
fn patient_by_id_not_found() {
    let env = TestEnv::new();
    env.server.mock(|when, then| {
        when.method(GET).path("/Patient/nope");
        then.status(404);
    });

    env.cmd()
        .args(["patient", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No patient found"));

    assert!(!env.path("samples").exists());
}
