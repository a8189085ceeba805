use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::JSONSchema;
use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn fixture_catalog() -> PathBuf {
    repo_root().join("fixtures/catalog.json")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn run_ncat<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_ncat"))
        .env_remove("NAVICUE_CATALOG")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute ncat binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_ncat(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "ncat command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_catalog_json(extra: &[&str]) -> Value {
    let catalog = fixture_catalog();
    let mut args = vec!["--catalog", path_str(&catalog)];
    args.extend_from_slice(extra);
    run_json(args)
}

fn expect_failure(extra: &[&str], needle: &str) {
    let catalog = fixture_catalog();
    let mut args = vec!["--catalog", path_str(&catalog)];
    args.extend_from_slice(extra);
    let output = run_ncat(args);

    assert!(!output.status.success(), "command should fail: {extra:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(needle), "unexpected stderr: {stderr}");
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn item_ids(value: &Value) -> Vec<String> {
    value
        .get("items")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing items array in payload: {value}"))
        .iter()
        .map(|item| as_str(item, "id").to_string())
        .collect()
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse JSON file {}: {err}", path.display()))
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

// Test IDs: TCLI-001
#[test]
fn catalog_stats_counts_each_status() {
    let stats = run_catalog_json(&["catalog", "stats"]);

    assert_eq!(as_str(&stats, "contract_version"), "cli.v1");
    assert_eq!(as_i64(&stats, "total"), 8);
    assert_eq!(as_i64(&stats, "active"), 6);
    assert_eq!(as_i64(&stats, "draft"), 1);
    assert_eq!(as_i64(&stats, "archived"), 1);
}

// Test IDs: TCLI-002
#[test]
fn query_applies_facets_text_status_and_paging() {
    let practice = run_catalog_json(&["query", "--facet", "family=practice"]);
    assert_eq!(as_i64(&practice, "total"), 2);
    assert_eq!(item_ids(&practice), vec!["PRAC-BR-001", "PRAC-BS-001"]);

    let breath = run_catalog_json(&["query", "--text", "BREATH"]);
    assert_eq!(item_ids(&breath), vec!["PRAC-BR-001", "NC-WIT-001"]);

    let breath_any = run_catalog_json(&["query", "--text", "breath", "--status", "any"]);
    assert_eq!(as_i64(&breath_any, "total"), 3);

    let paged = run_catalog_json(&["query", "--offset", "2", "--limit", "2"]);
    assert_eq!(as_i64(&paged, "total"), 6);
    assert_eq!(as_i64(&paged, "offset"), 2);
    assert_eq!(item_ids(&paged), vec!["NC-ECHO-001", "NC-PARA-001"]);

    let past_end = run_catalog_json(&["query", "--offset", "50"]);
    assert_eq!(as_i64(&past_end, "total"), 6);
    assert!(item_ids(&past_end).is_empty());

    let nothing = run_catalog_json(&["query", "--text", "xyz-not-present"]);
    assert_eq!(as_i64(&nothing, "total"), 0);
}

// Test IDs: TCLI-003
#[test]
fn invalid_arguments_fail_with_message_on_stderr() {
    expect_failure(&["query", "--limit", "0"], "limit MUST be > 0");
    expect_failure(&["query", "--offset", "-1"], "offset MUST be >= 0");
    expect_failure(&["query", "--facet", "schema"], "expected name=value");
    expect_failure(&["item", "show", "--id", "NC-MISSING"], "content not found: NC-MISSING");
    expect_failure(&["recommend", "--regulation-score", "11"], "regulation_score MUST be in [0, 10]");

    let output = run_ncat(["catalog", "stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no catalog given"), "unexpected stderr: {stderr}");
}

// Test IDs: TCLI-004
#[test]
fn recommend_follows_regulation_band_and_history() {
    let low = run_catalog_json(&["recommend", "--regulation-score", "2"]);
    let recommendation = &low["recommendation"];
    assert_eq!(as_str(&recommendation["item"], "id"), "PRAC-BR-001");
    assert_eq!(as_str(recommendation, "band"), "low");
    assert!(as_str(recommendation, "reason").contains("grounding"));

    let after_breath =
        run_catalog_json(&["recommend", "--regulation-score", "2", "--history", "breath"]);
    assert_eq!(as_str(&after_breath["recommendation"]["item"], "id"), "PRAC-BS-001");

    let ranked = run_catalog_json(&["recommend", "--regulation-score", "9", "--top", "3"]);
    let candidates = ranked
        .get("candidates")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing candidates in payload: {ranked}"));
    assert_eq!(candidates.len(), 3);
    assert_eq!(
        as_str(&candidates[0]["item"], "id"),
        as_str(&ranked["recommendation"]["item"], "id")
    );
}

#[test]
fn facets_list_distinct_active_values() {
    let facets = run_catalog_json(&["facets", "--facet", "pillar_id"]);
    let values = facets
        .get("values")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing values in payload: {facets}"))
        .iter()
        .map(|value| (as_str(value, "value").to_string(), as_i64(value, "count")))
        .collect::<Vec<_>>();

    assert_eq!(
        values,
        vec![
            ("DM".to_string(), 1),
            ("ER".to_string(), 3),
            ("SC".to_string(), 1),
            ("SR".to_string(), 1),
        ]
    );
}

// Test IDs: TCLI-005
#[test]
fn export_writes_a_bundle_that_loads_back() {
    let sandbox = unique_temp_dir("navicue-cli-export");
    let bundle = sandbox.join("bundle");

    let export = run_catalog_json(&["catalog", "export", "--out", path_str(&bundle)]);
    assert_eq!(as_i64(&export["manifest"]["files"][0], "records"), 8);
    assert!(bundle.join("manifest.json").exists());
    assert!(bundle.join("content_items.ndjson").exists());

    let stats = run_json(["--catalog", path_str(&bundle), "catalog", "stats"]);
    assert_eq!(as_i64(&stats, "total"), 8);

    let item = run_json(["--catalog", path_str(&bundle), "item", "show", "--id", "NC-ECHO-001"]);
    assert_eq!(as_str(&item["item"], "text_line"), "You are not your thoughts. Say it back, slower.");

    let _ = fs::remove_dir_all(&sandbox);
}

#[test]
fn catalog_path_can_come_from_the_environment() {
    let output = Command::new(env!("CARGO_BIN_EXE_ncat"))
        .env("NAVICUE_CATALOG", fixture_catalog())
        .env_remove("RUST_LOG")
        .args(["catalog", "stats"])
        .output()
        .unwrap_or_else(|err| panic!("failed to execute ncat binary: {err}"));
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

// Test IDs: TCLI-006
#[test]
fn cli_outputs_validate_against_versioned_schemas() {
    let sandbox = unique_temp_dir("navicue-contract-schemas");
    let bundle = sandbox.join("bundle");

    validate_schema("catalog-stats.json", &run_catalog_json(&["catalog", "stats"]));
    validate_schema(
        "catalog-export.json",
        &run_catalog_json(&["catalog", "export", "--out", path_str(&bundle)]),
    );
    validate_schema("item-show.json", &run_catalog_json(&["item", "show", "--id", "PRAC-BR-001"]));
    validate_schema(
        "query.json",
        &run_catalog_json(&["query", "--facet", "schema=shame", "--text", "say"]),
    );
    validate_schema("facets.json", &run_catalog_json(&["facets", "--facet", "response_type"]));
    validate_schema(
        "recommend.json",
        &run_catalog_json(&["recommend", "--regulation-score", "5", "--top", "4"]),
    );
    validate_schema("recommend.json", &run_catalog_json(&["recommend"]));

    let _ = fs::remove_dir_all(&sandbox);
}
