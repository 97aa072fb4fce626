use std::process::Command;

const KEY_VARS: &[&str] = &[
    "OMNISEARCH_TAVILY_API_KEY",
    "TAVILY_API_KEY",
    "OMNISEARCH_BRAVE_API_KEY",
    "BRAVE_API_KEY",
    "BRAVE_SEARCH_API_KEY",
    "OMNISEARCH_KAGI_API_KEY",
    "KAGI_API_KEY",
    "OMNISEARCH_EXA_API_KEY",
    "EXA_API_KEY",
    "OMNISEARCH_PERPLEXITY_API_KEY",
    "PERPLEXITY_API_KEY",
    "OMNISEARCH_FIRECRAWL_API_KEY",
    "FIRECRAWL_API_KEY",
    "OMNISEARCH_JINA_API_KEY",
    "JINA_AI_API_KEY",
    "OMNISEARCH_ENV_FILE",
];

fn doctor() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("omnisearch"));
    cmd.args(["doctor", "--check-stdio=false", "--timeout-ms", "1"]);
    for k in KEY_VARS {
        cmd.env_remove(k);
    }
    cmd
}

#[test]
fn doctor_without_keys_reports_booleans_and_fails_provider_check() {
    let out = doctor().output().expect("run omnisearch doctor");
    assert!(out.status.success(), "omnisearch doctor failed");
    let v: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&out.stdout)).expect("parse doctor json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("doctor"));
    assert_eq!(v["name"].as_str(), Some("omnisearch"));
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert!(v.get("elapsed_ms").is_some());
    assert_eq!(v["features"]["stdio"].as_bool(), Some(cfg!(feature = "stdio")));

    let providers = v["configured"]["providers"].as_object().expect("providers map");
    for vendor in ["tavily", "brave", "kagi", "exa", "perplexity", "firecrawl", "jina"] {
        assert_eq!(providers[vendor].as_bool(), Some(false), "{vendor}");
    }
    assert!(v["tools"]["web_search"].as_array().unwrap().is_empty());

    let checks = v["checks"].as_array().expect("checks array");
    let by_name = |n: &str| {
        checks
            .iter()
            .find(|c| c["name"].as_str() == Some(n))
            .unwrap_or_else(|| panic!("missing check {n}"))
            .clone()
    };
    assert_eq!(by_name("providers_configured")["ok"].as_bool(), Some(false));
    assert_eq!(by_name("env_file")["skipped"].as_bool(), Some(true));
    let handshake = by_name("mcp_stdio_handshake");
    assert_eq!(handshake["skipped"].as_bool(), Some(true));
    assert_eq!(handshake["ok"].as_bool(), Some(true));
}

#[test]
fn doctor_reads_keys_from_env_file_without_echoing_them() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("omnisearch.env");
    std::fs::write(&path, "# keys\nexport TAVILY_API_KEY=tvly-secret-value\n").unwrap();

    let out = doctor()
        .env("OMNISEARCH_ENV_FILE", &path)
        .output()
        .expect("run omnisearch doctor");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("tvly-secret-value"));
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("parse doctor json");

    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["configured"]["providers"]["tavily"].as_bool(), Some(true));
    assert_eq!(v["configured"]["providers"]["kagi"].as_bool(), Some(false));
    assert_eq!(v["tools"]["web_search"], serde_json::json!(["tavily"]));
    assert_eq!(v["tools"]["web_extract"], serde_json::json!(["extract"]));
}

#[test]
fn doctor_text_output() {
    let out = doctor().args(["--output", "text"]).output().unwrap();
    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("(ok=false)"), "{s}");
    assert!(s.contains("tavily=false"), "{s}");
    assert!(s.contains("- mcp_stdio_handshake: skipped"), "{s}");
}
