use std::io::Write;
use std::path::Path;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 17] = [
    "LECTERN_LLM_PROVIDER",
    "LECTERN_LLM_MODEL",
    "LECTERN_LLM_BASE_URL",
    "LECTERN_EMBEDDING_MODEL",
    "LECTERN_CHUNK_SIZE",
    "LECTERN_CHUNK_OVERLAP",
    "LECTERN_INDEX_BACKEND",
    "LECTERN_QDRANT_URL",
    "LECTERN_MAX_RESULTS",
    "LECTERN_COURSE_MATCH_MAX_DISTANCE",
    "LECTERN_MAX_HISTORY",
    "LECTERN_MAX_TOOL_ROUNDS",
    "LECTERN_MAX_SESSIONS",
    "LECTERN_DOCS_PATH",
    "LECTERN_CLAUDE_API_KEY",
    "ANTHROPIC_API_KEY",
    "LECTERN_CONFIG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lectern.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::Claude);
    assert_eq!(config.llm.model, "claude-sonnet-4-20250514");
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert_eq!(config.llm.embedding_model, "all-minilm");
    assert_eq!(config.llm.max_tokens, 800);
    assert_eq!(config.chunking.chunk_size, 800);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert_eq!(config.index.backend, IndexBackend::Memory);
    assert_eq!(config.index.qdrant_url, "http://localhost:6334");
    assert_eq!(config.index.max_results, 5);
    assert!(config.index.course_match_max_distance.is_none());
    assert_eq!(config.agent.max_history, 2);
    assert_eq!(config.agent.max_tool_rounds, 1);
    assert_eq!(config.agent.max_sessions, 1000);
    assert_eq!(config.timeouts.llm_seconds, 60);
    assert_eq!(config.timeouts.search_seconds, 15);
    assert!(config.ingest.docs_path.is_none());
    config.validate().unwrap();
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/lectern.toml")).unwrap();
    assert_eq!(config.chunking.chunk_size, 800);
    assert!(config.secrets.claude_api_key.is_none());
}

#[test]
#[serial]
fn parse_partial_toml() {
    let (_dir, path) = write_config(
        r#"
[llm]
provider = "ollama"
model = "llama3.2"

[chunking]
chunk_size = 400

[index]
backend = "qdrant"
course_match_max_distance = 0.6

[ingest]
docs_path = "./docs"
"#,
    );
    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.llm.model, "llama3.2");
    assert_eq!(config.llm.embedding_model, "all-minilm");
    assert_eq!(config.chunking.chunk_size, 400);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert_eq!(config.index.backend, IndexBackend::Qdrant);
    assert_eq!(config.index.course_match_max_distance, Some(0.6));
    assert_eq!(
        config.ingest.docs_path.as_deref(),
        Some(Path::new("./docs"))
    );
    assert_eq!(config.agent.max_tool_rounds, 1);
}

#[test]
#[serial]
fn invalid_toml_is_error() {
    let (_dir, path) = write_config("[chunking\nchunk_size = ");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let (_dir, path) = write_config("[index]\nmax_results = 3\n");
    clear_env();
    unsafe {
        std::env::set_var("LECTERN_LLM_PROVIDER", "ollama");
        std::env::set_var("LECTERN_MAX_RESULTS", "7");
        std::env::set_var("LECTERN_CHUNK_OVERLAP", "50");
        std::env::set_var("LECTERN_INDEX_BACKEND", "qdrant");
        std::env::set_var("LECTERN_QDRANT_URL", "http://qdrant:6334");
        std::env::set_var("LECTERN_COURSE_MATCH_MAX_DISTANCE", "0.4");
        std::env::set_var("LECTERN_MAX_TOOL_ROUNDS", "2");
        std::env::set_var("LECTERN_MAX_SESSIONS", "50");
        std::env::set_var("LECTERN_DOCS_PATH", "/srv/docs");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.index.max_results, 7);
    assert_eq!(config.chunking.chunk_overlap, 50);
    assert_eq!(config.index.backend, IndexBackend::Qdrant);
    assert_eq!(config.index.qdrant_url, "http://qdrant:6334");
    assert_eq!(config.index.course_match_max_distance, Some(0.4));
    assert_eq!(config.agent.max_tool_rounds, 2);
    assert_eq!(config.agent.max_sessions, 50);
    assert_eq!(
        config.ingest.docs_path.as_deref(),
        Some(Path::new("/srv/docs"))
    );
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("LECTERN_LLM_PROVIDER", "gpt");
        std::env::set_var("LECTERN_CHUNK_SIZE", "huge");
        std::env::set_var("LECTERN_INDEX_BACKEND", "postgres");
    }
    let config = Config::load(Path::new("/nonexistent")).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Claude);
    assert_eq!(config.chunking.chunk_size, 800);
    assert_eq!(config.index.backend, IndexBackend::Memory);
}

#[test]
#[serial]
fn api_key_from_env_with_fallback() {
    clear_env();
    unsafe { std::env::set_var("ANTHROPIC_API_KEY", "sk-fallback") };
    let config = Config::load(Path::new("/nonexistent")).unwrap();
    assert_eq!(
        config.secrets.claude_api_key.as_ref().map(Secret::expose),
        Some("sk-fallback")
    );

    unsafe { std::env::set_var("LECTERN_CLAUDE_API_KEY", "sk-primary") };
    let config = Config::load(Path::new("/nonexistent")).unwrap();
    clear_env();
    assert_eq!(
        config.secrets.claude_api_key.as_ref().map(Secret::expose),
        Some("sk-primary")
    );
}

#[test]
fn secret_debug_is_redacted() {
    let secrets = ResolvedSecrets {
        claude_api_key: Some(Secret::new("sk-ant-very-secret")),
    };
    let debug = format!("{secrets:?}");
    assert!(!debug.contains("sk-ant"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn validate_rejects_bad_values() {
    let mut config = Config::default();
    config.chunking.chunk_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.chunking.chunk_overlap = 800;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("chunk_overlap"));

    let mut config = Config::default();
    config.index.max_results = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.agent.max_sessions = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.agent.max_tool_rounds = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.index.course_match_max_distance = Some(-0.1);
    assert!(config.validate().is_err());
}

#[test]
fn chunker_config_mirrors_settings() {
    let mut config = Config::default();
    config.chunking.chunk_size = 300;
    config.chunking.chunk_overlap = 30;
    let chunker = config.chunker_config();
    assert_eq!(chunker.chunk_size, 300);
    assert_eq!(chunker.chunk_overlap, 30);
}
