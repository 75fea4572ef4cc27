use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 14] = [
    "SIFT_EMBEDDING_BASE_URL",
    "SIFT_EMBEDDING_ENGINE",
    "SIFT_OPENAI_API_KEY",
    "SIFT_EMBEDDING_BATCH_SIZE",
    "SIFT_EMBEDDING_CONCURRENCY",
    "SIFT_EMBEDDING_MAX_ATTEMPTS",
    "SIFT_EMBEDDINGS_DIR",
    "SIFT_INDEX_WINDOW_TOKENS",
    "SIFT_SEARCH_CODE_COUNT",
    "SIFT_SEARCH_MARKDOWN_COUNT",
    "SIFT_SEARCH_CACHE_CAPACITY",
    "SIFT_SEARCH_TIMEOUT_SECS",
    "SIFT_CLASSIFIER_DELTA",
    "SIFT_CONFIG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sift.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    (dir, path)
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.embedding.base_url, "https://api.openai.com/v1");
    assert_eq!(config.embedding.engine, "text-embedding-ada-002");
    assert!(config.embedding.api_key.is_none());
    assert_eq!(config.embedding.batch_size, 512);
    assert_eq!(config.embedding.concurrency, 4);
    assert_eq!(config.embedding.max_attempts, 6);
    assert_eq!(config.index.embeddings_dir, PathBuf::from("./embeddings"));
    assert_eq!(config.index.window_tokens, 256);
    assert_eq!(config.search.cache_capacity, 1024);
    assert_eq!(config.search.timeout_secs, 30);
    assert!((config.classifier.delta - 0.02).abs() < f32::EPSILON);
    config.validate().unwrap();
}

#[test]
#[serial]
fn defaults_when_file_missing() {
    clear_env();
    let config = Config::load(std::path::Path::new("/nonexistent/sift.toml")).unwrap();
    assert_eq!(config.embedding.engine, "text-embedding-ada-002");
}

#[test]
#[serial]
fn parse_valid_toml() {
    let (_dir, path) = write_config(
        r#"
[embedding]
base_url = "http://localhost:8080/v1"
engine = "nomic-embed-text"
batch_size = 64
max_delay_ms = 5000

[index]
embeddings_dir = "/var/lib/sift"

[search]
code_count = 8
markdown_count = 0
"#,
    );
    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.embedding.base_url, "http://localhost:8080/v1");
    assert_eq!(config.embedding.engine, "nomic-embed-text");
    assert_eq!(config.embedding.batch_size, 64);
    assert_eq!(config.embedding.concurrency, 4);
    assert_eq!(config.embedding.retry_policy().max_delay.as_millis(), 5000);
    assert_eq!(config.index.embeddings_dir, PathBuf::from("/var/lib/sift"));
    assert_eq!(config.index.window_tokens, 256);
    assert_eq!(config.search.code_count, 8);
    assert_eq!(config.search.markdown_count, 0);
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    let (_dir, path) = write_config("[embedding\nengine = ");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_file() {
    let (_dir, path) = write_config("[embedding]\nengine = \"from-file\"\n");
    clear_env();
    unsafe {
        std::env::set_var("SIFT_EMBEDDING_ENGINE", "from-env");
        std::env::set_var("SIFT_OPENAI_API_KEY", "sk-test");
        std::env::set_var("SIFT_SEARCH_TIMEOUT_SECS", "5");
        std::env::set_var("SIFT_EMBEDDINGS_DIR", "/tmp/emb");
        std::env::set_var("SIFT_CLASSIFIER_DELTA", "0.05");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.embedding.engine, "from-env");
    assert_eq!(config.embedding.api_key.as_ref().unwrap().expose(), "sk-test");
    assert_eq!(config.search.timeout_secs, 5);
    assert_eq!(config.index.embeddings_dir, PathBuf::from("/tmp/emb"));
    assert!((config.classifier.delta - 0.05).abs() < f32::EPSILON);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("SIFT_EMBEDDING_BATCH_SIZE", "lots");
        std::env::set_var("SIFT_SEARCH_CODE_COUNT", "-1");
    }
    let config = Config::load(std::path::Path::new("/nonexistent/sift.toml")).unwrap();
    clear_env();

    assert_eq!(config.embedding.batch_size, 512);
    assert_eq!(config.search.code_count, 5);
}

#[test]
#[serial]
fn every_numeric_override_ignores_garbage() {
    clear_env();
    for key in [
        "SIFT_EMBEDDING_MAX_ATTEMPTS",
        "SIFT_INDEX_WINDOW_TOKENS",
        "SIFT_SEARCH_MARKDOWN_COUNT",
        "SIFT_SEARCH_CACHE_CAPACITY",
        "SIFT_SEARCH_TIMEOUT_SECS",
    ] {
        unsafe { std::env::set_var(key, "not-a-number") };
    }
    let config = Config::load(std::path::Path::new("/nonexistent/sift.toml")).unwrap();
    clear_env();

    let defaults = Config::default();
    assert_eq!(config.embedding.max_attempts, defaults.embedding.max_attempts);
    assert_eq!(config.index.window_tokens, defaults.index.window_tokens);
    assert_eq!(config.search.markdown_count, defaults.search.markdown_count);
    assert_eq!(config.search.cache_capacity, defaults.search.cache_capacity);
    assert_eq!(config.search.timeout_secs, defaults.search.timeout_secs);
}

#[test]
#[serial]
fn env_parsed_distinguishes_unset_from_invalid() {
    clear_env();
    assert_eq!(super::env::env_parsed::<usize>("SIFT_SEARCH_CODE_COUNT"), None);
    unsafe { std::env::set_var("SIFT_SEARCH_CODE_COUNT", "7") };
    assert_eq!(super::env::env_parsed::<usize>("SIFT_SEARCH_CODE_COUNT"), Some(7));
    unsafe { std::env::set_var("SIFT_SEARCH_CODE_COUNT", "seven") };
    assert_eq!(super::env::env_parsed::<usize>("SIFT_SEARCH_CODE_COUNT"), None);
    clear_env();
}

#[test]
#[serial]
fn empty_api_key_env_is_ignored() {
    clear_env();
    unsafe { std::env::set_var("SIFT_OPENAI_API_KEY", "") };
    let config = Config::load(std::path::Path::new("/nonexistent/sift.toml")).unwrap();
    clear_env();
    assert!(config.embedding.api_key.is_none());
}

#[test]
fn validate_rejects_oversized_batch() {
    let mut config = Config::default();
    config.embedding.batch_size = 4096;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("batch_size"));
}

#[test]
fn validate_rejects_zero_values() {
    let mut config = Config::default();
    config.embedding.concurrency = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.search.timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.index.window_tokens = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_inverted_delays() {
    let mut config = Config::default();
    config.embedding.base_delay_ms = 30_000;
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn invalid_file_values_fail_load() {
    let (_dir, path) = write_config("[search]\ncache_capacity = 0\n");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("cache_capacity"));
}

#[test]
fn secret_is_redacted() {
    let mut config = Config::default();
    config.embedding.api_key = Some(Secret::new("sk-very-secret"));
    let debug = format!("{config:?}");
    assert!(!debug.contains("sk-very-secret"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn builder_config_follows_settings() {
    let mut config = Config::default();
    config.embedding.batch_size = 32;
    config.index.window_tokens = 128;
    let builder = config.builder_config();
    assert_eq!(builder.batch_size, 32);
    assert_eq!(builder.chunker.window_tokens, 128);
    assert_eq!(builder.chunker.min_file_chars, 128);
}

#[test]
fn serialized_config_omits_api_key() {
    let mut config = Config::default();
    config.embedding.api_key = Some(Secret::new("sk-1"));
    let toml = toml::to_string(&config).unwrap();
    assert!(!toml.contains("sk-1"));
    assert!(toml.contains("[embedding]"));
}
