//! Tests for transport settings and credentials.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use inference_transport::config::{
    AuthMode, Credentials, RequestConfig, StreamFormat, TransportSettings,
};
use inference_transport::error::{ErrorKind, NotFoundRule};
use inference_transport::provider::TransportClient;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const SETTINGS_ENV_VARS: [&str; 7] = [
    "INFERENCE_MAX_RETRIES",
    "INFERENCE_TIMEOUT_MS",
    "INFERENCE_CONNECT_TIMEOUT_MS",
    "INFERENCE_STREAM_IDLE_TIMEOUT_MS",
    "INFERENCE_API_VERSION",
    "INFERENCE_TEST_KEY",
    "INFERENCE_TEST_BASE_URL",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() {
    for key in SETTINGS_ENV_VARS {
        std::env::remove_var(key);
    }
}

#[test]
fn settings_load_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
max_retries = 4
timeout_ms = 20000
connect_timeout_ms = 2500
initial_backoff_ms = 250
max_backoff_ms = 8000
backoff_multiplier = 3.0
backoff_jitter = 0.1

[classifier.not_found]
mode = "discriminate"
markers = ["model", "engine"]
"#
    )
    .unwrap();

    let settings = TransportSettings::from_file(file.path()).unwrap();
    assert_eq!(settings.max_retries, 4);
    assert_eq!(settings.connect_timeout(), Duration::from_millis(2500));
    assert_eq!(
        settings.classifier.not_found,
        NotFoundRule::Discriminate {
            markers: vec!["model".into(), "engine".into()]
        }
    );

    let backoff = settings.backoff();
    assert_eq!(backoff.initial, Duration::from_millis(250));
    assert_eq!(backoff.max, Duration::from_secs(8));
    assert_eq!(backoff.multiplier, 3.0);

    let config = settings.request_config(StreamFormat::DeltaJson, AuthMode::Bearer);
    assert_eq!(config.timeout, Duration::from_secs(20));
    assert!(config.validate().is_ok());

    let client = TransportClient::from_settings(&settings).unwrap();
    assert_eq!(client.rules(), &settings.classifier);
}

#[test]
fn missing_settings_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TransportSettings::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert!(err.message().contains("absent.toml"));
}

#[test]
fn settings_from_env_override_defaults() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&SETTINGS_ENV_VARS);
    clear_env();

    std::env::set_var("INFERENCE_MAX_RETRIES", "7");
    std::env::set_var("INFERENCE_STREAM_IDLE_TIMEOUT_MS", "45000");

    let settings = TransportSettings::from_env().unwrap();
    assert_eq!(settings.max_retries, 7);
    assert_eq!(settings.stream_idle_timeout_ms, Some(45_000));
    assert_eq!(settings.timeout_ms, TransportSettings::default().timeout_ms);

    std::env::set_var("INFERENCE_TIMEOUT_MS", "soon");
    let err = TransportSettings::from_env().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

#[test]
fn credentials_from_env() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&SETTINGS_ENV_VARS);
    clear_env();

    let err = Credentials::from_env(
        "INFERENCE_TEST_KEY",
        "INFERENCE_TEST_BASE_URL",
        "https://api.example.com/v1",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApiKeyMissing);

    std::env::set_var("INFERENCE_TEST_KEY", "sk-live");
    let creds = Credentials::from_env(
        "INFERENCE_TEST_KEY",
        "INFERENCE_TEST_BASE_URL",
        "https://api.example.com/v1",
    )
    .unwrap();
    assert_eq!(creds.base_url, "https://api.example.com/v1");
    assert_eq!(creds.endpoint("messages"), "https://api.example.com/v1/messages");

    std::env::set_var("INFERENCE_TEST_BASE_URL", "localhost:8080");
    let err = Credentials::from_env(
        "INFERENCE_TEST_KEY",
        "INFERENCE_TEST_BASE_URL",
        "https://api.example.com/v1",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBaseUrl);
}

#[test]
fn request_config_builder_overrides() {
    let config = RequestConfig::builder()
        .max_retries(0)
        .timeout(Duration::from_secs(5))
        .format(StreamFormat::TypedEvent)
        .stream_idle_timeout(Duration::from_secs(30))
        .api_version("2024-10-22")
        .build();
    assert_eq!(config.max_retries, 0);
    assert_eq!(config.format, StreamFormat::TypedEvent);
    assert_eq!(config.auth_mode, AuthMode::Bearer);
    assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.api_version, "2024-10-22");

    assert_eq!("typed-event".parse::<StreamFormat>().unwrap(), StreamFormat::TypedEvent);
    assert_eq!(AuthMode::ApiKeyHeader.to_string(), "api-key-header");
}
