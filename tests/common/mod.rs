use std::fs;
use std::path::PathBuf;

use base64::Engine;
use tempfile::TempDir;

use iamguard::config::Config;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Builds an unsigned JWT whose payload is `claims`.
#[allow(dead_code)]
pub fn make_jwt(claims: serde_json::Value) -> String {
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

/// Configuration pointing both the provider and the backend at `server_uri`.
#[allow(dead_code)]
pub fn config_for(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.auth.client_id = "test-client".to_string();
    config.auth.provider_url = Some(server_uri.to_string());
    config.api.base_url = server_uri.to_string();
    config.api.read_retries = 0;
    config
}
