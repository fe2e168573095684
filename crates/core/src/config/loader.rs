use figment::{
    providers::{Format, Toml},
    Figment,
};
use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration from an optional TOML file, then apply environment
/// variable overrides.
///
/// The file is optional so that a deployment can be driven purely by the
/// environment; every value has a default except the JWT secrets, which are
/// validated by `validate_config`.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    let mut config: Config = figment
        .extract()
        .map_err(|e| Error::bad_request(format!("failed to parse config: {e}")))?;

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config> {
    toml::from_str(toml_str).map_err(|e| Error::bad_request(format!("failed to parse config: {e}")))
}

/// Environment variables override file values under their well-known names.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.database.path = v.into();
    }
    if let Ok(v) = std::env::var("JWT_SECRET_KEY") {
        config.auth.jwt_secret_key = v;
    }
    if let Ok(v) = std::env::var("JWT_REFRESH_SECRET_KEY") {
        config.auth.jwt_refresh_secret_key = v;
    }
    if let Ok(v) = std::env::var("ACCESS_TOKEN_LIFESPAN") {
        config.auth.access_token_lifespan = v;
    }
    if let Ok(v) = std::env::var("REFRESH_TOKEN_LIFESPAN") {
        config.auth.refresh_token_lifespan = v;
    }
    if let Ok(v) = std::env::var("STORAGE_PATH") {
        config.storage.path = v.into();
    }
    if let Ok(v) = std::env::var("ALLOWED_ORIGINS") {
        config.allowed_origins = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

/// Reject configurations that cannot possibly serve authenticated traffic.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.auth.jwt_secret_key.is_empty() {
        return Err(Error::bad_request("JWT_SECRET_KEY must be set"));
    }
    if config.auth.jwt_refresh_secret_key.is_empty() {
        return Err(Error::bad_request("JWT_REFRESH_SECRET_KEY must be set"));
    }
    if config.auth.jwt_secret_key == config.auth.jwt_refresh_secret_key {
        return Err(Error::bad_request(
            "JWT_SECRET_KEY and JWT_REFRESH_SECRET_KEY must differ",
        ));
    }
    Ok(())
}
