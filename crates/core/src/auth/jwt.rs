//! JWT claims and signing for access and refresh tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::directory::{AppUser, Employee};
use crate::error::{Error, Result};

/// Claims carried by both token kinds. Refresh tokens omit the employee
/// attributes; authorization always re-reads the database anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "uid")]
    pub user_id: i64,
    #[serde(rename = "typ", default)]
    pub user_type: String,
    #[serde(rename = "npk", default, skip_serializing_if = "Option::is_none")]
    pub employee_npk: Option<String>,
    #[serde(rename = "pos_id")]
    pub employee_position_id: i64,
    #[serde(rename = "dept_id", default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    #[serde(rename = "area_id", default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<i64>,
    #[serde(rename = "jti")]
    pub token_id: String,
    pub exp: i64,
}

/// A freshly minted access/refresh pair. The refresh token's id and expiry
/// are surfaced so the caller can persist the rotation.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_id: String,
    pub refresh_expires_at: i64,
}

/// Sign an access + refresh pair for the given user.
pub fn generate_tokens(
    config: &AuthConfig,
    user: &AppUser,
    employee: Option<&Employee>,
) -> Result<TokenPair> {
    let now = Utc::now();

    let npk = employee
        .map(|e| e.npk.clone())
        .or_else(|| user.employee_npk.clone());

    let access_exp = now + chrono::Duration::seconds(config.access_lifespan().as_secs() as i64);
    let access_claims = Claims {
        user_id: user.id,
        user_type: user.user_type.clone(),
        employee_npk: npk,
        employee_position_id: user.employee_position_id,
        department_id: employee.map(|e| e.department_id),
        area_id: employee.and_then(|e| e.area_id),
        token_id: uuid::Uuid::new_v4().to_string(),
        exp: access_exp.timestamp(),
    };

    let access_token = encode(
        &Header::new(Algorithm::HS256),
        &access_claims,
        &EncodingKey::from_secret(config.jwt_secret_key.as_bytes()),
    )
    .map_err(|e| Error::Database(format!("failed to sign access token: {e}")))?;

    let refresh_exp = now + chrono::Duration::seconds(config.refresh_lifespan().as_secs() as i64);
    let refresh_token_id = uuid::Uuid::new_v4().to_string();
    let refresh_claims = Claims {
        user_id: user.id,
        user_type: String::new(),
        employee_npk: None,
        employee_position_id: user.employee_position_id,
        department_id: None,
        area_id: None,
        token_id: refresh_token_id.clone(),
        exp: refresh_exp.timestamp(),
    };

    let refresh_token = encode(
        &Header::new(Algorithm::HS256),
        &refresh_claims,
        &EncodingKey::from_secret(config.jwt_refresh_secret_key.as_bytes()),
    )
    .map_err(|e| Error::Database(format!("failed to sign refresh token: {e}")))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        refresh_token_id,
        refresh_expires_at: refresh_exp.timestamp(),
    })
}

/// Validate a token's signature and expiry, returning its claims.
pub fn validate_token(config: &AuthConfig, token: &str, is_refresh: bool) -> Result<Claims> {
    let secret = if is_refresh {
        &config.jwt_refresh_secret_key
    } else {
        &config.jwt_secret_key
    };
    if secret.is_empty() {
        return Err(Error::unauthenticated("jwt secret key is not set"));
    }

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::unauthenticated("invalid or expired token"))?;

    Ok(data.claims)
}
