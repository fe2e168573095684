//! Login, token rotation and logout.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::jwt::{generate_tokens, validate_token};
use super::{password, tokens};
use crate::config::AuthConfig;
use crate::db::Database;
use crate::directory::{store as directory, UserDetail};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserDetail,
}

pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    pub fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let conn = self.db.conn();

        let user = directory::find_user_by_username_or_npk(&conn, &req.username)?
            .ok_or_else(|| Error::unauthenticated("invalid credentials"))?;

        if !password::verify_password(&req.password, &user.password_salt, &user.password_hash) {
            return Err(Error::unauthenticated("invalid credentials"));
        }

        let employee = match &user.employee_npk {
            Some(npk) => Some(directory::find_employee_by_npk(&conn, npk)?.ok_or_else(|| {
                Error::not_found("employee data associated with user not found")
            })?),
            None => None,
        };

        let pair = generate_tokens(&self.config, &user, employee.as_ref())?;
        tokens::store_refresh_token(&conn, user.id, &pair.refresh_token_id, pair.refresh_expires_at)?;

        let mut detail = directory::user_detail(&conn, user.id)?
            .ok_or_else(|| Error::not_found("user not found"))?;
        detail.permissions = directory::permissions_for_position(&conn, detail.position_id)?;

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: detail,
        })
    }

    /// Rotate a refresh token: the presented token is invalidated and a new
    /// pair is issued.
    pub fn refresh(&self, refresh_token: &str) -> Result<LoginResponse> {
        let claims = validate_token(&self.config, refresh_token, true)
            .map_err(|_| Error::unauthenticated("invalid or expired refresh token"))?;

        let conn = self.db.conn();
        tokens::validate_and_delete_refresh_token(&conn, claims.user_id, &claims.token_id)?;

        let user = directory::find_user_by_id(&conn, claims.user_id)?
            .ok_or_else(|| Error::unauthenticated("user associated with token not found"))?;

        let employee = match &user.employee_npk {
            Some(npk) => Some(directory::find_employee_by_npk(&conn, npk)?.ok_or_else(|| {
                Error::not_found("employee data associated with user not found")
            })?),
            None => None,
        };

        let pair = generate_tokens(&self.config, &user, employee.as_ref())?;
        tokens::store_refresh_token(&conn, user.id, &pair.refresh_token_id, pair.refresh_expires_at)?;

        let mut detail = directory::user_detail(&conn, user.id)?
            .ok_or_else(|| Error::not_found("user not found"))?;
        detail.permissions = directory::permissions_for_position(&conn, detail.position_id)?;

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: detail,
        })
    }

    /// Blacklist the presented access token until its natural expiry and drop
    /// every refresh token of that user. An already-invalid token is a no-op.
    pub fn logout(&self, access_token: &str) -> Result<()> {
        let Ok(claims) = validate_token(&self.config, access_token, false) else {
            return Ok(());
        };

        if claims.exp <= Utc::now().timestamp() {
            return Ok(());
        }

        let conn = self.db.conn();
        tokens::blacklist_token(&conn, &claims.token_id, claims.exp)?;
        tokens::delete_all_user_refresh_tokens(&conn, claims.user_id)
    }

    pub fn issue_ws_ticket(&self, user_id: i64) -> Result<String> {
        let conn = self.db.conn();
        tokens::issue_ws_ticket(&conn, Some(user_id))
    }

    pub fn issue_public_ws_ticket(&self) -> Result<String> {
        let conn = self.db.conn();
        tokens::issue_ws_ticket(&conn, None)
    }

    /// Resolve and delete a WS ticket; returns 0 for anonymous clients.
    pub fn consume_ws_ticket(&self, ticket: &str) -> Result<i64> {
        let conn = self.db.conn();
        tokens::consume_ws_ticket(&conn, ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::store::{
        insert_app_user, insert_department, insert_employee, insert_position,
    };

    fn service_with_user() -> AuthService {
        let db = Database::in_memory().unwrap();
        {
            let conn = db.conn();
            let dept = insert_department(&conn, "GA", true, true).unwrap();
            let pos = insert_position(&conn, "Staff").unwrap();
            insert_employee(&conn, "E100", "Asep", dept, None, pos).unwrap();
            let salt = password::generate_salt();
            let hash = password::hash_password("hunter2", &salt);
            insert_app_user(&conn, "asep", &hash, &salt, "regular", Some("E100"), pos).unwrap();
        }
        let config = AuthConfig {
            jwt_secret_key: "access-secret".to_string(),
            jwt_refresh_secret_key: "refresh-secret".to_string(),
            ..Default::default()
        };
        AuthService::new(db, config)
    }

    #[test]
    fn test_login_success() {
        let service = service_with_user();
        let resp = service
            .login(&LoginRequest {
                username: "asep".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();

        assert!(!resp.access_token.is_empty());
        assert_eq!(resp.user.npk.as_deref(), Some("E100"));
    }

    #[test]
    fn test_login_bad_password() {
        let service = service_with_user();
        let err = service
            .login(&LoginRequest {
                username: "asep".to_string(),
                password: "wrong".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[test]
    fn test_login_unknown_user() {
        let service = service_with_user();
        let err = service
            .login(&LoginRequest {
                username: "ghost".to_string(),
                password: "irrelevant".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[test]
    fn test_refresh_rotates_token() {
        let service = service_with_user();
        let login = service
            .login(&LoginRequest {
                username: "asep".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();

        let refreshed = service.refresh(&login.refresh_token).unwrap();
        assert_ne!(refreshed.refresh_token, login.refresh_token);

        // The old refresh token was deleted on rotation.
        assert!(service.refresh(&login.refresh_token).is_err());
    }

    #[test]
    fn test_logout_blacklists_and_clears_refresh_tokens() {
        let service = service_with_user();
        let login = service
            .login(&LoginRequest {
                username: "asep".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();

        service.logout(&login.access_token).unwrap();
        assert!(service.refresh(&login.refresh_token).is_err());

        let claims = validate_token(
            &AuthConfig {
                jwt_secret_key: "access-secret".to_string(),
                jwt_refresh_secret_key: "refresh-secret".to_string(),
                ..Default::default()
            },
            &login.access_token,
            false,
        )
        .unwrap();
        let conn = service.db.conn();
        assert!(tokens::is_token_blacklisted(&conn, &claims.token_id).unwrap());
    }

    #[test]
    fn test_logout_garbage_token_is_noop() {
        let service = service_with_user();
        service.logout("garbage").unwrap();
    }
}
