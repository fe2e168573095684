//! Persistence for refresh tokens, the logout blacklist and one-shot
//! WebSocket tickets.

use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::now_rfc3339;
use crate::error::{Error, Result};

/// WS tickets bridge an authenticated HTTP session to a WS upgrade and are
/// only valid for a few seconds.
pub const WS_TICKET_TTL: Duration = Duration::from_secs(15);

pub fn store_refresh_token(
    conn: &Connection,
    user_id: i64,
    token_id: &str,
    expires_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO active_refresh_tokens (token_id, user_id, expires_at) VALUES (?, ?, ?)",
        params![token_id, user_id, expires_at],
    )?;
    Ok(())
}

/// Rotation step: a refresh token is single-use, so the stored row is checked
/// and deleted in one go.
pub fn validate_and_delete_refresh_token(
    conn: &Connection,
    user_id: i64,
    token_id: &str,
) -> Result<()> {
    let now = Utc::now().timestamp();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM active_refresh_tokens WHERE token_id = ? AND user_id = ? AND expires_at > ?",
            params![token_id, user_id, now],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_none() {
        return Err(Error::unauthenticated("token not found, invalid, or expired"));
    }

    conn.execute(
        "DELETE FROM active_refresh_tokens WHERE token_id = ?",
        params![token_id],
    )?;
    Ok(())
}

pub fn delete_all_user_refresh_tokens(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM active_refresh_tokens WHERE user_id = ?",
        params![user_id],
    )?;
    Ok(())
}

pub fn blacklist_token(conn: &Connection, token_id: &str, expires_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO token_blacklist (token_id, expires_at) VALUES (?, ?) \
         ON CONFLICT (token_id) DO NOTHING",
        params![token_id, expires_at],
    )?;
    Ok(())
}

pub fn is_token_blacklisted(conn: &Connection, token_id: &str) -> Result<bool> {
    let now = Utc::now().timestamp();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM token_blacklist WHERE token_id = ? AND expires_at > ?",
            params![token_id, now],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

/// Issue a one-shot WS ticket. `user_id` is NULL for anonymous clients.
pub fn issue_ws_ticket(conn: &Connection, user_id: Option<i64>) -> Result<String> {
    let ticket = uuid::Uuid::new_v4().to_string();
    let expires_at = Utc::now().timestamp() + WS_TICKET_TTL.as_secs() as i64;
    conn.execute(
        "INSERT INTO websocket_tickets (ticket, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        params![ticket, user_id, expires_at, now_rfc3339()],
    )?;
    Ok(ticket)
}

/// Resolve and delete a WS ticket in one step. Returns the bound user id,
/// 0 for anonymous clients.
pub fn consume_ws_ticket(conn: &Connection, ticket: &str) -> Result<i64> {
    let now = Utc::now().timestamp();
    let user_id: Option<Option<i64>> = conn
        .query_row(
            "SELECT user_id FROM websocket_tickets WHERE ticket = ? AND expires_at > ?",
            params![ticket, now],
            |row| row.get(0),
        )
        .optional()?;

    let Some(user_id) = user_id else {
        return Err(Error::unauthenticated("invalid or expired websocket ticket"));
    };

    conn.execute("DELETE FROM websocket_tickets WHERE ticket = ?", params![ticket])?;
    Ok(user_id.unwrap_or(0))
}

/// Drop expired rows; safe to run from any maintenance path.
pub fn purge_expired_ws_tickets(conn: &Connection) -> Result<usize> {
    let now = Utc::now().timestamp();
    let removed = conn.execute(
        "DELETE FROM websocket_tickets WHERE expires_at <= ?",
        params![now],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_refresh_token_is_single_use() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        let expires = Utc::now().timestamp() + 3600;
        store_refresh_token(&conn, 1, "tok-1", expires).unwrap();

        validate_and_delete_refresh_token(&conn, 1, "tok-1").unwrap();
        let again = validate_and_delete_refresh_token(&conn, 1, "tok-1");
        assert!(matches!(again, Err(Error::Unauthenticated(_))));
    }

    #[test]
    fn test_expired_refresh_token_rejected() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        store_refresh_token(&conn, 1, "tok-old", Utc::now().timestamp() - 10).unwrap();
        assert!(validate_and_delete_refresh_token(&conn, 1, "tok-old").is_err());
    }

    #[test]
    fn test_refresh_token_bound_to_user() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        store_refresh_token(&conn, 1, "tok-1", Utc::now().timestamp() + 3600).unwrap();
        assert!(validate_and_delete_refresh_token(&conn, 2, "tok-1").is_err());
    }

    #[test]
    fn test_blacklist_until_expiry() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        let future = Utc::now().timestamp() + 60;
        blacklist_token(&conn, "jti-1", future).unwrap();
        // Re-blacklisting the same jti is a no-op.
        blacklist_token(&conn, "jti-1", future).unwrap();

        assert!(is_token_blacklisted(&conn, "jti-1").unwrap());
        assert!(!is_token_blacklisted(&conn, "jti-2").unwrap());
    }

    #[test]
    fn test_expired_blacklist_entry_is_harmless() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        blacklist_token(&conn, "jti-old", Utc::now().timestamp() - 60).unwrap();
        assert!(!is_token_blacklisted(&conn, "jti-old").unwrap());
    }

    #[test]
    fn test_ws_ticket_consumed_once() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        let ticket = issue_ws_ticket(&conn, Some(42)).unwrap();

        assert_eq!(consume_ws_ticket(&conn, &ticket).unwrap(), 42);
        assert!(consume_ws_ticket(&conn, &ticket).is_err());
    }

    #[test]
    fn test_anonymous_ws_ticket_resolves_to_zero() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        let ticket = issue_ws_ticket(&conn, None).unwrap();
        assert_eq!(consume_ws_ticket(&conn, &ticket).unwrap(), 0);
    }

    #[test]
    fn test_purge_expired_ws_tickets() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO websocket_tickets (ticket, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            params!["stale", 1_i64, Utc::now().timestamp() - 5, now_rfc3339()],
        )
        .unwrap();
        let fresh = issue_ws_ticket(&conn, Some(1)).unwrap();

        assert_eq!(purge_expired_ws_tickets(&conn).unwrap(), 1);
        assert_eq!(consume_ws_ticket(&conn, &fresh).unwrap(), 1);
    }
}
