//! Process-wide edit-mode gate.
//!
//! While the flag is on, every mutating operation by a non-master user fails
//! fast at the HTTP edge. The flag lives in `system_config` so all three
//! entry points observe the same value.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{now_rfc3339, Database};
use crate::error::Result;
use crate::hub::{HubHandle, WsEvent};

const EDIT_MODE_KEY: &str = "edit_mode";

/// Read the flag straight off a connection. Absent row reads as false.
pub fn get_edit_mode(conn: &Connection) -> Result<bool> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM system_config WHERE key = ?",
            params![EDIT_MODE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.as_deref() == Some("true"))
}

pub fn set_edit_mode(conn: &Connection, enabled: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO system_config (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![EDIT_MODE_KEY, if enabled { "true" } else { "false" }, now_rfc3339()],
    )?;
    Ok(())
}

pub struct SystemService {
    db: Database,
    hub: HubHandle,
}

impl SystemService {
    pub fn new(db: Database, hub: HubHandle) -> Self {
        Self { db, hub }
    }

    pub fn edit_mode(&self) -> Result<bool> {
        get_edit_mode(&self.db.conn())
    }

    /// Flip the gate and notify every connected client.
    pub fn update_edit_mode(&self, enabled: bool) -> Result<()> {
        set_edit_mode(&self.db.conn(), enabled)?;

        self.hub.try_broadcast(WsEvent::SystemEditModeChanged {
            is_editing: enabled,
            message: "System edit mode has been updated.".to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::create_hub;

    #[test]
    fn test_edit_mode_defaults_to_false() {
        let db = Database::in_memory().unwrap();
        assert!(!get_edit_mode(&db.conn()).unwrap());
    }

    #[test]
    fn test_edit_mode_round_trip() {
        let db = Database::in_memory().unwrap();
        {
            let conn = db.conn();
            set_edit_mode(&conn, true).unwrap();
            assert!(get_edit_mode(&conn).unwrap());
            set_edit_mode(&conn, false).unwrap();
            assert!(!get_edit_mode(&conn).unwrap());
        }
    }

    #[tokio::test]
    async fn test_update_broadcasts_change() {
        let db = Database::in_memory().unwrap();
        let (handle, hub) = create_hub();
        tokio::spawn(hub.run());

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        handle
            .register(crate::hub::Client {
                id: "c1".to_string(),
                user_id: 1,
                tx,
            })
            .await;

        let service = SystemService::new(db, handle);
        service.update_edit_mode(true).unwrap();

        let seen = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(seen.contains("SYSTEM_EDIT_MODE_CHANGED"));
        assert!(seen.contains("\"is_editing\":true"));
        assert!(service.edit_mode().unwrap());
    }
}
