//! Read-side queries over the master-data tables the core consumes.
//!
//! Master-data CRUD lives outside the core; the insert helpers here exist for
//! seeding and tests. Every function takes a connection so callers can compose
//! them inside their own transactions.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::{AppUser, Department, Employee, Position, UserDetail};
use crate::error::Result;

pub fn find_employee_by_npk(conn: &Connection, npk: &str) -> Result<Option<Employee>> {
    let employee = conn
        .query_row(
            r#"
            SELECT e.npk, e.name, e.department_id, e.area_id, p.id, p.name
            FROM employee e
            JOIN employee_position p ON e.position_id = p.id
            WHERE e.npk = ?"#,
            params![npk],
            |row| {
                Ok(Employee {
                    npk: row.get(0)?,
                    name: row.get(1)?,
                    department_id: row.get(2)?,
                    area_id: row.get(3)?,
                    position: Position {
                        id: row.get(4)?,
                        name: row.get(5)?,
                    },
                })
            },
        )
        .optional()?;
    Ok(employee)
}

pub fn find_department(conn: &Connection, id: i64) -> Result<Option<Department>> {
    let department = conn
        .query_row(
            "SELECT id, name, is_active, receive_job FROM department WHERE id = ?",
            params![id],
            |row| {
                Ok(Department {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get(2)?,
                    receive_job: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(department)
}

/// Departments the schedulers iterate over: active and receiving jobs.
pub fn active_receiving_department_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT id FROM department WHERE is_active = 1 AND receive_job = 1")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Find an existing (name, physical location) pair or insert it, returning the id.
pub fn find_or_create_specified_location(
    conn: &Connection,
    name: &str,
    physical_location_id: i64,
) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM specified_location WHERE name = ? AND physical_location_id = ?",
            params![name, physical_location_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO specified_location (name, physical_location_id) VALUES (?, ?)",
        params![name, physical_location_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn permissions_for_position(conn: &Connection, position_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM position_permission WHERE employee_position_id = ? ORDER BY name",
    )?;
    let names = stmt
        .query_map(params![position_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn row_to_app_user(row: &rusqlite::Row) -> rusqlite::Result<AppUser> {
    Ok(AppUser {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        password_salt: row.get(3)?,
        user_type: row.get(4)?,
        employee_npk: row.get(5)?,
        employee_position_id: row.get(6)?,
    })
}

const APP_USER_COLUMNS: &str = "id, username, password_hash, password_salt, user_type, \
                                employee_npk, employee_position_id";

/// Login accepts either the account username or the employee NPK.
pub fn find_user_by_username_or_npk(conn: &Connection, ident: &str) -> Result<Option<AppUser>> {
    let user = conn
        .query_row(
            &format!("SELECT {APP_USER_COLUMNS} FROM app_user WHERE username = ?1 OR employee_npk = ?1"),
            params![ident],
            row_to_app_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_id(conn: &Connection, id: i64) -> Result<Option<AppUser>> {
    let user = conn
        .query_row(
            &format!("SELECT {APP_USER_COLUMNS} FROM app_user WHERE id = ?"),
            params![id],
            row_to_app_user,
        )
        .optional()?;
    Ok(user)
}

/// User view for login/refresh responses. Permissions are filled by the caller.
pub fn user_detail(conn: &Connection, user_id: i64) -> Result<Option<UserDetail>> {
    let detail = conn
        .query_row(
            r#"
            SELECT u.id, u.username, u.user_type, u.employee_npk, e.name,
                   u.employee_position_id, p.name, e.department_id, d.name
            FROM app_user u
            LEFT JOIN employee e ON u.employee_npk = e.npk
            LEFT JOIN employee_position p ON u.employee_position_id = p.id
            LEFT JOIN department d ON e.department_id = d.id
            WHERE u.id = ?"#,
            params![user_id],
            |row| {
                Ok(UserDetail {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    user_type: row.get(2)?,
                    npk: row.get(3)?,
                    name: row.get(4)?,
                    position_id: row.get(5)?,
                    position_name: row.get(6)?,
                    department_id: row.get(7)?,
                    department_name: row.get(8)?,
                    permissions: Vec::new(),
                })
            },
        )
        .optional()?;
    Ok(detail)
}

// Seed helpers, used by tests and initial provisioning.

pub fn insert_department(conn: &Connection, name: &str, is_active: bool, receive_job: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO department (name, is_active, receive_job) VALUES (?, ?, ?)",
        params![name, is_active, receive_job],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_area(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO area (name) VALUES (?)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_physical_location(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO physical_location (name) VALUES (?)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_position(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO employee_position (name) VALUES (?)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_employee(
    conn: &Connection,
    npk: &str,
    name: &str,
    department_id: i64,
    area_id: Option<i64>,
    position_id: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO employee (npk, name, department_id, area_id, position_id) VALUES (?, ?, ?, ?, ?)",
        params![npk, name, department_id, area_id, position_id],
    )?;
    Ok(())
}

pub fn insert_app_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    password_salt: &str,
    user_type: &str,
    employee_npk: Option<&str>,
    employee_position_id: i64,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO app_user (username, password_hash, password_salt, user_type,
                              employee_npk, employee_position_id)
        VALUES (?, ?, ?, ?, ?, ?)"#,
        params![username, password_hash, password_salt, user_type, employee_npk, employee_position_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn grant_permission(conn: &Connection, position_id: i64, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO position_permission (employee_position_id, name) VALUES (?, ?)",
        params![position_id, name],
    )?;
    Ok(())
}
