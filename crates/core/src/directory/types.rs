use serde::{Deserialize, Serialize};

/// A department that can file and/or receive work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub receive_job: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub name: String,
}

/// An employee as the workflow sees them: identity plus the relational
/// attributes role resolution depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub npk: String,
    pub name: String,
    pub department_id: i64,
    pub area_id: Option<i64>,
    pub position: Position,
}

/// Application login account. `employee_npk` is NULL for service accounts.
#[derive(Debug, Clone)]
pub struct AppUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub user_type: String,
    pub employee_npk: Option<String>,
    pub employee_position_id: i64,
}

impl AppUser {
    pub fn is_master(&self) -> bool {
        self.user_type == "master"
    }
}

/// User view returned by login/refresh, including resolved permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    pub id: i64,
    pub username: String,
    pub user_type: String,
    pub npk: Option<String>,
    pub name: Option<String>,
    pub position_id: i64,
    pub position_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub permissions: Vec<String>,
}
