//! Master-data entities (departments, employees, positions, locations) as the
//! core consumes them. CRUD for these tables is owned elsewhere.

pub mod store;
mod types;

pub use types::{AppUser, Department, Employee, Position, UserDetail};
