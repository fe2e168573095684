//! jobdesk core: workflow engine, priority manager, realtime hub and the
//! stores backing them.

pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod files;
pub mod hub;
pub mod priority;
pub mod system;
pub mod testing;
pub mod ticket;
pub mod workflow;

pub use auth::{AuthService, Claims, LoginRequest, LoginResponse};
pub use config::{load_config, load_config_from_str, validate_config, Config};
pub use db::Database;
pub use error::{Error, Result};
pub use files::FileMetadata;
pub use hub::{create_hub, Hub, HubHandle, WsEvent};
pub use priority::{PriorityScheduler, PriorityService, ReorderRequest};
pub use system::SystemService;
pub use ticket::{RejectionService, TicketDetail, TicketFilter, TicketService};
pub use workflow::{SectionService, WorkflowEngine};
