//! Authentication: password verification, JWT pairs, refresh rotation,
//! logout blacklist and one-shot WebSocket tickets.

pub mod jwt;
pub mod password;
mod service;
pub mod tokens;

pub use jwt::{validate_token, Claims, TokenPair};
pub use service::{AuthService, LoginRequest, LoginResponse};
pub use tokens::WS_TICKET_TTL;
