//! HTTP/WS edge for the jobdesk backend. The binary entry points live in
//! `main.rs`; the router and state are exported for integration tests.

pub mod api;
pub mod metrics;
pub mod state;
