//! Realtime coordination hub: client registry, broadcast fan-out and
//! cooperative editing-session locks.

#[allow(clippy::module_inception)]
mod hub;
mod message;

pub use hub::{create_hub, Client, Hub, HubHandle, CLIENT_BUFFER};
pub use message::{ClientEvent, SystemStatus, WsEvent};
