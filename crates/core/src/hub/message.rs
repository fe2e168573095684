//! Wire envelope for WebSocket push messages: `{event, payload}`.

use serde::{Deserialize, Serialize};

use crate::ticket::TicketDetail;

/// Process-wide flags reported to a client on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub is_editing: bool,
}

/// Server-emitted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    ConnectionEstablished {
        system_status: SystemStatus,
    },
    TicketCreated(Box<TicketDetail>),
    TicketUpdated(Box<TicketDetail>),
    TicketStatusChanged(Box<TicketDetail>),
    TicketPriorityUpdated {
        department_target_id: i64,
        message: String,
    },
    TicketPriorityRecalculated {
        message: String,
    },
    JobPriorityUpdated {
        department_target_id: i64,
        message: String,
    },
    JobPriorityRecalculated {
        message: String,
    },
    EditingStarted {
        entity: String,
        context_id: i64,
    },
    EditingFinished {
        entity: String,
        context_id: i64,
    },
    SystemEditModeChanged {
        is_editing: bool,
        message: String,
    },
}

/// Client-accepted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    StartEditing { entity: String, context_id: i64 },
    FinishEditing { entity: String, context_id: i64 },
}
