//! The workflow engine and its reference data: transitions gated by
//! (status × action × actor role), contextual role resolution, and section
//! reorganization.

pub mod engine;
pub mod registry;
pub mod roles;
mod sections;
pub mod store;
pub mod types;

pub use engine::{ExecuteActionRequest, WorkflowEngine};
pub use sections::{ReorderStatusBandsRequest, SectionService};
pub use types::{
    Action, ActorRole, AvailableAction, Section, Status, Transition, Workflow, WorkflowStep,
};
