//! Priority management: manual optimistic reorder and the scheduled
//! background rescorer.

mod reorder;
mod scheduler;

pub use reorder::{PriorityService, ReorderItem, ReorderRequest};
pub use scheduler::{age_weight, deadline_weight, PriorityScheduler};
