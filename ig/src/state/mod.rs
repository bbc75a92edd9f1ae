//! State management with actor pattern
//!
//! StateManager owns the JobStore and processes messages via channels,
//! providing serialized access to job records.

mod manager;
mod messages;
mod recovery;
mod store;

pub use manager::{StateEvent, StateManager};
pub use messages::{StateCommand, StateError, StateResponse};
pub use recovery::{RecoveryStats, recover, scan_for_recovery};
pub use store::JobStore;
