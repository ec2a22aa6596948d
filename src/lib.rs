pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod entities;
pub mod model;
pub mod retry;

pub use api::{ApiClient, Error};
pub use coordinator::{Coordinator, CycleOutcome, CycleState};
