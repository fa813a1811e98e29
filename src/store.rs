//! Persistence for records awaiting scores and for scoring jobs.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use models::{Record, ScoringJob};
pub use traits::{JobStore, RecordStore};
