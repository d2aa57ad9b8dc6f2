//! SQLite-backed candidate pools and benchmark history for the sbloopy loop.

pub mod export;
pub mod filter;
pub mod schema;
pub mod store;

pub use export::export_training_csv;
pub use filter::{PoolFilter, SeedPolicy};
pub use schema::{init_schema, BehaviorStats, IterationSummary, StoredRow, SCHEMA_VERSION};
pub use store::{ExperimentStore, OutcomeRecord};
