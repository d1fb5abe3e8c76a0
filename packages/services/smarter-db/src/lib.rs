//! Schema bootstrap for the SMARTER sheep/goat sample registry.
//!
//! Creates the `counters`, `breeds` and `sampleSheep` collections with their
//! validators and unique indexes, then seeds the per-species sample counters.
//! Running it again against an initialized database changes nothing.

pub mod cli;
pub mod config;
pub mod counters;
pub mod error;
pub mod migrations;
pub mod models;
pub mod schema;

pub use config::Config;
pub use error::SmarterError;
pub use models::{Breed, BreedName, Counter, Sample, Species};

/// Name the bootstrap steps are recorded under
pub const SERVICE_NAME: &str = "smarter";
