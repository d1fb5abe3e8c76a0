//! SMARTER bootstrap steps
//!
//! Collections first, then indexes, then seed data. All three read the
//! canonical table from [`crate::schema::smarter_schema`].

use mongodb_initdb::{migrations, MigrationRegistration};

pub mod m001_create_collections;
pub mod m002_create_indexes;
pub mod m003_seed_counters;

pub use m001_create_collections::CreateCollections;
pub use m002_create_indexes::CreateIndexes;
pub use m003_seed_counters::SeedCounters;

/// Every bootstrap step of the service
pub static STEPS: &[MigrationRegistration] = migrations![CreateCollections, CreateIndexes, SeedCounters];

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb_initdb::create_migration_registry;

    #[test]
    fn test_steps_form_a_complete_sequence() {
        let registry = create_migration_registry(STEPS).unwrap();
        assert_eq!(registry.get_versions(), vec![1, 2, 3]);
        assert!(registry.validate_sequence().is_ok());
    }

    #[test]
    fn test_step_descriptions() {
        let registry = create_migration_registry(STEPS).unwrap();
        let descriptions: Vec<&str> = registry
            .get_all_migrations()
            .iter()
            .map(|m| m.description())
            .collect();
        assert_eq!(
            descriptions,
            vec![
                "Create validated collections",
                "Create unique indexes",
                "Seed sample counters",
            ]
        );
    }
}
