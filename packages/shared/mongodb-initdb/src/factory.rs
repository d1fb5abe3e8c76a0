use crate::{Migration, MigrationRegistry, Result};

/// A named constructor for one bootstrap step
pub struct MigrationRegistration {
    pub name: &'static str,
    pub constructor: fn() -> Box<dyn Migration>,
}

impl MigrationRegistration {
    pub const fn new(name: &'static str, constructor: fn() -> Box<dyn Migration>) -> Self {
        Self { name, constructor }
    }
}

/// Build a registry from a service's step list (see [`crate::migrations!`])
pub fn create_migration_registry(steps: &[MigrationRegistration]) -> Result<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();

    for registration in steps {
        let migration = (registration.constructor)();
        tracing::debug!(
            name = registration.name,
            version = migration.version(),
            "Registered migration"
        );
        registry = registry.register_boxed(migration)?;
    }

    tracing::info!("Migration registry created with {} migrations", registry.count());
    Ok(registry)
}
