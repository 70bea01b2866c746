//! Test utilities for the database crate.

use crate::{MelDatabase, SqlKeyValueStore};
use mel_migration::{Migrator, MigratorTrait};

/// Instantiates a new in-memory sqlite store and runs the migrations to set up the schema.
pub async fn setup_test_store() -> SqlKeyValueStore {
    let connection = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&connection, None).await.unwrap();
    connection.into()
}

/// Instantiates a [`MelDatabase`] over a fresh in-memory sqlite store.
pub async fn setup_test_db() -> MelDatabase<SqlKeyValueStore> {
    MelDatabase::new(setup_test_store().await)
}
