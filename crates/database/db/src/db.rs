use crate::{
    error::DatabaseResult,
    models::kv,
    store::{KeyValueStore, WriteBatch},
};
use sea_orm::{
    sea_query::OnConflict, ActiveValue, Database as SeaOrmDatabase, DatabaseConnection,
    EntityTrait, TransactionTrait,
};

/// A [`KeyValueStore`] backed by a sql database.
///
/// The [`SqlKeyValueStore`] wraps a [`sea_orm::DatabaseConnection`] and stores all pairs in the
/// `kv` table. Every [`WriteBatch`] is applied in a single transaction.
#[derive(Debug, Clone)]
pub struct SqlKeyValueStore {
    /// The underlying database connection.
    connection: DatabaseConnection,
}

impl SqlKeyValueStore {
    /// Creates a new [`SqlKeyValueStore`] instance associated with the provided database URL.
    pub async fn new(database_url: &str) -> DatabaseResult<Self> {
        let connection = SeaOrmDatabase::connect(database_url).await?;
        Ok(Self { connection })
    }

    /// Returns the underlying connection.
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

impl From<DatabaseConnection> for SqlKeyValueStore {
    fn from(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn get(&self, key: &[u8]) -> DatabaseResult<Option<Vec<u8>>> {
        Ok(kv::Entity::find_by_id(key.to_vec()).one(&self.connection).await?.map(|m| m.value))
    }

    async fn write(&self, batch: WriteBatch) -> DatabaseResult<()> {
        if batch.is_empty() {
            return Ok(())
        }

        let len = batch.len();
        let tx = self.connection.begin().await?;
        for (key, value) in batch {
            let model = kv::ActiveModel { key: ActiveValue::Set(key), value: ActiveValue::Set(value) };
            kv::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(kv::Column::Key).update_column(kv::Column::Value).to_owned(),
                )
                .exec_without_returning(&tx)
                .await?;
        }
        tracing::trace!(target: "mel::db", len, "committing write batch");
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;

    #[tokio::test]
    async fn test_write_batch_upserts() -> eyre::Result<()> {
        // Given
        let store = setup_test_store().await;
        let mut batch = WriteBatch::default();
        batch.put(b"a".to_vec(), vec![1]);
        batch.put(b"b".to_vec(), vec![2]);
        store.write(batch).await?;

        // When
        let mut batch = WriteBatch::default();
        batch.put(b"a".to_vec(), vec![3]);
        store.write(batch).await?;

        // Then
        assert_eq!(store.get(b"a").await?, Some(vec![3]));
        assert_eq!(store.get(b"b").await?, Some(vec![2]));
        assert!(!store.has(b"c").await?);

        Ok(())
    }
}
