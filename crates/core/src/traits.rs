use crate::error::StoreError;
use crate::models::{MetadataId, SimilarDocument};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::error;

/// One open connection to the relational store.
///
/// Every statement method runs inside the transaction opened by [`begin`];
/// calling one without an open transaction yields [`StoreError::NoTransaction`].
///
/// [`begin`]: DocumentSession::begin
#[async_trait]
pub trait DocumentSession: Send {
    async fn begin(&mut self) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;

    /// Creates extension, tables and the cosine index if they are missing.
    async fn create_schema(&mut self, dimensions: usize) -> Result<(), StoreError>;

    /// Deletes every metadata row; content rows go with them.
    async fn delete_all(&mut self) -> Result<u64, StoreError>;

    /// Case-insensitive title match.
    async fn delete_by_title(&mut self, title: &str) -> Result<u64, StoreError>;

    /// Nearest content row whose cosine distance is strictly below `max_distance`.
    async fn nearest_within(
        &mut self,
        embedding: &[f32],
        max_distance: f64,
    ) -> Result<Option<SimilarDocument>, StoreError>;

    async fn delete_metadata(&mut self, id: MetadataId) -> Result<u64, StoreError>;

    async fn insert_metadata(
        &mut self,
        title: &str,
        upload_date: NaiveDate,
    ) -> Result<Option<MetadataId>, StoreError>;

    async fn insert_content(
        &mut self,
        metadata_id: MetadataId,
        text: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError>;

    /// Rolls back any open transaction and releases the connection.
    async fn close(&mut self);
}

/// Commits when `result` is `Ok`, otherwise rolls back and returns the original error.
pub async fn commit_or_rollback<S, T>(
    session: &mut S,
    result: Result<T, StoreError>,
) -> Result<T, StoreError>
where
    S: DocumentSession + ?Sized,
{
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(failure) => {
            if let Err(rollback_error) = session.rollback().await {
                error!(error = %rollback_error, "rollback failed");
            }
            Err(failure)
        }
    }
}
