use crate::embeddings::cosine_distance;
use crate::error::StoreError;
use crate::models::{MetadataId, SimilarDocument};
use crate::traits::DocumentSession;
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub id: MetadataId,
    pub title: String,
    pub upload_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub metadata_id: MetadataId,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub metadata: Vec<MetadataRow>,
    pub content: Vec<ContentRow>,
    pub next_id: i32,
    pub schema_dimensions: Option<usize>,
}

impl MemoryState {
    fn delete_where(&mut self, matches: impl Fn(&MetadataRow) -> bool) -> u64 {
        let doomed: Vec<MetadataId> = self
            .metadata
            .iter()
            .filter(|row| matches(row))
            .map(|row| row.id)
            .collect();
        self.metadata.retain(|row| !doomed.contains(&row.id));
        self.content.retain(|row| !doomed.contains(&row.metadata_id));
        doomed.len() as u64
    }
}

/// Transactional in-memory store with hooks for injecting failures.
#[derive(Debug, Default)]
pub struct MemorySession {
    pub committed: MemoryState,
    pub(crate) staged: Option<MemoryState>,
    pub fail_content_for_title: Option<String>,
    pub omit_generated_id: bool,
    pub closed: bool,
}

impl MemorySession {
    pub fn titles(&self) -> Vec<String> {
        self.committed
            .metadata
            .iter()
            .map(|row| row.title.clone())
            .collect()
    }

    /// Seeds a committed document without going through a transaction.
    pub fn seed(&mut self, title: &str, embedding: Vec<f32>) -> MetadataId {
        self.committed.next_id += 1;
        let id = MetadataId(self.committed.next_id);
        self.committed.metadata.push(MetadataRow {
            id,
            title: title.to_string(),
            upload_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        });
        self.committed.content.push(ContentRow {
            metadata_id: id,
            text: format!("seeded {title}"),
            embedding,
        });
        id
    }

    fn state(&mut self) -> Result<&mut MemoryState, StoreError> {
        self.staged.as_mut().ok_or(StoreError::NoTransaction)
    }

    fn injected(details: &str) -> StoreError {
        StoreError::Database(sqlx::Error::Protocol(details.to_string()))
    }
}

#[async_trait]
impl DocumentSession for MemorySession {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::TransactionAlreadyOpen);
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let staged = self.staged.take().ok_or(StoreError::NoTransaction)?;
        self.committed = staged;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.staged = None;
        Ok(())
    }

    async fn create_schema(&mut self, dimensions: usize) -> Result<(), StoreError> {
        let state = self.state()?;
        state.schema_dimensions.get_or_insert(dimensions);
        Ok(())
    }

    async fn delete_all(&mut self) -> Result<u64, StoreError> {
        Ok(self.state()?.delete_where(|_| true))
    }

    async fn delete_by_title(&mut self, title: &str) -> Result<u64, StoreError> {
        let lowered = title.to_lowercase();
        Ok(self
            .state()?
            .delete_where(|row| row.title.to_lowercase() == lowered))
    }

    async fn nearest_within(
        &mut self,
        embedding: &[f32],
        max_distance: f64,
    ) -> Result<Option<SimilarDocument>, StoreError> {
        let state = self.state()?;
        Ok(state
            .content
            .iter()
            .map(|row| SimilarDocument {
                metadata_id: row.metadata_id,
                distance: cosine_distance(embedding, &row.embedding),
            })
            .filter(|candidate| candidate.distance < max_distance)
            .min_by(|left, right| left.distance.total_cmp(&right.distance)))
    }

    async fn delete_metadata(&mut self, id: MetadataId) -> Result<u64, StoreError> {
        Ok(self.state()?.delete_where(|row| row.id == id))
    }

    async fn insert_metadata(
        &mut self,
        title: &str,
        upload_date: NaiveDate,
    ) -> Result<Option<MetadataId>, StoreError> {
        let omit = self.omit_generated_id;
        let state = self.state()?;
        state.next_id += 1;
        let id = MetadataId(state.next_id);
        state.metadata.push(MetadataRow {
            id,
            title: title.to_string(),
            upload_date,
        });
        Ok(if omit { None } else { Some(id) })
    }

    async fn insert_content(
        &mut self,
        metadata_id: MetadataId,
        text: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let fail_for = self.fail_content_for_title.clone();
        let state = self.state()?;

        let owner = state
            .metadata
            .iter()
            .find(|row| row.id == metadata_id)
            .ok_or_else(|| Self::injected("foreign key violation on content.metadata_id"))?;

        if fail_for.as_deref() == Some(owner.title.as_str()) {
            return Err(Self::injected("injected content insert failure"));
        }

        state.content.push(ContentRow {
            metadata_id,
            text: text.to_string(),
            embedding: embedding.to_vec(),
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.staged = None;
        self.closed = true;
    }
}
