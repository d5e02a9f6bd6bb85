use crate::error::StoreError;
use crate::models::{MetadataId, NewDocument};
use crate::traits::DocumentSession;
use tracing::debug;

/// Inserts the metadata row and its single content row inside the open transaction.
pub async fn insert_document<S>(
    session: &mut S,
    document: &NewDocument,
) -> Result<MetadataId, StoreError>
where
    S: DocumentSession + ?Sized,
{
    let metadata_id = session
        .insert_metadata(&document.title, document.upload_date)
        .await?
        .ok_or_else(|| StoreError::MissingGeneratedId(document.title.clone()))?;

    debug!(document = %document.title, %metadata_id, "metadata inserted");

    session
        .insert_content(metadata_id, &document.text, &document.embedding)
        .await?;

    Ok(metadata_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemorySession;
    use chrono::NaiveDate;

    fn document(title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            upload_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            text: "Holiday notice".to_string(),
            embedding: vec![0.6, 0.8],
        }
    }

    #[tokio::test]
    async fn writes_one_metadata_and_one_content_row() -> Result<(), StoreError> {
        let mut session = MemorySession::default();

        session.begin().await?;
        let id = insert_document(&mut session, &document("holiday.pdf")).await?;
        session.commit().await?;

        assert_eq!(session.committed.metadata.len(), 1);
        assert_eq!(session.committed.metadata[0].id, id);
        assert_eq!(session.committed.content.len(), 1);
        assert_eq!(session.committed.content[0].metadata_id, id);
        assert_eq!(session.committed.content[0].text, "Holiday notice");
        Ok(())
    }

    #[tokio::test]
    async fn missing_generated_id_is_an_error() -> Result<(), StoreError> {
        let mut session = MemorySession {
            omit_generated_id: true,
            ..MemorySession::default()
        };

        session.begin().await?;
        let result = insert_document(&mut session, &document("ghost.pdf")).await;
        session.rollback().await?;

        assert!(matches!(result, Err(StoreError::MissingGeneratedId(title)) if title == "ghost.pdf"));
        assert!(session.committed.metadata.is_empty());
        Ok(())
    }
}
