use crate::error::StoreError;
use crate::models::TitleDeletion;
use crate::traits::{commit_or_rollback, DocumentSession};
use tracing::{info, warn};

/// Creates the extension, tables and index when they do not exist yet.
pub async fn initialize_schema<S>(session: &mut S, dimensions: usize) -> Result<(), StoreError>
where
    S: DocumentSession + ?Sized,
{
    session.begin().await?;
    let result = session.create_schema(dimensions).await;
    commit_or_rollback(session, result).await?;

    info!(dimensions, "schema initialised");
    Ok(())
}

/// Deletes every document; content rows cascade.
pub async fn purge_all<S>(session: &mut S) -> Result<u64, StoreError>
where
    S: DocumentSession + ?Sized,
{
    session.begin().await?;
    let result = session.delete_all().await;
    let deleted = commit_or_rollback(session, result).await?;

    info!(deleted, "purged all documents");
    Ok(deleted)
}

/// Deletes documents by case-insensitive title, all titles in one transaction.
pub async fn delete_by_title<S>(
    session: &mut S,
    titles: &[String],
) -> Result<Vec<TitleDeletion>, StoreError>
where
    S: DocumentSession + ?Sized,
{
    session.begin().await?;
    let result = delete_titles(session, titles).await;
    let deletions = commit_or_rollback(session, result).await?;

    for deletion in &deletions {
        if deletion.deleted > 0 {
            info!(title = %deletion.title, deleted = deletion.deleted, "deleted documents");
        } else {
            warn!(title = %deletion.title, "no documents found for title");
        }
    }

    Ok(deletions)
}

async fn delete_titles<S>(
    session: &mut S,
    titles: &[String],
) -> Result<Vec<TitleDeletion>, StoreError>
where
    S: DocumentSession + ?Sized,
{
    let mut deletions = Vec::with_capacity(titles.len());
    for title in titles {
        let deleted = session.delete_by_title(title).await?;
        deletions.push(TitleDeletion {
            title: title.clone(),
            deleted,
        });
    }
    Ok(deletions)
}
