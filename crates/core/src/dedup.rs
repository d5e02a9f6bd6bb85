use crate::error::StoreError;
use crate::models::DedupOutcome;
use crate::traits::DocumentSession;
use tracing::{info, warn};

/// Removes prior records that collide with an incoming document.
///
/// Runs inside the caller's transaction. Rows whose title equals `title`
/// case-insensitively go first; afterwards the single nearest content row
/// with cosine distance below `max_distance` has its metadata deleted.
pub async fn remove_conflicts<S>(
    session: &mut S,
    title: &str,
    embedding: &[f32],
    max_distance: f64,
) -> Result<DedupOutcome, StoreError>
where
    S: DocumentSession + ?Sized,
{
    let mut outcome = DedupOutcome {
        deleted_by_title: session.delete_by_title(title).await?,
        ..DedupOutcome::default()
    };

    if outcome.deleted_by_title > 0 {
        warn!(
            document = title,
            deleted = outcome.deleted_by_title,
            "replaced existing entries with the same title"
        );
    }

    if let Some(similar) = session.nearest_within(embedding, max_distance).await? {
        outcome.deleted_by_similarity = session.delete_metadata(similar.metadata_id).await?;
        outcome.similar = Some(similar);

        if outcome.deleted_by_similarity > 0 {
            warn!(
                document = title,
                metadata_id = %similar.metadata_id,
                distance = similar.distance,
                "replaced near-duplicate entry"
            );
        } else {
            info!(
                document = title,
                metadata_id = %similar.metadata_id,
                "near-duplicate entry was already gone"
            );
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemorySession;

    #[tokio::test]
    async fn title_collision_is_case_insensitive() -> Result<(), StoreError> {
        let mut session = MemorySession::default();
        session.seed("Notice.PDF", vec![1.0, 0.0]);
        session.seed("other.pdf", vec![0.0, 1.0]);

        session.begin().await?;
        let outcome = remove_conflicts(&mut session, "notice.pdf", &[-1.0, 0.0], 0.05).await?;
        session.commit().await?;

        assert_eq!(outcome.deleted_by_title, 1);
        assert_eq!(outcome.similar, None);
        assert_eq!(session.titles(), vec!["other.pdf".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn only_the_nearest_match_within_threshold_is_deleted() -> Result<(), StoreError> {
        let mut session = MemorySession::default();
        session.seed("far.pdf", vec![0.0, 1.0]);
        let near = session.seed("near.pdf", vec![1.0, 0.01]);
        session.seed("nearer.pdf", vec![1.0, 0.001]);

        session.begin().await?;
        let outcome = remove_conflicts(&mut session, "new.pdf", &[1.0, 0.0], 0.05).await?;
        session.commit().await?;

        let similar = outcome.similar.expect("a near duplicate exists");
        assert_ne!(similar.metadata_id, near);
        assert_eq!(outcome.deleted_by_similarity, 1);
        assert_eq!(
            session.titles(),
            vec!["far.pdf".to_string(), "near.pdf".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn distance_at_threshold_is_not_a_duplicate() -> Result<(), StoreError> {
        let mut session = MemorySession::default();
        session.seed("orthogonal.pdf", vec![0.0, 1.0]);

        session.begin().await?;
        let outcome = remove_conflicts(&mut session, "new.pdf", &[1.0, 0.0], 1.0).await?;
        session.commit().await?;

        assert_eq!(outcome, DedupOutcome::default());
        assert_eq!(session.titles().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn name_and_similarity_rules_can_hit_different_rows() -> Result<(), StoreError> {
        let mut session = MemorySession::default();
        session.seed("circular-7.pdf", vec![0.0, 1.0]);
        session.seed("renamed.pdf", vec![1.0, 0.0]);

        session.begin().await?;
        let outcome =
            remove_conflicts(&mut session, "CIRCULAR-7.pdf", &[1.0, 0.0], 0.05).await?;
        session.commit().await?;

        assert_eq!(outcome.replaced_rows(), 2);
        assert!(session.titles().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn statements_require_an_open_transaction() {
        let mut session = MemorySession::default();
        let result = remove_conflicts(&mut session, "a.pdf", &[1.0], 0.05).await;
        assert!(matches!(result, Err(StoreError::NoTransaction)));
    }
}
