use crate::error::IngestError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_DOCUMENTS_DIR: &str = "Circulars";
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Generated surrogate key of a `metadata` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataId(pub i32);

impl fmt::Display for MetadataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One document or many, normalized once at the batch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSelection {
    One(String),
    Many(Vec<String>),
}

impl DocumentSelection {
    pub fn into_identifiers(self) -> Vec<String> {
        match self {
            DocumentSelection::One(identifier) => vec![identifier],
            DocumentSelection::Many(identifiers) => identifiers,
        }
    }
}

impl From<&str> for DocumentSelection {
    fn from(value: &str) -> Self {
        DocumentSelection::One(value.to_string())
    }
}

impl From<String> for DocumentSelection {
    fn from(value: String) -> Self {
        DocumentSelection::One(value)
    }
}

impl From<Vec<String>> for DocumentSelection {
    fn from(value: Vec<String>) -> Self {
        DocumentSelection::Many(value)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub documents_dir: PathBuf,
    pub similarity_threshold: f64,
    pub embedding_dimensions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from(DEFAULT_DOCUMENTS_DIR),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            embedding_dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl PipelineConfig {
    /// Maximum cosine distance at which two documents count as duplicates.
    pub fn distance_threshold(&self) -> f64 {
        1.0 - self.similarity_threshold
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(IngestError::InvalidArgument(format!(
                "similarity threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }

        if self.embedding_dimensions == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// A fully prepared document, ready for the database stage.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub upload_date: NaiveDate,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Nearest existing content row within the distance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarDocument {
    pub metadata_id: MetadataId,
    pub distance: f64,
}

/// What the deduplication step removed ahead of an insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    pub deleted_by_title: u64,
    pub similar: Option<SimilarDocument>,
    pub deleted_by_similarity: u64,
}

impl DedupOutcome {
    pub fn replaced_rows(&self) -> u64 {
        self.deleted_by_title + self.deleted_by_similarity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentStage {
    Pending,
    Extracted,
    Embedded,
    Deduplicated,
    Committed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    EmptyContent,
    Extraction(String),
    Embedding(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found"),
            SkipReason::EmptyContent => write!(f, "empty text"),
            SkipReason::Extraction(details) => write!(f, "extraction failed: {details}"),
            SkipReason::Embedding(details) => write!(f, "embedding failed: {details}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentStatus {
    Committed {
        metadata_id: MetadataId,
        dedup: DedupOutcome,
    },
    Skipped(SkipReason),
    RolledBack(String),
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub identifier: String,
    pub stage: DocumentStage,
    pub status: DocumentStatus,
    pub images_seen: usize,
    pub ocr_failures: usize,
}

impl DocumentReport {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, DocumentStatus::Committed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents: Vec<DocumentReport>,
}

impl IngestionReport {
    pub fn committed_count(&self) -> usize {
        self.documents.iter().filter(|report| report.is_committed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|report| matches!(report.status, DocumentStatus::Skipped(_)))
            .count()
    }

    pub fn rolled_back_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|report| matches!(report.status, DocumentStatus::RolledBack(_)))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleDeletion {
    pub title: String,
    pub deleted: u64,
}
