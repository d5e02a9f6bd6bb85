use crate::dedup::remove_conflicts;
use crate::embeddings::{embed_checked, Embedder};
use crate::error::{DocumentError, IngestError, StoreError};
use crate::extractor::{extract_document, PdfExtractor};
use crate::models::{
    DedupOutcome, DocumentReport, DocumentSelection, DocumentStage, DocumentStatus,
    IngestionReport, MetadataId, NewDocument, PipelineConfig, SkipReason,
};
use crate::ocr::OcrEngine;
use crate::traits::{commit_or_rollback, DocumentSession};
use crate::writer::insert_document;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

struct PreparedDocument {
    document: NewDocument,
    images_seen: usize,
    ocr_failures: usize,
}

/// Extract → embed → deduplicate → write, one document at a time.
pub struct IngestionPipeline {
    config: PipelineConfig,
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    ocr: Option<Box<dyn OcrEngine + Send + Sync>>,
    embedder: Box<dyn Embedder + Send + Sync>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        extractor: Box<dyn PdfExtractor + Send + Sync>,
        ocr: Option<Box<dyn OcrEngine + Send + Sync>>,
        embedder: Box<dyn Embedder + Send + Sync>,
    ) -> Result<Self, IngestError> {
        config.validate()?;

        if embedder.dimensions() != config.embedding_dimensions {
            return Err(IngestError::InvalidArgument(format!(
                "embedder {} produces {} dimensions but the store expects {}",
                embedder.model_name(),
                embedder.dimensions(),
                config.embedding_dimensions
            )));
        }

        Ok(Self {
            config,
            extractor,
            ocr,
            embedder,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Every PDF below the documents directory, as identifiers relative to it.
    pub fn discover(&self) -> Result<DocumentSelection, IngestError> {
        let root = &self.config.documents_dir;
        let identifiers = discover_pdf_files(root)
            .into_iter()
            .filter_map(|path| {
                path.strip_prefix(root)
                    .ok()
                    .map(|relative| relative.to_string_lossy().to_string())
            })
            .collect::<Vec<_>>();

        if identifiers.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                root.display()
            )));
        }

        Ok(DocumentSelection::Many(identifiers))
    }

    /// Runs every selected document through the pipeline; failures never stop the batch.
    pub async fn ingest<S>(&self, session: &mut S, selection: DocumentSelection) -> IngestionReport
    where
        S: DocumentSession + ?Sized,
    {
        let identifiers = selection.into_identifiers();
        info!(documents = identifiers.len(), "starting ingestion batch");

        let mut report = IngestionReport::default();
        for identifier in identifiers {
            let document = self.process(session, &identifier).await;
            report.documents.push(document);
        }

        info!(
            committed = report.committed_count(),
            skipped = report.skipped_count(),
            rolled_back = report.rolled_back_count(),
            "ingestion batch finished"
        );
        report
    }

    async fn process<S>(&self, session: &mut S, identifier: &str) -> DocumentReport
    where
        S: DocumentSession + ?Sized,
    {
        let mut stage = DocumentStage::Pending;
        let mut images_seen = 0;
        let mut ocr_failures = 0;

        let prepared = tokio::task::block_in_place(|| self.prepare(identifier, &mut stage));

        let status = match prepared {
            Ok(prepared) => {
                images_seen = prepared.images_seen;
                ocr_failures = prepared.ocr_failures;

                match self.persist(session, &prepared.document, &mut stage).await {
                    Ok((metadata_id, dedup)) => {
                        stage = DocumentStage::Committed;
                        info!(
                            document = identifier,
                            %metadata_id,
                            replaced = dedup.replaced_rows(),
                            "document committed"
                        );
                        DocumentStatus::Committed { metadata_id, dedup }
                    }
                    Err(failure) => {
                        error!(
                            document = identifier,
                            stage = ?stage,
                            error = %failure,
                            "database stage failed, transaction rolled back"
                        );
                        DocumentStatus::RolledBack(failure.to_string())
                    }
                }
            }
            Err(failure) => skipped(identifier, failure),
        };

        DocumentReport {
            identifier: identifier.to_string(),
            stage,
            status,
            images_seen,
            ocr_failures,
        }
    }

    fn prepare(
        &self,
        identifier: &str,
        stage: &mut DocumentStage,
    ) -> Result<PreparedDocument, DocumentError> {
        let path = self.config.documents_dir.join(identifier);
        // Titles keep the folder part of the identifier.
        let title = identifier.to_string();

        info!(document = identifier, path = %path.display(), "processing document");
        let extracted = extract_document(
            &path,
            self.extractor.as_ref(),
            self.ocr.as_deref().map(|engine| engine as &dyn OcrEngine),
        )?;
        *stage = DocumentStage::Extracted;

        let embedding = embed_checked(
            self.embedder.as_ref(),
            &extracted.text,
            self.config.embedding_dimensions,
        )?;
        *stage = DocumentStage::Embedded;

        Ok(PreparedDocument {
            document: NewDocument {
                title,
                upload_date: Local::now().date_naive(),
                text: extracted.text,
                embedding,
            },
            images_seen: extracted.images_seen,
            ocr_failures: extracted.ocr_failures.len(),
        })
    }

    async fn persist<S>(
        &self,
        session: &mut S,
        document: &NewDocument,
        stage: &mut DocumentStage,
    ) -> Result<(MetadataId, DedupOutcome), StoreError>
    where
        S: DocumentSession + ?Sized,
    {
        session.begin().await?;
        let result = self.replace(session, document, stage).await;
        commit_or_rollback(session, result).await
    }

    async fn replace<S>(
        &self,
        session: &mut S,
        document: &NewDocument,
        stage: &mut DocumentStage,
    ) -> Result<(MetadataId, DedupOutcome), StoreError>
    where
        S: DocumentSession + ?Sized,
    {
        let dedup = remove_conflicts(
            session,
            &document.title,
            &document.embedding,
            self.config.distance_threshold(),
        )
        .await?;
        *stage = DocumentStage::Deduplicated;

        let metadata_id = insert_document(session, document).await?;
        Ok((metadata_id, dedup))
    }
}

fn skipped(identifier: &str, failure: DocumentError) -> DocumentStatus {
    match failure {
        DocumentError::NotFound(path) => {
            warn!(document = identifier, path = %path.display(), "pdf not found, skipping");
            DocumentStatus::Skipped(SkipReason::NotFound)
        }
        DocumentError::EmptyContent(path) => {
            warn!(document = identifier, path = %path.display(), "pdf has no text, skipping");
            DocumentStatus::Skipped(SkipReason::EmptyContent)
        }
        DocumentError::Extraction(failure) => {
            error!(document = identifier, error = %failure, "extraction failed, skipping");
            DocumentStatus::Skipped(SkipReason::Extraction(failure.to_string()))
        }
        DocumentError::Embedding(failure) => {
            error!(document = identifier, error = %failure, "embedding failed, skipping");
            DocumentStatus::Skipped(SkipReason::Embedding(failure.to_string()))
        }
    }
}
