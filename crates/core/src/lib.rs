pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod maintenance;
pub mod models;
pub mod ocr;
pub mod pdf_images;
pub mod stores;
pub mod text;
pub mod traits;
pub mod writer;

pub use dedup::remove_conflicts;
#[cfg(feature = "local-embed")]
pub use embeddings::FastEmbedder;
pub use embeddings::{
    cosine_distance, embed_checked, CharacterNgramEmbedder, Embedder, HttpEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
pub use error::{DocumentError, EmbedError, IngestError, StoreError};
pub use extractor::{
    extract_document, EmbeddedImage, ExtractedDocument, ImageData, LopdfExtractor, OcrFailure,
    PageContent, PdfExtractor,
};
pub use ingest::{discover_pdf_files, IngestionPipeline};
pub use maintenance::{delete_by_title, initialize_schema, purge_all};
pub use models::{
    DedupOutcome, DocumentReport, DocumentSelection, DocumentStage, DocumentStatus,
    IngestionReport, MetadataId, NewDocument, PipelineConfig, SimilarDocument, SkipReason,
    TitleDeletion, DEFAULT_DOCUMENTS_DIR, DEFAULT_SIMILARITY_THRESHOLD,
};
pub use ocr::{HttpOcr, OcrEndpointConfig, OcrEngine, TesseractOcr, DEFAULT_OCR_LANGUAGE};
pub use pdf_images::image_data;
pub use stores::{PgConfig, PgSession};
pub use traits::{commit_or_rollback, DocumentSession};
pub use writer::insert_document;
