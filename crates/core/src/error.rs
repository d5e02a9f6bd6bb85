use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported image encoding: {0}")]
    UnsupportedImage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

impl From<lopdf::Error> for IngestError {
    fn from(error: lopdf::Error) -> Self {
        IngestError::PdfParse(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("refusing to embed empty text")]
    EmptyInput,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("insert into metadata returned no id for {0}")]
    MissingGeneratedId(String),

    #[error("statement issued outside of an open transaction")]
    NoTransaction,

    #[error("a transaction is already open")]
    TransactionAlreadyOpen,
}

/// Reasons a document is skipped before its transaction opens.
/// Database failures roll the document back and surface as [`StoreError`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("pdf not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("pdf produced no text: {}", .0.display())]
    EmptyContent(PathBuf),

    #[error("extraction failed: {0}")]
    Extraction(#[from] IngestError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
