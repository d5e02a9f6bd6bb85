//! Local sentence-transformer embeddings via fastembed.

use super::{Embedder, DEFAULT_EMBEDDING_MODEL};
use crate::error::EmbedError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;
use tracing::info;

pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedder {
    /// Loads `all-MiniLM-L6-v2` (384 dimensions), downloading it on first use.
    pub fn new() -> Result<Self, EmbedError> {
        info!(model = DEFAULT_EMBEDDING_MODEL, "loading embedding model");

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|error| EmbedError::Model(format!("failed to initialise model: {error}")))?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: 384,
        })
    }
}

impl Embedder for FastEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let model = self
            .model
            .lock()
            .map_err(|_| EmbedError::Model("embedding model lock poisoned".to_string()))?;

        let mut vectors = model
            .embed(vec![text.to_string()], None)
            .map_err(|error| EmbedError::Model(error.to_string()))?;

        vectors
            .pop()
            .ok_or_else(|| EmbedError::Model("model returned no vector".to_string()))
    }
}
