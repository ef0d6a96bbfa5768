use crate::common::error::Result;
use crate::storage::{AttendanceStore, Embedding};
use std::sync::Arc;

/// Produces one embedding vector from raw image bytes, or None when no
/// face can be extracted. The production implementation is the external
/// HTTP embedding service.
pub trait EmbeddingProvider: Send + Sync {
    fn embedding_from_image(&self, image: &[u8]) -> Result<Option<Embedding>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// Vector stored; carries the resulting history length.
    Enrolled { embedding_count: usize },
    /// Soft failure: the service found no usable face. Nothing mutated.
    NoFaceDetected,
}

/// Turns captured enrollment images into stored embedding history.
pub struct EnrollmentPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn AttendanceStore>,
    max_embeddings: usize,
}

/// Transient transaction conflicts only; anything else is surfaced as-is.
const MAX_TXN_RETRIES: u32 = 3;

impl EnrollmentPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn AttendanceStore>,
        max_embeddings: usize,
    ) -> Self {
        Self {
            provider,
            store,
            max_embeddings,
        }
    }

    /// Enroll one captured image for the student owning `auth_uid`. The
    /// append-and-evict runs as a single atomic read-modify-write in the
    /// store, so a 4-shot enrollment burst cannot lose updates.
    pub fn enroll_image(&self, auth_uid: &str, image: &[u8]) -> Result<EnrollOutcome> {
        let embedding = match self.provider.embedding_from_image(image)? {
            Some(embedding) => embedding,
            None => {
                tracing::info!("No face detected in enrollment image for {}", auth_uid);
                return Ok(EnrollOutcome::NoFaceDetected);
            }
        };

        let mut attempt = 0;
        let embedding_count = loop {
            match self
                .store
                .append_embedding(auth_uid, embedding.clone(), self.max_embeddings)
            {
                Ok(count) => break count,
                Err(e) if e.is_retryable() && attempt < MAX_TXN_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        "Embedding append conflict for {}, retry {}/{}",
                        auth_uid,
                        attempt,
                        MAX_TXN_RETRIES
                    );
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            "Enrolled embedding for {} ({} in history)",
            auth_uid,
            embedding_count
        );
        Ok(EnrollOutcome::Enrolled { embedding_count })
    }
}
