use crate::common::config::EmbeddingServiceConfig;
use crate::common::error::{AttendanceError, Result};
use crate::core::enroll::EmbeddingProvider;
use crate::storage::Embedding;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the external embedding service: POST a base64 image, get a
/// fixed-length vector back, or no vector when no face was found. The
/// request carries a bounded timeout so a stalled service cannot hang the
/// whole check-in.
pub struct HttpEmbeddingClient {
    agent: ureq::Agent,
    url: String,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingServiceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        Self {
            agent,
            url: config.url.clone(),
        }
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    fn embedding_from_image(&self, image: &[u8]) -> Result<Option<Embedding>> {
        let payload = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });

        let response = match self.agent.post(&self.url).send_json(payload) {
            Ok(response) => response,
            // The service reports detection failure as an error payload;
            // parse it rather than failing the request.
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                if serde_json::from_str::<EmbeddingResponse>(&body).is_ok() && code < 502 {
                    tracing::info!("Embedding service returned no vector ({}): {}", code, body);
                    return Ok(None);
                }
                return Err(AttendanceError::EmbeddingService(format!(
                    "HTTP {} from embedding service: {}",
                    code, body
                )));
            }
            Err(e) => {
                return Err(AttendanceError::EmbeddingService(format!(
                    "Embedding service unreachable: {}",
                    e
                )));
            }
        };

        let parsed: EmbeddingResponse = response.into_json().map_err(|e| {
            AttendanceError::EmbeddingService(format!("Malformed embedding response: {}", e))
        })?;

        if let Some(error) = parsed.error {
            tracing::info!("Embedding service reported: {}", error);
            return Ok(None);
        }

        match parsed.embedding {
            Some(embedding) if !embedding.is_empty() => Ok(Some(embedding)),
            _ => Ok(None),
        }
    }
}
