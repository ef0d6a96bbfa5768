use crate::common::error::{AttendanceError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingServiceConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub passcode: PasscodeConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmbeddingServiceConfig {
    /// Endpoint that accepts a base64 image and returns an embedding vector.
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:8080/generate-embedding".to_string()
}
fn default_embedding_timeout() -> u64 {
    10
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            timeout_seconds: default_embedding_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// How long a cache snapshot may be served before a refresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_similarity_threshold() -> f32 {
    0.92
}
fn default_cache_ttl() -> u64 {
    300
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PasscodeConfig {
    #[serde(default = "default_passcode_validity")]
    pub validity_seconds: u64,
    #[serde(default = "default_passcode_length")]
    pub code_length: usize,
}

fn default_passcode_validity() -> u64 {
    60
}
fn default_passcode_length() -> usize {
    6
}

impl Default for PasscodeConfig {
    fn default() -> Self {
        Self {
            validity_seconds: default_passcode_validity(),
            code_length: default_passcode_length(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttendanceConfig {
    /// Fixed operational timezone, as an offset from UTC. All lateness
    /// decisions use this zone, never the host's local clock.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_grace_minutes")]
    pub default_grace_minutes: u32,
}

fn default_utc_offset() -> i32 {
    7
}
fn default_grace_minutes() -> u32 {
    15
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            default_grace_minutes: default_grace_minutes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    /// Bounded per-student embedding history; the oldest entry is evicted
    /// once this many are stored.
    #[serde(default = "default_max_embeddings")]
    pub max_embeddings: usize,
}

fn default_max_embeddings() -> usize {
    4
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_embeddings: default_max_embeddings(),
        }
    }
}

impl Config {
    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AttendanceError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, or fall back to built-in defaults when no
    /// path is supplied.
    pub fn load_or_default(path: Option<&std::path::Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.matcher.similarity_threshold < 0.0 || self.matcher.similarity_threshold > 1.0 {
            return Err(AttendanceError::InvalidArgument(format!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.matcher.similarity_threshold
            )));
        }
        if self.matcher.cache_ttl_seconds == 0 {
            return Err(AttendanceError::InvalidArgument(
                "Cache TTL must be at least 1 second".to_string(),
            ));
        }
        if self.passcode.validity_seconds == 0 || self.passcode.validity_seconds > 3600 {
            return Err(AttendanceError::InvalidArgument(format!(
                "Passcode validity must be between 1 and 3600 seconds, got {}",
                self.passcode.validity_seconds
            )));
        }
        if self.passcode.code_length < 6 {
            return Err(AttendanceError::InvalidArgument(format!(
                "Passcode length must be at least 6 characters, got {}",
                self.passcode.code_length
            )));
        }
        if self.attendance.utc_offset_hours < -12 || self.attendance.utc_offset_hours > 14 {
            return Err(AttendanceError::InvalidArgument(format!(
                "UTC offset must be between -12 and +14 hours, got {}",
                self.attendance.utc_offset_hours
            )));
        }
        if self.enrollment.max_embeddings == 0 {
            return Err(AttendanceError::InvalidArgument(
                "Embedding history must hold at least one entry".to_string(),
            ));
        }
        if self.embedding.timeout_seconds == 0 {
            return Err(AttendanceError::InvalidArgument(
                "Embedding service timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matcher.similarity_threshold, 0.92);
        assert_eq!(config.passcode.validity_seconds, 60);
        assert_eq!(config.attendance.utc_offset_hours, 7);
        assert_eq!(config.enrollment.max_embeddings, 4);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.matcher.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_passcode() {
        let mut config = Config::default();
        config.passcode.code_length = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [matcher]
            similarity_threshold = 0.95

            [attendance]
            utc_offset_hours = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.matcher.similarity_threshold, 0.95);
        assert_eq!(config.passcode.code_length, 6);
    }
}
