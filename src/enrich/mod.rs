//! Calls out to external services that add an image URL or generated text
//! to a post. Each capability is a trait so the HTTP-backed implementations
//! can be swapped for local ones (or fakes in tests).

mod cloudinary;
mod local;
mod openai;
mod vision;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use self::cloudinary::CloudinaryHost;
pub use self::local::LocalImageHost;
pub use self::openai::{OpenAiDescriber, PlaceholderDescriber};
pub use self::vision::{UnconfiguredLabeler, VisionLabeler};

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnrichError {
    /// Message safe to return to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            EnrichError::NotConfigured(_) => "External service is not configured",
            _ => "Error communicating with external service",
        }
    }
}

/// Stores an uploaded image and returns a URL it can be fetched from.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, EnrichError>;
}

/// Generates a short description for a post heading.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, heading: &str) -> Result<String, EnrichError>;
}

/// Detects labels for a hosted image.
#[async_trait]
pub trait ImageLabeler: Send + Sync {
    async fn labels(&self, image_url: &str) -> Result<Vec<String>, EnrichError>;
}

pub fn fallback_description(heading: &str) -> String {
    format!("Default description for heading: {}", heading)
}

/// A description never fails post creation: any describer error degrades
/// to the deterministic placeholder.
pub async fn describe_or_fallback(describer: &dyn Describer, heading: &str) -> String {
    match describer.describe(heading).await {
        Ok(description) => description,
        Err(EnrichError::QuotaExceeded) => {
            tracing::warn!("Using a placeholder description due to quota exhaustion");
            fallback_description(heading)
        }
        Err(e) => {
            tracing::error!("Description generation failed, using placeholder: {}", e);
            fallback_description(heading)
        }
    }
}

/// Shared client for every outbound adapter.
pub fn http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}
