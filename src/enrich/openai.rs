use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{Describer, EnrichError};
use crate::config::OpenAiConfig;

const SYSTEM_PROMPT: &str =
    "You are an assistant who describes the nutritional content based on the given heading.";

pub struct OpenAiDescriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl OpenAiDescriber {
    pub fn from_config(config: &OpenAiConfig, client: reqwest::Client) -> Option<Self> {
        Some(Self {
            client,
            api_key: config.api_key.clone()?,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn first_choice(body: ChatResponse) -> String {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "No description available".to_string())
}

fn classify_error(status: StatusCode, body: &str) -> EnrichError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let quota = envelope.error.code.as_deref() == Some("insufficient_quota")
                || envelope.error.kind.as_deref() == Some("insufficient_quota");
            if quota {
                EnrichError::QuotaExceeded
            } else {
                EnrichError::Upstream(format!("{}: {}", status, envelope.error.message))
            }
        }
        Err(_) => EnrichError::Upstream(format!("{}: {}", status, body)),
    }
}

#[async_trait]
impl Describer for OpenAiDescriber {
    async fn describe(&self, heading: &str) -> Result<String, EnrichError> {
        tracing::debug!("Fetching description for heading: {}", heading);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    {
                        "role": "user",
                        "content": format!(
                            "Please describe the nutritional content based on the following heading: {}",
                            heading
                        ),
                    },
                ],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        Ok(first_choice(response.json().await?))
    }
}

/// Stand-in when no API key is configured. Reports quota exhaustion so the
/// post still gets the placeholder description.
pub struct PlaceholderDescriber;

#[async_trait]
impl Describer for PlaceholderDescriber {
    async fn describe(&self, _heading: &str) -> Result<String, EnrichError> {
        Err(EnrichError::QuotaExceeded)
    }
}
