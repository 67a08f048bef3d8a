use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::{EnrichError, ImageHost};
use crate::config::CloudinaryConfig;

/// Every upload is cropped to fill a fixed 300x200 frame.
const TRANSFORMATION: &str = "c_fill,h_200,w_300";

pub struct CloudinaryHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadError>,
}

#[derive(Deserialize)]
struct UploadError {
    message: String,
}

impl CloudinaryHost {
    pub fn from_config(config: &CloudinaryConfig, client: reqwest::Client) -> Option<Self> {
        Some(Self {
            client,
            cloud_name: config.cloud_name.clone()?,
            api_key: config.api_key.clone()?,
            api_secret: config.api_secret.clone()?,
            folder: config.folder.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

/// Signature over the alphabetically sorted `key=value` pairs joined by `&`,
/// with the API secret appended.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, path: &Path) -> Result<String, EnrichError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("folder", self.folder.as_str()),
            ("timestamp", timestamp.as_str()),
            ("transformation", TRANSFORMATION),
        ];
        let signature = sign(&signed, &self.api_secret);

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in signed {
            form = form.text(key.to_string(), value.to_string());
        }
        form = form.part("file", Part::bytes(data).file_name(file_name));

        tracing::info!("Uploading image to Cloudinary");
        let body: UploadResponse = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        match (body.secure_url, body.error) {
            (Some(url), _) => {
                tracing::info!("Image uploaded to Cloudinary: {}", url);
                Ok(url)
            }
            (None, Some(err)) => Err(EnrichError::Upstream(err.message)),
            (None, None) => Err(EnrichError::Upstream(
                "Cloudinary response had no secure_url".into(),
            )),
        }
    }
}
