use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{EnrichError, ImageLabeler};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

pub struct VisionLabeler {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    label_annotations: Vec<Label>,
    error: Option<Status>,
}

#[derive(Deserialize)]
struct Label {
    description: String,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

impl VisionLabeler {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { client, api_key }
    }
}

fn extract_labels(body: AnnotateResponse) -> Result<Vec<String>, EnrichError> {
    let Some(first) = body.responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(status) = first.error {
        return Err(EnrichError::Upstream(status.message));
    }
    Ok(first
        .label_annotations
        .into_iter()
        .map(|l| l.description)
        .collect())
}

#[async_trait]
impl ImageLabeler for VisionLabeler {
    async fn labels(&self, image_url: &str) -> Result<Vec<String>, EnrichError> {
        if !image_url.starts_with("http://") && !image_url.starts_with("https://") {
            return Err(EnrichError::Upstream(format!(
                "image is not publicly reachable: {}",
                image_url
            )));
        }

        let body: AnnotateResponse = self
            .client
            .post(ANNOTATE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "requests": [{
                    "image": { "source": { "imageUri": image_url } },
                    "features": [{ "type": "LABEL_DETECTION" }],
                }],
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_labels(body)
    }
}

pub struct UnconfiguredLabeler;

#[async_trait]
impl ImageLabeler for UnconfiguredLabeler {
    async fn labels(&self, _image_url: &str) -> Result<Vec<String>, EnrichError> {
        Err(EnrichError::NotConfigured("image labelling"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AnnotateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn labels_are_extracted_in_order() {
        let body = parse(
            r#"{"responses":[{"labelAnnotations":[
                {"mid":"/m/02wbm","description":"Food","score":0.98},
                {"mid":"/m/0h55b","description":"Noodle","score":0.91}
            ]}]}"#,
        );
        assert_eq!(extract_labels(body).unwrap(), vec!["Food", "Noodle"]);
    }

    #[test]
    fn missing_annotations_mean_no_labels() {
        assert!(extract_labels(parse(r#"{"responses":[{}]}"#))
            .unwrap()
            .is_empty());
        assert!(extract_labels(parse(r#"{}"#)).unwrap().is_empty());
    }

    #[test]
    fn per_image_error_is_upstream() {
        let body = parse(r#"{"responses":[{"error":{"code":7,"message":"denied"}}]}"#);
        assert!(matches!(extract_labels(body), Err(EnrichError::Upstream(m)) if m == "denied"));
    }

    #[tokio::test]
    async fn relative_links_are_rejected_before_any_request() {
        let labeler = VisionLabeler::new("key".into(), reqwest::Client::new());
        assert!(matches!(
            labeler.labels("/uploads/a.jpg").await,
            Err(EnrichError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_labeler_errors() {
        assert!(matches!(
            UnconfiguredLabeler.labels("https://x").await,
            Err(EnrichError::NotConfigured(_))
        ));
    }
}
