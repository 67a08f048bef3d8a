use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GoogleConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GOOGLE_SCOPE: &str = "profile email";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

/// The subset of the provider profile we keep.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OAuthProfile {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name stored alongside linked accounts.
    fn name(&self) -> &'static str;

    /// Where to send the browser to start the flow.
    fn authorize_url(&self) -> Result<String, OAuthError>;

    /// Exchange an authorization code and fetch the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, OAuthError>;
}

pub struct GoogleOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GoogleOAuth {
    /// Returns `None` unless client id, secret and redirect URI are all set.
    pub fn from_config(config: &GoogleConfig, client: reqwest::Client) -> Option<Self> {
        Some(Self {
            client,
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
            redirect_uri: config.redirect_uri.clone()?,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self) -> Result<String, OAuthError> {
        let url = url::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", GOOGLE_SCOPE),
                ("response_type", "code"),
                ("access_type", "offline"),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected(format!(
                "token exchange returned {}: {}",
                status, body
            )));
        }
        let token: TokenResponse = response.json().await?;

        let profile = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<OAuthProfile>()
            .await?;

        Ok(profile)
    }
}
