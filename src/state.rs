use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::oauth::{GoogleOAuth, OAuthProvider};
use crate::auth::session::SessionKeys;
use crate::config::Config;
use crate::enrich::{
    self, CloudinaryHost, Describer, ImageHost, ImageLabeler, LocalImageHost, OpenAiDescriber,
    PlaceholderDescriber, UnconfiguredLabeler, VisionLabeler,
};
use crate::error::{AppError, AppResult};
use crate::notify::{BroadcastNotifier, Notifier};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    /// `None` when no signing secret is configured; every token operation
    /// then fails with a 500.
    pub session_keys: Option<Arc<SessionKeys>>,
    pub image_host: Arc<dyn ImageHost>,
    pub describer: Arc<dyn Describer>,
    pub labeler: Arc<dyn ImageLabeler>,
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire up adapters from config. Services without credentials fall back
    /// to local or placeholder implementations.
    pub fn from_config(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let client = enrich::http_client(config.enrich.timeout_secs)?;

        let session_keys = config
            .auth
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(SessionKeys::new(secret)));
        if session_keys.is_none() {
            tracing::warn!("JWT_SECRET is not set; sign-in and authenticated routes will fail");
        }

        let image_host: Arc<dyn ImageHost> =
            match CloudinaryHost::from_config(&config.cloudinary, client.clone()) {
                Some(host) => Arc::new(host),
                None => {
                    tracing::info!("Cloudinary not configured; storing images locally");
                    Arc::new(LocalImageHost::new(config.uploads_path()))
                }
            };

        let describer: Arc<dyn Describer> =
            match OpenAiDescriber::from_config(&config.openai, client.clone()) {
                Some(describer) => Arc::new(describer),
                None => {
                    tracing::info!("OpenAI not configured; using placeholder descriptions");
                    Arc::new(PlaceholderDescriber)
                }
            };

        let labeler: Arc<dyn ImageLabeler> = match config.vision.api_key.clone() {
            Some(key) => Arc::new(VisionLabeler::new(key, client.clone())),
            None => Arc::new(UnconfiguredLabeler),
        };

        let oauth = GoogleOAuth::from_config(&config.google, client)
            .map(|provider| Arc::new(provider) as Arc<dyn OAuthProvider>);

        Ok(Self {
            db,
            config,
            session_keys,
            image_host,
            describer,
            labeler,
            oauth,
            notifier: Arc::new(BroadcastNotifier::new()),
        })
    }

    pub fn session_keys(&self) -> AppResult<&SessionKeys> {
        self.session_keys
            .as_deref()
            .ok_or_else(|| AppError::MissingConfig("JWT_SECRET is not defined"))
    }

    pub fn oauth(&self) -> AppResult<&dyn OAuthProvider> {
        self.oauth
            .as_deref()
            .ok_or_else(|| AppError::MissingConfig("Google sign-in is not configured"))
    }
}
