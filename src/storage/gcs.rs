use async_trait::async_trait;
use log::{ debug, info };
use reqwest::header::{ AUTHORIZATION, CONTENT_TYPE };
use reqwest::{ RequestBuilder, Response, StatusCode };
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::{ Duration, Instant };
use tokio::sync::Mutex;
use url::Url;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ read_service_account_key, ServiceAccountAuthenticator };

use super::{ ObjectBackend, StoreError };
use crate::cli::Args;

const GCS_BASE_URL: &str = "https://storage.googleapis.com";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub enum TokenSource {
    /// Emulators accept unauthenticated requests.
    Anonymous,
    /// Keeps its tokens in memory and refreshes them shortly before expiry.
    ServiceAccount(DefaultAuthenticator),
    /// Default service account of the compute instance running us.
    Metadata {
        url: String,
    },
}

impl TokenSource {
    /// The key file is read here and never again.
    pub async fn service_account(sa_key_path: &Path) -> Result<Self, StoreError> {
        let key = read_service_account_key(sa_key_path)
            .await
            .map_err(|e| StoreError::Auth(format!("Failed to load SA key from {}: {}", sa_key_path.display(), e)))?;

        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;
        Ok(TokenSource::ServiceAccount(auth))
    }

    pub fn metadata() -> Self {
        TokenSource::Metadata { url: METADATA_TOKEN_URL.to_string() }
    }

    fn label(&self) -> &'static str {
        match self {
            TokenSource::Anonymous => "anonymous",
            TokenSource::ServiceAccount(_) => "service account",
            TokenSource::Metadata { .. } => "metadata server",
        }
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct GcsErrorEnvelope {
    error: GcsErrorDetail,
}

#[derive(Deserialize)]
struct GcsErrorDetail {
    message: String,
}

async fn error_from(resp: Response) -> StoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GcsErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    StoreError::Http { status: status.as_u16(), message }
}

/// A Cloud Storage bucket reached through the JSON API.
pub struct GcsBackend {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    project_id: Option<String>,
    tokens: TokenSource,
    metadata_token: Mutex<Option<CachedToken>>,
}

impl GcsBackend {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        project_id: Option<String>,
        tokens: TokenSource
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bucket: bucket.into(),
            project_id,
            tokens,
            metadata_token: Mutex::new(None),
        }
    }

    /// Builds the backend from configuration and proves that a token can be
    /// obtained. Any failure here means the process runs without cloud storage.
    pub async fn connect(args: &Args) -> Result<Self, StoreError> {
        let backend = match args.storage_emulator_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => {
                let base = if host.contains("://") { host.to_string() } else { format!("http://{}", host) };
                info!("Using storage emulator at {}", base);
                Self::new(base, &args.bucket_name, args.project_id.clone(), TokenSource::Anonymous)
            }
            _ => {
                let tokens = match &args.credentials_path {
                    Some(path) => TokenSource::service_account(path).await?,
                    None => TokenSource::metadata(),
                };
                Self::new(GCS_BASE_URL, &args.bucket_name, args.project_id.clone(), tokens)
            }
        };

        backend.access_token().await?;
        info!("Storage credentials verified ({})", backend.tokens.label());
        Ok(backend)
    }

    async fn access_token(&self) -> Result<Option<String>, StoreError> {
        match &self.tokens {
            TokenSource::Anonymous => Ok(None),
            TokenSource::ServiceAccount(auth) => {
                let token = auth
                    .token(&[STORAGE_SCOPE])
                    .await
                    .map_err(|e| StoreError::Auth(e.to_string()))?;
                token.token()
                    .map(|t| Some(t.to_string()))
                    .ok_or_else(|| StoreError::Auth("OAuth token was None".to_string()))
            }
            TokenSource::Metadata { url } => self.metadata_access_token(url).await.map(Some),
        }
    }

    async fn metadata_access_token(&self, url: &str) -> Result<String, StoreError> {
        let mut cached = self.metadata_token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }

        let resp = self.client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Auth(format!("metadata server returned {}", resp.status())));
        }
        let token: MetadataToken = resp.json().await?;
        debug!("Fetched metadata token valid for {}s", token.expires_in);

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        Ok(match self.access_token().await? {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => req,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bucket_url(&self) -> Result<Url, StoreError> {
        self.url(&["storage", "v1", "b", &self.bucket])
    }

    fn object_url(&self, name: &str) -> Result<Url, StoreError> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    /// GET that maps 404 to `false`.
    async fn probe(&self, url: Url) -> Result<bool, StoreError> {
        let resp = self.authorized(self.client.get(url)).await?.send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(error_from(resp).await),
        }
    }
}

#[async_trait]
impl ObjectBackend for GcsBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, name: &str) -> String {
        format!("gs://{}/{}", self.bucket, name)
    }

    async fn object_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.probe(self.object_url(name)?).await
    }

    async fn read_object(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let resp = self.authorized(self.client.get(url)).await?.send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn write_object(
        &self,
        name: &str,
        body: Vec<u8>,
        content_type: &str
    ) -> Result<(), StoreError> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut().append_pair("uploadType", "media").append_pair("name", name);
        debug!("Uploading {} bytes to {}", body.len(), self.location(name));

        let req = self.client.post(url).header(CONTENT_TYPE, content_type).body(body);
        let resp = self.authorized(req).await?.send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        self.probe(self.bucket_url()?).await
    }

    async fn create_bucket(&self) -> Result<(), StoreError> {
        let project = self.project_id.as_deref().ok_or_else(|| StoreError::BucketCreate {
            bucket: self.bucket.clone(),
            reason: "GOOGLE_CLOUD_PROJECT is not set".to_string(),
        })?;

        let mut url = self.url(&["storage", "v1", "b"])?;
        url.query_pairs_mut().append_pair("project", project);
        let req = self.client.post(url).json(&json!({ "name": self.bucket }));
        let resp = self.authorized(req).await?.send().await?;
        if !resp.status().is_success() {
            let reason = error_from(resp).await.to_string();
            return Err(StoreError::BucketCreate { bucket: self.bucket.clone(), reason });
        }
        info!("Created bucket {} in project {}", self.bucket, project);
        Ok(())
    }
}
