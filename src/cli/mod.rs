use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Provider Args ---
    /// API key for the generative language provider.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Alternate variable name for the provider API key. Used when API_KEY is unset or empty.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Base URL of the provider REST API (model routes are appended to it).
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    /// Model used for chat when the request does not name one.
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-1.5-pro")]
    pub chat_model: String,

    /// Model used for resume analysis and synthesis.
    #[arg(long, env = "ANALYSIS_MODEL", default_value = "gemini-1.5-flash")]
    pub analysis_model: String,

    // --- Storage Args ---
    /// Cloud Storage bucket holding the persona document.
    #[arg(long, env = "GCS_BUCKET_NAME", default_value = "persona-dna-store")]
    pub bucket_name: String,

    /// Project the bucket is created in when it does not exist yet.
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project_id: Option<String>,

    /// Service account key file. When unset, tokens come from the compute metadata server.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials_path: Option<PathBuf>,

    /// Storage emulator endpoint (e.g., http://localhost:4443). Disables authentication.
    #[arg(long, env = "STORAGE_EMULATOR_HOST")]
    pub storage_emulator_host: Option<String>,

    /// Local copy of the persona document, used only when the bucket cannot be read.
    #[arg(long, env = "LOCAL_CONFIG_PATH", default_value = "shadow_config.json")]
    pub local_config_path: PathBuf,

    // --- Server Args ---
    /// Address to bind the HTTP server to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Directory containing the built single-page application.
    #[arg(long, env = "STATIC_DIR", default_value = "dist")]
    pub static_dir: PathBuf,

    /// Largest accepted request body in bytes. Base64 attachments count against it.
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "20971520")]
    pub max_body_bytes: usize,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// The provider credential, taken from the first non-empty of the two accepted variables.
    pub fn resolved_api_key(&self) -> Option<String> {
        [&self.api_key, &self.gemini_api_key]
            .into_iter()
            .flatten()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .map(str::to_owned)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
