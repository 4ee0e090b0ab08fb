pub mod api;

use crate::cli::Args;
use crate::llm::chat::Provider;
use crate::llm::LlmConfig;
use crate::storage::initialize_store;
use api::AppState;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    args: Args,
}

impl Server {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    /// Builds the adapters once; every request shares them read-only.
    pub async fn build_state(&self) -> AppState {
        let llm_config = LlmConfig {
            api_key: self.args.resolved_api_key(),
            base_url: self.args.gemini_base_url.clone(),
            chat_model: self.args.chat_model.clone(),
            analysis_model: self.args.analysis_model.clone(),
        };
        let provider = Provider::from_config(&llm_config);
        let store = initialize_store(&self.args).await;

        AppState {
            provider: Arc::new(provider),
            store: Arc::new(store),
            static_dir: self.args.static_dir.clone(),
            max_body_bytes: self.args.max_body_bytes,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = self.build_state().await;
        api::start_http_server(&self.args, state).await
    }
}
