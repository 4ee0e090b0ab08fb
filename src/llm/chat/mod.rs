pub mod gemini;

use async_trait::async_trait;
use log::{ debug, error, info };
use std::sync::Arc;

use self::gemini::GeminiChatClient;
use super::{
    Content,
    ConversationTurn,
    GenerationRequest,
    LlmConfig,
    Part,
    ProviderError,
    ResponseFormat,
    Role,
};

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One stateless completion. Returns the generated text, or the sentinel text
    /// when the provider answered without any usable output.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;

    fn name(&self) -> &'static str;
}

pub fn new_client(config: &LlmConfig) -> Option<Arc<dyn ChatClient>> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
    let client = GeminiChatClient::new(api_key, config.base_url.clone());
    Some(Arc::new(client))
}

/// Maps client history onto provider turns and appends the new user message.
/// Turns without text are dropped rather than forwarded empty; order is kept.
pub fn build_conversation(history: &[ConversationTurn], message: &str) -> Vec<Content> {
    history
        .iter()
        .filter(|turn| !turn.text.is_empty())
        .map(|turn| Content::text(turn.role, turn.text.clone()))
        .chain(std::iter::once(Content::text(Role::User, message)))
        .collect()
}

/// Front door to the provider. Holds no per-request state; a missing credential
/// makes every call fail immediately without touching the network.
#[derive(Clone)]
pub struct Provider {
    client: Option<Arc<dyn ChatClient>>,
    chat_model: String,
    analysis_model: String,
}

impl Provider {
    pub fn new(
        client: Option<Arc<dyn ChatClient>>,
        chat_model: impl Into<String>,
        analysis_model: impl Into<String>
    ) -> Self {
        Self {
            client,
            chat_model: chat_model.into(),
            analysis_model: analysis_model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let client = new_client(config);
        match &client {
            Some(c) =>
                info!(
                    "Chat client configured: Provider={}, ChatModel={}, AnalysisModel={}, BaseURL={}",
                    c.name(),
                    config.chat_model,
                    config.analysis_model,
                    config.base_url
                ),
            None =>
                error!(
                    "No provider API key configured (API_KEY / GEMINI_API_KEY). Generation endpoints will return errors."
                ),
        }
        Self::new(client, config.chat_model.clone(), config.analysis_model.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&Arc<dyn ChatClient>, ProviderError> {
        self.client.as_ref().ok_or(ProviderError::MissingCredential)
    }

    pub async fn chat(
        &self,
        history: &[ConversationTurn],
        message: &str,
        system_instruction: Option<&str>,
        model: Option<&str>
    ) -> Result<String, ProviderError> {
        let client = self.client()?;
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.chat_model);
        let request = GenerationRequest {
            model: model.to_string(),
            system_instruction: system_instruction
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned),
            contents: build_conversation(history, message),
            response_format: ResponseFormat::Text,
        };
        if request.contents.len() <= history.len() {
            debug!(
                "Dropped {} empty history turn(s) before forwarding",
                history.len() + 1 - request.contents.len()
            );
        }
        info!(
            "Chat → model={} turns={} system_instruction={}",
            request.model,
            request.contents.len(),
            request.system_instruction.is_some()
        );
        client.generate(&request).await
    }

    /// Single-shot call: the parts go out as one user turn and the provider is
    /// told to answer with a JSON body. The raw text is returned unparsed.
    pub async fn generate_json(&self, parts: Vec<Part>) -> Result<String, ProviderError> {
        let client = self.client()?;
        let request = GenerationRequest {
            model: self.analysis_model.clone(),
            system_instruction: None,
            contents: vec![Content { role: Role::User, parts }],
            response_format: ResponseFormat::Json,
        };
        info!("Single-shot generation → model={}", request.model);
        client.generate(&request).await
    }
}
