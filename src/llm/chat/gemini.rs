use async_trait::async_trait;
use base64::{ engine::general_purpose::STANDARD as BASE64, Engine as _ };
use log::{ info, warn };
use serde::{ Deserialize, Serialize };

use super::ChatClient;
use crate::llm::{
    GenerationRequest,
    Part,
    ProviderError,
    ResponseFormat,
    Role,
    SENTINEL_TEXT,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: Role,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    prompt_feedback: Option<GooglePromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    message: String,
}

fn to_wire_part(part: &Part) -> GeminiPart<'_> {
    match part {
        Part::Text(text) => GeminiPart::Text { text },
        Part::Inline(attachment) =>
            GeminiPart::Inline {
                inline_data: GeminiInlineData {
                    mime_type: &attachment.mime_type,
                    data: BASE64.encode(&attachment.data),
                },
            },
    }
}

fn build_payload(request: &GenerationRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: request.contents
            .iter()
            .map(|c| GeminiContent {
                role: c.role,
                parts: c.parts.iter().map(to_wire_part).collect(),
            })
            .collect(),
        system_instruction: request.system_instruction.as_deref().map(|text| GeminiInstruction {
            parts: vec![GeminiPart::Text { text }],
        }),
        generation_config: match request.response_format {
            ResponseFormat::Json =>
                Some(GeminiGenerationConfig { response_mime_type: "application/json" }),
            ResponseFormat::Text => None,
        },
    }
}

/// Text of the first candidate. A response with nothing to say is not an error.
fn extract_text(response: GoogleResponse) -> String {
    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);
    let Some(candidate) = response.candidates.into_iter().next() else {
        warn!("Provider returned no candidates (block_reason={:?})", block_reason);
        return SENTINEL_TEXT.to_string();
    };

    let texts: Vec<String> = candidate.content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if texts.is_empty() {
        warn!("Provider candidate carried no text (finish_reason={:?})", candidate.finish_reason);
        return SENTINEL_TEXT.to_string();
    }
    texts.concat()
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<GoogleErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() { format!("Provider returned status {}", status) } else {
                body.trim().to_string()
            }
        })
}

pub struct GeminiChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let url = self.endpoint(&request.model);
        info!("GeminiChatClient::generate() → {}", url);

        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&build_payload(request))
            .send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let parsed: GoogleResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(extract_text(parsed))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
