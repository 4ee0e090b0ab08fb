use base64::{ engine::general_purpose::STANDARD as BASE64, Engine as _ };
use serde::{ Deserialize, Serialize };

use crate::llm::{ Attachment, ConversationTurn, Role };

#[derive(Clone, Debug, Default, Deserialize)]
pub struct HistoryPart {
    #[serde(default)]
    pub text: Option<String>,
}

/// One prior turn as the web client sends it: `{role, parts: [{text}]}`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<HistoryPart>,
}

impl HistoryTurn {
    /// Only the first part is carried forward; a turn without one has empty text.
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn {
            role: Role::from_wire(&self.role),
            text: self.parts
                .first()
                .and_then(|p| p.text.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    pub system_instruction: Option<String>,
    pub model: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub mime_type: String,
    pub data: String,
}

impl FileUpload {
    /// Decodes the base64 payload. A `data:<mime>;base64,` prefix is tolerated.
    pub fn decode(&self) -> Result<Attachment, base64::DecodeError> {
        let raw = self.data.trim();
        let encoded = match raw.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
            Some((_, payload)) => payload,
            None => raw,
        };
        Ok(Attachment {
            mime_type: self.mime_type.clone(),
            data: BASE64.decode(encoded)?,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalyzeResumeRequest {
    pub text: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub content: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveReply {
    pub status: String,
    pub location: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    pub key_active: bool,
    pub persistence_mode: String,
    pub bucket: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_turn_keeps_only_first_part() {
        let turn: HistoryTurn = serde_json::from_value(
            json!({"role": "model", "parts": [{"text": "a"}, {"text": "b"}]})
        ).unwrap();
        assert_eq!(turn.to_turn(), ConversationTurn { role: Role::Model, text: "a".into() });
    }

    #[test]
    fn malformed_turns_become_empty_model_turns() {
        let turns: Vec<HistoryTurn> = serde_json::from_value(
            json!([{"role": "assistant"}, {"parts": [{}]}, {"role": "user", "parts": []}])
        ).unwrap();
        let mapped: Vec<_> = turns.iter().map(HistoryTurn::to_turn).collect();
        assert_eq!(mapped[0], ConversationTurn { role: Role::Model, text: String::new() });
        assert_eq!(mapped[1], ConversationTurn { role: Role::Model, text: String::new() });
        assert_eq!(mapped[2], ConversationTurn { role: Role::User, text: String::new() });
    }

    #[test]
    fn chat_request_uses_client_field_names() {
        let req: ChatRequest = serde_json::from_value(
            json!({"message": "hi", "systemInstruction": "be kind", "model": "gemini-x"})
        ).unwrap();
        assert_eq!(req.message.as_deref(), Some("hi"));
        assert_eq!(req.system_instruction.as_deref(), Some("be kind"));
        assert!(req.history.is_empty());
    }

    #[test]
    fn file_upload_decodes_plain_and_data_url_payloads() {
        let plain = FileUpload { mime_type: "text/plain".into(), data: "aGVsbG8=".into() };
        assert_eq!(plain.decode().unwrap().data, b"hello");

        let data_url = FileUpload {
            mime_type: "text/plain".into(),
            data: "data:text/plain;base64,aGVsbG8=".into(),
        };
        let decoded = data_url.decode().unwrap();
        assert_eq!(decoded.data, b"hello");
        assert_eq!(decoded.mime_type, "text/plain");

        let broken = FileUpload { mime_type: "text/plain".into(), data: "***".into() };
        assert!(broken.decode().is_err());
    }
}
