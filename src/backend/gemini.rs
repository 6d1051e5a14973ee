//! Google Gemini `generateContent`.
//!
//! Gemini answers in one piece; the reply is surfaced as a single final
//! chunk so that callers consume every engine the same way.

use std::time::Duration;

use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

use super::http::{self, HttpClient};
use super::{Backend, ChunkStream, TurnOptions, single_chunk};
use crate::error::{Error, Result};
use crate::types::{Engine, Message, Role, SafetyPolicy};

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HATE_SPEECH",
];

/// A batch backend for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    api_key: String,
    base_url: String,
    http: HttpClient,
}

impl GeminiBackend {
    /// Create a backend talking to `base_url`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: HttpClient::new(timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: [OwnedTextPart; 1],
}

#[derive(Debug, Serialize)]
struct OwnedTextPart {
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait::async_trait]
impl Backend for GeminiBackend {
    fn engine(&self) -> Engine {
        Engine::Gemini
    }

    async fn send_turn(
        &self,
        history: &[Message],
        user_text: &str,
        options: &TurnOptions,
    ) -> Result<ChunkStream> {
        let url = http::endpoint(
            &self.base_url,
            &format!("models/{}:generateContent", options.model),
        )?;
        let mut headers = http::json_headers("application/json");
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert("x-goog-api-key", key);

        let request = build_request(history, user_text, options.safety);
        let response = self
            .http
            .post_json(url, headers, &request, &options.model)
            .await?;
        let body = self.http.read_text(response).await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        let (content, reasoning) = extract_answer(parsed)?;
        Ok(single_chunk(content, reasoning))
    }
}

fn build_request<'a>(
    history: &'a [Message],
    user_text: &'a str,
    safety: SafetyPolicy,
) -> GenerateContentRequest<'a> {
    let system: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let system_instruction = (!system.is_empty()).then(|| SystemInstruction {
        parts: [OwnedTextPart {
            text: system.join("\n\n"),
        }],
    });

    let contents = history
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(("user", m.content.as_str())),
            Role::Assistant => Some(("model", m.content.as_str())),
        })
        .chain(std::iter::once(("user", user_text)))
        .map(|(role, text)| Content {
            role,
            parts: [TextPart { text }],
        })
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction,
        safety_settings: safety_settings(safety),
    }
}

fn safety_settings(safety: SafetyPolicy) -> Vec<SafetySetting> {
    let threshold = match safety {
        SafetyPolicy::Strict => "BLOCK_LOW_AND_ABOVE",
        SafetyPolicy::Moderate => "BLOCK_MEDIUM_AND_ABOVE",
        SafetyPolicy::Off => "BLOCK_NONE",
    };
    HARM_CATEGORIES
        .iter()
        .map(|&category| SafetySetting {
            category,
            threshold,
        })
        .collect()
}

/// Pull the answer and any thought summary out of the first candidate.
fn extract_answer(response: GenerateContentResponse) -> Result<(String, Option<String>)> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::safety_blocked(format!("prompt blocked ({reason})")));
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(Error::api(200, None, "response contained no candidates"));
    };
    if matches!(
        candidate.finish_reason.as_deref(),
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST")
    ) {
        return Err(Error::safety_blocked("response blocked by safety settings"));
    }

    let mut content = String::new();
    let mut reasoning = String::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        let Some(text) = part.text else { continue };
        if part.thought {
            reasoning.push_str(&text);
        } else {
            content.push_str(&text);
        }
    }
    let reasoning = (!reasoning.is_empty()).then_some(reasoning);
    Ok((content, reasoning))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn strict_blocks_low_and_above() {
        let settings = safety_settings(SafetyPolicy::Strict);
        assert_eq!(settings.len(), 4);
        assert!(settings.iter().all(|s| s.threshold == "BLOCK_LOW_AND_ABOVE"));
        assert!(
            settings
                .iter()
                .any(|s| s.category == "HARM_CATEGORY_DANGEROUS_CONTENT")
        );
    }

    #[test]
    fn off_blocks_nothing() {
        let settings = safety_settings(SafetyPolicy::Off);
        assert!(settings.iter().all(|s| s.threshold == "BLOCK_NONE"));
    }

    #[test]
    fn request_maps_roles() {
        let history = vec![
            Message::system("You are a helpful assistant."),
            Message::user("hi"),
            Message::assistant("hello", Some("thinking".to_string())),
        ];
        let request = build_request(&history, "what's up", SafetyPolicy::Moderate);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a helpful assistant."
        );
        let roles: Vec<&str> = json["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(json["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "what's up");
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn request_without_system_message() {
        let request = build_request(&[], "hi", SafetyPolicy::Off);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn extracts_text_and_thoughts() {
        let parsed = response(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"weighing options","thought":true},
                {"text":"Use "},{"text":"ls -la"}
            ]},"finishReason":"STOP"}]}"#,
        );
        let (content, reasoning) = extract_answer(parsed).unwrap();
        assert_eq!(content, "Use ls -la");
        assert_eq!(reasoning.as_deref(), Some("weighing options"));
    }

    #[test]
    fn blocked_prompt() {
        let parsed = response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(extract_answer(parsed).unwrap_err().is_safety_blocked());
    }

    #[test]
    fn blocked_candidate() {
        let parsed = response(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(extract_answer(parsed).unwrap_err().is_safety_blocked());
    }

    #[test]
    fn no_candidates() {
        let err = extract_answer(response("{}")).unwrap_err();
        assert!(err.is_provider());
    }
}
