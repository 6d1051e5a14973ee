//! Delivery of a session transcript to the notification endpoint.
//!
//! The endpoint receives `{email, chatHistory}` and mails the transcript to
//! the user.  The address comes from the verified account status file when
//! one exists, otherwise from an interactive prompt.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::chat::input::{LineEvent, LineSource};
use crate::error::{Error, Result};
use crate::observability::{NOTIFY_ERRORS, NOTIFY_SENT};
use crate::types::{Message, Role, conversation_turns};

/// Prompt used when no verified address is on file.
pub const ADDRESS_PROMPT: &str = "Please enter your email address: ";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// The transcript as the endpoint expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// When the payload was built, RFC 3339.
    pub timestamp: String,
    /// The model the session talked to.
    pub model: String,
    /// Every message after the system message.
    pub messages: Vec<PayloadMessage>,
    /// Session identification.
    pub metadata: PayloadMetadata,
}

/// One message of a [`NotificationPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The message text, with any reasoning appended.
    pub content: String,
}

/// Metadata of a [`NotificationPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    /// `<engine>-<unix seconds>` of the session start.
    pub session_id: String,
    /// Always `markdown`.
    pub format: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest<'a> {
    email: &'a str,
    chat_history: &'a NotificationPayload,
}

#[derive(Debug, Default, Deserialize)]
struct UserStatus {
    #[serde(default)]
    email: String,
}

/// Sends a built payload somewhere.
#[async_trait::async_trait]
pub trait NotifyTransport: Send + Sync {
    /// Deliver `payload` addressed to `email`.
    async fn deliver(&self, email: &str, payload: &NotificationPayload) -> Result<()>;
}

/// Posts payloads as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifyTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotifyTransport {
    /// A transport posting to `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait::async_trait]
impl NotifyTransport for HttpNotifyTransport {
    async fn deliver(&self, email: &str, payload: &NotificationPayload) -> Result<()> {
        let request = NotificationRequest {
            email,
            chat_history: payload,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::notify(format!("error making request: {e}"), None))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::notify("unexpected status code", Some(status.as_u16())));
        }
        Ok(())
    }
}

/// Builds transcripts and hands them to a [`NotifyTransport`].
pub struct HistoryNotifier {
    transport: Box<dyn NotifyTransport>,
    status_path: Option<PathBuf>,
}

impl HistoryNotifier {
    /// A notifier delivering through `transport`.
    pub fn new(transport: Box<dyn NotifyTransport>, status_path: Option<PathBuf>) -> Self {
        Self {
            transport,
            status_path,
        }
    }

    /// The verified address from the account status file, if any.
    pub fn verified_address(&self) -> Option<String> {
        let path = self.status_path.as_ref()?;
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no account status");
                return None;
            }
        };
        match serde_json::from_str::<UserStatus>(&text) {
            Ok(status) if !status.email.trim().is_empty() => Some(status.email.trim().to_string()),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable account status");
                None
            }
        }
    }

    /// The destination address: the verified one, else one read from
    /// `source`.  Returns `Ok(None)` when the prompt is left blank or
    /// cancelled.
    pub fn resolve_address(&self, source: &mut dyn LineSource) -> Result<Option<String>> {
        if let Some(address) = self.verified_address() {
            return Ok(Some(address));
        }
        match source.read_line(ADDRESS_PROMPT)? {
            LineEvent::Line(line) => {
                let address = line.trim();
                if address.is_empty() {
                    return Ok(None);
                }
                if !address.contains('@') {
                    return Err(Error::notify(format!("'{address}' is not an email address"), None));
                }
                Ok(Some(address.to_string()))
            }
            LineEvent::Interrupted | LineEvent::Eof => Ok(None),
        }
    }

    /// Send `history` to `address`.
    pub async fn notify(
        &self,
        history: &[Message],
        model: &str,
        session_id: &str,
        address: &str,
    ) -> Result<()> {
        let payload = build_payload(history, model, session_id, crate::chat::export::now())?;
        match self.transport.deliver(address, &payload).await {
            Ok(()) => {
                NOTIFY_SENT.click();
                tracing::info!(messages = payload.messages.len(), "transcript delivered");
                Ok(())
            }
            Err(err) => {
                NOTIFY_ERRORS.click();
                tracing::warn!(error = %err, "transcript delivery failed");
                Err(err)
            }
        }
    }
}

/// Build the payload for `history` at time `at`.
pub fn build_payload(
    history: &[Message],
    model: &str,
    session_id: &str,
    at: OffsetDateTime,
) -> Result<NotificationPayload> {
    let timestamp = at.format(&Rfc3339).map_err(|err| {
        Error::notify(format!("could not format timestamp: {err}"), None)
    })?;
    let messages = conversation_turns(history)
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| PayloadMessage {
            role: m.role,
            content: m.transcript_content(),
        })
        .collect();
    Ok(NotificationPayload {
        timestamp,
        model: model.to_string(),
        messages,
        metadata: PayloadMetadata {
            session_id: session_id.to_string(),
            format: "markdown".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<(String, NotificationPayload)>>>,
        status: Option<u16>,
    }

    #[async_trait::async_trait]
    impl NotifyTransport for Recorder {
        async fn deliver(&self, email: &str, payload: &NotificationPayload) -> Result<()> {
            if let Some(status) = self.status {
                return Err(Error::notify("unexpected status code", Some(status)));
            }
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), payload.clone()));
            Ok(())
        }
    }

    struct Answer(Option<LineEvent>);

    impl LineSource for Answer {
        fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
            assert_eq!(prompt, ADDRESS_PROMPT);
            Ok(self.0.take().unwrap_or(LineEvent::Eof))
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::system("You are a helpful assistant."),
            Message::user("hi"),
            Message::assistant("hello", Some("be friendly".to_string())),
        ]
    }

    #[test]
    fn payload_shape() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        let payload = build_payload(&history(), "deepseek-chat", "deepseek-1709622489", at).unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "timestamp": "2024-03-05T07:08:09Z",
                "model": "deepseek-chat",
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello\n\n💡 Reasoning:\nbe friendly"}
                ],
                "metadata": {"sessionId": "deepseek-1709622489", "format": "markdown"}
            })
        );
    }

    #[test]
    fn request_wraps_the_payload() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        let payload = build_payload(&history(), "gpt-4", "gpt-1", at).unwrap();
        let request = NotificationRequest {
            email: "user@example.com",
            chat_history: &payload,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["email"], "user@example.com");
        assert_eq!(json["chatHistory"]["model"], "gpt-4");
    }

    #[test]
    fn verified_address_from_status_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_status.json");
        fs::write(
            &path,
            r#"{"email": "verified@example.com", "token": "abc", "expiry": 1900000000}"#,
        )
        .unwrap();
        let notifier = HistoryNotifier::new(Box::new(Recorder::default()), Some(path));
        assert_eq!(
            notifier.verified_address().as_deref(),
            Some("verified@example.com")
        );
        let mut never = Answer(None);
        assert_eq!(
            notifier.resolve_address(&mut never).unwrap().as_deref(),
            Some("verified@example.com")
        );
    }

    #[test]
    fn prompt_when_no_status_file() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = HistoryNotifier::new(
            Box::new(Recorder::default()),
            Some(dir.path().join("missing.json")),
        );
        let mut answer = Answer(Some(LineEvent::Line(" typed@example.com ".to_string())));
        assert_eq!(
            notifier.resolve_address(&mut answer).unwrap().as_deref(),
            Some("typed@example.com")
        );
    }

    #[test]
    fn blank_or_cancelled_prompt_aborts() {
        let notifier = HistoryNotifier::new(Box::new(Recorder::default()), None);
        let mut blank = Answer(Some(LineEvent::Line("   ".to_string())));
        assert_eq!(notifier.resolve_address(&mut blank).unwrap(), None);
        let mut cancelled = Answer(Some(LineEvent::Interrupted));
        assert_eq!(notifier.resolve_address(&mut cancelled).unwrap(), None);
        let mut malformed = Answer(Some(LineEvent::Line("nobody".to_string())));
        assert!(notifier.resolve_address(&mut malformed).is_err());
    }

    #[tokio::test]
    async fn notify_delivers_payload() {
        let recorder = Recorder::default();
        let notifier = HistoryNotifier::new(Box::new(recorder.clone()), None);
        notifier
            .notify(&history(), "gpt-4", "gpt-1", "user@example.com")
            .await
            .unwrap();
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user@example.com");
        assert_eq!(sent[0].1.messages.len(), 2);
    }

    #[tokio::test]
    async fn rejected_delivery_is_a_notify_error() {
        let recorder = Recorder {
            status: Some(500),
            ..Recorder::default()
        };
        let notifier = HistoryNotifier::new(Box::new(recorder), None);
        let err = notifier
            .notify(&history(), "gpt-4", "gpt-1", "user@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert!(!err.is_fatal());
    }
}
