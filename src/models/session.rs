use serde::Deserialize;

/// Short-lived credential issued by the backend for one connection
/// attempt. Never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCredential {
    pub token: String,
    pub url: String,
    #[serde(rename = "roomName")]
    pub room_name: String,
}

/// Voice session lifecycle. One enumerated type instead of scattered
/// `isConnecting`/`room` globals; every UI status line derives from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    Idle,
    RequestingCredential,
    Connecting,
    Connected,
    /// Agent is waiting for the caller to speak.
    Listening,
    /// Caller utterance received, agent is working on a reply.
    Speaking,
    Error,
}

impl VoicePhase {
    /// An attempt is outstanding or a session is live; a new `start()`
    /// must be a no-op in these phases.
    pub fn is_active(&self) -> bool {
        !matches!(self, VoicePhase::Idle | VoicePhase::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// Structured message received over the voice data channel: UTF-8 JSON
/// with a `type` discriminator, falling back to a bare `{message}`.
#[derive(Debug, Clone, PartialEq)]
pub enum DataMessage {
    Transcript { role: TranscriptRole, text: String },
    Status { message: String },
    Generic { message: String },
}

impl DataMessage {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("transcript") => {
                let text = value.get("text")?.as_str()?.to_string();
                let role = match value.get("role").and_then(|r| r.as_str())? {
                    "user" => TranscriptRole::User,
                    "assistant" => TranscriptRole::Assistant,
                    _ => return None,
                };
                Some(DataMessage::Transcript { role, text })
            }
            Some("status") => Some(DataMessage::Status {
                message: value.get("message")?.as_str()?.to_string(),
            }),
            _ => value
                .get("message")
                .and_then(|m| m.as_str())
                .map(|message| DataMessage::Generic {
                    message: message.to_string(),
                }),
        }
    }
}
