use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::config::{AppConfig, TokenRoute};
use crate::errors::AppError;
use crate::models::{
    ChatMessage, ChatRole, DataMessage, SessionCredential, TranscriptRole, VoicePhase,
};
use crate::services::voice::{ConnectionQuality, VoiceConnection, VoiceEvent, VoiceTransport};

const DEFAULT_ROOM: &str = "sofia-dental";
const UPDATE_BUFFER: usize = 256;

// Status line wording, unchanged from the calendar page.
const STATUS_CONNECTING: &str = "Verbindung wird hergestellt...";
const STATUS_MIC_PENDING: &str = "Verbunden - Mikrofon wird aktiviert...";
const STATUS_READY: &str = "Bereit - Sie können jetzt sprechen";
const STATUS_LISTENING: &str = "Sofia hört zu...";
const STATUS_THINKING: &str = "Sofia denkt nach...";
const STATUS_POOR_CONNECTION: &str = "Schlechte Verbindung...";
const STATUS_MIC_ERROR: &str = "Mikrofon-Fehler";
const STATUS_DISCONNECTED: &str = "Getrennt";

const MSG_WELCOME: &str =
    "Hallo! Ich bin Sofia, Ihre digitale Zahnarzthelferin. Wie kann ich Ihnen helfen?";
const MSG_MIC_DENIED: &str =
    "Mikrofon konnte nicht aktiviert werden. Bitte überprüfen Sie Ihre Berechtigungen.";
const MSG_TOKEN_FAILED: &str = "Verbindung fehlgeschlagen. Bitte versuchen Sie es erneut.";
const MSG_AGENT_JOINED: &str = "Sofia ist jetzt verbunden und hört zu.";
const MSG_AGENT_LEFT: &str = "Sofia hat den Raum verlassen.";
const MSG_STOPPED: &str = "Sitzung beendet.";

/// View updates emitted by the state machine. The UI renders these
/// verbatim; it never derives text from anything else.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Phase(VoicePhase),
    StatusLine(String),
    Chat(ChatMessage),
}

struct Inner {
    phase: VoicePhase,
    connection: Option<Box<dyn VoiceConnection>>,
    microphone_published: bool,
    transcript: Vec<ChatMessage>,
}

/// Owns the voice session lifecycle: credential request, transport
/// connect, microphone, transcript. All connection state lives here:
/// one controller, one lock, no page-global flags.
pub struct SessionController {
    config: Arc<AppConfig>,
    http: reqwest::Client,
    transport: Arc<dyn VoiceTransport>,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionController {
    pub fn new(config: Arc<AppConfig>, transport: Arc<dyn VoiceTransport>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            config,
            http: reqwest::Client::new(),
            transport,
            inner: Mutex::new(Inner {
                phase: VoicePhase::Idle,
                connection: None,
                microphone_published: false,
                transcript: Vec::new(),
            }),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub async fn phase(&self) -> VoicePhase {
        self.inner.lock().await.phase
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.transcript.clone()
    }

    /// Start a session. A second call while an attempt is outstanding or
    /// a session is live is a no-op and returns `Ok(false)`; exactly one
    /// credential request is ever in flight.
    pub async fn start(self: &Arc<Self>) -> Result<bool, AppError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.phase.is_active() {
                tracing::debug!(phase = ?inner.phase, "start ignored, session already active");
                return Ok(false);
            }
            inner.phase = VoicePhase::RequestingCredential;
            inner.transcript.clear();
        }
        self.set_phase(VoicePhase::RequestingCredential);
        self.status(STATUS_CONNECTING);

        let credential = match self.request_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(error = %e, "credential request failed");
                self.push_chat(ChatRole::Error, MSG_TOKEN_FAILED).await;
                self.enter_error().await;
                return Err(e);
            }
        };
        tracing::info!(room = %credential.room_name, "credential received");

        // Stopped while the request was in flight.
        {
            let mut inner = self.inner.lock().await;
            if inner.phase != VoicePhase::RequestingCredential {
                return Ok(false);
            }
            inner.phase = VoicePhase::Connecting;
        }
        self.set_phase(VoicePhase::Connecting);

        let (connection, events) = match self
            .transport
            .connect(&credential.url, &credential.token)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, url = %credential.url, "voice connect failed");
                self.push_chat(ChatRole::Error, MSG_TOKEN_FAILED).await;
                self.enter_error().await;
                return Err(AppError::Connection(e.to_string()));
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.phase != VoicePhase::Connecting {
                // Stopped while connecting; don't leak the handle.
                let mut connection = connection;
                connection.close().await;
                return Ok(false);
            }
            inner.phase = VoicePhase::Connected;
            inner.connection = Some(connection);
        }
        self.set_phase(VoicePhase::Connected);
        self.status(STATUS_MIC_PENDING);
        self.push_chat(ChatRole::Assistant, MSG_WELCOME).await;

        if let Err(e) = self.enable_microphone().await {
            // Permission problem: session stays up, voice input off.
            tracing::warn!(error = %e, "microphone unavailable");
            self.push_chat(ChatRole::Error, MSG_MIC_DENIED).await;
            self.status(STATUS_MIC_ERROR);
        }
        self.spawn_event_pump(events);
        Ok(true)
    }

    /// Stop the session locally. Safe to call at any time, in any phase.
    pub async fn stop(self: &Arc<Self>) {
        self.disconnect(MSG_STOPPED).await;
    }

    async fn enable_microphone(&self) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        let Some(connection) = inner.connection.as_mut() else {
            return Ok(());
        };
        connection
            .publish_microphone()
            .await
            .map_err(|e| AppError::Microphone(e.to_string()))?;
        inner.microphone_published = true;
        drop(inner);
        self.status(STATUS_READY);
        Ok(())
    }

    /// Tear down the connection. The microphone is released exactly once
    /// even when local stop and remote disconnect race: whoever takes the
    /// handle under the lock does the release.
    async fn disconnect(self: &Arc<Self>, note: &str) {
        let (connection, release_mic) = {
            let mut inner = self.inner.lock().await;
            if inner.connection.is_none() && !inner.phase.is_active() {
                return;
            }
            let connection = inner.connection.take();
            let release_mic = inner.microphone_published;
            inner.microphone_published = false;
            inner.phase = VoicePhase::Idle;
            (connection, release_mic)
        };

        if let Some(mut connection) = connection {
            if release_mic {
                connection.unpublish_microphone().await;
            }
            connection.close().await;
        }

        self.push_chat(ChatRole::System, note).await;
        self.set_phase(VoicePhase::Idle);
        self.status(STATUS_DISCONNECTED);
        tracing::info!("voice session closed");
    }

    fn spawn_event_pump(self: &Arc<Self>, mut events: mpsc::Receiver<VoiceEvent>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    VoiceEvent::Data(message) => controller.handle_data(message).await,
                    VoiceEvent::ParticipantJoined { identity } => {
                        if is_agent_identity(&identity) {
                            controller.push_chat(ChatRole::System, MSG_AGENT_JOINED).await;
                            controller.transition(VoicePhase::Listening).await;
                            controller.status(STATUS_LISTENING);
                        }
                    }
                    VoiceEvent::ParticipantLeft { identity } => {
                        if is_agent_identity(&identity) {
                            controller.push_chat(ChatRole::System, MSG_AGENT_LEFT).await;
                        }
                    }
                    VoiceEvent::Quality(ConnectionQuality::Poor) => {
                        controller.status(STATUS_POOR_CONNECTION);
                    }
                    VoiceEvent::Quality(ConnectionQuality::Good) => {}
                    VoiceEvent::Disconnected { reason } => {
                        controller
                            .disconnect(&format!("Verbindung getrennt: {reason}"))
                            .await;
                        break;
                    }
                }
            }
        });
    }

    async fn handle_data(&self, message: DataMessage) {
        match message {
            DataMessage::Transcript {
                role: TranscriptRole::User,
                text,
            } => {
                self.push_chat(ChatRole::User, text).await;
                self.transition(VoicePhase::Speaking).await;
                self.status(STATUS_THINKING);
            }
            DataMessage::Transcript {
                role: TranscriptRole::Assistant,
                text,
            } => {
                self.push_chat(ChatRole::Assistant, text).await;
                self.transition(VoicePhase::Listening).await;
                self.status(STATUS_LISTENING);
            }
            DataMessage::Status { message } => self.status(&message),
            DataMessage::Generic { message } => {
                self.push_chat(ChatRole::Assistant, message).await;
            }
        }
    }

    async fn request_credential(&self) -> Result<SessionCredential, AppError> {
        let participant = format!("Sofia User {}", Uuid::new_v4());
        let body = match self.config.token_route {
            TokenRoute::Token => serde_json::json!({ "participant_name": participant }),
            TokenRoute::Connect => serde_json::json!({
                "participantName": participant,
                "roomName": DEFAULT_ROOM,
            }),
        };

        let response = self
            .http
            .post(self.config.token_endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Credential(format!(
                "token request failed: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Credential(format!("invalid token response: {e}")))
    }

    /// Only a live session may move between Connected/Listening/Speaking;
    /// a disconnect that raced the event pump wins.
    async fn transition(&self, phase: VoicePhase) {
        let mut inner = self.inner.lock().await;
        if !matches!(
            inner.phase,
            VoicePhase::Connected | VoicePhase::Listening | VoicePhase::Speaking
        ) {
            return;
        }
        inner.phase = phase;
        drop(inner);
        self.set_phase(phase);
    }

    async fn enter_error(&self) {
        self.inner.lock().await.phase = VoicePhase::Error;
        self.set_phase(VoicePhase::Error);
    }

    async fn push_chat(&self, role: ChatRole, text: impl Into<String>) {
        let message = ChatMessage::new(role, text);
        self.inner.lock().await.transcript.push(message.clone());
        let _ = self.updates.send(SessionUpdate::Chat(message));
    }

    fn set_phase(&self, phase: VoicePhase) {
        let _ = self.updates.send(SessionUpdate::Phase(phase));
    }

    fn status(&self, line: &str) {
        let _ = self.updates.send(SessionUpdate::StatusLine(line.to_string()));
    }
}

fn is_agent_identity(identity: &str) -> bool {
    let identity = identity.to_lowercase();
    identity.contains("sofia") || identity.contains("agent")
}
