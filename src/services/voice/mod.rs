pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::DataMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Good,
    Poor,
}

/// Events surfaced by a live voice connection, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    ParticipantJoined { identity: String },
    ParticipantLeft { identity: String },
    Data(DataMessage),
    Quality(ConnectionQuality),
    Disconnected { reason: String },
}

/// The single injection point for the voice service. Resolved once at
/// startup; when voice is enabled and no transport is available, startup
/// fails with a clear error instead of probing for globals at call time.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> anyhow::Result<(Box<dyn VoiceConnection>, mpsc::Receiver<VoiceEvent>)>;
}

/// Handle for one established session. Idempotence of microphone
/// release is the caller's job; implementations may assume at-most-once.
#[async_trait]
pub trait VoiceConnection: Send {
    async fn publish_microphone(&mut self) -> anyhow::Result<()>;
    async fn unpublish_microphone(&mut self);
    async fn close(&mut self);
}
