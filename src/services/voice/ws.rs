use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::models::DataMessage;

use super::{ConnectionQuality, VoiceConnection, VoiceEvent, VoiceTransport};

const EVENT_BUFFER: usize = 256;
#[cfg(feature = "audio")]
const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// JSON-over-WebSocket voice transport. Text frames carry the session's
/// structured messages; audio arrives as base64 PCM16 frames. Media
/// negotiation (TURN/STUN, codecs) happens upstream in the voice
/// backend; this client only speaks the data/control channel.
pub struct WsVoiceTransport;

impl WsVoiceTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WsVoiceTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceTransport for WsVoiceTransport {
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> anyhow::Result<(Box<dyn VoiceConnection>, mpsc::Receiver<VoiceEvent>)> {
        let sep = if url.contains('?') { '&' } else { '?' };
        let full_url = format!("{url}{sep}access_token={token}");

        let (stream, _response) = connect_async(&full_url).await?;
        tracing::debug!(url, "voice websocket established");

        let (mut sink, mut source) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<WsMessage>();

        #[cfg(feature = "audio")]
        let playback = playback::Playback::spawn();

        let writer: JoinHandle<()> = tokio::spawn(async move {
            while let Some(frame) = control_rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if sink.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });

        let reader: JoinHandle<()> = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        #[cfg(feature = "audio")]
                        if let Some(event) = translate_frame(&text, playback.as_ref()) {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        #[cfg(not(feature = "audio"))]
                        if let Some(event) = translate_frame(&text) {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "Verbindung beendet".to_string());
                        let _ = event_tx.send(VoiceEvent::Disconnected { reason }).await;
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary
                    Some(Err(e)) => {
                        let _ = event_tx
                            .send(VoiceEvent::Disconnected {
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                    None => {
                        let _ = event_tx
                            .send(VoiceEvent::Disconnected {
                                reason: "Verbindung getrennt".to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        let connection = WsVoiceConnection {
            control: control_tx,
            reader,
            writer,
            closed: false,
        };
        Ok((Box::new(connection), event_rx))
    }
}

/// Map one inbound text frame onto a `VoiceEvent`. Audio frames are
/// consumed here and never reach the session controller.
fn translate_frame(
    text: &str,
    #[cfg(feature = "audio")] playback: Option<&playback::Playback>,
) -> Option<VoiceEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("type").and_then(|t| t.as_str()) {
        Some("participant_joined") => Some(VoiceEvent::ParticipantJoined {
            identity: value.get("identity")?.as_str()?.to_string(),
        }),
        Some("participant_left") => Some(VoiceEvent::ParticipantLeft {
            identity: value.get("identity")?.as_str()?.to_string(),
        }),
        Some("quality") => {
            let quality = match value.get("value").and_then(|v| v.as_str())? {
                "poor" => ConnectionQuality::Poor,
                _ => ConnectionQuality::Good,
            };
            Some(VoiceEvent::Quality(quality))
        }
        Some("audio") => {
            let pcm = decode_audio_frame(&value)?;
            tracing::trace!(samples = pcm.len(), "audio frame");
            #[cfg(feature = "audio")]
            if let Some(playback) = playback {
                let rate = value
                    .get("sample_rate")
                    .and_then(|r| r.as_u64())
                    .map(|r| r as u32)
                    .unwrap_or(DEFAULT_SAMPLE_RATE);
                playback.push(pcm, rate);
            }
            None
        }
        _ => DataMessage::parse(text.as_bytes()).map(VoiceEvent::Data),
    }
}

fn decode_audio_frame(value: &serde_json::Value) -> Option<Vec<i16>> {
    let bytes = B64.decode(value.get("data")?.as_str()?).ok()?;
    let mut pcm = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        pcm.push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    Some(pcm)
}

struct WsVoiceConnection {
    control: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    closed: bool,
}

impl WsVoiceConnection {
    fn send_control(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        self.control
            .send(WsMessage::Text(payload.to_string()))
            .map_err(|_| anyhow::anyhow!("voice connection already closed"))
    }
}

#[async_trait]
impl VoiceConnection for WsVoiceConnection {
    async fn publish_microphone(&mut self) -> anyhow::Result<()> {
        self.send_control(serde_json::json!({
            "type": "microphone",
            "enabled": true,
            "echo_cancellation": true,
            "noise_suppression": true,
            "auto_gain_control": true,
        }))
    }

    async fn unpublish_microphone(&mut self) {
        let _ = self.send_control(serde_json::json!({
            "type": "microphone",
            "enabled": false,
        }));
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.control.send(WsMessage::Close(None));
        // Give the writer a moment to flush the close frame.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.writer.abort();
        self.reader.abort();
    }
}

impl Drop for WsVoiceConnection {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

#[cfg(feature = "audio")]
mod playback {
    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, Sink};
    use std::sync::mpsc;

    /// Playback runs on its own thread because the rodio output stream
    /// is not Send.
    pub struct Playback {
        tx: mpsc::Sender<(Vec<i16>, u32)>,
    }

    impl Playback {
        pub fn spawn() -> Option<Self> {
            let (tx, rx) = mpsc::channel::<(Vec<i16>, u32)>();
            std::thread::spawn(move || {
                let Ok((_stream, handle)) = OutputStream::try_default() else {
                    tracing::warn!("no audio output device, inbound audio disabled");
                    return;
                };
                let Ok(sink) = Sink::try_new(&handle) else {
                    return;
                };
                while let Ok((frame, rate)) = rx.recv() {
                    sink.append(SamplesBuffer::new(1, rate, frame));
                }
            });
            Some(Self { tx })
        }

        pub fn push(&self, frame: Vec<i16>, sample_rate: u32) {
            let _ = self.tx.send((frame, sample_rate));
        }
    }
}
