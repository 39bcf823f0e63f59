use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::errors::AppError;
use crate::models::{Notification, NotificationLevel, RealtimeEvent};
use crate::services::calendar::CalendarView;

const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Subscriber for server-pushed calendar events. Push is an
/// optimization, never the source of truth: each event only triggers a
/// refetch through the view.
pub struct RealtimeChannel {
    url: String,
    calendar: Arc<CalendarView>,
    notifications: broadcast::Sender<Notification>,
}

impl RealtimeChannel {
    pub fn new(
        url: impl Into<String>,
        calendar: Arc<CalendarView>,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        Self {
            url: url.into(),
            calendar,
            notifications,
        }
    }

    /// Run until the connection is lost and the bounded reconnect
    /// attempts (5, 1 s apart) are spent.
    pub async fn run(&self) -> Result<(), AppError> {
        let mut attempts: u32 = 0;
        loop {
            match connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    tracing::info!(url = %self.url, "realtime channel connected");
                    attempts = 0;
                    self.notify(NotificationLevel::Info, "Verbunden - Live Updates");
                    self.pump(stream).await;
                    self.notify(NotificationLevel::Warning, "Verbindung getrennt");
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %self.url, "realtime connect failed");
                }
            }

            attempts += 1;
            if attempts >= RECONNECT_ATTEMPTS {
                let _ = self.notifications.send(Notification::banner(
                    "Live-Updates nicht verfügbar - Kalender bitte manuell aktualisieren",
                ));
                return Err(AppError::Realtime(
                    "reconnect attempts exhausted".to_string(),
                ));
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn pump<S>(&self, mut stream: S)
    where
        S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    if let Some(event) = RealtimeEvent::parse(&text) {
                        tracing::debug!(?event, "realtime event");
                        self.calendar.handle_event(event).await;
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {} // ping/pong/binary
                Err(e) => {
                    tracing::warn!(error = %e, "realtime stream error");
                    break;
                }
            }
        }
    }

    fn notify(&self, level: NotificationLevel, text: &str) {
        let _ = self.notifications.send(Notification::new(level, text));
    }
}
