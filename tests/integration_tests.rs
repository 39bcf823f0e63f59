use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use futures_util::SinkExt;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use frontdesk::config::{AppConfig, Overrides};
use frontdesk::errors::AppError;
use frontdesk::models::{ChatRole, DataMessage, Notification, TranscriptRole, VoicePhase};
use frontdesk::services::appointments::AppointmentsApi;
use frontdesk::services::calendar::CalendarView;
use frontdesk::services::realtime::RealtimeChannel;
use frontdesk::services::session::SessionController;
use frontdesk::services::voice::{VoiceConnection, VoiceEvent, VoiceTransport};

// ── Mock voice transport ──

struct MockTransport {
    mic_released: Arc<AtomicUsize>,
    event_feed: std::sync::Mutex<Option<mpsc::Sender<VoiceEvent>>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            mic_released: Arc::new(AtomicUsize::new(0)),
            event_feed: std::sync::Mutex::new(None),
        }
    }

    async fn feed(&self, event: VoiceEvent) {
        let tx = self.event_feed.lock().unwrap().clone().unwrap();
        tx.send(event).await.unwrap();
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _token: &str,
    ) -> anyhow::Result<(Box<dyn VoiceConnection>, mpsc::Receiver<VoiceEvent>)> {
        let (tx, rx) = mpsc::channel(16);
        *self.event_feed.lock().unwrap() = Some(tx);
        Ok((
            Box::new(MockConnection {
                released: Arc::clone(&self.mic_released),
            }),
            rx,
        ))
    }
}

struct MockConnection {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceConnection for MockConnection {
    async fn publish_microphone(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unpublish_microphone(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&mut self) {}
}

// ── Helpers ──

fn appointment_json(id: &str, name: &str, time: &str, end_time: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "patient_name": name,
        "phone": "+49 170 0000000",
        "date": "2025-06-16",
        "time": time,
        "end_time": end_time,
        "treatment_type": "Kontrolle",
        "notes": null,
        "status": "confirmed",
    })
}

fn test_config(server: &MockServer) -> Arc<AppConfig> {
    let overrides = Overrides {
        api_url: Some(server.uri()),
        ..Default::default()
    };
    Arc::new(AppConfig::resolve("localhost", &overrides).unwrap())
}

fn calendar_with(server: &MockServer) -> (Arc<CalendarView>, broadcast::Receiver<Notification>) {
    let api = Arc::new(AppointmentsApi::new(server.uri()));
    let (tx, rx) = broadcast::channel(64);
    (Arc::new(CalendarView::new(api, tx)), rx)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

async fn drain_for(rx: &mut broadcast::Receiver<Notification>, text: &str) -> bool {
    while let Ok(notification) = rx.try_recv() {
        if notification.text.contains(text) {
            return true;
        }
    }
    false
}

// ── Calendar view ──

#[tokio::test]
async fn test_refetch_fills_cache_and_range_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            appointment_json("a1", "Maria Schmidt", "10:00", "10:30"),
            {
                "id": "a2",
                "patient_name": "Hans Weber",
                "date": "2025-07-01",
                "time": "09:00",
                "end_time": "09:30",
                "status": "completed",
            },
        ])))
        .mount(&server)
        .await;

    let (calendar, _rx) = calendar_with(&server);
    calendar.refetch().await.unwrap();
    assert_eq!(calendar.appointments().await.len(), 2);

    calendar
        .set_visible_range(date("2025-06-01"), date("2025-06-30"))
        .await;
    let visible = calendar.visible().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].patient_name, "Maria Schmidt");
}

#[tokio::test]
async fn test_failed_move_reverts_to_server_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            appointment_json("a1", "Maria Schmidt", "10:00", "10:30"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/appointments/a1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": false })),
        )
        .mount(&server)
        .await;

    let (calendar, mut rx) = calendar_with(&server);
    calendar.refetch().await.unwrap();

    let result = calendar
        .move_appointment("a1", date("2025-06-16"), time("11:00"), time("11:30"))
        .await;
    assert!(matches!(result, Err(AppError::Api(_))));

    // The optimistic change is gone; the view matches the server again.
    let cache = calendar.appointments().await;
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0].time, time("10:00"));
    assert_eq!(cache[0].end_time, time("10:30"));
    assert!(drain_for(&mut rx, "Fehler beim Verschieben").await);
}

#[tokio::test]
async fn test_successful_move_keeps_new_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            appointment_json("a1", "Maria Schmidt", "10:00", "10:30"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/appointments/a1"))
        .and(body_partial_json(serde_json::json!({
            "time": "11:00",
            "end_time": "11:30",
            "status": "confirmed",
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (calendar, mut rx) = calendar_with(&server);
    calendar.refetch().await.unwrap();
    calendar
        .move_appointment("a1", date("2025-06-16"), time("11:00"), time("11:30"))
        .await
        .unwrap();

    assert_eq!(calendar.appointments().await[0].time, time("11:00"));
    assert!(drain_for(&mut rx, "Termin verschoben").await);
    server.verify().await;
}

#[tokio::test]
async fn test_move_unknown_appointment_is_not_found() {
    let server = MockServer::start().await;
    let (calendar, _rx) = calendar_with(&server);
    let result = calendar
        .move_appointment("missing", date("2025-06-16"), time("11:00"), time("11:30"))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_create_error_reply_surfaces_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "Zeitfenster bereits belegt",
        })))
        .mount(&server)
        .await;

    let (calendar, mut rx) = calendar_with(&server);
    let draft = frontdesk::models::AppointmentDraft {
        patient_name: "Maria Schmidt".to_string(),
        phone: None,
        date: date("2025-06-16"),
        time: time("10:00"),
        end_time: time("10:30"),
        treatment_type: None,
        notes: None,
    };
    let result = calendar.create(draft).await;
    assert!(matches!(result, Err(AppError::Api(_))));
    assert!(drain_for(&mut rx, "Zeitfenster bereits belegt").await);
}

#[tokio::test]
async fn test_delete_refetches_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/appointments/a1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
        )
        .mount(&server)
        .await;

    let (calendar, mut rx) = calendar_with(&server);
    calendar.delete("a1").await.unwrap();
    assert!(calendar.appointments().await.is_empty());
    assert!(drain_for(&mut rx, "Termin gelöscht").await);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })),
        )
        .mount(&server)
        .await;

    let api = AppointmentsApi::new(server.uri());
    let reply = api.health().await.unwrap();
    assert_eq!(reply["status"], "ok");
}

// ── Voice session end to end ──

#[tokio::test]
async fn test_voice_bootstrap_with_connect_route() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sofia/connect"))
        .and(body_partial_json(
            serde_json::json!({ "roomName": "sofia-dental" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "jwt-test",
            "url": "ws://localhost:7880",
            "roomName": "sofia-dental",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let overrides = Overrides {
        api_url: Some(server.uri()),
        token_route: Some("connect".to_string()),
        ..Default::default()
    };
    let config = Arc::new(AppConfig::resolve("localhost", &overrides).unwrap());

    let transport = Arc::new(MockTransport::new());
    let controller = Arc::new(SessionController::new(
        config,
        Arc::clone(&transport) as Arc<dyn VoiceTransport>,
    ));

    assert!(controller.start().await.unwrap());
    assert_eq!(controller.phase().await, VoicePhase::Connected);

    transport
        .feed(VoiceEvent::Data(DataMessage::Transcript {
            role: TranscriptRole::User,
            text: "Hallo".to_string(),
        }))
        .await;

    for _ in 0..100 {
        if controller
            .transcript()
            .await
            .iter()
            .any(|m| m.role == ChatRole::User && m.text == "Hallo")
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(controller
        .transcript()
        .await
        .iter()
        .any(|m| m.role == ChatRole::User && m.text == "Hallo"));

    controller.stop().await;
    controller.stop().await;
    assert_eq!(transport.mic_released.load(Ordering::SeqCst), 1);
    server.verify().await;
}

// ── Realtime channel ──

async fn spawn_push_server(frames: Vec<String>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(WsMessage::Text(frame)).await.unwrap();
            }
            // Hold the connection so the client doesn't start reconnecting
            // while the test is still asserting.
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
    format!("ws://{addr}")
}

#[tokio::test]
async fn test_push_event_triggers_refetch_and_notification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            appointment_json("a1", "Maria Schmidt", "10:00", "10:30"),
        ])))
        .mount(&server)
        .await;

    let (calendar, mut rx) = calendar_with(&server);
    assert!(calendar.appointments().await.is_empty());

    let ws_url = spawn_push_server(vec![serde_json::json!({
        "event": "appointmentCreated",
        "data": { "id": "a1", "patient_name": "Maria Schmidt" },
    })
    .to_string()])
    .await;

    let (notify_tx, _) = broadcast::channel(64);
    let channel = RealtimeChannel::new(ws_url, Arc::clone(&calendar), notify_tx);
    let runner = tokio::spawn(async move {
        let _ = channel.run().await;
    });

    for _ in 0..100 {
        if !calendar.appointments().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calendar.appointments().await.len(), 1);
    assert!(drain_for(&mut rx, "Neuer Termin: Maria Schmidt").await);
    runner.abort();
}
