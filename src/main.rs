use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use frontdesk::config::AppConfig;
use frontdesk::models::{ChatRole, Notification, NotificationLevel};
use frontdesk::services::appointments::AppointmentsApi;
use frontdesk::services::calendar::CalendarView;
use frontdesk::services::realtime::RealtimeChannel;
use frontdesk::services::session::{SessionController, SessionUpdate};
use frontdesk::services::voice::ws::WsVoiceTransport;
use frontdesk::services::voice::VoiceTransport;
use frontdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path =
        std::env::var("FRONTDESK_CONFIG_FILE").unwrap_or_else(|_| "frontdesk.json".to_string());
    let config = match AppConfig::load_saved(Path::new(&config_path)) {
        Some(saved) => {
            tracing::info!(path = %config_path, "using saved configuration");
            saved
        }
        None => match AppConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                // Missing configuration is fatal to every feature; show the
                // banner and stop instead of limping along half-wired.
                eprintln!("Konfiguration erforderlich: {e}");
                return Err(e.into());
            }
        },
    };
    let config = Arc::new(config);

    tracing::info!(
        environment = ?config.environment,
        api = %config.api_base_url,
        voice = %config.voice_url,
        "configuration resolved"
    );

    let (notify_tx, _) = broadcast::channel::<Notification>(256);

    let api = Arc::new(AppointmentsApi::new(config.api_base_url.clone()));
    let calendar = Arc::new(CalendarView::new(Arc::clone(&api), notify_tx.clone()));

    let voice = if config.features.voice_enabled {
        let transport: Arc<dyn VoiceTransport> = Arc::new(WsVoiceTransport::new());
        Some(Arc::new(SessionController::new(
            Arc::clone(&config),
            transport,
        )))
    } else {
        tracing::info!("voice assistant disabled by configuration");
        None
    };

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        api: Arc::clone(&api),
        calendar: Arc::clone(&calendar),
        voice,
        notifications: notify_tx.clone(),
    });

    if config.features.demo_mode {
        tracing::info!("demo mode active, skipping backend health check");
    } else {
        match api.health().await {
            Ok(_) => tracing::info!("backend reachable"),
            Err(e) => {
                tracing::warn!(error = %e, "backend health check failed");
                let _ = notify_tx.send(Notification::new(
                    NotificationLevel::Error,
                    "Verbindung zum Server fehlgeschlagen",
                ));
            }
        }
    }

    let _ = calendar.refetch().await;

    if config.features.realtime_updates {
        let channel = RealtimeChannel::new(
            config.ws_url.clone(),
            Arc::clone(&calendar),
            notify_tx.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = channel.run().await {
                tracing::warn!(error = %e, "realtime channel gave up");
            }
        });
    }

    // Notifications and session updates go straight to the terminal;
    // this loop is the page's status area.
    let mut notifications = BroadcastStream::new(notify_tx.subscribe());
    tokio::spawn(async move {
        while let Some(item) = notifications.next().await {
            if let Ok(notification) = item {
                print_notification(&notification);
            }
        }
    });
    if let Some(voice) = &state.voice {
        let mut updates = BroadcastStream::new(voice.subscribe());
        tokio::spawn(async move {
            while let Some(item) = updates.next().await {
                if let Ok(update) = item {
                    print_session_update(&update);
                }
            }
        });
    }

    println!("frontdesk: Befehle: start | stop | list | refresh | save | quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "start" => match &state.voice {
                Some(voice) => {
                    if let Err(e) = voice.start().await {
                        tracing::warn!(error = %e, "voice start failed");
                    }
                }
                None => println!("Sprachassistentin ist deaktiviert."),
            },
            "stop" => {
                if let Some(voice) = &state.voice {
                    voice.stop().await;
                }
            }
            "list" => {
                for appointment in state.calendar.visible().await {
                    println!(
                        "{} {}-{}  {}  [{}]",
                        appointment.date,
                        appointment.time.format("%H:%M"),
                        appointment.end_time.format("%H:%M"),
                        appointment.patient_name,
                        appointment.status.human_label(),
                    );
                }
            }
            "refresh" => {
                if state.calendar.refetch().await.is_ok() {
                    println!("Kalender aktualisiert");
                }
            }
            "save" => match state.config.save(Path::new(&config_path)) {
                Ok(()) => println!("Konfiguration gespeichert: {config_path}"),
                Err(e) => println!("Speichern fehlgeschlagen: {e}"),
            },
            "quit" | "exit" => break,
            "" => {}
            _ => println!("Befehle: start | stop | list | refresh | save | quit"),
        }
    }

    if let Some(voice) = &state.voice {
        voice.stop().await;
    }
    Ok(())
}

fn print_notification(notification: &Notification) {
    let tag = match notification.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Info => "info",
        NotificationLevel::Warning => "warn",
        NotificationLevel::Error => "fehler",
        NotificationLevel::Banner => "!",
    };
    println!("[{tag}] {}", notification.text);
}

fn print_session_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::Chat(message) => {
            let who = match message.role {
                ChatRole::System => "system",
                ChatRole::User => "Sie",
                ChatRole::Assistant => "Sofia",
                ChatRole::Error => "Fehler",
            };
            println!("{who}: {}", message.text);
        }
        SessionUpdate::StatusLine(line) => println!("· {line}"),
        SessionUpdate::Phase(_) => {}
    }
}
