use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::models::Notification;
use crate::services::appointments::AppointmentsApi;
use crate::services::calendar::CalendarView;
use crate::services::session::SessionController;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api: Arc<AppointmentsApi>,
    pub calendar: Arc<CalendarView>,
    /// Present only when the voice feature is enabled and a transport
    /// was injected at startup.
    pub voice: Option<Arc<SessionController>>,
    pub notifications: broadcast::Sender<Notification>,
}
