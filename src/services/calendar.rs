use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{broadcast, Mutex};

use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentDraft, AppointmentTimePatch, Notification, NotificationLevel,
    RealtimeEvent,
};
use crate::services::appointments::AppointmentsApi;

/// View-model behind the calendar widget: a read-mostly cache of the
/// backend's appointments plus the mutations the widget relays. There is
/// no conflict resolution; the server's last known state wins, and a
/// failed write is discarded by refetching.
pub struct CalendarView {
    api: Arc<AppointmentsApi>,
    appointments: Mutex<Vec<Appointment>>,
    visible_range: Mutex<Option<(NaiveDate, NaiveDate)>>,
    notifications: broadcast::Sender<Notification>,
}

impl CalendarView {
    pub fn new(api: Arc<AppointmentsApi>, notifications: broadcast::Sender<Notification>) -> Self {
        Self {
            api,
            appointments: Mutex::new(Vec::new()),
            visible_range: Mutex::new(None),
            notifications,
        }
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.appointments.lock().await.clone()
    }

    pub async fn set_visible_range(&self, from: NaiveDate, to: NaiveDate) {
        *self.visible_range.lock().await = Some((from, to));
    }

    /// Appointments inside the visible range, sorted by start time.
    pub async fn visible(&self) -> Vec<Appointment> {
        let range = *self.visible_range.lock().await;
        let mut list: Vec<Appointment> = self
            .appointments
            .lock()
            .await
            .iter()
            .filter(|a| match range {
                Some((from, to)) => a.date >= from && a.date <= to,
                None => true,
            })
            .cloned()
            .collect();
        list.sort_by_key(|a| a.start());
        list
    }

    /// Replace the cache with the server's current state.
    pub async fn refetch(&self) -> Result<(), AppError> {
        match self.api.list().await {
            Ok(list) => {
                tracing::debug!(count = list.len(), "appointments refetched");
                *self.appointments.lock().await = list;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "appointment refetch failed");
                self.notify(NotificationLevel::Error, "Fehler beim Laden der Termine");
                Err(e)
            }
        }
    }

    pub async fn create(&self, draft: AppointmentDraft) -> Result<(), AppError> {
        match self.api.create(&draft).await {
            Ok(()) => {
                self.notify(NotificationLevel::Success, "Termin erfolgreich erstellt!");
                self.refetch().await
            }
            Err(AppError::Api(message)) => {
                self.notify(NotificationLevel::Error, format!("Fehler: {message}"));
                Err(AppError::Api(message))
            }
            Err(e) => {
                self.notify(NotificationLevel::Error, "Verbindungsfehler");
                Err(e)
            }
        }
    }

    /// Drag/resize: apply the new time optimistically, then relay it. A
    /// rejected or failed update refetches so the view matches the
    /// server again.
    pub async fn move_appointment(
        &self,
        id: &str,
        date: NaiveDate,
        time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<(), AppError> {
        let status = {
            let mut cache = self.appointments.lock().await;
            let Some(appointment) = cache.iter_mut().find(|a| a.id == id) else {
                return Err(AppError::NotFound(format!("appointment {id}")));
            };
            appointment.date = date;
            appointment.time = time;
            appointment.end_time = end_time;
            appointment.status
        };

        let patch = AppointmentTimePatch {
            date,
            time,
            end_time,
            status,
        };
        match self.api.update_time(id, &patch).await {
            Ok(()) => {
                self.notify(NotificationLevel::Success, "Termin verschoben");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, id, "time update rejected, reverting");
                self.notify(NotificationLevel::Error, "Fehler beim Verschieben");
                // Discard the optimistic change.
                let _ = self.refetch().await;
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        match self.api.delete(id).await {
            Ok(()) => {
                self.notify(NotificationLevel::Success, "Termin gelöscht");
                self.refetch().await
            }
            Err(e) => {
                self.notify(NotificationLevel::Error, "Fehler beim Löschen");
                Err(e)
            }
        }
    }

    /// Server push: every event invalidates the cache.
    pub async fn handle_event(&self, event: RealtimeEvent) {
        match &event {
            RealtimeEvent::AppointmentCreated { patient_name } => {
                let name = patient_name.as_deref().unwrap_or("unbekannt");
                self.notify(NotificationLevel::Success, format!("Neuer Termin: {name}"));
            }
            RealtimeEvent::AppointmentUpdated => {
                self.notify(NotificationLevel::Info, "Termin aktualisiert");
            }
            RealtimeEvent::AppointmentDeleted => {
                self.notify(NotificationLevel::Warning, "Termin gelöscht");
            }
        }
        let _ = self.refetch().await;
    }

    fn notify(&self, level: NotificationLevel, text: impl Into<String>) {
        let _ = self.notifications.send(Notification::new(level, text));
    }
}
