use crate::errors::AppError;
use crate::models::{Appointment, AppointmentDraft, AppointmentTimePatch};

/// Thin client for the appointment REST API. The backend owns the data;
/// every mutation here is followed by a refetch in the view layer.
pub struct AppointmentsApi {
    base_url: String,
    client: reqwest::Client,
}

impl AppointmentsApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn list(&self) -> Result<Vec<Appointment>, AppError> {
        let appointments = self
            .client
            .get(format!("{}/api/appointments", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(appointments)
    }

    /// `POST /api/appointments`. The backend answers with either the new
    /// record or `{"error": "..."}`; callers refetch rather than trusting
    /// the reply body.
    pub async fn create(&self, draft: &AppointmentDraft) -> Result<(), AppError> {
        let reply: serde_json::Value = self
            .client
            .post(format!("{}/api/appointments", self.base_url))
            .json(draft)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match reply.get("error").and_then(|e| e.as_str()) {
            Some(message) => Err(AppError::Api(message.to_string())),
            None => Ok(()),
        }
    }

    /// `PUT /api/appointments/:id` after a drag or resize.
    pub async fn update_time(
        &self,
        id: &str,
        patch: &AppointmentTimePatch,
    ) -> Result<(), AppError> {
        let reply: serde_json::Value = self
            .client
            .put(format!("{}/api/appointments/{id}", self.base_url))
            .json(patch)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.get("success").and_then(|s| s.as_bool()) == Some(true) {
            Ok(())
        } else {
            Err(AppError::Api(format!("update of appointment {id} rejected")))
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let reply: serde_json::Value = self
            .client
            .delete(format!("{}/api/appointments/{id}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.get("success").and_then(|s| s.as_bool()) == Some(true) {
            Ok(())
        } else {
            Err(AppError::Api(format!("delete of appointment {id} rejected")))
        }
    }

    pub async fn health(&self) -> Result<serde_json::Value, AppError> {
        let reply = self
            .client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply)
    }
}
