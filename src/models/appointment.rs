use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Backend-owned appointment record. The client only ever holds a
/// read-mostly cached copy; any write goes through the API and is
/// followed by a refetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub treatment_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Display label, matching the calendar UI's wording.
    pub fn human_label(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "Bestätigt",
            AppointmentStatus::Cancelled => "Abgesagt",
            AppointmentStatus::Completed => "Erledigt",
        }
    }
}

/// Body of `POST /api/appointments`.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDraft {
    pub patient_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `PUT /api/appointments/:id` after a drag or resize. Only the
/// time range moves; the status is echoed back unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentTimePatch {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
}

/// The wire format carries times as `HH:MM`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
