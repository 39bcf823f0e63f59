pub mod appointment;
pub mod chat;
pub mod realtime;
pub mod session;

pub use appointment::{Appointment, AppointmentDraft, AppointmentStatus, AppointmentTimePatch};
pub use chat::{ChatMessage, ChatRole, Notification, NotificationLevel};
pub use realtime::RealtimeEvent;
pub use session::{DataMessage, SessionCredential, TranscriptRole, VoicePhase};
