pub mod appointments;
pub mod calendar;
pub mod realtime;
pub mod session;
pub mod voice;
