/// Server-pushed calendar event. Each one invalidates the local cache;
/// the payload is only mined for notification text.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    AppointmentCreated { patient_name: Option<String> },
    AppointmentUpdated,
    AppointmentDeleted,
}

impl RealtimeEvent {
    /// Parse a `{"event": "...", "data": ...}` frame. Unknown events are
    /// dropped, not errors; the channel also carries frames this client
    /// doesn't care about.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        match value.get("event").and_then(|e| e.as_str())? {
            "appointmentCreated" => Some(RealtimeEvent::AppointmentCreated {
                patient_name: value
                    .pointer("/data/patient_name")
                    .and_then(|n| n.as_str())
                    .map(str::to_string),
            }),
            "appointmentUpdated" => Some(RealtimeEvent::AppointmentUpdated),
            "appointmentDeleted" => Some(RealtimeEvent::AppointmentDeleted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_created_with_patient() {
        let event = RealtimeEvent::parse(
            r#"{"event":"appointmentCreated","data":{"id":"a1","patient_name":"Maria Schmidt"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::AppointmentCreated {
                patient_name: Some("Maria Schmidt".to_string())
            }
        );
    }

    #[test]
    fn test_parse_updated_and_deleted() {
        assert_eq!(
            RealtimeEvent::parse(r#"{"event":"appointmentUpdated","data":{"id":"a1"}}"#),
            Some(RealtimeEvent::AppointmentUpdated)
        );
        assert_eq!(
            RealtimeEvent::parse(r#"{"event":"appointmentDeleted","data":{"id":"a1"}}"#),
            Some(RealtimeEvent::AppointmentDeleted)
        );
    }

    #[test]
    fn test_unknown_event_dropped() {
        assert_eq!(RealtimeEvent::parse(r#"{"event":"ping"}"#), None);
        assert_eq!(RealtimeEvent::parse("not json"), None);
    }
}
