// MIT License - Copyright (c) 2026 Peter Wright
// Panel notifications

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// Timestamp format used in notification and event log JSON.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Category of a panel notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Led,
    Alarm,
    Trouble,
    Arm,
    Zone,
    Misc,
}

/// One state change published by the panel state machine.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<Notification>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(serialize_with = "serialize_timestamp")]
    pub ts: DateTime<Local>,
    pub msg: String,
}

impl Notification {
    pub fn new(kind: NotificationType, msg: impl Into<String>) -> Self {
        Self {
            kind,
            ts: Local::now(),
            msg: msg.into(),
        }
    }

    /// `{"type":..,"ts":..,"msg":..}` as a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"msg\":{:?}}}", self.msg))
    }
}

pub(crate) fn serialize_timestamp<S: Serializer>(
    ts: &DateTime<Local>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Type alias for the broadcast sender.
pub type NotificationSender = tokio::sync::broadcast::Sender<Notification>;

/// Type alias for the broadcast receiver.
pub type NotificationReceiver = tokio::sync::broadcast::Receiver<Notification>;

/// Create a new notification channel with the given capacity.
pub fn notification_channel(capacity: usize) -> (NotificationSender, NotificationReceiver) {
    tokio::sync::broadcast::channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_notification_json() {
        let ts = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let notification = Notification {
            kind: NotificationType::Arm,
            ts,
            msg: "Partition 1 armed".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&notification.to_json()).unwrap();
        assert_eq!(value["type"], "ARM");
        assert_eq!(value["ts"], "2024-01-02 03:04:05");
        assert_eq!(value["msg"], "Partition 1 armed");
    }

    #[test]
    fn test_type_names() {
        for (kind, name) in [
            (NotificationType::Led, "\"LED\""),
            (NotificationType::Trouble, "\"TROUBLE\""),
            (NotificationType::Misc, "\"MISC\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), name);
        }
    }
}
