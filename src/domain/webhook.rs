use serde::{Deserialize, Serialize};

/// A notification pushed by the payment processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: IntentObject,
}

/// The payment intent embedded in a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentObject {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The hold is in place and awaits capture.
    RequiresCapture,
    Succeeded,
    Canceled,
    Unrecognized,
}

impl NotificationKind {
    pub const REQUIRES_CAPTURE: &'static str = "payment_intent.requires_capture";
    pub const SUCCEEDED: &'static str = "payment_intent.succeeded";
    pub const CANCELED: &'static str = "payment_intent.canceled";

    pub fn as_event_type(&self) -> Option<&'static str> {
        match self {
            Self::RequiresCapture => Some(Self::REQUIRES_CAPTURE),
            Self::Succeeded => Some(Self::SUCCEEDED),
            Self::Canceled => Some(Self::CANCELED),
            Self::Unrecognized => None,
        }
    }
}

impl ProcessorEvent {
    pub fn new(id: impl Into<String>, kind: NotificationKind, intent: IntentObject) -> Self {
        Self {
            id: id.into(),
            event_type: kind.as_event_type().unwrap_or_default().to_string(),
            created: chrono::Utc::now().timestamp(),
            data: EventData { object: intent },
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self.event_type.as_str() {
            NotificationKind::REQUIRES_CAPTURE => NotificationKind::RequiresCapture,
            NotificationKind::SUCCEEDED => NotificationKind::Succeeded,
            NotificationKind::CANCELED => NotificationKind::Canceled,
            _ => NotificationKind::Unrecognized,
        }
    }

    pub fn intent(&self) -> &IntentObject {
        &self.data.object
    }
}
