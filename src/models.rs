use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

use crate::error::ApiError;

/// Interaction kinds emitted by the browser tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    Click,
    FormSubmit,
    InputChange,
    InputFocus,
    Scroll,
    ButtonClick,
    ImageView,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::PageView,
        EventType::Click,
        EventType::FormSubmit,
        EventType::InputChange,
        EventType::InputFocus,
        EventType::Scroll,
        EventType::ButtonClick,
        EventType::ImageView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::Click => "click",
            EventType::FormSubmit => "form_submit",
            EventType::InputChange => "input_change",
            EventType::InputFocus => "input_focus",
            EventType::Scroll => "scroll",
            EventType::ButtonClick => "button_click",
            EventType::ImageView => "image_view",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Click coordinates are mandatory for the click family.
    pub fn requires_coordinates(&self) -> bool {
        matches!(self, EventType::Click | EventType::ButtonClick)
    }
}

/// A stored interaction event. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: String,
    pub event_type: EventType,
    pub page_url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_y: Option<f64>,
    pub metadata: Map<String, serde_json::Value>,
}

/// Raw ingestion payload. Fields are optional so that validation can
/// answer with a 400 naming what is wrong, rather than a bare
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub page_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub click_x: Option<f64>,
    pub click_y: Option<f64>,
    pub metadata: Option<Map<String, serde_json::Value>>,
}

impl NewEvent {
    /// Validate the payload and mint a stored event.
    /// `received_at` fills in a missing timestamp.
    pub fn into_event(self, received_at: DateTime<Utc>) -> Result<Event, ApiError> {
        let missing = self.session_id.as_deref().map_or(true, str::is_empty)
            || self.event_type.as_deref().map_or(true, str::is_empty)
            || self.page_url.as_deref().map_or(true, str::is_empty);
        if missing {
            return Err(ApiError::Validation(
                "Missing required fields: session_id, event_type, page_url".to_string(),
            ));
        }

        let raw_type = self.event_type.unwrap_or_default();
        let event_type = EventType::parse(&raw_type).ok_or_else(|| {
            let accepted: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
            ApiError::Validation(format!(
                "Invalid event_type. Must be one of: {}",
                accepted.join(", ")
            ))
        })?;

        if event_type.requires_coordinates() && (self.click_x.is_none() || self.click_y.is_none()) {
            return Err(ApiError::Validation(
                "click_x and click_y are required for click and button_click events".to_string(),
            ));
        }

        Ok(Event {
            id: Uuid::new_v4(),
            session_id: self.session_id.unwrap_or_default(),
            event_type,
            page_url: self.page_url.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or(received_at),
            click_x: self.click_x,
            click_y: self.click_y,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

/// Session projection (derived from events, never stored).
#[derive(Debug, Serialize, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(rename = "totalEvents")]
    pub total_events: i64,
    #[serde(rename = "firstSeen")]
    pub first_seen: DateTime<Utc>,
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
    #[serde(rename = "uniquePages")]
    pub unique_pages: i64,
}

/// One click sample for the heatmap view.
#[derive(Debug, Serialize, Clone)]
pub struct HeatmapClick {
    pub click_x: f64,
    pub click_y: f64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}
