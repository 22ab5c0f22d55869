//! Per-Match Live Stream Records
//!
//! Records carried on the per-match SSE stream. Unlike the general topic
//! transport, the stream is already scoped to one match, so the record
//! carries the match id and a coarse event kind instead of a topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a per-match stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchEventKind {
    /// Score changed.
    Score,
    /// In-match statistics updated.
    Stats,
    /// Odds moved.
    Odds,
    /// Match status transition.
    Status,
}

impl MatchEventKind {
    /// Get the wire name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Stats => "stats",
            Self::Odds => "odds",
            Self::Status => "status",
        }
    }
}

/// One record on a per-match live stream.
///
/// Wire format: `{"matchId": ..., "type": ..., "data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStreamEvent {
    /// Match this event belongs to.
    pub match_id: String,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: MatchEventKind,
    /// Producer-controlled payload.
    pub data: serde_json::Value,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl MatchStreamEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(match_id: impl Into<String>, kind: MatchEventKind, data: serde_json::Value) -> Self {
        Self {
            match_id: match_id.into(),
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case(MatchEventKind::Score, "score")]
    #[test_case(MatchEventKind::Stats, "stats")]
    #[test_case(MatchEventKind::Odds, "odds")]
    #[test_case(MatchEventKind::Status, "status")]
    fn kind_wire_names(kind: MatchEventKind, expected: &str) {
        assert_eq!(kind.as_str(), expected);
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            format!("\"{expected}\"")
        );
    }

    #[test]
    fn event_wire_format() {
        let event = MatchStreamEvent::new("42", MatchEventKind::Score, json!({"home": 2}));
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains(r#""matchId":"42""#));
        assert!(json.contains(r#""type":"score""#));
        assert!(json.contains(r#""timestamp":"#));

        let parsed: MatchStreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
