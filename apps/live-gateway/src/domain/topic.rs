//! Topic Vocabulary and Wire Frames
//!
//! Defines the event frame exchanged between gateway and clients and the
//! canonical topic names. A topic is an opaque string key; entity scoping
//! (e.g. "for match X") lives in the payload and is filtered by handlers.

use serde::{Deserialize, Serialize};

/// A topic string identifying an event category.
pub type Topic = String;

/// Canonical topic names.
///
/// These are part of the wire protocol and must not change: clients match
/// on them byte-for-byte.
pub mod topics {
    /// General match data changed.
    pub const MATCH_UPDATE: &str = "match:update";
    /// Match status transition (scheduled, live, finished, ...).
    pub const MATCH_STATUS: &str = "match:status";
    /// Score changed.
    pub const MATCH_SCORE: &str = "match:score";
    /// Timeline entry added (goal, card, substitution, ...).
    pub const MATCH_TIMELINE: &str = "match:timeline";
    /// Odds changed.
    pub const ODDS_UPDATE: &str = "odds:update";
    /// Market suspended.
    pub const ODDS_SUSPENDED: &str = "odds:suspended";
    /// Market restored after suspension.
    pub const ODDS_RESTORED: &str = "odds:restored";
    /// Bet settled.
    pub const BET_SETTLED: &str = "bet:settled";
    /// Bet voided.
    pub const BET_VOIDED: &str = "bet:voided";
    /// Maintenance announcement.
    pub const SYSTEM_MAINTENANCE: &str = "system:maintenance";
    /// Server-side error notice.
    pub const SYSTEM_ERROR: &str = "system:error";

    /// All canonical topics.
    pub const ALL: &[&str] = &[
        MATCH_UPDATE,
        MATCH_STATUS,
        MATCH_SCORE,
        MATCH_TIMELINE,
        ODDS_UPDATE,
        ODDS_SUSPENDED,
        ODDS_RESTORED,
        BET_SETTLED,
        BET_VOIDED,
        SYSTEM_MAINTENANCE,
        SYSTEM_ERROR,
    ];
}

// =============================================================================
// Event Frame
// =============================================================================

/// One server→client event: `{"type": <topic>, "payload": <JSON>}`.
///
/// The payload is opaque to the gateway; producers control its shape and
/// handlers interpret it. One frame per event, no batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Topic the event was published to.
    #[serde(rename = "type")]
    pub topic: Topic,
    /// Producer-controlled payload.
    pub payload: serde_json::Value,
}

impl EventFrame {
    /// Create a frame for a topic and payload.
    #[must_use]
    pub fn new(topic: impl Into<Topic>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Serialize the frame to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame from its wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Client Commands
// =============================================================================

/// One client→server control frame.
///
/// Subscribe and unsubscribe manage the session's topic set; publish lets a
/// client inject an event (used sparingly, e.g. test and demo flows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Add the session to a topic.
    Subscribe {
        /// Topic to subscribe to.
        topic: Topic,
    },
    /// Remove the session from a topic.
    Unsubscribe {
        /// Topic to unsubscribe from.
        topic: Topic,
    },
    /// Publish an event through the gateway.
    Publish {
        /// Topic to publish to.
        topic: Topic,
        /// Event payload.
        payload: serde_json::Value,
    },
}

impl ClientCommand {
    /// Serialize the command to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a command from its wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid command.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frame_wire_format() {
        let frame = EventFrame::new(
            topics::MATCH_SCORE,
            json!({"matchId": "7", "home": 1, "away": 0}),
        );

        let json = frame.to_json().unwrap();
        assert!(json.contains(r#""type":"match:score""#));
        assert!(json.contains(r#""matchId":"7""#));

        let parsed = EventFrame::from_json(&json).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn frame_rejects_garbage() {
        assert!(EventFrame::from_json("not json").is_err());
        assert!(EventFrame::from_json(r#"{"payload": 1}"#).is_err());
    }

    #[test]
    fn frame_payload_is_opaque() {
        let frame = EventFrame::from_json(r#"{"type":"odds:update","payload":[1,"two",null]}"#)
            .unwrap();
        assert_eq!(frame.topic, topics::ODDS_UPDATE);
        assert_eq!(frame.payload, json!([1, "two", null]));
    }

    #[test]
    fn subscribe_command_wire_format() {
        let cmd = ClientCommand::Subscribe {
            topic: topics::BET_SETTLED.to_string(),
        };
        let json = cmd.to_json().unwrap();
        assert_eq!(json, r#"{"action":"subscribe","topic":"bet:settled"}"#);
    }

    #[test]
    fn publish_command_round_trip() {
        let cmd = ClientCommand::Publish {
            topic: topics::ODDS_UPDATE.to_string(),
            payload: json!({"marketId": "m1", "odds": 2.4}),
        };
        let parsed = ClientCommand::from_json(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(ClientCommand::from_json(r#"{"action":"ping"}"#).is_err());
    }

    #[test]
    fn vocabulary_is_complete() {
        assert_eq!(topics::ALL.len(), 11);
        assert!(topics::ALL.contains(&"match:score"));
        assert!(topics::ALL.contains(&"system:error"));
    }
}
