//! Queued offline changes and the cross-tab message shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TeamRequest;

/// Kind of change a [`PendingMutation`] replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

/// A write that could not reach the backend and waits for replay.
///
/// For deletes the payload is a [`TeamRequest::reference`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    #[serde(default = "new_mutation_id")]
    pub id: String,
    pub action: MutationAction,
    pub payload: TeamRequest,
    pub timestamp: DateTime<Utc>,
    /// Failed replays so far.
    #[serde(default)]
    pub attempts: u32,
}

impl PendingMutation {
    pub fn new(action: MutationAction, payload: TeamRequest) -> Self {
        Self {
            id: new_mutation_id(),
            action,
            payload,
            timestamp: Utc::now(),
            attempts: 0,
        }
    }
}

fn new_mutation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Message carried on the cross-tab channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    #[serde(rename = "LISTINGS_UPDATED")]
    ListingsUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_message_shape() {
        assert_eq!(
            serde_json::to_value(ChannelMessage::ListingsUpdated).unwrap(),
            json!({ "type": "LISTINGS_UPDATED" })
        );
    }

    #[test]
    fn test_mutation_wire_shape() {
        let mutation = PendingMutation::new(
            MutationAction::Delete,
            TeamRequest::reference("r1", "fp-a"),
        );
        let value = serde_json::to_value(&mutation).unwrap();
        assert_eq!(value["action"], "delete");
        assert_eq!(value["payload"], json!({ "id": "r1", "ownerFingerprint": "fp-a" }));
        assert_eq!(value["attempts"], 0);
    }

    #[test]
    fn test_mutation_without_id_or_attempts_still_loads() {
        let mutation: PendingMutation = serde_json::from_value(json!({
            "action": "update",
            "payload": { "id": "r1", "ownerFingerprint": "fp-a", "name": "Ana" },
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(mutation.action, MutationAction::Update);
        assert!(!mutation.id.is_empty());
        assert_eq!(mutation.attempts, 0);
        assert_eq!(mutation.payload.name.as_deref(), Some("Ana"));
    }
}
