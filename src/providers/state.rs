//! OAuth state envelope
//!
//! The `state` parameter is an opaque base64url JSON envelope carrying the
//! user (and optionally the workflow) that initiated the flow. It is NOT a
//! secret and is never trusted for authorization: the callback handler
//! re-derives the authenticated user from its own session and uses the
//! decoded envelope only to route the resulting credential.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Routing payload embedded in the OAuth `state` parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEnvelope {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum StateDecodeError {
    #[error("state parameter is not valid base64url")]
    InvalidEncoding,
    #[error("state parameter is not a valid envelope: {0}")]
    InvalidEnvelope(String),
}

impl StateEnvelope {
    pub fn new(user_id: Uuid, workflow_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            workflow_id,
        }
    }

    /// Encode as base64url(JSON)
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("state envelope serializes");
        base64_url::encode(&json)
    }

    /// Decode from base64url(JSON)
    pub fn decode(state: &str) -> Result<Self, StateDecodeError> {
        let bytes = base64_url::decode(state).map_err(|_| StateDecodeError::InvalidEncoding)?;
        serde_json::from_slice(&bytes).map_err(|e| StateDecodeError::InvalidEnvelope(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_workflow() {
        let envelope = StateEnvelope::new(Uuid::new_v4(), Some(Uuid::new_v4()));
        let encoded = envelope.encode();
        let decoded = StateEnvelope::decode(&encoded).expect("decodes");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_round_trip_without_workflow() {
        let envelope = StateEnvelope::new(Uuid::new_v4(), None);
        let decoded = StateEnvelope::decode(&envelope.encode()).expect("decodes");
        assert_eq!(decoded, envelope);
        assert!(decoded.workflow_id.is_none());
    }

    #[test]
    fn test_tampered_state_rejected() {
        let result = StateEnvelope::decode("not!valid@base64url");
        assert!(result.is_err());
    }

    #[test]
    fn test_non_envelope_json_rejected() {
        let encoded = base64_url::encode(b"{\"foo\": 1}");
        let result = StateEnvelope::decode(&encoded);
        assert!(matches!(result, Err(StateDecodeError::InvalidEnvelope(_))));
    }
}
