//! Subscription tokens
//!
//! Short-lived HS256 tokens a client presents to the realtime transport to
//! receive events on exactly one channel. A token is issued only when the
//! requesting user matches the user embedded in the channel name, and
//! verification re-checks both the channel and the granted topic set.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::AuthError;
use crate::realtime::channel::{Channel, Topic};

/// Claims carried by a subscription token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionClaims {
    /// Requesting user id
    pub sub: String,
    /// Channel name the token is scoped to
    pub channel: String,
    /// Topics the token grants
    pub topics: Vec<Topic>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies scope-bound subscription tokens
pub struct SubscriptionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SubscriptionTokenIssuer {
    pub fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Issue a token for the given channel and topics. Fails unless the
    /// requesting user owns the channel.
    pub fn issue(
        &self,
        channel: &Channel,
        topics: &[Topic],
        requester_user_id: Uuid,
    ) -> Result<String, AuthError> {
        if requester_user_id != channel.user_id {
            return Err(AuthError::Unauthorized(
                "requester does not own this channel".to_string(),
            ));
        }

        let now = Utc::now();
        let claims = SubscriptionClaims {
            sub: requester_user_id.to_string(),
            channel: channel.name(),
            topics: topics.to_vec(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Unauthorized(format!("token encoding failed: {}", e)))
    }

    /// Verify a token against the channel and topic a consumer is trying to
    /// attach to. Signature, expiry, channel, and topic scope must all hold.
    pub fn verify(
        &self,
        token: &str,
        channel: &Channel,
        topic: Topic,
    ) -> Result<SubscriptionClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<SubscriptionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::Unauthorized("invalid or expired token".to_string()))?;

        let claims = data.claims;
        if claims.channel != channel.name() {
            return Err(AuthError::Unauthorized(
                "token is not scoped to this channel".to_string(),
            ));
        }
        if !claims.topics.contains(&topic) {
            return Err(AuthError::Unauthorized(
                "token does not grant this topic".to_string(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> SubscriptionTokenIssuer {
        SubscriptionTokenIssuer::new(b"test-signing-secret", 60)
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let channel = Channel::new(user_id, Uuid::new_v4());

        let token = issuer
            .issue(&channel, &[Topic::Updates, Topic::AiStream], user_id)
            .expect("token issued");

        let claims = issuer
            .verify(&token, &channel, Topic::Updates)
            .expect("token verifies");
        assert_eq!(claims.channel, channel.name());
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn test_issue_refused_for_foreign_channel() {
        let issuer = issuer();
        let channel = Channel::new(Uuid::new_v4(), Uuid::new_v4());
        let result = issuer.issue(&channel, &[Topic::Updates], Uuid::new_v4());
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_token_rejected_on_other_users_channel() {
        let issuer = issuer();
        let user_a = Uuid::new_v4();
        let workflow_id = Uuid::new_v4();
        let channel_a = Channel::new(user_a, workflow_id);
        let channel_b = Channel::new(Uuid::new_v4(), workflow_id);

        let token = issuer
            .issue(&channel_a, &[Topic::Updates], user_a)
            .expect("token issued");

        let result = issuer.verify(&token, &channel_b, Topic::Updates);
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_token_scoped_to_granted_topics() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let channel = Channel::new(user_id, Uuid::new_v4());

        let token = issuer
            .issue(&channel, &[Topic::Updates], user_id)
            .expect("token issued");

        assert!(issuer.verify(&token, &channel, Topic::Updates).is_ok());
        assert!(issuer.verify(&token, &channel, Topic::AiStream).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = SubscriptionTokenIssuer::new(b"test-signing-secret", -120);
        let user_id = Uuid::new_v4();
        let channel = Channel::new(user_id, Uuid::new_v4());

        let token = issuer
            .issue(&channel, &[Topic::Updates], user_id)
            .expect("token issued");

        let result = issuer.verify(&token, &channel, Topic::Updates);
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let channel = Channel::new(user_id, Uuid::new_v4());

        let mut token = issuer
            .issue(&channel, &[Topic::Updates], user_id)
            .expect("token issued");
        token.push('x');

        let result = issuer.verify(&token, &channel, Topic::Updates);
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }
}
