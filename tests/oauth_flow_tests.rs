//! Provider auth handler tests against a mock token endpoint: code
//! exchange, single-use code semantics, refresh, and per-provider quirks.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duramation::providers::trait_::{AuthError, AuthHandler};
use duramation::providers::{
    google::GoogleAuthHandler, microsoft::MicrosoftAuthHandler, slack::SlackAuthHandler,
};
use duramation::secrets::CredentialSecret;

fn google(mock: &MockServer) -> GoogleAuthHandler {
    GoogleAuthHandler::with_endpoints(
        "client-id".to_string(),
        "client-secret".to_string(),
        "https://app.example.com/callback".to_string(),
        format!("{}/auth", mock.uri()),
        format!("{}/token", mock.uri()),
    )
}

fn microsoft(mock: &MockServer) -> MicrosoftAuthHandler {
    MicrosoftAuthHandler::with_endpoints(
        "client-id".to_string(),
        "client-secret".to_string(),
        "https://app.example.com/callback".to_string(),
        format!("{}/auth", mock.uri()),
        format!("{}/token", mock.uri()),
    )
}

fn slack(mock: &MockServer) -> SlackAuthHandler {
    SlackAuthHandler::with_endpoints(
        "client-id".to_string(),
        "client-secret".to_string(),
        "https://app.example.com/callback".to_string(),
        format!("{}/auth", mock.uri()),
        format!("{}/token", mock.uri()),
    )
}

#[tokio::test]
async fn google_code_exchange_yields_full_secret() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.granted",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.readonly openid",
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let secret = google(&mock)
        .handle_callback("auth-code-1")
        .await
        .expect("exchange succeeds");

    let CredentialSecret::GoogleOAuth(secret) = secret else {
        panic!("expected a google secret");
    };
    assert_eq!(secret.access_token, "ya29.granted");
    assert_eq!(secret.refresh_token, "1//refresh");
    assert_eq!(secret.scopes.len(), 2);
    assert!(secret.expires_at > chrono::Utc::now());
}

#[tokio::test]
async fn google_reused_code_surfaces_invalid_grant() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Code was already redeemed.",
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let result = google(&mock).handle_callback("already-used-code").await;
    assert!(matches!(result, Err(AuthError::InvalidCode(_))));
}

#[tokio::test]
async fn google_incomplete_token_data_is_malformed() {
    let mock = MockServer::start().await;
    // No refresh_token in the response
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.granted",
            "expires_in": 3599,
        })))
        .mount(&mock)
        .await;

    let result = google(&mock).handle_callback("code").await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn google_refresh_returns_new_token() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let refreshed = google(&mock)
        .refresh_token("1//refresh")
        .await
        .expect("refresh succeeds");
    assert_eq!(refreshed.access_token, "ya29.fresh");
    assert!(refreshed.expires_at > chrono::Utc::now());
}

#[tokio::test]
async fn google_server_error_maps_to_provider_unavailable() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock)
        .await;

    let result = google(&mock).refresh_token("1//refresh").await;
    assert!(matches!(result, Err(AuthError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn microsoft_exchange_tolerates_missing_refresh_token() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "eyJ.granted",
            "expires_in": 3600,
            "scope": "https://graph.microsoft.com/User.Read",
        })))
        .mount(&mock)
        .await;

    let secret = microsoft(&mock)
        .handle_callback("code")
        .await
        .expect("re-authorization without refresh token is accepted");

    let CredentialSecret::MicrosoftOAuth(secret) = secret else {
        panic!("expected a microsoft secret");
    };
    assert_eq!(secret.access_token, "eyJ.granted");
    assert!(secret.refresh_token.is_none());
}

#[tokio::test]
async fn microsoft_refresh_round_trip() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "eyJ.fresh",
            "expires_in": 1800,
        })))
        .mount(&mock)
        .await;

    let refreshed = microsoft(&mock)
        .refresh_token("ms-refresh")
        .await
        .expect("refresh succeeds");
    assert_eq!(refreshed.access_token, "eyJ.fresh");
}

#[tokio::test]
async fn slack_exchange_captures_workspace_identity() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "access_token": "xoxb-granted",
            "scope": "chat:write,team:read",
            "token_type": "bot",
            "bot_user_id": "U0BOT",
            "team": { "id": "T0123", "name": "Acme" },
        })))
        .mount(&mock)
        .await;

    let secret = slack(&mock)
        .handle_callback("code")
        .await
        .expect("exchange succeeds");

    let CredentialSecret::SlackOAuth(secret) = secret else {
        panic!("expected a slack secret");
    };
    assert_eq!(secret.access_token, "xoxb-granted");
    assert_eq!(secret.team_id, "T0123");
    assert_eq!(secret.team_name.as_deref(), Some("Acme"));
    assert_eq!(secret.scopes, vec!["chat:write", "team:read"]);
}

#[tokio::test]
async fn slack_error_envelope_maps_to_invalid_code() {
    let mock = MockServer::start().await;
    // Slack reports failures with HTTP 200 + ok:false
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "invalid_code",
        })))
        .mount(&mock)
        .await;

    let result = slack(&mock).handle_callback("bad-code").await;
    let Err(AuthError::InvalidCode(error)) = result else {
        panic!("expected invalid code error");
    };
    assert_eq!(error, "invalid_code");
}
