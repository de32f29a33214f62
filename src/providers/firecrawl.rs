//! Firecrawl API-key provider
//!
//! Firecrawl does not use OAuth; users paste an API key which can be
//! validated with a best-effort scrape call before storage.

use crate::providers::{ApiKeyField, ApiKeyProviderConfig};

pub const FIRECRAWL_API_BASE: &str = "https://api.firecrawl.dev/v1";

/// Field descriptors for the manual connect form
pub fn api_key_config() -> ApiKeyProviderConfig {
    ApiKeyProviderConfig {
        fields: vec![ApiKeyField {
            name: "apiKey",
            label: "API Key",
            field_type: "password",
            placeholder: "fc-xxxxxxxxxxxxxxxx",
            description: "Your Firecrawl API key from the dashboard",
        }],
    }
}

/// Best-effort key validation: a scrape request with the key either
/// succeeds or comes back 401/403. Network failures count as unverified
/// rather than invalid.
pub async fn validate_api_key(api_base: &str, api_key: &str) -> bool {
    let client = reqwest::Client::new();
    let result = client
        .post(format!("{}/scrape", api_base.trim_end_matches('/')))
        .bearer_auth(api_key)
        .json(&serde_json::json!({ "url": "https://example.com" }))
        .send()
        .await;

    match result {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_config_declares_password_field() {
        let config = api_key_config();
        assert_eq!(config.fields.len(), 1);
        assert_eq!(config.fields[0].name, "apiKey");
        assert_eq!(config.fields[0].field_type, "password");
    }
}
