//! Best-effort display-title resolution for media identifiers.

use std::time::Duration;

use log::warn;
use serde_json::Value;

use crate::config::TitleLookupConfig;

/// Display label used until (or instead of) a resolved title.
pub fn placeholder_title(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("(No Title) {prefix}...")
}

/// Resolves a human-readable label for a media identifier.
///
/// Implementations block the calling thread; the controller only calls them
/// from worker threads. Any failure yields `None`.
pub trait TitleLookup: Send + Sync {
    fn resolve_title(&self, id: &str) -> Option<String>;

    /// When false, callers skip issuing lookups entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Lookup used when no API key is configured.
pub struct DisabledTitleLookup;

impl TitleLookup for DisabledTitleLookup {
    fn resolve_title(&self, _id: &str) -> Option<String> {
        None
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Video title lookup against the YouTube Data API, backed by `ureq`.
pub struct YouTubeTitleLookup {
    http_client: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl YouTubeTitleLookup {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            http_client,
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        }
    }

    fn request_url(&self, id: &str) -> String {
        format!(
            "{}?part=snippet&id={}&key={}",
            self.endpoint,
            urlencoding::encode(id),
            urlencoding::encode(&self.api_key)
        )
    }

    fn request_json(&self, id: &str) -> Result<Value, String> {
        let response = self
            .http_client
            .get(&self.request_url(id))
            .call()
            .map_err(|err| format!("title request failed: {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("title response parse failed: {err}"))
    }

    fn parse_title(payload: &Value) -> Option<String> {
        let title = payload
            .get("items")?
            .as_array()?
            .first()?
            .get("snippet")?
            .get("title")?
            .as_str()?
            .trim();
        if title.is_empty() {
            return None;
        }
        Some(title.to_string())
    }
}

impl TitleLookup for YouTubeTitleLookup {
    fn resolve_title(&self, id: &str) -> Option<String> {
        match self.request_json(id) {
            Ok(payload) => {
                let title = Self::parse_title(&payload);
                if title.is_none() {
                    warn!("TitleLookup: could not retrieve title for video id {}", id);
                }
                title
            }
            Err(err) => {
                warn!("TitleLookup: {} (id={})", err, id);
                None
            }
        }
    }
}

/// Builds the lookup described by `config`, falling back to the disabled one.
pub fn title_lookup_from_config(config: &TitleLookupConfig) -> Box<dyn TitleLookup> {
    let api_key = config.effective_api_key();
    if !config.enabled || api_key.is_empty() {
        return Box::new(DisabledTitleLookup);
    }
    Box::new(YouTubeTitleLookup::new(
        &config.endpoint,
        &api_key,
        Duration::from_secs(config.timeout_secs),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_title_uses_id_prefix() {
        assert_eq!(placeholder_title("dQw4w9WgXcQ"), "(No Title) dQw4w9Wg...");
        assert_eq!(placeholder_title("abc"), "(No Title) abc...");
    }

    #[test]
    fn test_parse_title_reads_first_item_snippet() {
        let payload = serde_json::json!({
            "items": [
                {"snippet": {"title": "  Lofi Beats  "}},
                {"snippet": {"title": "Other"}}
            ]
        });
        assert_eq!(
            YouTubeTitleLookup::parse_title(&payload).as_deref(),
            Some("Lofi Beats")
        );
    }

    #[test]
    fn test_parse_title_handles_missing_items() {
        assert_eq!(
            YouTubeTitleLookup::parse_title(&serde_json::json!({"items": []})),
            None
        );
        assert_eq!(
            YouTubeTitleLookup::parse_title(&serde_json::json!({"error": {"code": 403}})),
            None
        );
    }

    #[test]
    fn test_request_url_encodes_key() {
        let lookup = YouTubeTitleLookup::new(
            "https://www.googleapis.com/youtube/v3/videos/",
            "key with space",
            Duration::from_secs(1),
        );
        assert_eq!(
            lookup.request_url("dQw4w9WgXcQ"),
            "https://www.googleapis.com/youtube/v3/videos?part=snippet&id=dQw4w9WgXcQ&key=key%20with%20space"
        );
    }

    #[test]
    fn test_disabled_lookup_never_resolves() {
        assert_eq!(DisabledTitleLookup.resolve_title("dQw4w9WgXcQ"), None);
        assert!(!DisabledTitleLookup.is_enabled());
    }

    #[test]
    fn test_disabled_config_builds_disabled_lookup() {
        let config = TitleLookupConfig {
            enabled: false,
            ..TitleLookupConfig::default()
        };
        assert!(!title_lookup_from_config(&config).is_enabled());
    }
}
