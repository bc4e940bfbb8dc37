//! Search proxy backend adapter implementation.

use std::time::Duration;

use serde_json::Value;

use crate::backends::{SearchBackend, SearchError};
use crate::collections::Track;
use crate::config::SearchConfig;

const GENERIC_FAILURE_MESSAGE: &str = "Search is unavailable right now. Try again.";

/// Adapter for the external search proxy, backed by `ureq`.
///
/// The proxy forwards queries to the upstream video catalog and answers
/// with `{"items": [{id, title, thumbnailUrl}]}` on success or
/// `{"error": message}` on failure.
pub struct SearchProxyAdapter {
    endpoint: String,
    http_client: ureq::Agent,
}

impl SearchProxyAdapter {
    pub fn new(config: &SearchConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .timeout_write(Duration::from_secs(config.read_timeout_secs))
            .build();
        Self {
            endpoint: config.endpoint.trim().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn query_url(&self, query: &str) -> String {
        format!("{}?q={}", self.endpoint, urlencoding::encode(query))
    }

    fn parse_track(item: &Value) -> Option<Track> {
        let item_id = item.get("id")?.as_str()?.to_string();
        let title = item
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Title")
            .to_string();
        let thumbnail_url = item
            .get("thumbnailUrl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Track {
            id: item_id.clone(),
            media_id: item_id,
            title,
            thumbnail_url,
        })
    }

    fn error_message(response: ureq::Response) -> String {
        response
            .into_json::<Value>()
            .ok()
            .as_ref()
            .and_then(|payload| payload.get("error"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

impl SearchBackend for SearchProxyAdapter {
    fn search(&self, query: &str) -> Result<Vec<Track>, SearchError> {
        let url = self.query_url(query);
        let response = match self.http_client.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => {
                return Err(SearchError::Upstream(Self::error_message(response)));
            }
            Err(err) => {
                return Err(SearchError::Upstream(format!(
                    "Search request failed: {}",
                    err
                )));
            }
        };

        let payload: Value = response
            .into_json()
            .map_err(|err| SearchError::Upstream(format!("Search response parse failed: {}", err)))?;

        let items = match payload.get("items") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        };
        Ok(items.iter().filter_map(Self::parse_track).collect())
    }
}
