use serde::{Deserialize, Serialize};

const DEFAULT_SEARCH_ENDPOINT: &str = "http://127.0.0.1:3000/api/search";

/// Search proxy connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            connect_timeout_secs: 5,
            read_timeout_secs: 15,
        }
    }
}

/// Logical viewport used to place newly spawned floating sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub viewport: ViewportConfig,
}

/// Clamps loaded values into usable ranges so a hand-edited config cannot
/// wedge the runtime.
pub fn sanitize_config(mut config: Config) -> Config {
    if config.search.endpoint.trim().is_empty() {
        config.search.endpoint = DEFAULT_SEARCH_ENDPOINT.to_string();
    }
    config.search.connect_timeout_secs = config.search.connect_timeout_secs.clamp(1, 60);
    config.search.read_timeout_secs = config.search.read_timeout_secs.clamp(1, 120);
    config.viewport.width = config.viewport.width.clamp(320.0, 7680.0);
    config.viewport.height = config.viewport.height.clamp(240.0, 4320.0);
    config
}
