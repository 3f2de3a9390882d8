use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const CONFIG_FILE_NAME: &str = "desk_config.json";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_API_PREFIX: &str = "/api/admin";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) api_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) session_cookie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) disable_network: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) initial_page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) older_page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tab_page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) resolved_page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) chat_poll_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) lists_poll_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) background_poll_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) request_timeout_ms: Option<u64>,
}

/// Page sizes handed to the timeline engine and the list store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageSizes {
    pub(crate) initial: u32,
    pub(crate) older: u32,
    pub(crate) tab: u32,
    pub(crate) resolved: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            initial: 50,
            older: 25,
            tab: 50,
            resolved: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollIntervals {
    pub(crate) chat: Duration,
    pub(crate) lists: Duration,
    pub(crate) background: Duration,
}

impl AppConfig {
    pub(crate) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("DESK_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(crate) fn base_url(&self) -> String {
        if let Ok(url) = std::env::var("DESK_BASE_URL") {
            let url = url.trim();
            if !url.is_empty() {
                return url.to_string();
            }
        }
        non_empty(self.base_url.as_deref()).unwrap_or(DEFAULT_BASE_URL).to_string()
    }

    pub(crate) fn api_prefix(&self) -> String {
        non_empty(self.api_prefix.as_deref())
            .unwrap_or(DEFAULT_API_PREFIX)
            .to_string()
    }

    pub(crate) fn session_cookie(&self) -> Option<String> {
        non_empty(self.session_cookie.as_deref()).map(str::to_owned)
    }

    pub(crate) fn page_sizes(&self) -> PageSizes {
        let d = PageSizes::default();
        PageSizes {
            initial: positive(self.initial_page_size).unwrap_or(d.initial),
            older: positive(self.older_page_size).unwrap_or(d.older),
            tab: positive(self.tab_page_size).unwrap_or(d.tab),
            resolved: positive(self.resolved_page_size).unwrap_or(d.resolved),
        }
    }

    pub(crate) fn poll_intervals(&self) -> PollIntervals {
        let ms = |v: Option<u64>, default: u64| {
            Duration::from_millis(v.filter(|ms| *ms > 0).unwrap_or(default))
        };
        PollIntervals {
            chat: ms(self.chat_poll_ms, 10_000),
            lists: ms(self.lists_poll_ms, 10_000),
            background: ms(self.background_poll_ms, 60_000),
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.filter(|ms| *ms > 0).unwrap_or(15_000))
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn positive(v: Option<u32>) -> Option<u32> {
    v.filter(|n| *n > 0)
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let sizes = PageSizes::default();
    let cfg = AppConfig {
        base_url: Some(DEFAULT_BASE_URL.to_string()),
        api_prefix: Some(DEFAULT_API_PREFIX.to_string()),
        session_cookie: None,
        disable_network: Some(false),
        initial_page_size: Some(sizes.initial),
        older_page_size: Some(sizes.older),
        tab_page_size: Some(sizes.tab),
        resolved_page_size: Some(sizes.resolved),
        chat_poll_ms: Some(10_000),
        lists_poll_ms: Some(10_000),
        background_poll_ms: Some(60_000),
        request_timeout_ms: Some(15_000),
    };
    serde_json::to_string_pretty(&cfg).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(cfg.page_sizes(), PageSizes::default());
        assert_eq!(cfg.api_prefix(), "/api/admin");
        assert_eq!(cfg.poll_intervals().background, Duration::from_secs(60));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"older_page_size": 10, "chat_poll_ms": 250, "session_cookie": "  ", "unknown": 1}"#,
        )
        .unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        let sizes = cfg.page_sizes();
        assert_eq!(sizes.older, 10);
        assert_eq!(sizes.initial, 50);
        assert_eq!(cfg.poll_intervals().chat, Duration::from_millis(250));
        assert_eq!(cfg.session_cookie(), None);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(cfg.page_sizes(), PageSizes::default());
    }

    #[test]
    fn default_json_round_trips_through_loader() {
        let cfg: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(cfg.page_sizes(), PageSizes::default());
        assert_eq!(cfg.disable_network, Some(false));
        assert!(cfg.session_cookie.is_none());
        assert!(cfg.network_enabled());
    }

    #[test]
    fn disable_network_flag_wins_over_env() {
        let cfg = AppConfig {
            disable_network: Some(true),
            ..Default::default()
        };
        assert!(!cfg.network_enabled());
    }
}
