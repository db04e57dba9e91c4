use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const CONFIG_FILE_NAME: &str = "chatsync_config.json";

const DEFAULT_PAGE_SIZE: u32 = 20;
const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;
const DEFAULT_INBOUND_TYPING_MS: u64 = 8_000;
const DEFAULT_PUSH_DEDUP_WINDOW_MS: u64 = 5_000;
const DEFAULT_DELETED_TEXT: &str = "This message was deleted";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) page_size: Option<u32>,
    pub(crate) typing_idle_timeout_ms: Option<u64>,
    // 0 disables the expiry.
    pub(crate) inbound_typing_timeout_ms: Option<u64>,
    pub(crate) push_dedup_window_ms: Option<u64>,
    pub(crate) deleted_message_text: Option<String>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        api_base_url: None,
        page_size: Some(DEFAULT_PAGE_SIZE),
        typing_idle_timeout_ms: Some(DEFAULT_TYPING_IDLE_MS),
        inbound_typing_timeout_ms: Some(DEFAULT_INBOUND_TYPING_MS),
        push_dedup_window_ms: Some(DEFAULT_PUSH_DEDUP_WINDOW_MS),
        deleted_message_text: Some(DEFAULT_DELETED_TEXT.to_string()),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub(crate) fn page_size(&self) -> u32 {
        self.page_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn typing_idle_timeout(&self) -> Duration {
        Duration::from_millis(
            self.typing_idle_timeout_ms
                .unwrap_or(DEFAULT_TYPING_IDLE_MS),
        )
    }

    pub(crate) fn inbound_typing_timeout(&self) -> Option<Duration> {
        match self
            .inbound_typing_timeout_ms
            .unwrap_or(DEFAULT_INBOUND_TYPING_MS)
        {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub(crate) fn push_dedup_window_ms(&self) -> i64 {
        self.push_dedup_window_ms
            .unwrap_or(DEFAULT_PUSH_DEDUP_WINDOW_MS)
            .min(i64::MAX as u64) as i64
    }

    pub(crate) fn deleted_message_text(&self) -> &str {
        self.deleted_message_text
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DELETED_TEXT)
    }
}
