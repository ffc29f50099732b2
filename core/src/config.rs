//! Per-call defaults.

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 Slardar HTTP Requester";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
const FALLBACK_LANGUAGE: &str = "en-US";

/// Values applied when the caller leaves them unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: system_language_tag(),
        }
    }
}

/// The process locale as a BCP 47 tag, read from `LC_ALL`, `LC_MESSAGES`
/// and `LANG` in that order.
pub fn system_language_tag() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| locale_to_tag(&value))
        .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string())
}

/// `zh_CN.UTF-8` → `zh-CN`. `C` and `POSIX` carry no language.
pub fn locale_to_tag(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_strings_become_language_tags() {
        assert_eq!(locale_to_tag("zh_CN.UTF-8").as_deref(), Some("zh-CN"));
        assert_eq!(locale_to_tag("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(locale_to_tag("fr").as_deref(), Some("fr"));
        assert_eq!(locale_to_tag("C"), None);
        assert_eq!(locale_to_tag("POSIX"), None);
        assert_eq!(locale_to_tag(""), None);
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "Mozilla/5.0 Slardar HTTP Requester");
        assert!(!config.accept_language.is_empty());
    }
}
