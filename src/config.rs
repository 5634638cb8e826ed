//! Service configuration.
//!
//! Everything is environment-driven with fixed defaults; the portal
//! service account is a static credential pair, so the defaults are the
//! real values and the env vars exist for ops overrides only.

use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port for the lookup facade.
const DEFAULT_PORT: u16 = 3000;

/// Portal login page.
const DEFAULT_LOGIN_URL: &str = "https://www.denticon.com/login";

/// Fixed service-account credentials for the portal.
const DEFAULT_USERNAME: &str = "RecepiaAgent";
const DEFAULT_PASSWORD: &str = "Dpnr2025$";

/// Ceiling on simultaneous browser sessions. Each in-flight lookup owns
/// a whole Chromium process, so this stays small.
const DEFAULT_MAX_BROWSER_SESSIONS: usize = 2;

/// Internal configuration, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub login_url: String,
    pub username: String,
    pub password: String,
    /// Explicit Chrome/Chromium binary. When unset, common install paths
    /// are probed at launch time.
    pub chrome_path: Option<PathBuf>,
    pub max_browser_sessions: usize,
    /// Where diagnostic screenshots land on workflow errors.
    pub screenshot_dir: PathBuf,
    /// Upper bound for login navigations.
    pub navigation_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            login_url: DEFAULT_LOGIN_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            chrome_path: None,
            max_browser_sessions: DEFAULT_MAX_BROWSER_SESSIONS,
            screenshot_dir: PathBuf::from("."),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Build the config from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let max_browser_sessions = std::env::var("MAX_BROWSER_SESSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_browser_sessions);

        Self {
            port,
            login_url: std::env::var("PORTAL_LOGIN_URL").unwrap_or(defaults.login_url),
            username: std::env::var("PORTAL_USERNAME").unwrap_or(defaults.username),
            password: std::env::var("PORTAL_PASSWORD").unwrap_or(defaults.password),
            chrome_path: std::env::var("CHROME_PATH").ok().map(PathBuf::from),
            max_browser_sessions,
            screenshot_dir: std::env::var("SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.screenshot_dir),
            navigation_timeout: defaults.navigation_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_browser_sessions, 2);
        assert!(config.chrome_path.is_none());
        assert!(config.login_url.starts_with("https://"));
    }
}
