//! Browser session lifecycle.
//!
//! Every lookup gets its own Chromium process, launched headless with
//! automation-resistant flags and torn down on every exit path. Site
//! isolation is disabled so the portal's same-process iframes stay
//! reachable through `contentDocument`.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;

use super::PortalError;

/// An isolated browser context scoped to a single lookup request.
pub struct BrowserSession {
    browser: Browser,
    pub page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch headless Chromium, open a blank page, and clear cookies so
    /// no state leaks between requests.
    pub async fn launch(config: &AppConfig) -> Result<Self, PortalError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-web-security")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .window_size(1280, 720);

        if let Some(path) = config.chrome_path.clone().or_else(detect_chrome) {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(PortalError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PortalError::Launch(e.to_string()))?;

        // Drive the CDP websocket until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.execute(ClearBrowserCookiesParams::default()).await?;

        info!("Headless Chromium launched");

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Best-effort full-page screenshot for offline debugging. Failure
    /// here never affects the lookup result.
    pub async fn save_screenshot(
        &self,
        dir: &Path,
        request_id: Uuid,
    ) -> anyhow::Result<PathBuf> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await?;

        let path = dir.join(format!("lookup-error-{request_id}.png"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Tear the session down. Always called, whatever the workflow did.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Error closing browser: {}", e);
        }
        self.handler_task.abort();
    }
}

/// Probe common install paths for a Chrome/Chromium binary.
pub fn detect_chrome() -> Option<PathBuf> {
    chrome_candidate_paths().into_iter().find(|p| p.exists())
}

fn chrome_candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin/google-chrome"));
        paths.push(PathBuf::from("/usr/bin/google-chrome-stable"));
        paths.push(PathBuf::from("/usr/bin/chromium-browser"));
        paths.push(PathBuf::from("/usr/bin/chromium"));
        paths.push(PathBuf::from("/snap/bin/chromium"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ));
        paths.push(PathBuf::from(
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(program_files) = std::env::var("ProgramFiles") {
            paths.push(PathBuf::from(format!(
                "{}\\Google\\Chrome\\Application\\chrome.exe",
                program_files
            )));
        }
        if let Ok(local_app_data) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                "{}\\Google\\Chrome\\Application\\chrome.exe",
                local_app_data
            )));
        }
    }

    paths
}

/// Automation engine status for the `/debug` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub engine: &'static str,
    #[serde(rename = "serviceVersion")]
    pub service_version: &'static str,
    #[serde(rename = "configuredPath")]
    pub configured_path: Option<PathBuf>,
    #[serde(rename = "detectedPath")]
    pub detected_path: Option<PathBuf>,
    #[serde(rename = "browserFound")]
    pub browser_found: bool,
}

pub fn engine_status(config: &AppConfig) -> EngineStatus {
    let detected = detect_chrome();
    let configured = config.chrome_path.clone();
    let browser_found = configured
        .as_ref()
        .map(|p| p.exists())
        .unwrap_or(false)
        || detected.is_some();

    EngineStatus {
        engine: "chromiumoxide",
        service_version: env!("CARGO_PKG_VERSION"),
        configured_path: configured,
        detected_path: detected,
        browser_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_paths_not_empty() {
        assert!(!chrome_candidate_paths().is_empty());
    }

    #[test]
    fn test_detect_chrome_does_not_panic() {
        let _ = detect_chrome();
    }

    #[test]
    fn test_engine_status_reports_configured_path() {
        let config = AppConfig {
            chrome_path: Some(PathBuf::from("/nonexistent/chrome")),
            ..AppConfig::default()
        };
        let status = engine_status(&config);
        assert_eq!(status.engine, "chromiumoxide");
        assert_eq!(
            status.configured_path,
            Some(PathBuf::from("/nonexistent/chrome"))
        );
    }
}
