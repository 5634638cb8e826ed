//! DOM wait and iframe plumbing.
//!
//! The portal keeps every view inside an iframe, and chromiumoxide's
//! selector API only sees the top document. With site isolation off the
//! frames share the renderer process, so everything frame-scoped runs as
//! injected JavaScript walking `contentDocument`.

use chromiumoxide::element::Element;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

use super::PortalError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// JSON-escape a value for safe embedding inside injected JavaScript.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Poll until `selector` is attached to the top document, or time out.
pub async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, PortalError> {
    let start = Instant::now();
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if start.elapsed() >= timeout {
            return Err(PortalError::Timeout(selector.to_string()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Whether `selector` currently exists in the top document.
pub async fn selector_exists(page: &Page, selector: &str) -> bool {
    page.find_element(selector).await.is_ok()
}

/// Evaluate `body` against the document of the iframe matching
/// `frame_selector`. The body sees the frame document as `doc` and its
/// return value is deserialized into `T`. A missing or unreadable frame
/// yields `null`, so `T` is usually an `Option`.
pub async fn eval_in_frame<T: DeserializeOwned>(
    page: &Page,
    frame_selector: &str,
    body: &str,
) -> Result<T, PortalError> {
    let js = format!(
        r#"(() => {{
            const frame = document.querySelector({frame});
            let doc = null;
            try {{ doc = frame && frame.contentDocument; }} catch (e) {{ doc = null; }}
            if (!doc) {{ return null; }}
            {body}
        }})()"#,
        frame = js_string(frame_selector),
    );

    page.evaluate(js)
        .await?
        .into_value::<T>()
        .map_err(|e| PortalError::Extraction(format!("frame {frame_selector}: {e}")))
}

/// Whether `inner_selector` exists inside the given iframe's document.
pub async fn frame_has_selector(
    page: &Page,
    frame_selector: &str,
    inner_selector: &str,
) -> Result<bool, PortalError> {
    let body = format!(
        "return !!doc.querySelector({});",
        js_string(inner_selector)
    );
    let found: Option<bool> = eval_in_frame(page, frame_selector, &body).await?;
    Ok(found.unwrap_or(false))
}

/// Poll until `inner_selector` appears inside the iframe, or time out.
pub async fn wait_for_frame_selector(
    page: &Page,
    frame_selector: &str,
    inner_selector: &str,
    timeout: Duration,
) -> Result<(), PortalError> {
    let start = Instant::now();
    loop {
        if frame_has_selector(page, frame_selector, inner_selector).await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(PortalError::Timeout(format!(
                "{inner_selector} in {frame_selector}"
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Click the first top-document element matching `selector` whose text
/// contains `needle`. Returns whether a target existed.
pub async fn click_matching_text(
    page: &Page,
    selector: &str,
    needle: &str,
) -> Result<bool, PortalError> {
    let js = format!(
        r#"(() => {{
            const entries = Array.from(document.querySelectorAll({sel}));
            const target = entries.find(el => (el.textContent || '').includes({needle}));
            if (!target) {{ return false; }}
            target.click();
            return true;
        }})()"#,
        sel = js_string(selector),
        needle = js_string(needle),
    );
    page.evaluate(js)
        .await?
        .into_value::<bool>()
        .map_err(|e| PortalError::Extraction(format!("click on {selector}: {e}")))
}

/// Click an element inside an iframe. Returns whether a target existed.
pub async fn click_in_frame(
    page: &Page,
    frame_selector: &str,
    inner_selector: &str,
) -> Result<bool, PortalError> {
    let body = format!(
        r#"const el = doc.querySelector({});
           if (!el) {{ return false; }}
           el.click();
           return true;"#,
        js_string(inner_selector)
    );
    let clicked: Option<bool> = eval_in_frame(page, frame_selector, &body).await?;
    Ok(clicked.unwrap_or(false))
}
