//! Browser-automation fallback
//!
//! When every credential is spent, the post's canonical page is rendered in
//! a headless browser and the structured responses the page itself loads
//! are intercepted and searched for the target item. Authentication uses a
//! stored session profile (cookie export) when one is available: the
//! tenant's own profiles first, then any tenant's, then a plain
//! unauthenticated session.
//!
//! The browser process is released on every exit path: all fallible page
//! work runs in an inner future whose result is captured before the
//! unconditional close/wait/abort teardown.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::{BrowserError, Result};

use super::extract::extract_status_text;
use super::FallbackResolver;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);

pub struct BrowserResolver {
    settings: BrowserConfig,
}

impl BrowserResolver {
    pub fn new(settings: BrowserConfig) -> Self {
        Self { settings }
    }

    /// Pick a stored session profile: the tenant's own directory first,
    /// falling back to every other tenant's, then none.
    fn pick_profile(&self, tenant_id: i64) -> Option<PathBuf> {
        let base = PathBuf::from(shellexpand::tilde(&self.settings.profiles_dir).to_string());

        let mut candidates = profile_files(&base.join(tenant_id.to_string()));
        if candidates.is_empty() {
            if let Ok(entries) = std::fs::read_dir(&base) {
                for entry in entries.flatten() {
                    if entry.path().is_dir() {
                        candidates.extend(profile_files(&entry.path()));
                    }
                }
            }
        }

        candidates.choose(&mut rand::thread_rng()).cloned()
    }

    async fn drive_page(
        &self,
        browser: &Browser,
        url: &str,
        item_id: &str,
        profile: Option<PathBuf>,
    ) -> Result<Option<String>> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        page.execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        // Session auth is best-effort; an unreadable profile degrades to a
        // guest session rather than failing the resolution.
        if let Some(path) = profile {
            match load_profile_cookies(&path) {
                Ok(cookies) if !cookies.is_empty() => {
                    debug!(profile = %path.display(), "applying session profile");
                    if let Err(e) = page.set_cookies(cookies).await {
                        warn!(%e, "failed to apply session profile, continuing as guest");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(%e, profile = %path.display(), "unreadable session profile"),
            }
        }

        // Listen before navigating so early responses are not missed.
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        match timeout(NAVIGATION_TIMEOUT, page.goto(url)).await {
            Ok(Ok(_)) => debug!(url, "page navigation committed"),
            Ok(Err(e)) => warn!(%e, "navigation failed, still watching responses"),
            Err(_) => warn!(url, "navigation timed out, still watching responses"),
        }

        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        for tick in 0..self.settings.poll_intervals {
            // Nudge the page partway through the window; some content only
            // loads on scroll.
            if tick == 5 || tick == 10 {
                let _ = page.evaluate("window.scrollBy(0, 400)").await;
            }

            let deadline = tokio::time::sleep(interval);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = responses.next() => {
                        match event {
                            Some(event) => {
                                if let Some(text) = inspect_response(&page, &event, item_id).await {
                                    info!(item_id, "captured post text from intercepted response");
                                    return Ok(Some(text));
                                }
                            }
                            // Listener closed; nothing more will arrive.
                            None => return Ok(None),
                        }
                    }
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl FallbackResolver for BrowserResolver {
    async fn resolve_via_page(
        &self,
        url: &str,
        item_id: &str,
        tenant_id: i64,
    ) -> Result<Option<String>> {
        let profile = self.pick_profile(tenant_id);
        if profile.is_none() {
            debug!(tenant_id, "no session profile found, scraping as guest");
        }

        let mut builder = ChromeConfig::builder().new_headless_mode().args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
        ]);
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(Path::new(executable));
        }
        let chrome_config = builder.build().map_err(BrowserError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.drive_page(&browser, url, item_id, profile).await;

        // Unconditional teardown: the page result is already captured, so
        // every path through drive_page releases the browser here.
        let _ = browser.close().await;
        let _ = browser.wait().await;
        handler_task.abort();

        result
    }
}

async fn inspect_response(
    page: &Page,
    event: &EventResponseReceived,
    item_id: &str,
) -> Option<String> {
    if event.response.status != 200 || !event.response.mime_type.contains("json") {
        return None;
    }

    let body = page
        .execute(GetResponseBodyParams::new(event.request_id.clone()))
        .await
        .ok()?;

    let raw = if body.result.base64_encoded {
        let bytes = STANDARD.decode(body.result.body.as_bytes()).ok()?;
        String::from_utf8(bytes).ok()?
    } else {
        body.result.body.clone()
    };

    let payload: Value = serde_json::from_str(&raw).ok()?;
    extract_status_text(&payload, item_id)
}

fn profile_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files
}

/// Stored session profile: a cookie export, `{"cookies": [...]}`.
#[derive(Debug, Deserialize)]
struct SessionProfile {
    #[serde(default)]
    cookies: Vec<ProfileCookie>,
}

#[derive(Debug, Deserialize)]
struct ProfileCookie {
    name: String,
    value: String,
    domain: String,
    #[serde(default)]
    path: Option<String>,
}

fn load_profile_cookies(path: &Path) -> Result<Vec<CookieParam>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BrowserError::Page(format!("read profile: {}", e)))?;
    let profile: SessionProfile = serde_json::from_str(&content)
        .map_err(|e| BrowserError::Page(format!("parse profile: {}", e)))?;

    let mut params = Vec::with_capacity(profile.cookies.len());
    for cookie in profile.cookies {
        let mut builder = CookieParam::builder()
            .name(cookie.name)
            .value(cookie.value)
            .domain(cookie.domain);
        if let Some(path) = cookie.path {
            builder = builder.path(path);
        }
        match builder.build() {
            Ok(param) => params.push(param),
            Err(e) => warn!(%e, "skipping malformed cookie in session profile"),
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_dir(dir: &Path) -> BrowserConfig {
        BrowserConfig {
            profiles_dir: dir.to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    fn write_profile(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(name),
            r#"{"cookies": [{"name": "session", "value": "abc", "domain": ".example.social"}]}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_pick_profile_prefers_own_tenant() {
        let temp = tempfile::TempDir::new().unwrap();
        write_profile(&temp.path().join("1"), "own.json");
        write_profile(&temp.path().join("2"), "other.json");

        let resolver = BrowserResolver::new(settings_with_dir(temp.path()));
        let picked = resolver.pick_profile(1).unwrap();
        assert!(picked.ends_with("1/own.json"));
    }

    #[test]
    fn test_pick_profile_falls_back_to_any_tenant() {
        let temp = tempfile::TempDir::new().unwrap();
        write_profile(&temp.path().join("2"), "other.json");

        let resolver = BrowserResolver::new(settings_with_dir(temp.path()));
        let picked = resolver.pick_profile(1).unwrap();
        assert!(picked.ends_with("2/other.json"));
    }

    #[test]
    fn test_pick_profile_none_available() {
        let temp = tempfile::TempDir::new().unwrap();
        let resolver = BrowserResolver::new(settings_with_dir(temp.path()));
        assert!(resolver.pick_profile(1).is_none());
    }

    #[test]
    fn test_non_json_files_are_not_profiles() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a profile").unwrap();

        let resolver = BrowserResolver::new(settings_with_dir(temp.path()));
        assert!(resolver.pick_profile(1).is_none());
    }

    #[test]
    fn test_load_profile_cookies() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("profile.json");
        std::fs::write(
            &path,
            r#"{"cookies": [
                {"name": "auth", "value": "tok", "domain": ".example.social", "path": "/"},
                {"name": "lang", "value": "en", "domain": ".example.social"}
            ]}"#,
        )
        .unwrap();

        let cookies = load_profile_cookies(&path).unwrap();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_load_profile_rejects_garbage() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_profile_cookies(&path).is_err());
    }
}
