//! Session manager — the lifecycle of the single attached page.
//!
//! One session slot, guarded by a mutex: attaches are serialized against each
//! other and against draw/capture sequences, so a new attach can never race a
//! command against a mid-replacement handle. Replacing a session always
//! releases the old handle before the new context opens.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use doodlebot_core::command::DrawCommand;
use doodlebot_core::config::{BrowserConfig, CanvasConfig};
use doodlebot_core::error::{DoodleBotError, Result};
use doodlebot_core::session::{CanvasHost, SessionState};

use crate::backend::{Backend, PageHandle};
use crate::{capture, surface};

struct Session<P> {
    target_url: String,
    page: P,
    /// Tool table snapshot taken at attach time.
    tools: HashMap<String, String>,
}

pub struct SessionManager<B: Backend> {
    backend: B,
    browser: BrowserConfig,
    canvas: CanvasConfig,
    state: RwLock<SessionState>,
    slot: Mutex<Option<Session<B::Page>>>,
}

impl<B: Backend> SessionManager<B> {
    pub fn new(backend: B, browser: BrowserConfig, canvas: CanvasConfig) -> Self {
        Self {
            backend,
            browser,
            canvas,
            state: RwLock::new(SessionState::Empty),
            slot: Mutex::new(None),
        }
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    fn check_url(&self, url: &str) -> Result<()> {
        let parsed =
            Url::parse(url).map_err(|e| DoodleBotError::Attach(format!("invalid url: {e}")))?;
        if self.canvas.allowed_hosts.is_empty() {
            return Ok(());
        }
        let host = parsed.host_str().unwrap_or_default();
        if self
            .canvas
            .allowed_hosts
            .iter()
            .any(|allowed| host.contains(allowed.as_str()))
        {
            Ok(())
        } else {
            Err(DoodleBotError::Attach(format!("host not allowed: {host}")))
        }
    }

    /// Open, wait for the canvas target, and inject the control surface.
    /// Closes the page on any failure so no half-open handle escapes.
    async fn open_ready(&self, url: &str) -> Result<B::Page> {
        let nav_timeout = Duration::from_millis(self.browser.nav_timeout_ms);
        let mut page = tokio::time::timeout(nav_timeout, self.backend.open(url))
            .await
            .map_err(|_| {
                DoodleBotError::Attach(format!(
                    "navigation timed out after {}ms",
                    self.browser.nav_timeout_ms
                ))
            })?
            .map_err(|e| DoodleBotError::Attach(e.to_string()))?;

        if let Err(e) = self.wait_for_target(&page).await {
            page.close().await;
            return Err(e);
        }
        if let Err(e) = self.inject_surface(&page).await {
            page.close().await;
            return Err(e);
        }
        Ok(page)
    }

    async fn wait_for_target(&self, page: &B::Page) -> Result<()> {
        let probe = surface::target_probe(&self.canvas.selector);
        let poll = Duration::from_millis(self.browser.selector_poll_ms.max(1));
        let attempts = (self.browser.selector_wait_ms / self.browser.selector_poll_ms.max(1)).max(1);

        for _ in 0..attempts {
            match page.eval(&probe).await {
                Ok(value) if value.as_bool() == Some(true) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    return Err(DoodleBotError::Attach(format!("target probe failed: {e}")));
                }
            }
            tokio::time::sleep(poll).await;
        }

        Err(DoodleBotError::Attach(format!(
            "canvas target {:?} did not appear within {}ms",
            self.canvas.selector, self.browser.selector_wait_ms
        )))
    }

    async fn inject_surface(&self, page: &B::Page) -> Result<()> {
        let script = surface::injection_script(&self.canvas.selector);
        page.eval(&script)
            .await
            .map_err(|e| DoodleBotError::Attach(format!("surface injection failed: {e}")))?;
        debug!(selector = %self.canvas.selector, "control surface injected");
        Ok(())
    }

    async fn capture_session(&self, session: &Session<B::Page>) -> Result<Vec<u8>> {
        let png = session
            .page
            .screenshot_element(&self.canvas.selector)
            .await
            .map_err(|e| DoodleBotError::Capture(e.to_string()))?;
        capture::recompress(
            &png,
            self.canvas.capture.max_dimension,
            self.canvas.capture.jpeg_quality,
        )
    }
}

#[async_trait]
impl<B: Backend> CanvasHost for SessionManager<B> {
    async fn attach(&self, url: &str) -> Result<()> {
        self.check_url(url)?;

        let mut slot = self.slot.lock().await;

        // Release-then-open: never two live contexts at once.
        if let Some(mut old) = slot.take() {
            debug!(url = %old.target_url, "releasing previous session");
            old.page.close().await;
        }
        self.set_state(SessionState::Attaching).await;

        match self.open_ready(url).await {
            Ok(page) => {
                *slot = Some(Session {
                    target_url: url.to_string(),
                    page,
                    tools: self.canvas.tools.clone(),
                });
                self.set_state(SessionState::Ready).await;
                info!(url, "session attached");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed).await;
                warn!(url, error = %e, "attach failed");
                Err(e)
            }
        }
    }

    async fn detach(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut session) = slot.take() {
            debug!(url = %session.target_url, "detaching session");
            session.page.close().await;
        }
        self.set_state(SessionState::Empty).await;
    }

    async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    async fn draw(&self, command: &DrawCommand) -> Result<Vec<u8>> {
        let slot = self.slot.lock().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| DoodleBotError::Surface("no session attached".into()))?;
        if !self.state().await.is_ready() {
            return Err(DoodleBotError::Surface("session not ready".into()));
        }

        let (op, args) = surface::operation(command, &session.tools)?;
        let expr = surface::call_expr(op, &args);
        let reply = session
            .page
            .eval(&expr)
            .await
            .map_err(|e| DoodleBotError::Surface(e.to_string()))?;
        surface::parse_result(&reply)?;

        self.capture_session(session).await
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        let slot = self.slot.lock().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| DoodleBotError::Capture("no session attached".into()))?;
        self.capture_session(session).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;

    type EventLog = Arc<StdMutex<Vec<String>>>;

    fn white_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(64, 32, image::Rgba([255, 255, 255, 255]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    struct FakeBackend {
        log: EventLog,
        target_present: bool,
    }

    struct FakePage {
        url: String,
        log: EventLog,
        target_present: bool,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        type Page = FakePage;

        async fn open(&self, url: &str) -> anyhow::Result<FakePage> {
            self.log.lock().unwrap().push(format!("open:{url}"));
            Ok(FakePage {
                url: url.to_string(),
                log: self.log.clone(),
                target_present: self.target_present,
            })
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn eval(&self, expr: &str) -> anyhow::Result<Value> {
            if expr.contains("!== null") {
                return Ok(Value::Bool(self.target_present));
            }
            if expr.starts_with("window.__doodlebot.dispatch(") {
                self.log.lock().unwrap().push(format!("dispatch:{expr}"));
                return Ok(json!({ "ok": true }));
            }
            // Surface injection
            Ok(Value::Bool(true))
        }

        async fn screenshot_element(&self, _selector: &str) -> anyhow::Result<Vec<u8>> {
            Ok(white_png())
        }

        async fn close(&mut self) {
            self.log.lock().unwrap().push(format!("close:{}", self.url));
        }
    }

    fn manager(target_present: bool) -> (SessionManager<FakeBackend>, EventLog) {
        let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let backend = FakeBackend {
            log: log.clone(),
            target_present,
        };
        let browser = BrowserConfig {
            selector_wait_ms: 5,
            selector_poll_ms: 1,
            ..BrowserConfig::default()
        };
        (
            SessionManager::new(backend, browser, CanvasConfig::default()),
            log,
        )
    }

    fn dispatch_count(log: &EventLog) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("dispatch:"))
            .count()
    }

    #[tokio::test]
    async fn test_attach_reaches_ready() {
        let (mgr, log) = manager(true);
        mgr.attach("http://doodle.example/room/1").await.unwrap();
        assert_eq!(mgr.state().await, SessionState::Ready);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["open:http://doodle.example/room/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reattach_releases_before_open() {
        let (mgr, log) = manager(true);
        mgr.attach("http://doodle.example/a").await.unwrap();
        mgr.attach("http://doodle.example/b").await.unwrap();
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[
                "open:http://doodle.example/a".to_string(),
                "close:http://doodle.example/a".to_string(),
                "open:http://doodle.example/b".to_string(),
            ]
        );
        assert_eq!(mgr.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_attaches_serialize() {
        let (mgr, log) = manager(true);
        let mgr = Arc::new(mgr);
        let first = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.attach("http://doodle.example/a").await })
        };
        let second = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.attach("http://doodle.example/b").await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Whichever attach wins the lock, the loser's open never interleaves:
        // exactly open, close, open.
        let events = log.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[0].starts_with("open:"));
        assert!(events[1].starts_with("close:"));
        assert!(events[2].starts_with("open:"));
        drop(events);
        assert_eq!(mgr.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_attach_without_target_fails_closed() {
        let (mgr, log) = manager(false);
        let err = mgr.attach("http://doodle.example/x").await.unwrap_err();
        assert!(err.to_string().contains("did not appear"));
        assert_eq!(mgr.state().await, SessionState::Failed);
        // The partially-opened page was released
        let events = log.lock().unwrap();
        assert_eq!(events.last().unwrap(), "close:http://doodle.example/x");
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let (mgr, log) = manager(true);
        assert!(mgr.attach("not a url").await.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_host_allowlist_enforced() {
        let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let backend = FakeBackend {
            log: log.clone(),
            target_present: true,
        };
        let canvas = CanvasConfig {
            allowed_hosts: vec!["doodlegator".into()],
            ..CanvasConfig::default()
        };
        let mgr = SessionManager::new(backend, BrowserConfig::default(), canvas);

        let err = mgr.attach("http://example.com/page").await.unwrap_err();
        assert!(err.to_string().contains("host not allowed"));
        assert!(log.lock().unwrap().is_empty());

        mgr.attach("https://app.doodlegator.io/room").await.unwrap();
        assert_eq!(mgr.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_draw_without_session_touches_nothing() {
        let (mgr, log) = manager(true);
        let cmd = doodlebot_core::command::parse("line 0 0 10 10").unwrap();
        assert!(mgr.draw(&cmd).await.is_err());
        assert_eq!(dispatch_count(&log), 0);
    }

    #[tokio::test]
    async fn test_draw_dispatches_and_captures() {
        let (mgr, log) = manager(true);
        mgr.attach("http://doodle.example/a").await.unwrap();

        let cmd = doodlebot_core::command::parse("line 0 0 10 10").unwrap();
        let jpg = mgr.draw(&cmd).await.unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);

        assert_eq!(dispatch_count(&log), 1);
        let events = log.lock().unwrap();
        let dispatch = events.iter().find(|e| e.starts_with("dispatch:")).unwrap();
        assert!(dispatch.contains("drawLine"));
    }

    #[tokio::test]
    async fn test_capture_without_session_errors() {
        let (mgr, _log) = manager(true);
        let err = mgr.capture().await.unwrap_err();
        assert!(matches!(err, DoodleBotError::Capture(_)));
    }

    #[tokio::test]
    async fn test_detach_resets_to_empty() {
        let (mgr, log) = manager(true);
        mgr.attach("http://doodle.example/a").await.unwrap();
        mgr.detach().await;
        assert_eq!(mgr.state().await, SessionState::Empty);
        assert_eq!(
            log.lock().unwrap().last().unwrap(),
            "close:http://doodle.example/a"
        );
    }
}
