//! The page backend seam.
//!
//! The session manager only ever talks to the remote page through these two
//! traits: open a page, evaluate a JS expression to JSON, screenshot one
//! element, close. The chromiumoxide implementation lives behind the
//! `browser` feature; tests drive the session manager with a fake.

use async_trait::async_trait;
use serde_json::Value;

/// An open remote page, exclusively owned by its session.
#[async_trait]
pub trait PageHandle: Send + Sync + 'static {
    /// Evaluate a JS expression in the page and return its JSON value.
    async fn eval(&self, expr: &str) -> anyhow::Result<Value>;

    /// Screenshot the element matching `selector` as PNG bytes.
    async fn screenshot_element(&self, selector: &str) -> anyhow::Result<Vec<u8>>;

    /// Release the page and its browser context.
    async fn close(&mut self);
}

/// Opens browser pages.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Page: PageHandle;

    /// Launch a browser context and navigate it to `url`.
    async fn open(&self, url: &str) -> anyhow::Result<Self::Page>;
}

#[cfg(feature = "browser")]
pub mod chromium {
    //! CDP backend using chromiumoxide.

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use serde_json::Value;
    use tracing::{debug, info};

    use super::{Backend, PageHandle};

    pub struct ChromiumBackend {
        config: doodlebot_core::config::BrowserConfig,
    }

    impl ChromiumBackend {
        pub fn new(config: doodlebot_core::config::BrowserConfig) -> Self {
            Self { config }
        }
    }

    pub struct ChromiumPage {
        browser: Browser,
        page: Page,
        handler_task: tokio::task::JoinHandle<()>,
    }

    #[async_trait]
    impl Backend for ChromiumBackend {
        type Page = ChromiumPage;

        async fn open(&self, url: &str) -> anyhow::Result<ChromiumPage> {
            let mut builder = BrowserConfig::builder()
                .window_size(self.config.viewport_width, self.config.viewport_height)
                .arg("--no-sandbox")
                .arg("--disable-setuid-sandbox")
                .arg("--disable-dev-shm-usage");

            if !self.config.headless {
                builder = builder.with_head();
            }
            if let Some(path) = self.config.chrome_path() {
                builder = builder.chrome_executable(path);
            }

            let config = builder
                .build()
                .map_err(|e| anyhow::anyhow!("browser config: {e}"))?;

            let (browser, mut handler) = Browser::launch(config).await?;

            // The handler stream must be drained for the browser to function.
            let handler_task = tokio::spawn(async move {
                while let Some(_event) = handler.next().await {}
            });

            info!(url, "browser launched, navigating");
            let page = browser.new_page(url).await?;

            Ok(ChromiumPage {
                browser,
                page,
                handler_task,
            })
        }
    }

    #[async_trait]
    impl PageHandle for ChromiumPage {
        async fn eval(&self, expr: &str) -> anyhow::Result<Value> {
            let result = self.page.evaluate(expr).await?;
            Ok(result.into_value::<Value>().unwrap_or(Value::Null))
        }

        async fn screenshot_element(&self, selector: &str) -> anyhow::Result<Vec<u8>> {
            let element = self
                .page
                .find_element(selector)
                .await
                .map_err(|e| anyhow::anyhow!("element {selector:?} not found: {e}"))?;
            let png = element.screenshot(CaptureScreenshotFormat::Png).await?;
            Ok(png)
        }

        async fn close(&mut self) {
            if let Err(e) = self.browser.close().await {
                debug!(error = %e, "browser close failed");
            }
            self.handler_task.abort();
        }
    }
}
