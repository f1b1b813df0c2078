//! Chromium driver over the DevTools protocol.
//!
//! Only compiled with the `browser` feature. The driver owns a private tokio
//! runtime and blocks on each CDP call, so sessions stay synchronous.

use crate::config::HarnessConfig;
use crate::driver::{Driver, ElementHandle, Launcher, Viewport};
use crate::locator::Strategy;
use crate::result::{VigilError, VigilResult};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Launches local Chromium processes
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    sandbox: bool,
    executable: Option<PathBuf>,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            executable: None,
        }
    }
}

impl ChromiumLauncher {
    /// Launcher with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher following the harness configuration
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        let launcher = Self::new().with_headless(config.headless);
        if config.no_sandbox {
            launcher.without_sandbox()
        } else {
            launcher
        }
    }

    /// Run without a window
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable the Chromium sandbox (needed in most containers)
    #[must_use]
    pub const fn without_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Use a specific Chromium binary
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    async fn start(&self, viewport: Viewport) -> VigilResult<(CdpBrowser, CdpPage, JoinHandle<()>)> {
        let mut builder = CdpConfig::builder().window_size(viewport.width, viewport.height);
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(VigilError::unavailable)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| VigilError::unavailable(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| VigilError::unavailable(e.to_string()))?;
        Ok((browser, page, handle))
    }
}

impl Launcher for ChromiumLauncher {
    fn launch(&self, viewport: Viewport) -> VigilResult<Box<dyn Driver>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| VigilError::unavailable(format!("tokio runtime: {e}")))?;
        let (browser, page, handler) = runtime.block_on(self.start(viewport))?;
        tracing::info!(%viewport, headless = self.headless, "chromium launched");
        Ok(Box::new(ChromiumDriver {
            runtime,
            browser: Some(browser),
            page,
            handler,
        }))
    }
}

/// One Chromium process with a single page
#[derive(Debug)]
pub struct ChromiumDriver {
    runtime: Runtime,
    browser: Option<CdpBrowser>,
    page: CdpPage,
    handler: JoinHandle<()>,
}

/// Attribute stamped on every element returned by `find_elements`
const HANDLE_ATTRIBUTE: &str = "data-vigil-id";

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// JavaScript expression yielding the matching nodes as an array
fn query_expression(strategy: &Strategy) -> String {
    match strategy {
        Strategy::Css(selector) => {
            format!("Array.from(document.querySelectorAll({}))", js_string(selector))
        }
        Strategy::TagName(tag) => {
            format!("Array.from(document.getElementsByTagName({}))", js_string(tag))
        }
        Strategy::AttributeEquals { name, value } => format!(
            "Array.from(document.querySelectorAll('*')).filter(e => e.getAttribute({}) === {})",
            js_string(name),
            js_string(value)
        ),
        // deepest elements containing the text
        Strategy::TextContains(text) => format!(
            "(() => {{ const t = {text}; const has = e => (e.innerText || e.textContent || '').includes(t); \
             return Array.from(document.querySelectorAll('body *')).filter(e => has(e) && !Array.from(e.children).some(has)); }})()",
            text = js_string(text)
        ),
    }
}

fn find_script(strategy: &Strategy) -> String {
    format!(
        "(() => {{ \
            const nodes = {query}; \
            return nodes.map(e => {{ \
                if (!e.hasAttribute('{attr}')) {{ \
                    window.__vigilSeq = (window.__vigilSeq || 0) + 1; \
                    e.setAttribute('{attr}', String(window.__vigilSeq)); \
                }} \
                const rect = e.getBoundingClientRect(); \
                const style = window.getComputedStyle(e); \
                return {{ \
                    id: e.getAttribute('{attr}'), \
                    tag_name: e.tagName.toLowerCase(), \
                    text_content: (e.innerText || e.textContent || '').trim(), \
                    attributes: Object.fromEntries(Array.from(e.attributes).map(a => [a.name, a.value])), \
                    visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none', \
                    enabled: !e.disabled, \
                    checked: !!e.checked \
                }}; \
            }}); \
        }})()",
        query = query_expression(strategy),
        attr = HANDLE_ATTRIBUTE,
    )
}

/// Evaluate errors raised while the page is being replaced.
///
/// A click that starts a navigation tears down the script context the
/// next lookup runs in; the new document simply has no matches yet.
fn is_context_lost(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("execution context was destroyed")
        || message.contains("cannot find context with specified id")
        || message.contains("inspected target navigated or closed")
}

impl ChromiumDriver {
    async fn locate(&self, element: &ElementHandle, action: &str) -> VigilResult<chromiumoxide::element::Element> {
        let selector = format!("[{HANDLE_ATTRIBUTE}=\"{}\"]", element.id);
        self.page
            .find_element(selector)
            .await
            .map_err(|e| VigilError::driver(action, format!("element {} is gone: {e}", element.id)))
    }
}

impl Driver for ChromiumDriver {
    fn set_viewport(&mut self, viewport: Viewport) -> VigilResult<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        self.runtime
            .block_on(self.page.execute(params))
            .map_err(|e| VigilError::driver("set viewport", e.to_string()))?;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> VigilResult<()> {
        self.runtime
            .block_on(self.page.goto(url))
            .map_err(|e| VigilError::driver(format!("navigate to {url}"), e.to_string()))?;
        Ok(())
    }

    fn find_elements(&self, strategy: &Strategy) -> VigilResult<Vec<ElementHandle>> {
        let script = find_script(strategy);
        self.runtime.block_on(async {
            let value = match self.page.evaluate(script).await {
                Ok(value) => value,
                Err(e) if is_context_lost(&e.to_string()) => {
                    tracing::trace!(error = %e, "page context replaced during lookup");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(VigilError::driver("find elements", e.to_string())),
            };
            value
                .into_value::<Vec<ElementHandle>>()
                .map_err(|e| VigilError::driver("find elements", e.to_string()))
        })
    }

    fn click(&mut self, element: &ElementHandle) -> VigilResult<()> {
        self.runtime.block_on(async {
            self.locate(element, "click")
                .await?
                .click()
                .await
                .map_err(|e| VigilError::driver("click", e.to_string()))?;
            Ok(())
        })
    }

    fn type_text(&mut self, element: &ElementHandle, text: &str) -> VigilResult<()> {
        self.runtime.block_on(async {
            let target = self.locate(element, "type").await?;
            target
                .click()
                .await
                .map_err(|e| VigilError::driver("focus", e.to_string()))?;
            target
                .type_str(text)
                .await
                .map_err(|e| VigilError::driver("type", e.to_string()))?;
            Ok(())
        })
    }

    fn current_url(&self) -> VigilResult<String> {
        self.runtime
            .block_on(self.page.url())
            .map(Option::unwrap_or_default)
            .map_err(|e| VigilError::driver("read url", e.to_string()))
    }

    fn title(&self) -> VigilResult<String> {
        self.runtime
            .block_on(self.page.get_title())
            .map(Option::unwrap_or_default)
            .map_err(|e| VigilError::driver("read title", e.to_string()))
    }

    fn close(&mut self) -> VigilResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self.runtime.block_on(async {
            browser.close().await?;
            browser.wait().await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
        });
        self.handler.abort();
        tracing::info!("chromium closed");
        result.map_err(|e| VigilError::driver("close", e.to_string()))
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if self.browser.is_some() {
            let _ = Driver::close(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_query_is_quoted() {
        let js = query_expression(&Strategy::Css("input[type='email']".into()));
        assert_eq!(js, "Array.from(document.querySelectorAll(\"input[type='email']\"))");
    }

    #[test]
    fn test_text_query_escapes_quotes() {
        let js = query_expression(&Strategy::TextContains("say \"hi\"".into()));
        assert!(js.contains(r#"const t = "say \"hi\"""#));
    }

    #[test]
    fn test_find_script_stamps_handles() {
        let js = find_script(&Strategy::TagName("h1".into()));
        assert!(js.contains("data-vigil-id"));
        assert!(js.contains("getElementsByTagName(\"h1\")"));
    }

    #[test]
    fn test_find_script_reports_checked_state() {
        let js = find_script(&Strategy::Css("input[type='radio']".into()));
        assert!(js.contains("checked: !!e.checked"));
    }

    #[test]
    fn test_context_loss_is_recognized() {
        assert!(is_context_lost(
            "Execution context was destroyed, most likely because of a navigation."
        ));
        assert!(is_context_lost("Cannot find context with specified id"));
        assert!(!is_context_lost("SyntaxError: Unexpected token"));
        assert!(!is_context_lost("websocket closed"));
    }

    #[test]
    fn test_launcher_from_config() {
        let launcher = ChromiumLauncher::from_config(&HarnessConfig::default().with_headless(false));
        assert!(!launcher.headless);
        assert!(launcher.sandbox);
    }

    #[test]
    fn test_launcher_from_config_without_sandbox() {
        let launcher = ChromiumLauncher::from_config(&HarnessConfig::default().with_no_sandbox(true));
        assert!(launcher.headless);
        assert!(!launcher.sandbox);
    }
}
