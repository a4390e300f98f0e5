//! Static snapshots of dynamic pages.
//!
//! [`StaticRenderer`] navigates a single retained session to the requested
//! page, polls the application's readiness flag and serializes the resulting
//! document. Renders are single-flight: concurrent requests queue on the
//! session guard in arrival order.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{is_truthy, JsValue};
use crate::session::{Context, Session};
use crate::{PrerenderError, Result};

/// Expression the application sets once client-side rendering has settled.
pub const DEFAULT_READY_EXPRESSION: &str = "window.$renderStaticReady";

/// Expression that serializes the current document.
pub const OUTER_HTML_EXPRESSION: &str = "document.documentElement.outerHTML";

/// Default maximum time to wait for the readiness flag.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default delay between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const SCRIPT_OPEN: &str = "<script";
const DISABLED_SCRIPT_OPEN: &str = r#"<script type="text/disabled""#;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Prefix joined with each request path to form the page address.
    pub target_base_url: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Serve whatever is rendered at the timeout instead of failing.
    pub return_unfinished_pages: bool,
    /// Neutralize `<script>` tags in the output. Not a security boundary.
    pub remove_scripts: bool,
    pub ready_expression: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            target_base_url: "http://localhost:3000".to_string(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            return_unfinished_pages: false,
            remove_scripts: false,
            ready_expression: DEFAULT_READY_EXPRESSION.to_string(),
        }
    }
}

/// A serialized page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    /// False when the page never signaled readiness and was served anyway.
    pub finished: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct StaticRenderer {
    context: Context,
    options: RenderOptions,
    session: Mutex<Option<Session>>,
}

impl StaticRenderer {
    pub fn new(context: Context, options: RenderOptions) -> Self {
        Self {
            context,
            options,
            session: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Joins the target base with `request_path` (path plus query).
    pub fn target_url(&self, request_path: &str) -> String {
        let base = self.options.target_base_url.as_str();
        match (base.ends_with('/'), request_path.starts_with('/')) {
            (true, true) => format!("{}{}", base, &request_path[1..]),
            (false, false) if !request_path.is_empty() && !request_path.starts_with('?') => {
                format!("{base}/{request_path}")
            }
            _ => format!("{base}{request_path}"),
        }
    }

    /// Renders the page at `request_path` to static HTML.
    pub async fn render(&self, request_path: &str) -> Result<RenderedPage> {
        let mut slot = self.session.lock().await;
        let started = Instant::now();

        if slot.is_none() {
            debug!("creating retained render session");
            *slot = Some(self.context.new_session().await?);
        }
        let Some(session) = &mut *slot else {
            return Err(PrerenderError::engine_unavailable("render session missing"));
        };

        let url = self.target_url(request_path);
        info!(%url, "rendering HTML for page");
        session.open(&url)?;
        session.wait().await?;

        let finished = self.await_readiness(session, &url, started).await?;

        let html = match session.evaluate_script(OUTER_HTML_EXPRESSION).await {
            Ok(JsValue::String(html)) => html,
            Ok(other) => {
                warn!(%url, "document serialization returned a non-string value");
                return Err(PrerenderError::UnexpectedValue(format!(
                    "expected markup string, got {other}"
                )));
            }
            Err(err) => {
                warn!(%url, error = %err, "failed to dump HTML for page");
                return Err(err);
            }
        };
        let html = if self.options.remove_scripts {
            neutralize_scripts(&html)
        } else {
            html
        };

        Ok(RenderedPage {
            url,
            html,
            finished,
            elapsed: started.elapsed(),
        })
    }

    /// Closes the retained session; the next render creates a new one.
    pub async fn release(&self) {
        if let Some(session) = self.session.lock().await.take() {
            debug!(page = %session.page_id(), "releasing render session");
            session.close();
        }
    }

    /// Polls the readiness expression until it is truthy or the wait timeout,
    /// measured from `started`, elapses. Returns whether the page finished.
    async fn await_readiness(&self, session: &Session, url: &str, started: Instant) -> Result<bool> {
        let timeout = self.options.wait_timeout;
        loop {
            let ready = session
                .evaluate_script(&self.options.ready_expression)
                .await?;
            if is_truthy(&ready) {
                return Ok(true);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                if self.options.return_unfinished_pages {
                    warn!(%url, ?timeout, "page did not signal readiness; returning unfinished page");
                    return Ok(false);
                }
                warn!(%url, ?timeout, "page did not signal readiness; returning error");
                return Err(PrerenderError::ReadinessTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.options.poll_interval.min(timeout - elapsed)).await;
        }
    }
}

/// Makes every `<script` opening tag inert by giving it a non-executable
/// type. All other bytes are left untouched.
pub fn neutralize_scripts(html: &str) -> String {
    html.replace(SCRIPT_OPEN, DISABLED_SCRIPT_OPEN)
}
