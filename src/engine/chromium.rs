//! Headless Chromium engine backed by `chromiumoxide`.
//!
//! The browser, its CDP event handler and every page live on the engine loop
//! thread. Operations spawn local tasks that drive the CDP calls and fulfil
//! the caller's completion when they finish.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::future::LocalBoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{Completion, Engine, EngineFactory, JsValue, PageId};
use crate::{PrerenderError, Result};

const BLANK_URL: &str = "about:blank";

/// Launch settings for the headless browser.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Chrome/Chromium binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Pass `--no-sandbox` (usually required inside containers).
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Extra command-line arguments for the browser.
    pub args: Vec<String>,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            window_width: 1280,
            window_height: 800,
            args: Vec::new(),
        }
    }
}

impl ChromiumOptions {
    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window_width, self.window_height)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        for arg in &self.args {
            builder = builder.arg(arg.as_str());
        }
        builder
            .build()
            .map_err(|e| PrerenderError::engine_unavailable(format!("Browser config error: {e}")))
    }
}

/// Engine factory that launches Chromium on the loop thread.
pub fn factory(options: ChromiumOptions) -> EngineFactory {
    Box::new(move || -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> {
        Box::pin(async move {
            let engine = ChromiumEngine::launch(&options).await?;
            Ok(Box::new(engine) as Box<dyn Engine>)
        })
    })
}

type Pages = Rc<RefCell<HashMap<PageId, Page>>>;

pub struct ChromiumEngine {
    browser: Rc<Browser>,
    pages: Pages,
    next_id: u64,
}

impl ChromiumEngine {
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let config = options.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PrerenderError::engine_unavailable(format!("failed to launch browser: {e}")))?;

        tokio::task::spawn_local(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "browser event error");
                }
            }
            debug!("browser event handler finished");
        });

        Ok(Self {
            browser: Rc::new(browser),
            pages: Rc::new(RefCell::new(HashMap::new())),
            next_id: 1,
        })
    }

    fn page(&self, page: PageId) -> Option<Page> {
        self.pages.borrow().get(&page).cloned()
    }
}

impl Engine for ChromiumEngine {
    fn create_page(&mut self, done: Completion<PageId>) {
        let id = PageId(self.next_id);
        self.next_id += 1;
        let browser = Rc::clone(&self.browser);
        let pages = Rc::clone(&self.pages);
        tokio::task::spawn_local(async move {
            match browser.new_page(BLANK_URL).await {
                Ok(page) => {
                    pages.borrow_mut().insert(id, page);
                    done.succeed(id);
                }
                Err(err) => done.fail(PrerenderError::engine_unavailable(format!(
                    "failed to open page: {err}"
                ))),
            }
        });
    }

    fn load(&mut self, page: PageId, url: &str, done: Completion<()>) {
        let Some(page) = self.page(page) else {
            done.fail(PrerenderError::PageClosed);
            return;
        };
        let url = url.to_string();
        tokio::task::spawn_local(async move {
            match page.goto(url.as_str()).await {
                Ok(_) => done.succeed(()),
                Err(err) => {
                    debug!(%url, error = %err, "navigation failed");
                    done.fail(PrerenderError::load_failed(url));
                }
            }
        });
    }

    fn evaluate(&mut self, page: PageId, script: &str, done: Completion<JsValue>) {
        let Some(page) = self.page(page) else {
            done.fail(PrerenderError::PageClosed);
            return;
        };
        let script = script.to_string();
        tokio::task::spawn_local(async move {
            match page.evaluate(script.as_str()).await {
                Ok(result) => done.succeed(result.value().cloned().unwrap_or(JsValue::Null)),
                Err(err) => done.fail(PrerenderError::script(err.to_string())),
            }
        });
    }

    fn uri(&mut self, page: PageId, done: Completion<String>) {
        let Some(page) = self.page(page) else {
            done.fail(PrerenderError::PageClosed);
            return;
        };
        tokio::task::spawn_local(async move {
            match page.url().await {
                Ok(url) => done.succeed(url.unwrap_or_default()),
                Err(err) => done.fail(PrerenderError::script(err.to_string())),
            }
        });
    }

    fn title(&mut self, page: PageId, done: Completion<String>) {
        let Some(page) = self.page(page) else {
            done.fail(PrerenderError::PageClosed);
            return;
        };
        tokio::task::spawn_local(async move {
            match page.get_title().await {
                Ok(title) => done.succeed(title.unwrap_or_default()),
                Err(err) => done.fail(PrerenderError::script(err.to_string())),
            }
        });
    }

    fn destroy(&mut self, page: PageId) {
        let Some(page) = self.pages.borrow_mut().remove(&page) else {
            return;
        };
        tokio::task::spawn_local(async move {
            if let Err(err) = page.close().await {
                warn!(error = %err, "failed to close page");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_headless() {
        let opts = ChromiumOptions::default();
        assert!(opts.headless);
        assert!(!opts.no_sandbox);
        assert!(opts.executable.is_none());
        assert_eq!((opts.window_width, opts.window_height), (1280, 800));
    }
}
